//! Largest-first coin selection over available outputs.

use dlcplaza_types::{DlcError, Result, Utxo, UtxoFilter};
use tracing::debug;

use crate::ledger::UtxoLedger;

/// Outputs picked to cover a target amount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub inputs: Vec<Utxo>,
    pub total: u64,
    pub target: u64,
}

impl Selection {
    #[must_use]
    pub fn change(&self) -> u64 {
        self.total - self.target
    }

    #[must_use]
    pub fn outpoints(&self) -> Vec<dlcplaza_types::OutPoint> {
        self.inputs.iter().map(|u| u.outpoint).collect()
    }
}

/// Pick available outputs, largest value first, until `target_sats` is covered.
///
/// Soft-earmarked outputs are skipped when `skip_soft_reserved` is set. At
/// most `max_inputs` outputs are used.
///
/// # Errors
/// `InsufficientFunds` with the best reachable total if the target cannot be met.
pub fn select_inputs(
    ledger: &UtxoLedger,
    target_sats: u64,
    wallet_tag: Option<&str>,
    skip_soft_reserved: bool,
    max_inputs: usize,
) -> Result<Selection> {
    let mut filter = UtxoFilter::new();
    if let Some(tag) = wallet_tag {
        filter = filter.wallet_tag(tag);
    }
    let mut candidates = if skip_soft_reserved {
        ledger.list_available_excluding_soft(&filter)?
    } else {
        ledger.list_available(&filter)?
    };
    candidates.sort_by(|a, b| b.value.cmp(&a.value).then(a.outpoint.cmp(&b.outpoint)));

    let mut inputs = Vec::new();
    let mut total = 0u64;
    for utxo in candidates.into_iter().take(max_inputs) {
        if total >= target_sats {
            break;
        }
        total = total.saturating_add(utxo.value);
        inputs.push(utxo);
    }

    if total < target_sats || inputs.is_empty() {
        return Err(DlcError::InsufficientFunds {
            needed: target_sats,
            available: total,
        });
    }

    debug!(target = target_sats, total, count = inputs.len(), "inputs selected");
    Ok(Selection {
        inputs,
        total,
        target: target_sats,
    })
}
