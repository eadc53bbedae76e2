//! UTXO ledger: the single owner of UTXO records.
//!
//! Tracks every output known to the wallet, its spend status, and its
//! reservation slots. Reservation fields are written only by the
//! [`ReservationManager`](crate::ReservationManager); the ledger itself
//! handles chain facts (new outputs, spends, confirmation depth).
//!
//! ## Availability
//!
//! An output is available when it is not spent and carries no *live* hard
//! reservation. Liveness is decided by comparing the stored expiry against
//! the clock reading taken once per query, never by a cleared flag.

use std::sync::Arc;

use dlcplaza_types::{
    Clock, DlcError, OriginState, OutPoint, Result, SystemClock, Txid, Utxo, UtxoFilter,
    WalletProvenance,
};
use tracing::{debug, info, warn};

use crate::store::{MemoryStore, RecordStore};

/// Handle to the UTXO set. Cheap to clone; clones share the same store.
#[derive(Clone)]
pub struct UtxoLedger {
    store: Arc<dyn RecordStore<OutPoint, Utxo>>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for UtxoLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UtxoLedger")
            .field("records", &self.store.len().unwrap_or(0))
            .field("clock", &self.clock)
            .finish()
    }
}

impl UtxoLedger {
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore<OutPoint, Utxo>>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Ledger over a fresh in-memory store.
    #[must_use]
    pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
        Self::new(Arc::new(MemoryStore::for_utxos()), clock)
    }

    #[must_use]
    pub fn with_system_clock() -> Self {
        Self::in_memory(Arc::new(SystemClock))
    }

    pub(crate) fn store(&self) -> &dyn RecordStore<OutPoint, Utxo> {
        self.store.as_ref()
    }

    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    // -----------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------

    /// # Errors
    /// `UtxoNotFound` if the output is unknown.
    pub fn get(&self, outpoint: &OutPoint) -> Result<Utxo> {
        self.store.get(outpoint)
    }

    pub fn get_by(&self, txid: Txid, vout: u32) -> Result<Utxo> {
        self.get(&OutPoint::new(txid, vout))
    }

    /// Not spent and no live hard reservation, passing `filter`. Ordered by outpoint.
    pub fn list_available(&self, filter: &UtxoFilter) -> Result<Vec<Utxo>> {
        let now = self.clock.now();
        self.store.scan(&|u| filter.admits(u, now))
    }

    /// [`list_available`](Self::list_available) that also skips live soft earmarks.
    pub fn list_available_excluding_soft(&self, filter: &UtxoFilter) -> Result<Vec<Utxo>> {
        let filter = filter.clone().exclude_soft_reserved();
        self.list_available(&filter)
    }

    /// Sum of available value, optionally for one wallet tag.
    pub fn balance(&self, wallet_tag: Option<&str>) -> Result<u64> {
        let mut filter = UtxoFilter::new();
        if let Some(tag) = wallet_tag {
            filter = filter.wallet_tag(tag);
        }
        Ok(self.list_available(&filter)?.iter().map(|u| u.value).sum())
    }

    pub fn len(&self) -> Result<usize> {
        self.store.len()
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.store.is_empty()
    }

    // -----------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------

    /// Insert a new output or merge chain data into a known one.
    ///
    /// For a known output the chain metadata is refreshed, the origin state
    /// only moves forward, a spend is adopted if the record was unspent, and
    /// reservation slots are preserved.
    ///
    /// # Errors
    /// `InvalidUtxo` if the record fails validation.
    pub fn upsert(&self, utxo: Utxo) -> Result<Utxo> {
        utxo.validate()?;
        let now = self.clock.now();

        let mut fresh = utxo.clone();
        fresh.created_at = now;
        fresh.updated_at = now;

        let mut previous_value = None;
        let (rec, created) = self.store.upsert_with(utxo.outpoint, fresh, &mut |rec| {
            previous_value = Some(rec.value);
            rec.value = utxo.value;
            rec.script_pubkey.clone_from(&utxo.script_pubkey);
            if utxo.address.is_some() {
                rec.address.clone_from(&utxo.address);
            }
            if utxo.script_type.is_some() {
                rec.script_type.clone_from(&utxo.script_type);
            }
            if utxo.block_height.is_some() {
                rec.block_height = utxo.block_height;
                rec.block_time = utxo.block_time;
            }
            if rec.origin_state.can_advance_to(utxo.origin_state) {
                rec.origin_state = utxo.origin_state;
            }
            if rec.origin_draft.is_none() {
                rec.origin_draft = utxo.origin_draft;
            }
            if utxo.is_spent && !rec.is_spent {
                rec.is_spent = true;
                rec.spend_txid = utxo.spend_txid;
            }
            if rec.provenance == WalletProvenance::default() {
                rec.provenance = utxo.provenance.clone();
            }
            rec.updated_at = now;
            Ok(())
        })?;

        if created {
            info!(outpoint = %rec.outpoint, value = rec.value, origin = %rec.origin_state, "UTXO recorded");
        } else if let Some(old) = previous_value.filter(|v| *v != utxo.value) {
            warn!(
                outpoint = %utxo.outpoint,
                old,
                new = utxo.value,
                "UTXO value changed on upsert"
            );
        }
        Ok(rec)
    }

    /// Mark an output consumed by `spending_txid`.
    ///
    /// Irreversible. Repeating with the same txid is a no-op; a different
    /// txid on an already spent output is an error. Clears both reservation
    /// slots.
    ///
    /// # Errors
    /// `UtxoNotFound`, or `UtxoAlreadySpent` for a conflicting spend.
    pub fn mark_spent(&self, outpoint: &OutPoint, spending_txid: Txid) -> Result<()> {
        self.mark_spent_all(std::slice::from_ref(outpoint), spending_txid)
    }

    /// [`mark_spent`](Self::mark_spent) over a batch, all or nothing.
    pub fn mark_spent_all(&self, outpoints: &[OutPoint], spending_txid: Txid) -> Result<()> {
        let now = self.clock.now();
        let mut newly_spent = Vec::new();

        self.store.update_all(outpoints, &mut |records| {
            newly_spent.clear();
            for rec in records.iter_mut() {
                match rec.spend_txid {
                    Some(prev) if rec.is_spent && prev == spending_txid => continue,
                    Some(prev) if rec.is_spent => {
                        return Err(DlcError::UtxoAlreadySpent {
                            outpoint: rec.outpoint,
                            spent_by: prev,
                        });
                    }
                    _ => {}
                }
                if let Some(holder) = rec.hard_holder_at(now) {
                    warn!(outpoint = %rec.outpoint, draft = %holder, txid = %spending_txid, "spending a hard-reserved UTXO");
                }
                rec.is_spent = true;
                rec.spend_txid = Some(spending_txid);
                rec.soft = None;
                rec.hard = None;
                rec.updated_at = now;
                newly_spent.push(rec.outpoint);
            }
            Ok(())
        })?;

        if newly_spent.is_empty() {
            debug!(txid = %spending_txid, "spend already recorded");
        }
        for op in &newly_spent {
            info!(outpoint = %op, txid = %spending_txid, "UTXO marked spent");
        }
        Ok(())
    }

    /// Advance the origin state of an output. Regressions are ignored.
    pub fn set_origin_state(
        &self,
        outpoint: &OutPoint,
        state: OriginState,
        block_height: Option<u32>,
    ) -> Result<Utxo> {
        let now = self.clock.now();
        self.store.update(outpoint, &mut |rec| {
            if !rec.origin_state.can_advance_to(state) {
                debug!(outpoint = %rec.outpoint, current = %rec.origin_state, requested = %state, "ignoring origin regression");
                return Ok(());
            }
            rec.origin_state = state;
            if block_height.is_some() {
                rec.block_height = block_height;
                rec.block_time = Some(now);
            }
            rec.updated_at = now;
            Ok(())
        })
    }
}
