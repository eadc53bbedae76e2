//! # UTXO model
//!
//! A [`Utxo`] is one output known to the wallet, keyed by its [`OutPoint`].
//! Besides the chain data it carries two reservation slots:
//!
//! - **soft** ([`SoftReservation`]): an advisory earmark for a contract offer.
//!   Never blocks anything; at most one contract id per output.
//! - **hard** ([`HardReservation`]): an exclusive, time-bounded claim tying the
//!   output to a single funding draft. While live, no other allocation may
//!   touch the output.
//!
//! ## Expiry
//!
//! Reservations are void once `expires_at <= now`, whether or not a sweep has
//! cleared the fields yet. Every availability predicate therefore takes the
//! evaluation instant `now` explicitly and compares stored timestamps; nothing
//! here trusts a cleared flag.
//!
//! ## Origin
//!
//! ```text
//!   local_draft ──▶ mempool ──▶ confirmed
//! ```
//!
//! Origin only moves forward.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ContractId, DlcError, DraftId, OutPoint, Result, Txid, constants};

/// How certain we are that the transaction creating this output exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OriginState {
    /// Created by a locally built transaction that is not broadcast yet.
    LocalDraft,
    /// Created by a broadcast transaction sitting in the mempool (0 conf).
    Mempool,
    /// Created by a transaction with at least one confirmation.
    Confirmed,
}

impl OriginState {
    /// Origin never regresses; staying put is allowed.
    #[must_use]
    pub fn can_advance_to(self, target: Self) -> bool {
        target >= self
    }

    /// Origin implied by a confirmation depth.
    #[must_use]
    pub fn from_depth(depth: u32) -> Self {
        if depth == 0 {
            Self::Mempool
        } else {
            Self::Confirmed
        }
    }
}

impl fmt::Display for OriginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LocalDraft => write!(f, "local_draft"),
            Self::Mempool => write!(f, "mempool"),
            Self::Confirmed => write!(f, "confirmed"),
        }
    }
}

/// Advisory earmark of an output for a contract offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftReservation {
    pub contract_id: ContractId,
    pub reserved_at: DateTime<Utc>,
    /// `None` means the earmark lives until released.
    pub expires_at: Option<DateTime<Utc>>,
}

impl SoftReservation {
    #[must_use]
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|exp| now < exp)
    }
}

/// Exclusive claim of an output by one funding draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardReservation {
    pub draft: DraftId,
    pub reserved_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl HardReservation {
    #[must_use]
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Where the wallet got this output from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletProvenance {
    /// Extended public key the receiving address derives from.
    pub xpub: Option<String>,
    /// `m/purpose'/coin'/account'/change/index`
    pub derivation_path: Option<String>,
    /// Free-form grouping label, e.g. "hot", "cold", "oracle".
    pub wallet_tag: Option<String>,
}

/// An output tracked by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub outpoint: OutPoint,
    /// Value in satoshis.
    pub value: u64,
    pub script_pubkey: Vec<u8>,
    pub address: Option<String>,
    /// e.g. `p2wpkh`, `p2tr`, `p2wsh`.
    pub script_type: Option<String>,
    pub block_height: Option<u32>,
    pub block_time: Option<DateTime<Utc>>,
    pub is_spent: bool,
    pub spend_txid: Option<Txid>,
    pub origin_state: OriginState,
    /// Local handle of the draft that (will) create this output.
    pub origin_draft: Option<DraftId>,
    pub soft: Option<SoftReservation>,
    pub hard: Option<HardReservation>,
    pub provenance: WalletProvenance,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Utxo {
    /// A confirmed, unreserved output with no provenance.
    #[must_use]
    pub fn new(outpoint: OutPoint, value: u64, script_pubkey: Vec<u8>) -> Self {
        let now = Utc::now();
        Self {
            outpoint,
            value,
            script_pubkey,
            address: None,
            script_type: None,
            block_height: None,
            block_time: None,
            is_spent: false,
            spend_txid: None,
            origin_state: OriginState::Confirmed,
            origin_draft: None,
            soft: None,
            hard: None,
            provenance: WalletProvenance::default(),
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn with_wallet_tag(mut self, tag: impl Into<String>) -> Self {
        self.provenance.wallet_tag = Some(tag.into());
        self
    }

    #[must_use]
    pub fn with_origin(mut self, state: OriginState, draft: Option<DraftId>) -> Self {
        self.origin_state = state;
        self.origin_draft = draft;
        self
    }

    #[must_use]
    pub fn with_block(mut self, height: u32, time: DateTime<Utc>) -> Self {
        self.block_height = Some(height);
        self.block_time = Some(time);
        self
    }

    /// Structural checks applied on every upsert.
    ///
    /// # Errors
    /// Returns `InvalidUtxo` for a value above the money supply cap or an
    /// empty locking script.
    pub fn validate(&self) -> Result<()> {
        if self.value > constants::MAX_MONEY_SATS {
            return Err(DlcError::InvalidUtxo {
                reason: format!(
                    "{} value {} exceeds max money {}",
                    self.outpoint,
                    self.value,
                    constants::MAX_MONEY_SATS
                ),
            });
        }
        if self.script_pubkey.is_empty() {
            return Err(DlcError::InvalidUtxo {
                reason: format!("{} has an empty script_pubkey", self.outpoint),
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn wallet_tag(&self) -> Option<&str> {
        self.provenance.wallet_tag.as_deref()
    }

    /// Contract holding a live soft earmark at `now`, if any.
    #[must_use]
    pub fn soft_holder_at(&self, now: DateTime<Utc>) -> Option<ContractId> {
        self.soft
            .as_ref()
            .filter(|r| r.is_live_at(now))
            .map(|r| r.contract_id)
    }

    /// Draft holding a live hard reservation at `now`, if any.
    #[must_use]
    pub fn hard_holder_at(&self, now: DateTime<Utc>) -> Option<DraftId> {
        self.hard
            .as_ref()
            .filter(|r| r.is_live_at(now))
            .map(|r| r.draft)
    }

    #[must_use]
    pub fn is_soft_reserved_at(&self, now: DateTime<Utc>) -> bool {
        self.soft_holder_at(now).is_some()
    }

    #[must_use]
    pub fn is_hard_reserved_at(&self, now: DateTime<Utc>) -> bool {
        self.hard_holder_at(now).is_some()
    }

    /// Available for new coin selection: not spent and no live hard reservation.
    /// Soft earmarks are the caller's choice to honor.
    #[must_use]
    pub fn is_available_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_spent && !self.is_hard_reserved_at(now)
    }

    /// `true` if a hard reservation is still recorded although it has lapsed.
    #[must_use]
    pub fn has_stale_hard_reservation(&self, now: DateTime<Utc>) -> bool {
        self.hard.as_ref().is_some_and(|r| !r.is_live_at(now))
    }

    /// `true` if a soft earmark is still recorded although it has lapsed.
    #[must_use]
    pub fn has_stale_soft_reservation(&self, now: DateTime<Utc>) -> bool {
        self.soft.as_ref().is_some_and(|r| !r.is_live_at(now))
    }
}

impl fmt::Display for Utxo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "UTXO({}, value={}, state={}, spent={}, wallet={})",
            self.outpoint,
            self.value,
            self.origin_state,
            self.is_spent,
            self.wallet_tag().unwrap_or("-")
        )
    }
}

/// Selection criteria for ledger availability queries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoFilter {
    /// Only outputs worth at least this many sats.
    pub min_value: u64,
    /// Only outputs carrying this wallet tag.
    pub wallet_tag: Option<String>,
    /// Also skip outputs with a live soft earmark.
    pub exclude_soft_reserved: bool,
}

impl UtxoFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn min_value(mut self, sats: u64) -> Self {
        self.min_value = sats;
        self
    }

    #[must_use]
    pub fn wallet_tag(mut self, tag: impl Into<String>) -> Self {
        self.wallet_tag = Some(tag.into());
        self
    }

    #[must_use]
    pub fn exclude_soft_reserved(mut self) -> Self {
        self.exclude_soft_reserved = true;
        self
    }

    /// Does `utxo` pass this filter and count as available at `now`?
    #[must_use]
    pub fn admits(&self, utxo: &Utxo, now: DateTime<Utc>) -> bool {
        utxo.is_available_at(now)
            && utxo.value >= self.min_value
            && self
                .wallet_tag
                .as_deref()
                .is_none_or(|tag| utxo.wallet_tag() == Some(tag))
            && !(self.exclude_soft_reserved && utxo.is_soft_reserved_at(now))
    }
}

/// Dummy UTXOs for testing. **Never use in production.**
#[cfg(any(test, feature = "test-helpers"))]
impl Utxo {
    /// A confirmed P2WPKH-looking output with a random outpoint.
    pub fn dummy(value: u64) -> Self {
        let outpoint = OutPoint::new(Txid(rand::random::<[u8; 32]>()), 0);
        let mut script = vec![0x00, 0x14];
        script.extend_from_slice(&rand::random::<[u8; 20]>());
        let mut utxo = Self::new(outpoint, value, script);
        utxo.script_type = Some("p2wpkh".to_string());
        utxo
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn origin_never_regresses() {
        assert!(OriginState::LocalDraft.can_advance_to(OriginState::Mempool));
        assert!(OriginState::Mempool.can_advance_to(OriginState::Confirmed));
        assert!(OriginState::Mempool.can_advance_to(OriginState::Mempool));
        assert!(!OriginState::Confirmed.can_advance_to(OriginState::Mempool));
        assert!(!OriginState::Mempool.can_advance_to(OriginState::LocalDraft));
    }

    #[test]
    fn origin_from_depth() {
        assert_eq!(OriginState::from_depth(0), OriginState::Mempool);
        assert_eq!(OriginState::from_depth(1), OriginState::Confirmed);
        assert_eq!(OriginState::from_depth(6), OriginState::Confirmed);
    }

    #[test]
    fn lapsed_hard_reservation_counts_as_absent() {
        let mut utxo = Utxo::dummy(10_000);
        utxo.hard = Some(HardReservation {
            draft: DraftId::new(),
            reserved_at: now() - Duration::seconds(120),
            expires_at: now() - Duration::seconds(1),
        });
        assert!(!utxo.is_hard_reserved_at(now()));
        assert!(utxo.is_available_at(now()));
        assert!(utxo.has_stale_hard_reservation(now()));
    }

    #[test]
    fn live_hard_reservation_blocks_availability() {
        let mut utxo = Utxo::dummy(10_000);
        let draft = DraftId::new();
        utxo.hard = Some(HardReservation {
            draft,
            reserved_at: now(),
            expires_at: now() + Duration::seconds(60),
        });
        assert_eq!(utxo.hard_holder_at(now()), Some(draft));
        assert!(!utxo.is_available_at(now()));
        // Expiry instant itself is already void.
        assert!(utxo.is_available_at(now() + Duration::seconds(60)));
    }

    #[test]
    fn spent_is_never_available() {
        let mut utxo = Utxo::dummy(10_000);
        utxo.is_spent = true;
        assert!(!utxo.is_available_at(now()));
    }

    #[test]
    fn filter_honours_soft_only_when_asked() {
        let mut utxo = Utxo::dummy(50_000).with_wallet_tag("hot");
        utxo.soft = Some(SoftReservation {
            contract_id: ContractId([1u8; 8]),
            reserved_at: now(),
            expires_at: None,
        });

        assert!(UtxoFilter::new().admits(&utxo, now()));
        assert!(!UtxoFilter::new().exclude_soft_reserved().admits(&utxo, now()));
        assert!(UtxoFilter::new().wallet_tag("hot").admits(&utxo, now()));
        assert!(!UtxoFilter::new().wallet_tag("cold").admits(&utxo, now()));
        assert!(!UtxoFilter::new().min_value(60_000).admits(&utxo, now()));
    }

    #[test]
    fn validate_rejects_empty_script_and_overflow() {
        let mut utxo = Utxo::dummy(1);
        utxo.script_pubkey.clear();
        assert!(matches!(utxo.validate(), Err(DlcError::InvalidUtxo { .. })));

        let too_big = Utxo::dummy(constants::MAX_MONEY_SATS + 1);
        assert!(too_big.validate().is_err());
        assert!(Utxo::dummy(100_000).validate().is_ok());
    }
}
