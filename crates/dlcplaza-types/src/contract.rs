//! # DLC contract model
//!
//! A [`DlcContract`] moves through the following statuses:
//!
//! ```text
//!   created ──▶ offered ──▶ accepted ──▶ signed ──▶ funding_broadcast ──▶ confirmed
//!                  │            │           │              │                  │
//!                  ▼            ▼           ▼              ▼                  ├──▶ attested ──▶ settled
//!               expired      expired     expired        expired               │       │
//!               aborted      aborted     aborted                              └───────┴──▶ refunded
//! ```
//!
//! Each forward step stamps a [`Phase`] timestamp. [`PhaseTimestamps::stamp`]
//! refuses to set a timestamp twice, before its canonical predecessors, or
//! earlier than any of them.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{ContractId, DlcError, DraftId, NewTransaction, OutPoint, Result, Txid, constants};

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    Created,
    Offered,
    Accepted,
    /// Both funding signatures recorded.
    Signed,
    FundingBroadcast,
    /// Funding transaction reached the configured confirmation depth.
    Confirmed,
    /// Oracle outcome received.
    Attested,
    /// Outcome transaction confirmed. Terminal.
    Settled,
    /// Refund locktime elapsed without an outcome broadcast. Terminal.
    Refunded,
    /// A phase deadline elapsed before funding. Terminal.
    Expired,
    /// Explicitly aborted before funding broadcast. Terminal.
    Aborted,
}

impl ContractStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Settled | Self::Refunded | Self::Expired | Self::Aborted
        )
    }

    /// `true` while the contract still holds UTXO reservations it may lose.
    #[must_use]
    pub fn is_pre_funding(self) -> bool {
        matches!(
            self,
            Self::Created | Self::Offered | Self::Accepted | Self::Signed
        )
    }

    #[must_use]
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Created, Self::Offered | Self::Aborted)
                | (
                    Self::Offered,
                    Self::Accepted | Self::Expired | Self::Aborted
                )
                | (Self::Accepted, Self::Signed | Self::Expired | Self::Aborted)
                | (
                    Self::Signed,
                    Self::FundingBroadcast | Self::Expired | Self::Aborted
                )
                | (Self::FundingBroadcast, Self::Confirmed | Self::Expired)
                | (Self::Confirmed, Self::Attested | Self::Refunded)
                | (Self::Attested, Self::Settled | Self::Refunded)
        )
    }
}

impl fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Offered => "offered",
            Self::Accepted => "accepted",
            Self::Signed => "signed",
            Self::FundingBroadcast => "funding_broadcast",
            Self::Confirmed => "confirmed",
            Self::Attested => "attested",
            Self::Settled => "settled",
            Self::Refunded => "refunded",
            Self::Expired => "expired",
            Self::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Phases
// ---------------------------------------------------------------------------

/// A timestamped lifecycle event, in canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Offered,
    Accepted,
    SignedIni,
    SignedAcc,
    BroadcastFunding,
    ConfirmedFunding,
    Attest,
    BroadcastCet,
    ConfirmedCet,
    Refund,
    BroadcastRtx,
    ConfirmedRtx,
}

impl Phase {
    pub const ALL: [Self; 12] = [
        Self::Offered,
        Self::Accepted,
        Self::SignedIni,
        Self::SignedAcc,
        Self::BroadcastFunding,
        Self::ConfirmedFunding,
        Self::Attest,
        Self::BroadcastCet,
        Self::ConfirmedCet,
        Self::Refund,
        Self::BroadcastRtx,
        Self::ConfirmedRtx,
    ];

    /// Phases that must be stamped before this one.
    #[must_use]
    pub fn predecessors(self) -> &'static [Phase] {
        match self {
            Self::Offered => &[],
            Self::Accepted => &[Self::Offered],
            Self::SignedIni | Self::SignedAcc => &[Self::Accepted],
            Self::BroadcastFunding => &[Self::SignedIni, Self::SignedAcc],
            Self::ConfirmedFunding => &[Self::BroadcastFunding],
            Self::Attest | Self::Refund => &[Self::ConfirmedFunding],
            Self::BroadcastCet => &[Self::Attest],
            Self::ConfirmedCet => &[Self::BroadcastCet],
            Self::BroadcastRtx => &[Self::Refund],
            Self::ConfirmedRtx => &[Self::BroadcastRtx],
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Offered => "offered",
            Self::Accepted => "accepted",
            Self::SignedIni => "signed_ini",
            Self::SignedAcc => "signed_acc",
            Self::BroadcastFunding => "broadcast_ftx",
            Self::ConfirmedFunding => "confirmed_ftx",
            Self::Attest => "attest",
            Self::BroadcastCet => "broadcast_cet",
            Self::ConfirmedCet => "confirmed_cet",
            Self::Refund => "refund",
            Self::BroadcastRtx => "broadcast_rtx",
            Self::ConfirmedRtx => "confirmed_rtx",
        };
        f.write_str(s)
    }
}

/// Every phase timestamp of a contract. Set-once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseTimestamps {
    pub offered_at: Option<DateTime<Utc>>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub signed_ini_at: Option<DateTime<Utc>>,
    pub signed_acc_at: Option<DateTime<Utc>>,
    pub broadcast_ftx_at: Option<DateTime<Utc>>,
    pub confirmed_ftx_at: Option<DateTime<Utc>>,
    pub attest_at: Option<DateTime<Utc>>,
    pub broadcast_cet_at: Option<DateTime<Utc>>,
    pub confirmed_cet_at: Option<DateTime<Utc>>,
    pub refund_at: Option<DateTime<Utc>>,
    pub broadcast_rtx_at: Option<DateTime<Utc>>,
    pub confirmed_rtx_at: Option<DateTime<Utc>>,
}

impl PhaseTimestamps {
    #[must_use]
    pub fn get(&self, phase: Phase) -> Option<DateTime<Utc>> {
        match phase {
            Phase::Offered => self.offered_at,
            Phase::Accepted => self.accepted_at,
            Phase::SignedIni => self.signed_ini_at,
            Phase::SignedAcc => self.signed_acc_at,
            Phase::BroadcastFunding => self.broadcast_ftx_at,
            Phase::ConfirmedFunding => self.confirmed_ftx_at,
            Phase::Attest => self.attest_at,
            Phase::BroadcastCet => self.broadcast_cet_at,
            Phase::ConfirmedCet => self.confirmed_cet_at,
            Phase::Refund => self.refund_at,
            Phase::BroadcastRtx => self.broadcast_rtx_at,
            Phase::ConfirmedRtx => self.confirmed_rtx_at,
        }
    }

    fn slot_mut(&mut self, phase: Phase) -> &mut Option<DateTime<Utc>> {
        match phase {
            Phase::Offered => &mut self.offered_at,
            Phase::Accepted => &mut self.accepted_at,
            Phase::SignedIni => &mut self.signed_ini_at,
            Phase::SignedAcc => &mut self.signed_acc_at,
            Phase::BroadcastFunding => &mut self.broadcast_ftx_at,
            Phase::ConfirmedFunding => &mut self.confirmed_ftx_at,
            Phase::Attest => &mut self.attest_at,
            Phase::BroadcastCet => &mut self.broadcast_cet_at,
            Phase::ConfirmedCet => &mut self.confirmed_cet_at,
            Phase::Refund => &mut self.refund_at,
            Phase::BroadcastRtx => &mut self.broadcast_rtx_at,
            Phase::ConfirmedRtx => &mut self.confirmed_rtx_at,
        }
    }

    #[must_use]
    pub fn is_set(&self, phase: Phase) -> bool {
        self.get(phase).is_some()
    }

    /// Record `phase` at `at`.
    ///
    /// # Errors
    /// `PhaseOrderViolation` if the phase is already stamped, a predecessor
    /// is unset, or a predecessor carries a later timestamp.
    pub fn stamp(&mut self, phase: Phase, at: DateTime<Utc>) -> Result<()> {
        let violation = |reason: String| Err(DlcError::PhaseOrderViolation { phase, reason });

        if let Some(existing) = self.get(phase) {
            return violation(format!("already stamped at {existing}"));
        }
        for &pred in phase.predecessors() {
            match self.get(pred) {
                None => return violation(format!("{pred} is not stamped yet")),
                Some(pred_at) if pred_at > at => {
                    return violation(format!("{pred} at {pred_at} is later than {at}"));
                }
                Some(_) => {}
            }
        }
        *self.slot_mut(phase) = Some(at);
        Ok(())
    }

    /// Latest timestamp recorded so far.
    #[must_use]
    pub fn last_stamped(&self) -> Option<(Phase, DateTime<Utc>)> {
        Phase::ALL
            .into_iter()
            .filter_map(|p| self.get(p).map(|at| (p, at)))
            .max_by_key(|(_, at)| *at)
    }
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// One party's contribution to a contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyParams {
    /// Hex-encoded compressed funding public key.
    pub fund_pubkey: String,
    pub payout_spk: Vec<u8>,
    pub payout_serial_id: u64,
    pub change_spk: Vec<u8>,
    pub change_serial_id: u64,
    /// Collateral in sats.
    pub collateral: u64,
    /// Outputs this party funds the contract with.
    pub funding_inputs: Vec<OutPoint>,
}

impl PartyParams {
    fn validate(&self, who: &str) -> Result<()> {
        let reject = |reason: String| Err(DlcError::ContractRejected { reason });
        if self.fund_pubkey.len() != 66 || hex::decode(&self.fund_pubkey).is_err() {
            return reject(format!("{who} funding pubkey must be 33 bytes of hex"));
        }
        if self.payout_spk.is_empty() {
            return reject(format!("{who} payout script is empty"));
        }
        if self.collateral == 0 {
            return reject(format!("{who} collateral must be positive"));
        }
        if self.funding_inputs.is_empty() {
            return reject(format!("{who} names no funding inputs"));
        }
        let mut seen = std::collections::BTreeSet::new();
        if let Some(dup) = self.funding_inputs.iter().find(|op| !seen.insert(**op)) {
            return reject(format!("{who} funding input {dup} listed twice"));
        }
        Ok(())
    }
}

/// Which oracle event resolves the contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleRef {
    pub oracle_id: String,
    /// Hex-encoded x-only public key.
    pub pubkey: String,
    pub event_id: String,
    pub event_time: DateTime<Utc>,
    pub nb_digits: u16,
    pub nonces: Vec<String>,
}

/// Side of a lend/borrow deal the initiator takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanRole {
    Lender,
    Borrower,
}

/// Terms of the BTC/USD lend-borrow product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LendBorrowTerms {
    pub role: LoanRole,
    pub duration_days: u32,
    pub interest: Decimal,
    pub interest_ear: Decimal,
    pub interest_b: Decimal,
    pub interest_b_ear: Decimal,
    /// Loan-to-value ratio in (0, 1].
    pub ltv: Decimal,
}

/// Product-specific payload of an offer, tagged by product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProductTerms {
    LendBorrowBtcUsd(LendBorrowTerms),
    Custom {
        product_id: String,
        payload: serde_json::Value,
    },
}

impl ProductTerms {
    pub const LEND_BORROW_BTCUSD: &'static str = "lend_borrow_btcusd";

    #[must_use]
    pub fn product_id(&self) -> &str {
        match self {
            Self::LendBorrowBtcUsd(_) => Self::LEND_BORROW_BTCUSD,
            Self::Custom { product_id, .. } => product_id,
        }
    }

    fn validate(&self) -> Result<()> {
        let reject = |reason: String| Err(DlcError::ContractRejected { reason });
        match self {
            Self::LendBorrowBtcUsd(t) => {
                if t.duration_days == 0 {
                    return reject("loan duration must be at least one day".into());
                }
                if t.ltv <= Decimal::ZERO || t.ltv > Decimal::ONE {
                    return reject(format!("ltv {} outside (0, 1]", t.ltv));
                }
                let rates = [t.interest, t.interest_ear, t.interest_b, t.interest_b_ear];
                if rates.iter().any(Decimal::is_sign_negative) {
                    return reject("interest rates must not be negative".into());
                }
                Ok(())
            }
            Self::Custom { product_id, .. } if product_id.trim().is_empty() => {
                reject("custom product id is empty".into())
            }
            Self::Custom { .. } => Ok(()),
        }
    }
}

/// Everything the initiator supplies with an offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractParams {
    /// Negotiation id shared by both parties before the contract id exists.
    pub temp_contract_id: String,
    pub protocol_version: u32,
    pub chain_hash: String,
    pub contract_flags: u8,
    pub initiator: PartyParams,
    pub oracle: OracleRef,
    pub fee_rate_per_vb: u64,
    pub cet_locktime: u32,
    /// UNIX seconds. Defaults to offer time plus the product refund delay.
    pub refund_locktime: Option<u32>,
    /// Seconds the offer stays open. Defaults to the product setting.
    pub expiry_offer_secs: Option<u64>,
    pub terms: ProductTerms,
}

impl ContractParams {
    #[must_use]
    pub fn product_id(&self) -> &str {
        self.terms.product_id()
    }

    /// # Errors
    /// `ContractRejected` describing the first failing check.
    pub fn validate(&self) -> Result<()> {
        let reject = |reason: String| Err(DlcError::ContractRejected { reason });

        if self.temp_contract_id.trim().is_empty() {
            return reject("temp_contract_id is empty".into());
        }
        if self.protocol_version != constants::PROTOCOL_VERSION {
            return reject(format!(
                "unsupported protocol version {}",
                self.protocol_version
            ));
        }
        if self.chain_hash.len() != 64 || hex::decode(&self.chain_hash).is_err() {
            return reject("chain_hash must be 32 bytes of hex".into());
        }
        if self.fee_rate_per_vb == 0 {
            return reject("fee rate must be positive".into());
        }
        if self.expiry_offer_secs == Some(0) {
            return reject("offer expiry must be positive".into());
        }
        if let Some(refund) = self.refund_locktime {
            if refund < constants::LOCKTIME_THRESHOLD {
                return reject(format!(
                    "refund locktime {refund} is a block height, expected UNIX seconds"
                ));
            }
            if self.cet_locktime >= constants::LOCKTIME_THRESHOLD && self.cet_locktime >= refund {
                return reject(format!(
                    "cet locktime {} must precede refund locktime {refund}",
                    self.cet_locktime
                ));
            }
        }
        self.initiator.validate("initiator")?;
        self.terms.validate()
    }
}

/// Everything the acceptor supplies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptParams {
    pub acceptor: PartyParams,
    /// Unsigned funding draft spending both parties' inputs.
    pub funding: NewTransaction,
    /// Unsigned refund draft spending the funding output.
    pub refund: NewTransaction,
}

impl AcceptParams {
    /// # Errors
    /// `ContractRejected` if the acceptor terms are malformed.
    pub fn validate(&self) -> Result<()> {
        self.acceptor.validate("acceptor")
    }
}

/// Oracle outcome for the contract's event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    pub event_id: String,
    pub outcome_value: String,
    /// Hex-encoded oracle signatures, one per digit.
    pub signatures: Vec<String>,
    pub attested_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Contract record
// ---------------------------------------------------------------------------

/// Absolute deadlines of a contract. Computed once; never moved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deadlines {
    pub offer_expires_at: Option<DateTime<Utc>>,
    pub acc_signature_due: Option<DateTime<Utc>>,
    pub ini_signature_due: Option<DateTime<Utc>>,
    pub funding_broadcast_due: Option<DateTime<Utc>>,
    pub refund_locktime: Option<DateTime<Utc>>,
}

/// A DLC contract as owned by the lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DlcContract {
    pub contract_id: ContractId,
    pub status: ContractStatus,
    pub params: ContractParams,
    pub acceptor: Option<PartyParams>,
    /// Outputs soft-reserved at offer time.
    pub offered_inputs: Vec<OutPoint>,
    /// Outputs hard-reserved for the funding draft.
    pub funding_inputs: Vec<OutPoint>,
    pub funding_draft: Option<DraftId>,
    pub funding_txid: Option<Txid>,
    pub refund_draft: Option<DraftId>,
    pub refund_txid: Option<Txid>,
    pub outcome_draft: Option<DraftId>,
    pub outcome_txid: Option<Txid>,
    pub attestation: Option<Attestation>,
    pub timestamps: PhaseTimestamps,
    pub deadlines: Deadlines,
    /// Why the contract ended in `expired` or `aborted`.
    pub terminal_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DlcContract {
    /// A contract in `created` status.
    #[must_use]
    pub fn new(params: ContractParams, created_at: DateTime<Utc>) -> Self {
        let contract_id = ContractId::derive(&params.temp_contract_id, created_at);
        Self {
            contract_id,
            status: ContractStatus::Created,
            offered_inputs: params.initiator.funding_inputs.clone(),
            params,
            acceptor: None,
            funding_inputs: Vec::new(),
            funding_draft: None,
            funding_txid: None,
            refund_draft: None,
            refund_txid: None,
            outcome_draft: None,
            outcome_txid: None,
            attestation: None,
            timestamps: PhaseTimestamps::default(),
            deadlines: Deadlines::default(),
            terminal_reason: None,
            created_at,
            updated_at: created_at,
        }
    }

    /// Move to `target`.
    ///
    /// # Errors
    /// `InvalidContractState` if the status machine forbids the move.
    pub fn transition(
        &mut self,
        target: ContractStatus,
        action: &'static str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        if !self.status.can_transition_to(target) {
            return Err(self.invalid(action));
        }
        self.status = target;
        self.updated_at = at;
        Ok(())
    }

    /// `InvalidContractState` for `action` in the current status.
    #[must_use]
    pub fn invalid(&self, action: &'static str) -> DlcError {
        DlcError::InvalidContractState {
            contract_id: self.contract_id,
            action,
            status: self.status,
        }
    }

    #[must_use]
    pub fn total_collateral(&self) -> u64 {
        self.params.initiator.collateral + self.acceptor.as_ref().map_or(0, |a| a.collateral)
    }

    /// Deadline governing the current status, if any.
    ///
    /// While signatures are outstanding this is the earliest due date among
    /// the signers that have not signed yet.
    #[must_use]
    pub fn current_deadline(&self) -> Option<DateTime<Utc>> {
        let d = &self.deadlines;
        match self.status {
            ContractStatus::Offered => d.offer_expires_at,
            ContractStatus::Accepted => {
                let acc = d
                    .acc_signature_due
                    .filter(|_| !self.timestamps.is_set(Phase::SignedAcc));
                let ini = d
                    .ini_signature_due
                    .filter(|_| !self.timestamps.is_set(Phase::SignedIni));
                acc.into_iter().chain(ini).min()
            }
            ContractStatus::Signed => d.funding_broadcast_due,
            // An outcome transaction that was broadcast but never confirms
            // still falls back to the refund at the locktime.
            ContractStatus::FundingBroadcast | ContractStatus::Confirmed | ContractStatus::Attested => {
                d.refund_locktime
            }
            _ => None,
        }
    }

    /// `true` if the current phase deadline has elapsed at `now`.
    #[must_use]
    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        self.current_deadline().is_some_and(|due| now >= due)
    }

    #[must_use]
    pub fn snapshot(&self) -> ContractSnapshot {
        ContractSnapshot {
            contract_id: self.contract_id,
            status: self.status,
            product_id: self.params.product_id().to_string(),
            total_collateral: self.total_collateral(),
            timestamps: self.timestamps.clone(),
            deadlines: self.deadlines.clone(),
            funding_draft: self.funding_draft,
            funding_txid: self.funding_txid,
            refund_txid: self.refund_txid,
            outcome_txid: self.outcome_txid,
            reserved_inputs: if self.funding_inputs.is_empty() {
                self.offered_inputs.clone()
            } else {
                self.funding_inputs.clone()
            },
            terminal_reason: self.terminal_reason.clone(),
            updated_at: self.updated_at,
        }
    }
}

/// Read-only view returned by `get_contract`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractSnapshot {
    pub contract_id: ContractId,
    pub status: ContractStatus,
    pub product_id: String,
    pub total_collateral: u64,
    pub timestamps: PhaseTimestamps,
    pub deadlines: Deadlines,
    pub funding_draft: Option<DraftId>,
    pub funding_txid: Option<Txid>,
    pub refund_txid: Option<Txid>,
    pub outcome_txid: Option<Txid>,
    pub reserved_inputs: Vec<OutPoint>,
    pub terminal_reason: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Sample parameters for testing. **Never use in production.**
#[cfg(any(test, feature = "test-helpers"))]
impl ContractParams {
    /// Lend/borrow offer funded by `inputs` with `collateral` sats.
    pub fn dummy(inputs: Vec<OutPoint>, collateral: u64) -> Self {
        Self {
            temp_contract_id: format!("tmp-{}", hex::encode(rand::random::<[u8; 8]>())),
            protocol_version: constants::PROTOCOL_VERSION,
            chain_hash: constants::MAINNET_CHAIN_HASH.to_string(),
            contract_flags: 0,
            initiator: PartyParams::dummy(inputs, collateral),
            oracle: OracleRef {
                oracle_id: "oracle-1".into(),
                pubkey: hex::encode([2u8; 32]),
                event_id: "btcusd-2026-12-31".into(),
                event_time: DateTime::from_timestamp(1_798_675_200, 0).unwrap_or_default(),
                nb_digits: 20,
                nonces: vec![hex::encode([3u8; 32])],
            },
            fee_rate_per_vb: 2,
            cet_locktime: 0,
            refund_locktime: None,
            expiry_offer_secs: None,
            terms: ProductTerms::LendBorrowBtcUsd(LendBorrowTerms {
                role: LoanRole::Borrower,
                duration_days: 30,
                interest: Decimal::new(5, 2),
                interest_ear: Decimal::new(512, 4),
                interest_b: Decimal::new(6, 2),
                interest_b_ear: Decimal::new(617, 4),
                ltv: Decimal::new(5, 1),
            }),
        }
    }
}

#[cfg(any(test, feature = "test-helpers"))]
impl PartyParams {
    pub fn dummy(inputs: Vec<OutPoint>, collateral: u64) -> Self {
        Self {
            fund_pubkey: format!("02{}", hex::encode(rand::random::<[u8; 32]>())),
            payout_spk: vec![0x00, 0x14, 0xaa],
            payout_serial_id: rand::random(),
            change_spk: vec![0x00, 0x14, 0xbb],
            change_serial_id: rand::random(),
            collateral,
            funding_inputs: inputs,
        }
    }
}
