//! # Transaction and signature model
//!
//! Every funding, refund, and outcome transaction is registered as an
//! unsigned draft and needs both contract parties' signatures before it may
//! be broadcast.
//!
//! ## Status machine
//!
//! ```text
//!   pending ──▶ partially_signed ──▶ signed ──▶ broadcast
//! ```
//!
//! Status is a pure function of the recorded signatures until broadcast, and
//! only ever moves forward. `broadcast` requires `signed`.

use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ContractId, DlcError, DraftId, OutPoint, Result, Txid, constants};

/// Which contract transaction a draft is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxType {
    Funding,
    Refund,
    /// Contract execution transaction for the attested outcome.
    Outcome,
}

impl fmt::Display for TxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Funding => write!(f, "funding"),
            Self::Refund => write!(f, "refund"),
            Self::Outcome => write!(f, "outcome"),
        }
    }
}

/// Signing / broadcast progress of a draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    Pending,
    PartiallySigned,
    Signed,
    Broadcast,
}

impl TxStatus {
    /// Forward only; `Broadcast` is reachable from `Signed` alone.
    #[must_use]
    pub fn can_transition_to(self, target: Self) -> bool {
        match target {
            Self::Broadcast => self == Self::Signed,
            _ => target > self,
        }
    }

    /// Status implied by the number of distinct signers recorded.
    #[must_use]
    pub fn from_signature_count(count: usize) -> Self {
        match count {
            0 => Self::Pending,
            n if n < constants::REQUIRED_SIGNATURES => Self::PartiallySigned,
            _ => Self::Signed,
        }
    }

    #[must_use]
    pub fn is_broadcastable(self) -> bool {
        self == Self::Signed
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::PartiallySigned => write!(f, "partially_signed"),
            Self::Signed => write!(f, "signed"),
            Self::Broadcast => write!(f, "broadcast"),
        }
    }
}

/// The two parties whose signatures form the quorum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignerRole {
    /// The party that published the offer.
    Initiator,
    /// The party that accepted it.
    Acceptor,
}

impl SignerRole {
    pub const ALL: [Self; 2] = [Self::Initiator, Self::Acceptor];
}

impl fmt::Display for SignerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initiator => write!(f, "initiator"),
            Self::Acceptor => write!(f, "acceptor"),
        }
    }
}

/// A previous output spent by a draft, with what signing needs to know.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    pub outpoint: OutPoint,
    pub value: u64,
    pub script_pubkey: Vec<u8>,
    /// e.g. `p2wpkh`, `p2pkh`, `p2wsh`.
    pub script_type: String,
    pub address: Option<String>,
    pub pubkey: Option<String>,
}

/// An output created by a draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub value: u64,
    pub script_pubkey: Vec<u8>,
    /// Wallet grouping label for outputs the ledger should track.
    pub wallet_tag: Option<String>,
}

/// One party's partial signature over a draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub signer: SignerRole,
    pub bytes: Vec<u8>,
    pub submitted_at: DateTime<Utc>,
}

/// A draft as handed to the signing coordinator for registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTransaction {
    pub contract_id: ContractId,
    pub tx_type: TxType,
    /// Raw unsigned transaction.
    pub raw: Vec<u8>,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

impl NewTransaction {
    /// # Errors
    /// Returns `InvalidTransaction` for an empty payload, no inputs or
    /// outputs, a repeated input, or outputs worth more than inputs.
    pub fn validate(&self) -> Result<()> {
        let reject = |reason: String| Err(DlcError::InvalidTransaction { reason });

        if self.raw.is_empty() {
            return reject(format!("{} draft has an empty payload", self.tx_type));
        }
        if self.inputs.is_empty() {
            return reject(format!("{} draft declares no inputs", self.tx_type));
        }
        if self.outputs.is_empty() {
            return reject(format!("{} draft declares no outputs", self.tx_type));
        }

        let mut seen = std::collections::BTreeSet::new();
        for input in &self.inputs {
            if !seen.insert(input.outpoint) {
                return reject(format!("input {} declared twice", input.outpoint));
            }
        }

        let Some(in_sum) = total(self.inputs.iter().map(|i| i.value)) else {
            return reject(format!("{} draft input values overflow", self.tx_type));
        };
        let Some(out_sum) = total(self.outputs.iter().map(|o| o.value)) else {
            return reject(format!("{} draft output values overflow", self.tx_type));
        };
        if out_sum > in_sum {
            return reject(format!(
                "{} draft spends {out_sum} sats but only has {in_sum} sats of inputs",
                self.tx_type
            ));
        }
        Ok(())
    }
}

/// A registered draft and its signing state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Local handle; primary key.
    pub draft_id: DraftId,
    /// Computed from the unsigned payload.
    pub txid: Txid,
    pub contract_id: ContractId,
    pub tx_type: TxType,
    pub raw: Vec<u8>,
    pub status: TxStatus,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    /// At most one signature per signer; the map key is the uniqueness constraint.
    pub signatures: BTreeMap<SignerRole, Signature>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub broadcast_at: Option<DateTime<Utc>>,
}

impl Transaction {
    /// Materialize a validated draft.
    #[must_use]
    pub fn from_new(new: NewTransaction, now: DateTime<Utc>) -> Self {
        Self {
            draft_id: DraftId::new(),
            txid: Txid::from_raw_tx(&new.raw),
            contract_id: new.contract_id,
            tx_type: new.tx_type,
            raw: new.raw,
            status: TxStatus::Pending,
            inputs: new.inputs,
            outputs: new.outputs,
            signatures: BTreeMap::new(),
            created_at: now,
            updated_at: now,
            broadcast_at: None,
        }
    }

    /// Outpoints this draft consumes.
    #[must_use]
    pub fn input_outpoints(&self) -> Vec<OutPoint> {
        self.inputs.iter().map(|i| i.outpoint).collect()
    }

    /// Outpoints this draft creates, paired with their output data.
    #[must_use]
    pub fn created_outputs(&self) -> Vec<(OutPoint, &TxOutput)> {
        self.outputs
            .iter()
            .zip(0u32..)
            .map(|(out, vout)| (OutPoint::new(self.txid, vout), out))
            .collect()
    }

    /// Signers that have not signed yet.
    #[must_use]
    pub fn missing_signers(&self) -> Vec<SignerRole> {
        SignerRole::ALL
            .into_iter()
            .filter(|s| !self.signatures.contains_key(s))
            .collect()
    }

    #[must_use]
    pub fn has_signed(&self, signer: SignerRole) -> bool {
        self.signatures.contains_key(&signer)
    }

    /// Sum of declared input values minus output values, or `None` when
    /// either side overflows.
    #[must_use]
    pub fn fee(&self) -> Option<u64> {
        let in_sum = total(self.inputs.iter().map(|i| i.value))?;
        let out_sum = total(self.outputs.iter().map(|o| o.value))?;
        Some(in_sum.saturating_sub(out_sum))
    }
}

fn total(mut values: impl Iterator<Item = u64>) -> Option<u64> {
    values.try_fold(0u64, u64::checked_add)
}

/// Dummy drafts for testing. **Never use in production.**
#[cfg(any(test, feature = "test-helpers"))]
impl NewTransaction {
    /// A draft spending `inputs` into a single output, paying a 500 sat fee.
    pub fn dummy(contract_id: ContractId, tx_type: TxType, inputs: &[(OutPoint, u64)]) -> Self {
        let total: u64 = inputs.iter().map(|(_, v)| v).sum();
        Self {
            contract_id,
            tx_type,
            raw: rand::random::<[u8; 32]>().to_vec(),
            inputs: inputs
                .iter()
                .map(|(op, value)| TxInput {
                    outpoint: *op,
                    value: *value,
                    script_pubkey: vec![0x00, 0x14],
                    script_type: "p2wpkh".to_string(),
                    address: None,
                    pubkey: None,
                })
                .collect(),
            outputs: vec![TxOutput {
                value: total.saturating_sub(500),
                script_pubkey: vec![0x00, 0x20],
                wallet_tag: None,
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contract() -> ContractId {
        ContractId([9u8; 8])
    }

    fn op(n: u8) -> OutPoint {
        OutPoint::new(Txid([n; 32]), 0)
    }

    #[test]
    fn status_only_moves_forward() {
        assert!(TxStatus::Pending.can_transition_to(TxStatus::PartiallySigned));
        assert!(TxStatus::PartiallySigned.can_transition_to(TxStatus::Signed));
        assert!(TxStatus::Signed.can_transition_to(TxStatus::Broadcast));
        assert!(!TxStatus::Signed.can_transition_to(TxStatus::Pending));
        assert!(!TxStatus::Broadcast.can_transition_to(TxStatus::Signed));
        assert!(!TxStatus::PartiallySigned.can_transition_to(TxStatus::PartiallySigned));
    }

    #[test]
    fn broadcast_requires_signed() {
        assert!(!TxStatus::Pending.can_transition_to(TxStatus::Broadcast));
        assert!(!TxStatus::PartiallySigned.can_transition_to(TxStatus::Broadcast));
        assert!(!TxStatus::Broadcast.can_transition_to(TxStatus::Broadcast));
    }

    #[test]
    fn status_from_signature_count() {
        assert_eq!(TxStatus::from_signature_count(0), TxStatus::Pending);
        assert_eq!(TxStatus::from_signature_count(1), TxStatus::PartiallySigned);
        assert_eq!(TxStatus::from_signature_count(2), TxStatus::Signed);
    }

    #[test]
    fn validate_rejects_overspend() {
        let mut draft = NewTransaction::dummy(contract(), TxType::Funding, &[(op(1), 1_000)]);
        assert!(draft.validate().is_ok());
        draft.outputs[0].value = 1_001;
        let err = draft.validate().unwrap_err();
        assert!(matches!(err, DlcError::InvalidTransaction { .. }));
    }

    #[test]
    fn validate_rejects_value_overflow() {
        let mut draft = NewTransaction::dummy(
            contract(),
            TxType::Funding,
            &[(op(1), 1_000), (op(2), 1_000)],
        );
        draft.inputs[0].value = u64::MAX;
        draft.inputs[1].value = 2;
        let err = draft.validate().unwrap_err();
        assert!(matches!(err, DlcError::InvalidTransaction { .. }));

        let tx = Transaction::from_new(draft, Utc::now());
        assert_eq!(tx.fee(), None);
    }

    #[test]
    fn validate_rejects_repeated_input() {
        let draft = NewTransaction::dummy(
            contract(),
            TxType::Funding,
            &[(op(1), 1_000), (op(1), 1_000)],
        );
        assert!(draft.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_payload_and_inputs() {
        let mut draft = NewTransaction::dummy(contract(), TxType::Refund, &[(op(1), 1_000)]);
        draft.raw.clear();
        assert!(draft.validate().is_err());

        let no_inputs = NewTransaction::dummy(contract(), TxType::Refund, &[]);
        assert!(no_inputs.validate().is_err());
    }

    #[test]
    fn txid_follows_payload_and_outputs_are_indexed() {
        let draft = NewTransaction::dummy(contract(), TxType::Funding, &[(op(1), 10_000)]);
        let raw = draft.raw.clone();
        let tx = Transaction::from_new(draft, Utc::now());
        assert_eq!(tx.txid, Txid::from_raw_tx(&raw));
        assert_eq!(tx.status, TxStatus::Pending);
        assert_eq!(tx.fee(), Some(500));

        let created = tx.created_outputs();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].0, OutPoint::new(tx.txid, 0));
        assert_eq!(tx.missing_signers(), SignerRole::ALL.to_vec());
    }
}
