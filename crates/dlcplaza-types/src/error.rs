//! Error types for the DLCPlaza settlement engine.
//!
//! All errors use the `DLC_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: UTXO ledger errors
//! - 2xx: Reservation errors
//! - 3xx: Signing errors
//! - 4xx: Contract lifecycle errors
//! - 5xx: Collaborator errors (chain observer, oracle, notification sink)
//! - 9xx: General / internal errors
//!
//! Every variant maps onto one [`ErrorKind`]. Only [`ErrorKind::Conflict`]
//! is recoverable by the caller (pick different UTXOs or abort the offer).

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{ContractId, ContractStatus, DraftId, OutPoint, Phase, SignerRole, TxStatus, Txid};

/// Central error enum for all DLCPlaza operations.
#[derive(Debug, Error)]
pub enum DlcError {
    // =================================================================
    // UTXO Ledger Errors (1xx)
    // =================================================================
    /// The referenced output is not known to the ledger.
    #[error("DLC_ERR_100: UTXO not found: {0}")]
    UtxoNotFound(OutPoint),

    /// The output was already consumed by a different transaction.
    #[error("DLC_ERR_101: UTXO {outpoint} already spent by {spent_by}")]
    UtxoAlreadySpent { outpoint: OutPoint, spent_by: Txid },

    /// The UTXO record failed validation.
    #[error("DLC_ERR_102: Invalid UTXO: {reason}")]
    InvalidUtxo { reason: String },

    /// Coin selection could not cover the requested amount.
    #[error("DLC_ERR_103: Insufficient funds: need {needed} sats, have {available} sats")]
    InsufficientFunds { needed: u64, available: u64 },

    // =================================================================
    // Reservation Errors (2xx)
    // =================================================================
    /// The output is spent or carries a live hard reservation for another draft.
    #[error("DLC_ERR_200: Reservation conflict on {outpoint}: {reason}")]
    ReservationConflict { outpoint: OutPoint, reason: String },

    /// Renewal was requested for an output not hard-reserved by that draft.
    #[error("DLC_ERR_201: {outpoint} is not hard-reserved by {draft}")]
    ReservationNotHeld { outpoint: OutPoint, draft: DraftId },

    /// A reservation request named no outputs.
    #[error("DLC_ERR_202: Reservation request names no UTXOs")]
    EmptyReservation,

    // =================================================================
    // Signing Errors (3xx)
    // =================================================================
    /// No draft transaction with this handle is registered.
    #[error("DLC_ERR_300: Unknown transaction: {0}")]
    TransactionNotFound(DraftId),

    /// The signer already signed this transaction with different bytes.
    #[error("DLC_ERR_301: Duplicate signature from {signer} on {draft}")]
    DuplicateSignature { draft: DraftId, signer: SignerRole },

    /// The draft transaction failed validation.
    #[error("DLC_ERR_302: Invalid transaction: {reason}")]
    InvalidTransaction { reason: String },

    /// The transaction status cannot move to the requested status.
    #[error("DLC_ERR_303: Transaction {draft} cannot move from {from} to {to}")]
    InvalidTxTransition {
        draft: DraftId,
        from: TxStatus,
        to: TxStatus,
    },

    // =================================================================
    // Contract Lifecycle Errors (4xx)
    // =================================================================
    /// The requested contract does not exist.
    #[error("DLC_ERR_400: Contract not found: {0}")]
    ContractNotFound(ContractId),

    /// A contract with this id already exists.
    #[error("DLC_ERR_401: Contract already exists: {0}")]
    DuplicateContract(ContractId),

    /// The operation is not permitted in the contract's current status.
    #[error("DLC_ERR_402: Cannot {action} contract {contract_id} in status {status}")]
    InvalidContractState {
        contract_id: ContractId,
        action: &'static str,
        status: ContractStatus,
    },

    /// Offer or accept parameters were rejected.
    #[error("DLC_ERR_403: Contract rejected: {reason}")]
    ContractRejected { reason: String },

    /// A phase timestamp would be set twice or out of canonical order.
    #[error("DLC_ERR_404: Phase order violation at {phase}: {reason}")]
    PhaseOrderViolation { phase: Phase, reason: String },

    /// The phase deadline elapsed; the contract has been moved to a terminal state.
    #[error("DLC_ERR_405: Contract {contract_id} expired during {status}")]
    ContractExpired {
        contract_id: ContractId,
        status: ContractStatus,
    },

    /// A bounded wait reached its deadline.
    #[error("DLC_ERR_406: Deadline elapsed waiting for {what}")]
    DeadlineElapsed { what: String },

    // =================================================================
    // Collaborator Errors (5xx)
    // =================================================================
    /// The notification sink refused an event (never rolls back a transition).
    #[error("DLC_ERR_500: Notification sink error: {0}")]
    Notification(String),

    /// The chain observer failed to answer.
    #[error("DLC_ERR_501: Chain observer error: {0}")]
    ChainObserver(String),

    /// The oracle client failed to answer.
    #[error("DLC_ERR_502: Oracle client error: {0}")]
    Oracle(String),

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error (e.g. a poisoned lock).
    #[error("DLC_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Serialization / deserialization error.
    #[error("DLC_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (invalid config file, missing fields, etc.).
    #[error("DLC_ERR_902: Configuration error: {0}")]
    Configuration(String),

    /// I/O error (config file access).
    #[error("DLC_ERR_903: I/O error: {0}")]
    Io(String),
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, DlcError>;

/// Coarse classification of a [`DlcError`], used by callers to decide
/// whether to retry with different inputs, surface, or give up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Resource already committed elsewhere. Recoverable.
    Conflict,
    /// Referenced id absent. Data-integrity problem.
    NotFound,
    /// Operation not permitted in the current state.
    InvalidState,
    /// A deadline elapsed.
    Expired,
    /// Same signer resubmitted different signature bytes.
    DuplicateSignature,
    /// Caller-supplied parameters failed validation.
    Rejected,
    /// Collaborator, configuration, or internal failure.
    Internal,
}

impl ErrorKind {
    #[must_use]
    pub fn is_recoverable(self) -> bool {
        self == Self::Conflict
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Conflict => write!(f, "CONFLICT"),
            Self::NotFound => write!(f, "NOT_FOUND"),
            Self::InvalidState => write!(f, "INVALID_STATE"),
            Self::Expired => write!(f, "EXPIRED"),
            Self::DuplicateSignature => write!(f, "DUPLICATE_SIGNATURE"),
            Self::Rejected => write!(f, "REJECTED"),
            Self::Internal => write!(f, "INTERNAL"),
        }
    }
}

impl DlcError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UtxoAlreadySpent { .. }
            | Self::ReservationConflict { .. }
            | Self::DuplicateContract(_) => ErrorKind::Conflict,
            Self::UtxoNotFound(_) | Self::TransactionNotFound(_) | Self::ContractNotFound(_) => {
                ErrorKind::NotFound
            }
            Self::ReservationNotHeld { .. }
            | Self::InvalidTxTransition { .. }
            | Self::InvalidContractState { .. }
            | Self::PhaseOrderViolation { .. } => ErrorKind::InvalidState,
            Self::ContractExpired { .. } | Self::DeadlineElapsed { .. } => ErrorKind::Expired,
            Self::DuplicateSignature { .. } => ErrorKind::DuplicateSignature,
            Self::InvalidUtxo { .. }
            | Self::InsufficientFunds { .. }
            | Self::EmptyReservation
            | Self::InvalidTransaction { .. }
            | Self::ContractRejected { .. } => ErrorKind::Rejected,
            Self::Notification(_)
            | Self::ChainObserver(_)
            | Self::Oracle(_)
            | Self::Internal(_)
            | Self::Serialization(_)
            | Self::Configuration(_)
            | Self::Io(_) => ErrorKind::Internal,
        }
    }

    /// Shorthand for `self.kind().is_recoverable()`.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        self.kind().is_recoverable()
    }
}

impl From<std::io::Error> for DlcError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for DlcError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for DlcError {
    fn from(err: toml::de::Error) -> Self {
        Self::Configuration(err.to_string())
    }
}

impl From<toml::ser::Error> for DlcError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
