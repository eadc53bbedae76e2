//! Events emitted to the notification sink.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ContractId, ContractStatus, Phase};

/// A contract moved from one status to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseChanged {
    pub contract_id: ContractId,
    pub from: ContractStatus,
    pub to: ContractStatus,
    /// Phase timestamp stamped by this transition, if any.
    pub phase: Option<Phase>,
    pub at: DateTime<Utc>,
    /// Set for expiries and aborts.
    pub reason: Option<String>,
}

impl PhaseChanged {
    #[must_use]
    pub fn new(
        contract_id: ContractId,
        from: ContractStatus,
        to: ContractStatus,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            contract_id,
            from,
            to,
            phase: None,
            at,
            reason: None,
        }
    }

    #[must_use]
    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.phase = Some(phase);
        self
    }

    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.to.is_terminal()
    }
}
