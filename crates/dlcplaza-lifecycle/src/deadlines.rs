//! Phase deadline enforcement.
//!
//! A contract past the deadline of its current status is moved to a
//! terminal state: `expired` before funding confirms, `refunded` after. Its
//! reservations are released in the same pass. The guard is idempotent and
//! runs from three places: inline when an operation meets a stale contract,
//! from [`SettlementEngine::sweep`], and when a bounded signature wait ends.

use chrono::{DateTime, Utc};
use dlcplaza_types::{ContractId, ContractSnapshot, ContractStatus, DlcError, Phase, PhaseChanged, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::engine::SettlementEngine;

/// A terminal move made by the deadline guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Enforcement {
    pub contract_id: ContractId,
    pub from: ContractStatus,
    pub to: ContractStatus,
    pub released_soft: usize,
    pub released_hard: usize,
}

/// Result of one [`SettlementEngine::sweep`] pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepSummary {
    /// Hard reservations cleared, lapsed or belonging to expired contracts.
    pub reclaimed_hard: usize,
    /// Soft earmarks cleared.
    pub reclaimed_soft: usize,
    pub expired: Vec<ContractId>,
    pub refunded: Vec<ContractId>,
    /// Contracts the sweep could not move; retried next pass.
    pub failed: usize,
}

impl SweepSummary {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl SettlementEngine {
    /// Move `contract_id` to its terminal failure state if it is past its
    /// current deadline at `now`. Returns `None` when nothing was due.
    pub(crate) fn enforce_deadline(
        &self,
        contract_id: ContractId,
        now: DateTime<Utc>,
    ) -> Result<Option<Enforcement>> {
        let mut from = None;
        let contract = self.contracts.update(&contract_id, &mut |c| {
            from = None;
            if !c.is_past_deadline(now) {
                return Ok(());
            }
            let (target, reason) = match c.status {
                ContractStatus::Offered => (ContractStatus::Expired, "offer window elapsed"),
                ContractStatus::Accepted => (ContractStatus::Expired, "signature window elapsed"),
                ContractStatus::Signed => {
                    (ContractStatus::Expired, "funding broadcast window elapsed")
                }
                ContractStatus::FundingBroadcast => (
                    ContractStatus::Expired,
                    "funding unconfirmed at refund locktime",
                ),
                ContractStatus::Confirmed | ContractStatus::Attested => {
                    (ContractStatus::Refunded, "refund locktime reached")
                }
                _ => return Ok(()),
            };
            let status = c.status;
            c.transition(target, "expire", now)?;
            if target == ContractStatus::Refunded {
                c.timestamps.stamp(Phase::Refund, now)?;
            }
            c.terminal_reason = Some(reason.to_string());
            from = Some(status);
            Ok(())
        })?;

        let Some(from) = from else {
            debug!(%contract_id, status = %contract.status, "no deadline due");
            return Ok(None);
        };

        let (released_soft, released_hard) = self.release_reservations(&contract)?;
        let reason = contract.terminal_reason.clone().unwrap_or_default();
        warn!(
            %contract_id,
            %from,
            to = %contract.status,
            reason = %reason,
            released_soft,
            released_hard,
            "contract deadline elapsed"
        );

        let mut event = PhaseChanged::new(contract_id, from, contract.status, now).with_reason(reason);
        if contract.status == ContractStatus::Refunded {
            event = event.with_phase(Phase::Refund);
        }
        self.emit(event);

        Ok(Some(Enforcement {
            contract_id,
            from,
            to: contract.status,
            released_soft,
            released_hard,
        }))
    }

    /// Reclaim lapsed reservations and terminate every contract past its
    /// deadline. Idempotent: a second pass at the same instant finds
    /// nothing to do.
    pub fn sweep(&self) -> Result<SweepSummary> {
        let lapsed = self.reservations.sweep_expired()?;
        let now = self.clock.now();
        let mut summary = SweepSummary {
            reclaimed_hard: lapsed.hard_cleared,
            reclaimed_soft: lapsed.soft_cleared,
            ..SweepSummary::default()
        };

        let due = self
            .contracts
            .scan(&|c| !c.status.is_terminal() && c.is_past_deadline(now))?;
        for contract in due {
            match self.enforce_deadline(contract.contract_id, now) {
                Ok(Some(done)) => {
                    summary.reclaimed_soft += done.released_soft;
                    summary.reclaimed_hard += done.released_hard;
                    match done.to {
                        ContractStatus::Refunded => summary.refunded.push(done.contract_id),
                        _ => summary.expired.push(done.contract_id),
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(contract_id = %contract.contract_id, error = %e, "sweep could not enforce deadline");
                    summary.failed += 1;
                }
            }
        }

        if !summary.is_empty() {
            info!(
                reclaimed_hard = summary.reclaimed_hard,
                reclaimed_soft = summary.reclaimed_soft,
                expired = summary.expired.len(),
                refunded = summary.refunded.len(),
                failed = summary.failed,
                "sweep finished"
            );
        }
        Ok(summary)
    }

    /// Wait until both parties have signed the funding draft, at most until
    /// the contract's signing deadline.
    ///
    /// # Errors
    /// `ContractExpired` if the deadline elapses first; the contract is
    /// expired and its inputs released before this returns.
    pub async fn await_funding_signatures(&self, contract_id: ContractId) -> Result<ContractSnapshot> {
        loop {
            let contract = self.contracts.get(&contract_id)?;
            match contract.status {
                ContractStatus::Accepted => {}
                ContractStatus::Signed
                | ContractStatus::FundingBroadcast
                | ContractStatus::Confirmed
                | ContractStatus::Attested
                | ContractStatus::Settled
                | ContractStatus::Refunded => return Ok(contract.snapshot()),
                ContractStatus::Expired => {
                    return Err(DlcError::ContractExpired {
                        contract_id,
                        status: ContractStatus::Accepted,
                    });
                }
                _ => return Err(contract.invalid("await signatures for")),
            }

            let (Some(draft), Some(deadline)) = (contract.funding_draft, contract.current_deadline())
            else {
                return Err(DlcError::Internal(format!(
                    "accepted contract {contract_id} has no funding draft or deadline"
                )));
            };

            match self.signing.wait_for_quorum(draft, deadline).await {
                Ok(_) => {
                    // Signatures may have reached the coordinator directly.
                    self.apply_funding_signatures(contract_id, self.clock.now())?;
                }
                Err(DlcError::DeadlineElapsed { .. }) => {
                    // The timer has run out, so the deadline has been reached
                    // even if the clock reads a moment earlier.
                    let at = self.clock.now().max(deadline);
                    if self.enforce_deadline(contract_id, at)?.is_some() {
                        return Err(DlcError::ContractExpired {
                            contract_id,
                            status: ContractStatus::Accepted,
                        });
                    }
                    // A signature moved the deadline; wait again.
                    tokio::task::yield_now().await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;
    use dlcplaza_types::{ErrorKind, SignerRole};

    use super::*;
    use crate::testkit::{Fixture, t0};

    #[test]
    fn sweep_expires_stale_offer_once() {
        let f = Fixture::new();
        let a = f.fund(150_000);
        let id = f.offer(vec![a], 100_000);

        f.clock.advance(Duration::hours(167));
        assert!(f.engine.sweep().unwrap().is_empty());

        f.clock.advance(Duration::hours(2));
        let summary = f.engine.sweep().unwrap();
        assert_eq!(summary.expired, vec![id]);
        assert_eq!(summary.reclaimed_soft, 1);
        assert!(summary.refunded.is_empty());

        let snap = f.engine.get_contract(id).unwrap();
        assert_eq!(snap.status, ContractStatus::Expired);
        assert_eq!(snap.terminal_reason.as_deref(), Some("offer window elapsed"));
        assert!(f.engine.reservations().earmarked_for(id).unwrap().is_empty());

        // Nothing left to do at the same instant.
        assert!(f.engine.sweep().unwrap().is_empty());
    }

    #[test]
    fn sweep_releases_hard_reservations_of_unsigned_contract() {
        let f = Fixture::new();
        let (id, draft) = f.accepted();

        f.clock.advance(Duration::minutes(61));
        let summary = f.engine.sweep().unwrap();
        assert_eq!(summary.expired, vec![id]);
        assert!(summary.reclaimed_hard >= 2);
        assert!(f.engine.reservations().held_by(draft).unwrap().is_empty());
        assert_eq!(
            f.engine.get_contract(id).unwrap().terminal_reason.as_deref(),
            Some("signature window elapsed")
        );
    }

    #[test]
    fn confirmed_contract_is_refunded_at_locktime() {
        let f = Fixture::new();
        let id = f.confirmed();

        f.clock.set(t0() + Duration::days(30));
        let summary = f.engine.sweep().unwrap();
        assert_eq!(summary.refunded, vec![id]);

        let snap = f.engine.get_contract(id).unwrap();
        assert_eq!(snap.status, ContractStatus::Refunded);
        assert_eq!(snap.timestamps.refund_at, Some(t0() + Duration::days(30)));
    }

    #[test]
    fn stuck_outcome_falls_back_to_refund_at_locktime() {
        let f = Fixture::new();
        let id = f.confirmed();
        f.clock.advance(Duration::days(2));
        let att = f.attestation(id);
        let attested = f.engine.on_attestation(id, att, Some(f.outcome_draft(id))).unwrap();
        let cet_draft = f.engine.contracts.get(&id).unwrap().outcome_draft.unwrap();
        f.sign_both(cet_draft);
        let snap = f.engine.broadcast_outcome(id).unwrap();
        assert!(snap.timestamps.broadcast_cet_at.is_some());
        assert_eq!(snap.deadlines.refund_locktime, attested.deadlines.refund_locktime);

        // The outcome never confirms.
        f.clock.set(t0() + Duration::days(29));
        assert!(f.engine.sweep().unwrap().is_empty());
        f.clock.set(t0() + Duration::days(30));
        let summary = f.engine.sweep().unwrap();
        assert_eq!(summary.refunded, vec![id]);
        let snap = f.engine.get_contract(id).unwrap();
        assert_eq!(snap.status, ContractStatus::Refunded);
        assert_eq!(snap.timestamps.refund_at, Some(t0() + Duration::days(30)));

        // A late outcome confirmation is recorded and rules out the refund.
        let snap = f
            .engine
            .on_confirmation(snap.outcome_txid.unwrap(), 1, Some(845_000))
            .unwrap()
            .unwrap();
        assert_eq!(snap.status, ContractStatus::Refunded);
        assert!(snap.timestamps.confirmed_cet_at.is_some());
        let refund = f.engine.contracts.get(&id).unwrap().refund_draft.unwrap();
        f.sign_both(refund);
        let err = f.engine.broadcast_refund(id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn enforce_before_deadline_is_a_no_op() {
        let f = Fixture::new();
        let (id, _) = f.accepted();
        assert!(f.engine.enforce_deadline(id, t0()).unwrap().is_none());
        assert_eq!(f.engine.get_contract(id).unwrap().status, ContractStatus::Accepted);
    }

    #[tokio::test(start_paused = true)]
    async fn signature_wait_expires_contract_at_deadline() {
        let f = Fixture::new();
        let (id, draft) = f.accepted();

        let err = f.engine.await_funding_signatures(id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Expired);
        assert_eq!(f.engine.get_contract(id).unwrap().status, ContractStatus::Expired);
        assert!(f.engine.reservations().held_by(draft).unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn signature_wait_returns_once_both_parties_sign() {
        let f = Fixture::new();
        let (id, draft) = f.accepted();

        let engine = Arc::clone(&f.engine);
        let waiter = tokio::spawn(async move { engine.await_funding_signatures(id).await });
        tokio::task::yield_now().await;

        // Only the acceptor signs before their window closes.
        f.engine
            .submit_signature(draft, SignerRole::Acceptor, b"acc".to_vec())
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_secs(3_700)).await;
        f.clock.advance(Duration::minutes(62));
        f.engine
            .submit_signature(draft, SignerRole::Initiator, b"ini".to_vec())
            .unwrap();

        let snap = waiter.await.unwrap().unwrap();
        assert_eq!(snap.status, ContractStatus::Signed);
    }
}
