//! Reservation manager: grants, renews, and releases UTXO reservations.
//!
//! Soft reservations earmark outputs for a contract offer and never block
//! anything. A hard reservation ties outputs to one funding draft for a
//! bounded time and makes them unavailable to every other allocation.
//!
//! `hard_reserve` is the one mutual-exclusion boundary of the engine: the
//! check of every named output and the write of the reservation happen in a
//! single [`RecordStore::update_all`](crate::RecordStore::update_all) call,
//! so two overlapping requests can never both succeed.

use std::collections::BTreeSet;

use chrono::Duration;
use dlcplaza_types::{
    ContractId, DlcError, DraftId, HardReservation, OutPoint, Result, SoftReservation, Txid,
    Utxo,
};
use tracing::{debug, error, info, warn};

use crate::ledger::UtxoLedger;

/// Outputs cleared by one [`ReservationManager::sweep_expired`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    pub hard_cleared: usize,
    pub soft_cleared: usize,
}

impl SweepOutcome {
    #[must_use]
    pub fn total(&self) -> usize {
        self.hard_cleared + self.soft_cleared
    }
}

/// Grants and releases reservations against a [`UtxoLedger`].
#[derive(Debug, Clone)]
pub struct ReservationManager {
    ledger: UtxoLedger,
}

/// Sorted, de-duplicated outpoints; rejects an empty request.
fn normalize(ids: &[OutPoint]) -> Result<Vec<OutPoint>> {
    let set: BTreeSet<OutPoint> = ids.iter().copied().collect();
    if set.is_empty() {
        return Err(DlcError::EmptyReservation);
    }
    Ok(set.into_iter().collect())
}

fn conflict(outpoint: OutPoint, reason: String) -> DlcError {
    DlcError::ReservationConflict { outpoint, reason }
}

impl ReservationManager {
    #[must_use]
    pub fn new(ledger: UtxoLedger) -> Self {
        Self { ledger }
    }

    #[must_use]
    pub fn ledger(&self) -> &UtxoLedger {
        &self.ledger
    }

    // -----------------------------------------------------------------
    // Soft
    // -----------------------------------------------------------------

    /// Earmark outputs for `contract_id` until released.
    ///
    /// # Errors
    /// `UtxoNotFound` or `UtxoAlreadySpent`; nothing is written on error.
    pub fn soft_reserve(&self, ids: &[OutPoint], contract_id: ContractId) -> Result<()> {
        self.soft_reserve_inner(ids, contract_id, None)
    }

    /// Earmark outputs for `contract_id`, lapsing after `ttl`.
    pub fn soft_reserve_for(
        &self,
        ids: &[OutPoint],
        contract_id: ContractId,
        ttl: Duration,
    ) -> Result<()> {
        self.soft_reserve_inner(ids, contract_id, Some(ttl))
    }

    fn soft_reserve_inner(
        &self,
        ids: &[OutPoint],
        contract_id: ContractId,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let ids = normalize(ids)?;
        let now = self.ledger.clock().now();

        let res = self.ledger.store().update_all(&ids, &mut |records| {
            for rec in records.iter_mut() {
                if rec.is_spent {
                    return Err(DlcError::UtxoAlreadySpent {
                        outpoint: rec.outpoint,
                        spent_by: rec.spend_txid.unwrap_or(Txid([0u8; 32])),
                    });
                }
                if let Some(previous) = rec.soft_holder_at(now).filter(|c| *c != contract_id) {
                    warn!(outpoint = %rec.outpoint, %previous, contract_id = %contract_id, "soft earmark replaced");
                }
                rec.soft = Some(SoftReservation {
                    contract_id,
                    reserved_at: now,
                    expires_at: ttl.map(|t| now + t),
                });
                rec.updated_at = now;
            }
            Ok(())
        });

        match res {
            Ok(_) => {
                info!(%contract_id, count = ids.len(), "soft reservation granted");
                Ok(())
            }
            Err(e) => {
                error!(%contract_id, error = %e, "soft reservation failed");
                Err(e)
            }
        }
    }

    // -----------------------------------------------------------------
    // Hard
    // -----------------------------------------------------------------

    /// Atomically claim every output for `draft` until `now + ttl`.
    ///
    /// Fails the whole batch if any output is spent or carries a live hard
    /// reservation, including one held by `draft` itself. Lapsed
    /// reservations count as absent whether or not a sweep cleared them.
    ///
    /// # Errors
    /// `ReservationConflict` (recoverable), `UtxoNotFound`, `EmptyReservation`.
    pub fn hard_reserve(&self, ids: &[OutPoint], draft: DraftId, ttl: Duration) -> Result<()> {
        let ids = normalize(ids)?;
        if ttl <= Duration::zero() {
            return Err(DlcError::Internal(format!(
                "hard reservation ttl must be positive, got {ttl}"
            )));
        }

        let res = self.ledger.store().update_all(&ids, &mut |records| {
            // Clock read inside the critical section so expiry is judged at grant time.
            let now = self.ledger.clock().now();
            for rec in records.iter() {
                if rec.is_spent {
                    let by = rec
                        .spend_txid
                        .map_or_else(|| "unknown tx".to_string(), |t| t.to_string());
                    return Err(conflict(rec.outpoint, format!("already spent by {by}")));
                }
                if let Some(h) = rec.hard.as_ref().filter(|h| h.is_live_at(now)) {
                    return Err(conflict(
                        rec.outpoint,
                        format!("hard-reserved by {} until {}", h.draft, h.expires_at),
                    ));
                }
            }
            for rec in records.iter_mut() {
                rec.hard = Some(HardReservation {
                    draft,
                    reserved_at: now,
                    expires_at: now + ttl,
                });
                rec.updated_at = now;
            }
            Ok(())
        });

        match res {
            Ok(_) => {
                info!(%draft, count = ids.len(), ttl_secs = ttl.num_seconds(), "hard reservation granted");
                Ok(())
            }
            Err(e @ DlcError::ReservationConflict { .. }) => {
                warn!(%draft, error = %e, "hard reservation conflict");
                Err(e)
            }
            Err(e) => {
                error!(%draft, error = %e, "hard reservation failed");
                Err(e)
            }
        }
    }

    /// Extend a live hard reservation held by `draft` to `now + ttl`.
    ///
    /// # Errors
    /// `ReservationNotHeld` if any output is not live-reserved by `draft`.
    pub fn renew(&self, ids: &[OutPoint], draft: DraftId, ttl: Duration) -> Result<()> {
        let ids = normalize(ids)?;
        let now = self.ledger.clock().now();

        self.ledger.store().update_all(&ids, &mut |records| {
            for rec in records.iter_mut() {
                match rec.hard.as_mut() {
                    Some(h) if h.draft == draft && h.is_live_at(now) => {
                        h.expires_at = now + ttl;
                    }
                    _ => {
                        return Err(DlcError::ReservationNotHeld {
                            outpoint: rec.outpoint,
                            draft,
                        });
                    }
                }
                rec.updated_at = now;
            }
            Ok(())
        })?;

        debug!(%draft, count = ids.len(), ttl_secs = ttl.num_seconds(), "hard reservation renewed");
        Ok(())
    }

    // -----------------------------------------------------------------
    // Release
    // -----------------------------------------------------------------

    /// Clear soft and hard reservation fields. Idempotent; unknown outputs
    /// are skipped. Returns how many records changed.
    pub fn release(&self, ids: &[OutPoint]) -> Result<usize> {
        self.release_where(ids, |rec| {
            let had = rec.soft.is_some() || rec.hard.is_some();
            rec.soft = None;
            rec.hard = None;
            had
        })
    }

    /// Clear the soft earmark only where `contract_id` holds it.
    pub fn release_soft_for(&self, ids: &[OutPoint], contract_id: ContractId) -> Result<usize> {
        self.release_where(ids, |rec| {
            if rec.soft.as_ref().is_some_and(|s| s.contract_id == contract_id) {
                rec.soft = None;
                true
            } else {
                false
            }
        })
    }

    /// Clear the hard reservation only where `draft` holds it.
    pub fn release_hard_for(&self, ids: &[OutPoint], draft: DraftId) -> Result<usize> {
        self.release_where(ids, |rec| {
            if rec.hard.as_ref().is_some_and(|h| h.draft == draft) {
                rec.hard = None;
                true
            } else {
                false
            }
        })
    }

    fn release_where(&self, ids: &[OutPoint], clear: impl Fn(&mut Utxo) -> bool) -> Result<usize> {
        let now = self.ledger.clock().now();
        let mut released = 0;
        for op in ids.iter().copied().collect::<BTreeSet<_>>() {
            let mut changed = false;
            let res = self.ledger.store().update(&op, &mut |rec| {
                changed = clear(rec);
                if changed {
                    rec.updated_at = now;
                }
                Ok(())
            });
            match res {
                Ok(_) if changed => {
                    released += 1;
                    info!(outpoint = %op, "reservation released");
                }
                Ok(_) => debug!(outpoint = %op, "nothing to release"),
                Err(DlcError::UtxoNotFound(_)) => debug!(outpoint = %op, "release of unknown UTXO"),
                Err(e) => return Err(e),
            }
        }
        Ok(released)
    }

    // -----------------------------------------------------------------
    // Sweep
    // -----------------------------------------------------------------

    /// Clear every reservation whose expiry has passed.
    ///
    /// Safe to interleave with reservation requests: each record is
    /// re-checked under the store's write lock before it is cleared.
    pub fn sweep_expired(&self) -> Result<SweepOutcome> {
        let now = self.ledger.clock().now();
        let mut outcome = SweepOutcome::default();

        self.ledger.store().update_matching(
            &|u| u.has_stale_hard_reservation(now) || u.has_stale_soft_reservation(now),
            &mut |rec| {
                if rec.has_stale_hard_reservation(now) {
                    if let Some(h) = rec.hard.take() {
                        debug!(outpoint = %rec.outpoint, draft = %h.draft, "stale hard reservation cleared");
                    }
                    outcome.hard_cleared += 1;
                }
                if rec.has_stale_soft_reservation(now) {
                    rec.soft = None;
                    outcome.soft_cleared += 1;
                }
                rec.updated_at = now;
            },
        )?;

        if outcome.total() > 0 {
            info!(
                hard = outcome.hard_cleared,
                soft = outcome.soft_cleared,
                "expired reservations swept"
            );
        }
        Ok(outcome)
    }

    // -----------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------

    /// Outputs currently live-reserved by `draft`.
    pub fn held_by(&self, draft: DraftId) -> Result<Vec<OutPoint>> {
        let now = self.ledger.clock().now();
        Ok(self
            .ledger
            .store()
            .scan(&|u| u.hard_holder_at(now) == Some(draft))?
            .into_iter()
            .map(|u| u.outpoint)
            .collect())
    }

    /// Outputs currently earmarked for `contract_id`.
    pub fn earmarked_for(&self, contract_id: ContractId) -> Result<Vec<OutPoint>> {
        let now = self.ledger.clock().now();
        Ok(self
            .ledger
            .store()
            .scan(&|u| u.soft_holder_at(now) == Some(contract_id))?
            .into_iter()
            .map(|u| u.outpoint)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, Utc};
    use dlcplaza_types::{ManualClock, UtxoFilter};

    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    struct Fixture {
        mgr: ReservationManager,
        clock: Arc<ManualClock>,
    }

    impl Fixture {
        fn new() -> Self {
            let clock = Arc::new(ManualClock::new(t0()));
            let ledger = UtxoLedger::in_memory(clock.clone());
            Self {
                mgr: ReservationManager::new(ledger),
                clock,
            }
        }

        fn utxo(&self, value: u64) -> OutPoint {
            let u = Utxo::dummy(value);
            self.mgr.ledger().upsert(u.clone()).unwrap();
            u.outpoint
        }

        fn available(&self) -> Vec<OutPoint> {
            self.mgr
                .ledger()
                .list_available(&UtxoFilter::new())
                .unwrap()
                .into_iter()
                .map(|u| u.outpoint)
                .collect()
        }
    }

    #[test]
    fn soft_reserve_is_advisory() {
        let f = Fixture::new();
        let a = f.utxo(100_000);
        let c1 = ContractId([1u8; 8]);
        f.mgr.soft_reserve(&[a], c1).unwrap();

        assert_eq!(f.available(), vec![a]);
        assert_eq!(f.mgr.earmarked_for(c1).unwrap(), vec![a]);
        // A hard reservation is not blocked by an earmark.
        f.mgr.hard_reserve(&[a], DraftId::new(), Duration::minutes(5)).unwrap();
    }

    #[test]
    fn soft_reserve_rejects_spent_and_unknown() {
        let f = Fixture::new();
        let a = f.utxo(100_000);
        let b = f.utxo(100_000);
        f.mgr.ledger().mark_spent(&b, Txid([5u8; 32])).unwrap();

        let c = ContractId([1u8; 8]);
        assert!(matches!(
            f.mgr.soft_reserve(&[a, b], c),
            Err(DlcError::UtxoAlreadySpent { .. })
        ));
        assert!(f.mgr.earmarked_for(c).unwrap().is_empty());

        let ghost = Utxo::dummy(1).outpoint;
        assert!(matches!(
            f.mgr.soft_reserve(&[ghost], c),
            Err(DlcError::UtxoNotFound(_))
        ));
        assert!(matches!(
            f.mgr.soft_reserve(&[], c),
            Err(DlcError::EmptyReservation)
        ));
    }

    #[test]
    fn hard_reserve_conflict_leaves_batch_untouched() {
        let f = Fixture::new();
        let a = f.utxo(100_000);
        let c = f.utxo(100_000);

        let d1 = DraftId::new();
        f.mgr.hard_reserve(&[a], d1, Duration::minutes(10)).unwrap();

        let d2 = DraftId::new();
        let err = f.mgr.hard_reserve(&[a, c], d2, Duration::minutes(10)).unwrap_err();
        assert!(matches!(err, DlcError::ReservationConflict { outpoint, .. } if outpoint == a));
        assert!(err.is_recoverable());

        assert_eq!(f.available(), vec![c]);
        assert!(f.mgr.held_by(d2).unwrap().is_empty());
        assert_eq!(f.mgr.held_by(d1).unwrap(), vec![a]);
    }

    #[test]
    fn same_draft_cannot_reenter() {
        let f = Fixture::new();
        let a = f.utxo(1_000);
        let d = DraftId::new();
        f.mgr.hard_reserve(&[a], d, Duration::minutes(1)).unwrap();
        assert!(f.mgr.hard_reserve(&[a], d, Duration::minutes(1)).is_err());
    }

    #[test]
    fn lapsed_reservation_is_absent_before_sweep() {
        let f = Fixture::new();
        let a = f.utxo(1_000);
        f.mgr.hard_reserve(&[a], DraftId::new(), Duration::seconds(30)).unwrap();

        f.clock.advance(Duration::seconds(30));
        let d2 = DraftId::new();
        f.mgr.hard_reserve(&[a], d2, Duration::seconds(30)).unwrap();
        assert_eq!(f.mgr.held_by(d2).unwrap(), vec![a]);
    }

    #[test]
    fn spent_output_conflicts() {
        let f = Fixture::new();
        let a = f.utxo(1_000);
        f.mgr.ledger().mark_spent(&a, Txid([8u8; 32])).unwrap();
        let err = f.mgr.hard_reserve(&[a], DraftId::new(), Duration::seconds(30)).unwrap_err();
        assert!(err.to_string().contains("already spent"));
    }

    #[test]
    fn renew_requires_live_holding() {
        let f = Fixture::new();
        let a = f.utxo(1_000);
        let d = DraftId::new();
        f.mgr.hard_reserve(&[a], d, Duration::seconds(30)).unwrap();

        f.clock.advance(Duration::seconds(20));
        f.mgr.renew(&[a], d, Duration::seconds(30)).unwrap();
        f.clock.advance(Duration::seconds(20));
        assert_eq!(f.mgr.held_by(d).unwrap(), vec![a]);

        assert!(matches!(
            f.mgr.renew(&[a], DraftId::new(), Duration::seconds(30)),
            Err(DlcError::ReservationNotHeld { .. })
        ));

        f.clock.advance(Duration::seconds(60));
        assert!(f.mgr.renew(&[a], d, Duration::seconds(30)).is_err());
    }

    #[test]
    fn release_is_idempotent() {
        let f = Fixture::new();
        let a = f.utxo(1_000);
        f.mgr.soft_reserve(&[a], ContractId([2u8; 8])).unwrap();
        f.mgr.hard_reserve(&[a], DraftId::new(), Duration::seconds(30)).unwrap();

        assert_eq!(f.mgr.release(&[a]).unwrap(), 1);
        assert_eq!(f.mgr.release(&[a]).unwrap(), 0);
        assert_eq!(f.mgr.release(&[Utxo::dummy(1).outpoint]).unwrap(), 0);
        assert_eq!(f.available(), vec![a]);
    }

    #[test]
    fn scoped_release_does_not_touch_other_holders() {
        let f = Fixture::new();
        let a = f.utxo(1_000);
        let old = DraftId::new();
        f.mgr.hard_reserve(&[a], old, Duration::seconds(10)).unwrap();
        f.clock.advance(Duration::seconds(11));

        let new = DraftId::new();
        f.mgr.hard_reserve(&[a], new, Duration::seconds(60)).unwrap();
        assert_eq!(f.mgr.release_hard_for(&[a], old).unwrap(), 0);
        assert_eq!(f.mgr.held_by(new).unwrap(), vec![a]);

        let c1 = ContractId([1u8; 8]);
        let c2 = ContractId([2u8; 8]);
        f.mgr.soft_reserve(&[a], c2).unwrap();
        assert_eq!(f.mgr.release_soft_for(&[a], c1).unwrap(), 0);
        assert_eq!(f.mgr.earmarked_for(c2).unwrap(), vec![a]);
    }

    #[test]
    fn sweep_clears_only_lapsed() {
        let f = Fixture::new();
        let a = f.utxo(1_000);
        let b = f.utxo(1_000);
        let c = f.utxo(1_000);
        f.mgr.hard_reserve(&[a], DraftId::new(), Duration::seconds(10)).unwrap();
        f.mgr.hard_reserve(&[b], DraftId::new(), Duration::seconds(100)).unwrap();
        f.mgr
            .soft_reserve_for(&[c], ContractId([3u8; 8]), Duration::seconds(10))
            .unwrap();

        f.clock.advance(Duration::seconds(10));
        let out = f.mgr.sweep_expired().unwrap();
        assert_eq!(out.hard_cleared, 1);
        assert_eq!(out.soft_cleared, 1);
        assert_eq!(f.mgr.sweep_expired().unwrap().total(), 0);

        let rec_a = f.mgr.ledger().get(&a).unwrap();
        assert!(rec_a.hard.is_none());
        assert!(f.mgr.ledger().get(&b).unwrap().hard.is_some());
    }
}
