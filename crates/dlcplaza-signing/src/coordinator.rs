//! Signing coordinator: two-of-two quorum over draft transactions.
//!
//! Drafts are registered unsigned. Each contract party submits one signature
//! per draft; the `(draft, signer)` pair is unique. Re-submitting identical
//! bytes is a no-op, different bytes are rejected and the original kept.
//!
//! After every accepted submission the status is recomputed from the number
//! of distinct signers: none is `pending`, one is `partially_signed`, both is
//! `signed`. Only a `signed` draft may be marked broadcast, and only once.
//!
//! Waiting for the counterparty is bounded: [`SigningCoordinator::wait_for_quorum`]
//! parks on a per-draft `watch` channel until the status reaches `signed` or
//! the deadline passes.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use chrono::{DateTime, Utc};
use dlcplaza_ledger::{MemoryStore, RecordStore};
use dlcplaza_types::{
    Clock, ContractId, DlcError, DraftId, NewTransaction, Result, Signature, SignerRole,
    Transaction, TxStatus, Txid,
};
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Outcome of a signature submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submission {
    pub status: TxStatus,
    /// `false` when the identical signature was already recorded.
    pub recorded: bool,
}

/// Collects partial signatures and tracks broadcast readiness.
pub struct SigningCoordinator {
    store: Arc<dyn RecordStore<DraftId, Transaction>>,
    clock: Arc<dyn Clock>,
    watchers: Mutex<HashMap<DraftId, watch::Sender<TxStatus>>>,
}

impl std::fmt::Debug for SigningCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningCoordinator")
            .field("drafts", &self.store.len().unwrap_or(0))
            .finish_non_exhaustive()
    }
}

fn poisoned<T>(_: PoisonError<T>) -> DlcError {
    DlcError::Internal("signing watcher lock poisoned".into())
}

impl SigningCoordinator {
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore<DraftId, Transaction>>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            watchers: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
        Self::new(Arc::new(MemoryStore::for_transactions()), clock)
    }

    /// Register an unsigned draft and return its local handle.
    ///
    /// # Errors
    /// `InvalidTransaction` if the draft fails validation.
    pub fn register_draft(&self, draft: NewTransaction) -> Result<DraftId> {
        draft.validate()?;
        let tx = Transaction::from_new(draft, self.clock.now());
        let draft_id = tx.draft_id;
        info!(draft = %draft_id, txid = %tx.txid.short(), contract_id = %tx.contract_id, tx_type = %tx.tx_type, "draft registered");
        self.store.create(draft_id, tx)?;
        Ok(draft_id)
    }

    /// # Errors
    /// `TransactionNotFound` for an unknown handle.
    pub fn get(&self, draft: DraftId) -> Result<Transaction> {
        self.store.get(&draft)
    }

    pub fn status(&self, draft: DraftId) -> Result<TxStatus> {
        Ok(self.get(draft)?.status)
    }

    /// Draft whose computed txid is `txid`, if registered.
    pub fn find_by_txid(&self, txid: Txid) -> Result<Option<Transaction>> {
        Ok(self.store.scan(&|tx| tx.txid == txid)?.into_iter().next())
    }

    /// Every draft belonging to `contract_id`.
    pub fn drafts_for(&self, contract_id: ContractId) -> Result<Vec<Transaction>> {
        self.store.scan(&|tx| tx.contract_id == contract_id)
    }

    /// Record `signer`'s signature on `draft` and recompute its status.
    ///
    /// # Errors
    /// - `TransactionNotFound` for an unknown handle
    /// - `DuplicateSignature` if `signer` already signed with different bytes
    /// - `InvalidTransaction` for empty signature bytes
    pub fn submit_signature(
        &self,
        draft: DraftId,
        signer: SignerRole,
        bytes: Vec<u8>,
    ) -> Result<Submission> {
        if bytes.is_empty() {
            return Err(DlcError::InvalidTransaction {
                reason: format!("empty signature from {signer} on {draft}"),
            });
        }
        let now = self.clock.now();
        let mut recorded = false;

        let res = self.store.update(&draft, &mut |tx| {
            recorded = false;
            match tx.signatures.get(&signer) {
                Some(existing) if existing.bytes == bytes => return Ok(()),
                Some(_) => return Err(DlcError::DuplicateSignature { draft, signer }),
                None => {}
            }

            tx.signatures.insert(
                signer,
                Signature {
                    signer,
                    bytes: bytes.clone(),
                    submitted_at: now,
                },
            );
            let next = TxStatus::from_signature_count(tx.signatures.len());
            if next != tx.status {
                if !tx.status.can_transition_to(next) {
                    return Err(DlcError::InvalidTxTransition {
                        draft,
                        from: tx.status,
                        to: next,
                    });
                }
                tx.status = next;
            }
            tx.updated_at = now;
            recorded = true;
            Ok(())
        });

        let tx = match res {
            Ok(tx) => tx,
            Err(e @ DlcError::DuplicateSignature { .. }) => {
                error!(%draft, %signer, "conflicting signature bytes rejected");
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        if recorded {
            info!(%draft, %signer, status = %tx.status, "signature recorded");
            self.notify(draft, tx.status)?;
        } else {
            debug!(%draft, %signer, "identical signature resubmitted");
        }
        Ok(Submission {
            status: tx.status,
            recorded,
        })
    }

    /// Remove a draft nobody has signed yet.
    ///
    /// # Errors
    /// `InvalidTxTransition` once any signature is recorded.
    pub fn discard_draft(&self, draft: DraftId) -> Result<()> {
        let tx = self.get(draft)?;
        if tx.status != TxStatus::Pending {
            return Err(DlcError::InvalidTxTransition {
                draft,
                from: tx.status,
                to: TxStatus::Pending,
            });
        }
        self.store.remove(&draft)?;
        self.forget(draft)?;
        debug!(%draft, "unsigned draft discarded");
        Ok(())
    }

    /// Move a fully signed draft to `broadcast`.
    ///
    /// # Errors
    /// `InvalidTxTransition` unless the draft is `signed`.
    pub fn mark_broadcast(&self, draft: DraftId) -> Result<Transaction> {
        let now = self.clock.now();
        let tx = self.store.update(&draft, &mut |tx| {
            if !tx.status.can_transition_to(TxStatus::Broadcast) {
                return Err(DlcError::InvalidTxTransition {
                    draft,
                    from: tx.status,
                    to: TxStatus::Broadcast,
                });
            }
            tx.status = TxStatus::Broadcast;
            tx.broadcast_at = Some(now);
            tx.updated_at = now;
            Ok(())
        })?;
        info!(%draft, txid = %tx.txid, "transaction marked broadcast");
        self.notify(draft, tx.status)?;
        // Broadcast is final for signing; no wait can still be pending.
        self.forget(draft)?;
        Ok(tx)
    }

    /// Wait until `draft` is `signed` (or later), or `deadline` passes.
    ///
    /// # Errors
    /// `DeadlineElapsed` on timeout, `TransactionNotFound` for an unknown handle.
    pub async fn wait_for_quorum(&self, draft: DraftId, deadline: DateTime<Utc>) -> Result<TxStatus> {
        let mut rx = self.subscribe(draft)?;
        let outcome = self.await_signed(draft, &mut rx, deadline).await;
        drop(rx);
        self.release_idle(draft)?;
        outcome
    }

    async fn await_signed(
        &self,
        draft: DraftId,
        rx: &mut watch::Receiver<TxStatus>,
        deadline: DateTime<Utc>,
    ) -> Result<TxStatus> {
        let elapsed = || DlcError::DeadlineElapsed {
            what: format!("signature quorum on {draft}"),
        };

        let remaining = (deadline - self.clock.now()).to_std().unwrap_or_default();
        if remaining.is_zero() && *rx.borrow() < TxStatus::Signed {
            return Err(elapsed());
        }

        match tokio::time::timeout(remaining, rx.wait_for(|s| *s >= TxStatus::Signed)).await {
            Ok(Ok(status)) => Ok(*status),
            Ok(Err(_)) => Err(DlcError::Internal(format!(
                "status channel for {draft} closed"
            ))),
            Err(_) => {
                debug!(%draft, "quorum wait timed out");
                Err(elapsed())
            }
        }
    }

    /// Receiver tracking the status of `draft`. The channel exists only
    /// while someone holds a receiver.
    pub fn subscribe(&self, draft: DraftId) -> Result<watch::Receiver<TxStatus>> {
        // Status is read under the watcher lock so no notify falls between.
        let mut watchers = self.watchers.lock().map_err(poisoned)?;
        let current = self.status(draft)?;
        let tx = watchers
            .entry(draft)
            .or_insert_with(|| watch::channel(current).0);
        Ok(tx.subscribe())
    }

    /// Publish `status` to current subscribers. Drafts nobody watches have
    /// no channel.
    fn notify(&self, draft: DraftId, status: TxStatus) -> Result<()> {
        if let Some(tx) = self.watchers.lock().map_err(poisoned)?.get(&draft) {
            tx.send_replace(status);
        }
        Ok(())
    }

    fn release_idle(&self, draft: DraftId) -> Result<()> {
        let mut watchers = self.watchers.lock().map_err(poisoned)?;
        if watchers.get(&draft).is_some_and(|tx| tx.receiver_count() == 0) {
            watchers.remove(&draft);
        }
        Ok(())
    }

    /// Number of drafts with a live status channel.
    pub fn watched(&self) -> Result<usize> {
        Ok(self.watchers.lock().map_err(poisoned)?.len())
    }

    /// Drop the status channel of a draft that no one will wait on again.
    pub fn forget(&self, draft: DraftId) -> Result<()> {
        self.watchers.lock().map_err(poisoned)?.remove(&draft);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use dlcplaza_types::{ManualClock, OutPoint, SystemClock, TxType};

    use super::*;

    fn coordinator() -> SigningCoordinator {
        SigningCoordinator::in_memory(Arc::new(SystemClock))
    }

    fn draft(coord: &SigningCoordinator) -> DraftId {
        let op = OutPoint::new(Txid([1u8; 32]), 0);
        coord
            .register_draft(NewTransaction::dummy(
                ContractId([7u8; 8]),
                TxType::Funding,
                &[(op, 200_000)],
            ))
            .unwrap()
    }

    #[test]
    fn quorum_progression() {
        let c = coordinator();
        let t1 = draft(&c);
        assert_eq!(c.status(t1).unwrap(), TxStatus::Pending);

        let s = c.submit_signature(t1, SignerRole::Initiator, vec![1, 2, 3]).unwrap();
        assert_eq!(s.status, TxStatus::PartiallySigned);
        assert!(s.recorded);

        let s = c.submit_signature(t1, SignerRole::Acceptor, vec![4, 5, 6]).unwrap();
        assert_eq!(s.status, TxStatus::Signed);
        assert!(c.get(t1).unwrap().missing_signers().is_empty());
    }

    #[test]
    fn identical_resubmission_is_noop() {
        let c = coordinator();
        let t1 = draft(&c);
        c.submit_signature(t1, SignerRole::Initiator, vec![9]).unwrap();
        let again = c.submit_signature(t1, SignerRole::Initiator, vec![9]).unwrap();
        assert!(!again.recorded);
        assert_eq!(again.status, TxStatus::PartiallySigned);
    }

    #[test]
    fn different_bytes_are_rejected_and_original_kept() {
        let c = coordinator();
        let t1 = draft(&c);
        c.submit_signature(t1, SignerRole::Acceptor, vec![1]).unwrap();

        let err = c
            .submit_signature(t1, SignerRole::Acceptor, vec![2])
            .unwrap_err();
        assert!(matches!(
            err,
            DlcError::DuplicateSignature {
                signer: SignerRole::Acceptor,
                ..
            }
        ));
        let tx = c.get(t1).unwrap();
        assert_eq!(tx.signatures[&SignerRole::Acceptor].bytes, vec![1]);
        assert_eq!(tx.status, TxStatus::PartiallySigned);
    }

    #[test]
    fn unknown_draft_and_empty_bytes() {
        let c = coordinator();
        assert!(matches!(
            c.submit_signature(DraftId::new(), SignerRole::Initiator, vec![1]),
            Err(DlcError::TransactionNotFound(_))
        ));
        let t1 = draft(&c);
        assert!(c.submit_signature(t1, SignerRole::Initiator, Vec::new()).is_err());
        assert_eq!(c.status(t1).unwrap(), TxStatus::Pending);
    }

    #[test]
    fn broadcast_requires_signed_and_happens_once() {
        let c = coordinator();
        let t1 = draft(&c);
        assert!(matches!(
            c.mark_broadcast(t1),
            Err(DlcError::InvalidTxTransition { from: TxStatus::Pending, .. })
        ));

        c.submit_signature(t1, SignerRole::Initiator, vec![1]).unwrap();
        assert!(c.mark_broadcast(t1).is_err());
        c.submit_signature(t1, SignerRole::Acceptor, vec![2]).unwrap();

        let tx = c.mark_broadcast(t1).unwrap();
        assert_eq!(tx.status, TxStatus::Broadcast);
        assert!(tx.broadcast_at.is_some());
        assert!(c.mark_broadcast(t1).is_err());

        // Signing after broadcast never regresses the status.
        let s = c.submit_signature(t1, SignerRole::Acceptor, vec![2]).unwrap();
        assert_eq!(s.status, TxStatus::Broadcast);
    }

    #[test]
    fn only_unsigned_drafts_can_be_discarded() {
        let c = coordinator();
        let t1 = draft(&c);
        let t2 = draft(&c);
        c.submit_signature(t2, SignerRole::Initiator, vec![1]).unwrap();

        c.discard_draft(t1).unwrap();
        assert!(matches!(c.get(t1), Err(DlcError::TransactionNotFound(_))));
        assert!(c.discard_draft(t2).is_err());
    }

    #[test]
    fn lookups_by_txid_and_contract() {
        let c = coordinator();
        let t1 = draft(&c);
        let txid = c.get(t1).unwrap().txid;
        assert_eq!(c.find_by_txid(txid).unwrap().unwrap().draft_id, t1);
        assert!(c.find_by_txid(Txid([0u8; 32])).unwrap().is_none());
        assert_eq!(c.drafts_for(ContractId([7u8; 8])).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn wait_returns_once_counterparty_signs() {
        let c = Arc::new(coordinator());
        let t1 = draft(&c);
        c.submit_signature(t1, SignerRole::Initiator, vec![1]).unwrap();

        let signer = Arc::clone(&c);
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            signer
                .submit_signature(t1, SignerRole::Acceptor, vec![2])
                .unwrap();
        });

        let status = c
            .wait_for_quorum(t1, Utc::now() + Duration::seconds(5))
            .await
            .unwrap();
        assert_eq!(status, TxStatus::Signed);
    }

    #[tokio::test]
    async fn status_channels_live_only_while_watched() {
        let c = Arc::new(coordinator());
        let drafts: Vec<DraftId> = (0..4).map(|_| draft(&c)).collect();
        for &d in &drafts {
            c.submit_signature(d, SignerRole::Initiator, vec![1]).unwrap();
        }
        assert_eq!(c.watched().unwrap(), 0);

        let waited = drafts[0];
        let signer = Arc::clone(&c);
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            signer
                .submit_signature(waited, SignerRole::Acceptor, vec![2])
                .unwrap();
        });
        c.wait_for_quorum(waited, Utc::now() + Duration::seconds(5))
            .await
            .unwrap();
        assert!(c
            .wait_for_quorum(drafts[1], Utc::now() + Duration::milliseconds(10))
            .await
            .is_err());
        assert_eq!(c.watched().unwrap(), 0);

        // A held receiver keeps its channel until the draft is broadcast.
        let mut rx = c.subscribe(drafts[2]).unwrap();
        c.submit_signature(drafts[2], SignerRole::Acceptor, vec![2]).unwrap();
        assert_eq!(*rx.borrow_and_update(), TxStatus::Signed);
        assert_eq!(c.watched().unwrap(), 1);
        c.mark_broadcast(drafts[2]).unwrap();
        assert_eq!(*rx.borrow(), TxStatus::Broadcast);
        assert_eq!(c.watched().unwrap(), 0);

        c.submit_signature(drafts[3], SignerRole::Acceptor, vec![2]).unwrap();
        c.mark_broadcast(drafts[3]).unwrap();
        assert_eq!(c.watched().unwrap(), 0);
    }

    #[tokio::test]
    async fn wait_is_bounded_by_deadline() {
        let c = coordinator();
        let t1 = draft(&c);
        let err = c
            .wait_for_quorum(t1, Utc::now() + Duration::milliseconds(30))
            .await
            .unwrap_err();
        assert!(matches!(err, DlcError::DeadlineElapsed { .. }));
    }

    #[tokio::test]
    async fn past_deadline_fails_immediately_unless_signed() {
        let t0 = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let c = SigningCoordinator::in_memory(Arc::new(ManualClock::new(t0)));
        let t1 = draft(&c);
        assert!(c.wait_for_quorum(t1, t0).await.is_err());

        c.submit_signature(t1, SignerRole::Initiator, vec![1]).unwrap();
        c.submit_signature(t1, SignerRole::Acceptor, vec![2]).unwrap();
        assert_eq!(c.wait_for_quorum(t1, t0).await.unwrap(), TxStatus::Signed);
    }
}
