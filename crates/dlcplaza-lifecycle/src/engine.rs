//! # Settlement engine
//!
//! [`SettlementEngine`] drives each contract through its lifecycle and owns
//! the three lower layers: the UTXO ledger (via the reservation manager),
//! the signing coordinator and the contract store.
//!
//! ## Negotiation
//!
//! ```text
//!   offer ──▶ soft earmark on the initiator's inputs
//!   accept ──▶ register funding + refund drafts
//!          ──▶ hard_reserve(all funding inputs, funding draft)
//!          ──▶ contract = accepted, soft earmark dropped
//!   submit_signature ×2 ──▶ funding draft signed ──▶ contract = signed
//! ```
//!
//! ## Deadlines
//!
//! Every guard reads the clock once and compares the result with the stored
//! deadline of the contract's current status (see
//! [`DlcContract::current_deadline`]). An operation that finds its contract
//! past that deadline moves it to `expired` (or `refunded` once funded),
//! releases its reservations, and fails with `ContractExpired`.
//!
//! ## Atomicity
//!
//! Contract records change only inside [`RecordStore::update`], which
//! re-validates the status in the same critical section that writes it. When
//! a step after the first side effect fails, the earlier effects are undone
//! (drafts discarded, hard reservation released) before the error returns.

use std::{collections::BTreeSet, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use dlcplaza_ledger::{MemoryStore, RecordStore, ReservationManager, Selection, UtxoLedger};
use dlcplaza_signing::{SigningCoordinator, Submission};
use dlcplaza_types::{
    AcceptParams, Clock, ContractId, ContractParams, ContractSnapshot, ContractStatus, DlcContract,
    DlcError, DraftId, EngineConfig, NewTransaction, OriginState, OutPoint, PartyParams, Phase,
    PhaseChanged, ResolvedTimers, Result, SignerRole, Transaction, TxStatus, TxType, Txid, Utxo,
};
use tracing::{debug, info, warn};

use crate::collaborators::{ChainObserver, LogSink, NotificationSink, OracleClient};

/// Contract lifecycle state machine and the exposed settlement API.
pub struct SettlementEngine {
    pub(crate) config: EngineConfig,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) reservations: ReservationManager,
    pub(crate) signing: Arc<SigningCoordinator>,
    pub(crate) contracts: Arc<dyn RecordStore<ContractId, DlcContract>>,
    pub(crate) sink: Arc<dyn NotificationSink>,
    pub(crate) chain: Option<Arc<dyn ChainObserver>>,
    pub(crate) oracle: Option<Arc<dyn OracleClient>>,
}

impl std::fmt::Debug for SettlementEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettlementEngine")
            .field("contracts", &self.contracts.len().unwrap_or(0))
            .field("signing", &self.signing)
            .field("chain", &self.chain.is_some())
            .field("oracle", &self.oracle.is_some())
            .finish_non_exhaustive()
    }
}

impl SettlementEngine {
    /// Engine over in-memory stores, logging events through [`LogSink`].
    ///
    /// # Errors
    /// `Configuration` if `config` fails validation.
    pub fn new(config: EngineConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        Self::with_stores(
            config,
            clock,
            Arc::new(MemoryStore::for_utxos()),
            Arc::new(MemoryStore::for_transactions()),
            Arc::new(MemoryStore::for_contracts()),
        )
    }

    /// Engine over caller-supplied stores.
    pub fn with_stores(
        config: EngineConfig,
        clock: Arc<dyn Clock>,
        utxos: Arc<dyn RecordStore<OutPoint, Utxo>>,
        drafts: Arc<dyn RecordStore<DraftId, Transaction>>,
        contracts: Arc<dyn RecordStore<ContractId, DlcContract>>,
    ) -> Result<Self> {
        config.validate()?;
        let ledger = UtxoLedger::new(utxos, clock.clone());
        Ok(Self {
            config,
            reservations: ReservationManager::new(ledger),
            signing: Arc::new(SigningCoordinator::new(drafts, clock.clone())),
            clock,
            contracts,
            sink: Arc::new(LogSink),
            chain: None,
            oracle: None,
        })
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = sink;
        self
    }

    #[must_use]
    pub fn with_chain_observer(mut self, chain: Arc<dyn ChainObserver>) -> Self {
        self.chain = Some(chain);
        self
    }

    #[must_use]
    pub fn with_oracle(mut self, oracle: Arc<dyn OracleClient>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn ledger(&self) -> &UtxoLedger {
        self.reservations.ledger()
    }

    pub fn reservations(&self) -> &ReservationManager {
        &self.reservations
    }

    pub fn signing(&self) -> &Arc<SigningCoordinator> {
        &self.signing
    }

    // -----------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------

    /// # Errors
    /// `ContractNotFound` for an unknown id.
    pub fn get_contract(&self, contract_id: ContractId) -> Result<ContractSnapshot> {
        Ok(self.contracts.get(&contract_id)?.snapshot())
    }

    /// Coin selection over the engine's ledger under the configured
    /// reservation policy. Nothing is reserved; pass the result to
    /// [`SettlementEngine::offer`] or an acceptor's terms.
    ///
    /// # Errors
    /// `InsufficientFunds` if the available outputs cannot cover `target_sats`.
    pub fn select_inputs(&self, target_sats: u64, wallet_tag: Option<&str>) -> Result<Selection> {
        let policy = &self.config.reservation;
        dlcplaza_ledger::select_inputs(
            self.ledger(),
            target_sats,
            wallet_tag,
            policy.selection_skips_soft_reserved,
            policy.max_selected_inputs,
        )
    }

    /// Snapshots of every contract currently in `status`.
    pub fn contracts_in(&self, status: ContractStatus) -> Result<Vec<ContractSnapshot>> {
        Ok(self
            .contracts
            .scan(&|c| c.status == status)?
            .iter()
            .map(DlcContract::snapshot)
            .collect())
    }

    // -----------------------------------------------------------------
    // created -> offered
    // -----------------------------------------------------------------

    /// Publish an offer and earmark the initiator's inputs for it.
    ///
    /// # Errors
    /// - `ContractRejected` for malformed parameters or a refund locktime
    ///   that is not in the future
    /// - `UtxoNotFound`, `UtxoAlreadySpent` for unusable inputs
    /// - `InsufficientFunds` if the inputs do not cover the collateral
    pub fn offer(&self, params: ContractParams) -> Result<ContractSnapshot> {
        params.validate()?;
        let now = self.clock.now();
        let timers = self.config.timers_for(params.product_id());

        let mut available = 0u64;
        for op in &params.initiator.funding_inputs {
            let utxo = self.ledger().get(op)?;
            if utxo.is_spent {
                return Err(DlcError::UtxoAlreadySpent {
                    outpoint: *op,
                    spent_by: utxo.spend_txid.unwrap_or(Txid([0u8; 32])),
                });
            }
            available = available.saturating_add(utxo.value);
        }
        if available < params.initiator.collateral {
            return Err(DlcError::InsufficientFunds {
                needed: params.initiator.collateral,
                available,
            });
        }

        let offer_ttl = match params.expiry_offer_secs {
            Some(secs) => span_secs(secs)?,
            None => timers.offer_expiry,
        };
        let refund_at = match params.refund_locktime {
            Some(secs) => DateTime::from_timestamp(i64::from(secs), 0).ok_or_else(|| {
                DlcError::ContractRejected {
                    reason: format!("refund locktime {secs} is out of range"),
                }
            })?,
            None => after(now, timers.refund_delay)?,
        };
        if refund_at <= now {
            return Err(DlcError::ContractRejected {
                reason: format!("refund locktime {refund_at} is not in the future"),
            });
        }

        let expires_at = after(now, offer_ttl)?;
        let mut contract = DlcContract::new(params, now);
        contract.deadlines.offer_expires_at = Some(expires_at);
        contract.deadlines.refund_locktime = Some(refund_at);
        contract.transition(ContractStatus::Offered, "offer", now)?;
        contract.timestamps.stamp(Phase::Offered, now)?;

        let contract_id = contract.contract_id;
        self.contracts.create(contract_id, contract.clone())?;
        if let Err(e) =
            self.reservations
                .soft_reserve_for(&contract.offered_inputs, contract_id, offer_ttl)
        {
            self.contracts.remove(&contract_id)?;
            return Err(e);
        }

        info!(
            %contract_id,
            product = contract.params.product_id(),
            collateral = contract.params.initiator.collateral,
            inputs = contract.offered_inputs.len(),
            %expires_at,
            "contract offered"
        );
        self.emit(
            PhaseChanged::new(contract_id, ContractStatus::Created, ContractStatus::Offered, now)
                .with_phase(Phase::Offered),
        );
        Ok(contract.snapshot())
    }

    // -----------------------------------------------------------------
    // offered -> accepted
    // -----------------------------------------------------------------

    /// Accept an open offer and lock every funding input to the funding draft.
    ///
    /// A `ReservationConflict` leaves the contract `offered`; the caller may
    /// retry with other inputs. An offer found past its expiry is expired
    /// and `ContractExpired` returned.
    pub fn accept(&self, contract_id: ContractId, accept: AcceptParams) -> Result<ContractSnapshot> {
        accept.validate()?;
        let now = self.clock.now();
        let contract = self.contracts.get(&contract_id)?;

        match contract.status {
            ContractStatus::Offered if contract.is_past_deadline(now) => {
                self.enforce_deadline(contract_id, now)?;
                return Err(DlcError::ContractExpired {
                    contract_id,
                    status: ContractStatus::Offered,
                });
            }
            ContractStatus::Offered => {}
            ContractStatus::Expired => {
                return Err(DlcError::ContractExpired {
                    contract_id,
                    status: contract.status,
                });
            }
            _ => return Err(contract.invalid("accept")),
        }

        let funding_inputs = self.check_accept(&contract, &accept)?;
        let timers = self.timers(&contract);
        let AcceptParams {
            acceptor,
            funding,
            refund,
        } = accept;

        let funding_draft = self.signing.register_draft(funding)?;
        let refund_draft = match self.signing.register_draft(refund) {
            Ok(draft) => draft,
            Err(e) => {
                self.discard_drafts(&[funding_draft]);
                return Err(e);
            }
        };

        if let Err(e) =
            self.reservations
                .hard_reserve(&funding_inputs, funding_draft, timers.signing_window())
        {
            warn!(%contract_id, error = %e, "accept lost the funding inputs");
            self.discard_drafts(&[funding_draft, refund_draft]);
            return Err(e);
        }

        let updated = match self.record_acceptance(
            contract_id,
            now,
            &timers,
            &acceptor,
            &funding_inputs,
            (funding_draft, refund_draft),
        ) {
            Ok(c) => c,
            Err(e) => {
                self.reservations
                    .release_hard_for(&funding_inputs, funding_draft)?;
                self.discard_drafts(&[funding_draft, refund_draft]);
                return Err(e);
            }
        };

        self.reservations
            .release_soft_for(&updated.offered_inputs, contract_id)?;
        let funding_tx = self.signing.get(funding_draft)?;
        self.track_outputs(&funding_tx, OriginState::LocalDraft, None)?;

        info!(
            %contract_id,
            %funding_draft,
            funding_txid = %funding_tx.txid.short(),
            inputs = funding_inputs.len(),
            collateral = updated.total_collateral(),
            "contract accepted"
        );
        self.emit(
            PhaseChanged::new(contract_id, ContractStatus::Offered, ContractStatus::Accepted, now)
                .with_phase(Phase::Accepted),
        );
        Ok(updated.snapshot())
    }

    fn record_acceptance(
        &self,
        contract_id: ContractId,
        now: DateTime<Utc>,
        timers: &ResolvedTimers,
        acceptor: &PartyParams,
        funding_inputs: &[OutPoint],
        (funding_draft, refund_draft): (DraftId, DraftId),
    ) -> Result<DlcContract> {
        let funding_txid = self.signing.get(funding_draft)?.txid;
        let refund_txid = self.signing.get(refund_draft)?.txid;
        let acc_due = after(now, timers.acc_window)?;
        let ini_due = after(now, timers.ini_window)?;

        self.contracts.update(&contract_id, &mut |c| {
            if c.status != ContractStatus::Offered {
                return Err(c.invalid("accept"));
            }
            c.transition(ContractStatus::Accepted, "accept", now)?;
            c.timestamps.stamp(Phase::Accepted, now)?;
            c.acceptor = Some(acceptor.clone());
            c.funding_inputs = funding_inputs.to_vec();
            c.funding_draft = Some(funding_draft);
            c.funding_txid = Some(funding_txid);
            c.refund_draft = Some(refund_draft);
            c.refund_txid = Some(refund_txid);
            c.deadlines.acc_signature_due = Some(acc_due);
            c.deadlines.ini_signature_due = Some(ini_due);
            Ok(())
        })
    }

    /// Structural checks on the acceptor's terms and the declared funding
    /// input values. Returns the funding inputs.
    fn check_accept(&self, contract: &DlcContract, accept: &AcceptParams) -> Result<Vec<OutPoint>> {
        let reject = |reason: String| Err(DlcError::ContractRejected { reason });
        let id = contract.contract_id;

        for (draft, expected) in [(&accept.funding, TxType::Funding), (&accept.refund, TxType::Refund)] {
            if draft.tx_type != expected {
                return reject(format!("expected a {expected} draft, got {}", draft.tx_type));
            }
            if draft.contract_id != id {
                return reject(format!("{expected} draft belongs to {}", draft.contract_id));
            }
            draft.validate()?;
        }

        let offered: BTreeSet<OutPoint> = contract.offered_inputs.iter().copied().collect();
        let acceptor: BTreeSet<OutPoint> = accept.acceptor.funding_inputs.iter().copied().collect();
        if let Some(shared) = offered.intersection(&acceptor).next() {
            return reject(format!("{shared} is offered by both parties"));
        }

        let expected: BTreeSet<OutPoint> = offered.union(&acceptor).copied().collect();
        let declared: BTreeSet<OutPoint> = accept.funding.inputs.iter().map(|i| i.outpoint).collect();
        if declared != expected {
            return reject("funding draft inputs differ from the committed inputs".into());
        }
        for input in &accept.funding.inputs {
            let recorded = self.ledger().get(&input.outpoint)?.value;
            if input.value != recorded {
                return Err(DlcError::InvalidTransaction {
                    reason: format!(
                        "funding input {} declares {} sats but the ledger holds {recorded}",
                        input.outpoint, input.value
                    ),
                });
            }
        }

        let mut available = 0u64;
        for op in &acceptor {
            available = available.saturating_add(self.ledger().get(op)?.value);
        }
        if available < accept.acceptor.collateral {
            return Err(DlcError::InsufficientFunds {
                needed: accept.acceptor.collateral,
                available,
            });
        }

        let funding_txid = Txid::from_raw_tx(&accept.funding.raw);
        if accept
            .refund
            .inputs
            .iter()
            .any(|i| i.outpoint.txid != funding_txid)
        {
            return reject("refund draft must spend the funding transaction".into());
        }

        Ok(expected.into_iter().collect())
    }

    // -----------------------------------------------------------------
    // accepted -> signed
    // -----------------------------------------------------------------

    /// Record a party's signature on one of a contract's drafts.
    ///
    /// Funding signatures are only taken while the contract is `accepted`
    /// and before its signing deadline; the second one moves the contract
    /// to `signed`. Refund and outcome signatures are forwarded as long as
    /// the contract has not failed.
    ///
    /// # Errors
    /// `TransactionNotFound`, `DuplicateSignature`, `ContractExpired`,
    /// `InvalidContractState`.
    pub fn submit_signature(
        &self,
        draft: DraftId,
        signer: SignerRole,
        signature: Vec<u8>,
    ) -> Result<Submission> {
        let now = self.clock.now();
        let tx = self.signing.get(draft)?;
        let contract_id = tx.contract_id;
        let contract = self.contracts.get(&contract_id)?;

        if contract.status == ContractStatus::Expired {
            return Err(DlcError::ContractExpired {
                contract_id,
                status: contract.status,
            });
        }
        if contract.status == ContractStatus::Aborted {
            return Err(contract.invalid("sign"));
        }
        if contract.funding_draft != Some(draft) {
            return self.signing.submit_signature(draft, signer, signature);
        }

        match contract.status {
            ContractStatus::Accepted if contract.is_past_deadline(now) => {
                self.enforce_deadline(contract_id, now)?;
                return Err(DlcError::ContractExpired {
                    contract_id,
                    status: ContractStatus::Accepted,
                });
            }
            ContractStatus::Accepted => {}
            // Late resubmissions get the coordinator's no-op or duplicate answer.
            s if !s.is_terminal() => {
                return self.signing.submit_signature(draft, signer, signature);
            }
            _ => return Err(contract.invalid("sign")),
        }

        let submission = self.signing.submit_signature(draft, signer, signature)?;
        self.apply_funding_signatures(contract_id, now)?;
        Ok(submission)
    }

    /// Mirror the funding draft's signatures onto the contract. Stamps the
    /// missing signer phases and promotes `accepted` to `signed` once the
    /// draft is fully signed. Idempotent.
    pub(crate) fn apply_funding_signatures(
        &self,
        contract_id: ContractId,
        now: DateTime<Utc>,
    ) -> Result<DlcContract> {
        let contract = self.contracts.get(&contract_id)?;
        let Some(draft) = contract.funding_draft else {
            return Ok(contract);
        };
        let tx = self.signing.get(draft)?;
        let timers = self.timers(&contract);
        let broadcast_due = after(now, timers.funding_broadcast_window)?;

        let mut stamped = Vec::new();
        let mut promoted = false;
        let updated = self.contracts.update(&contract_id, &mut |c| {
            stamped.clear();
            promoted = false;
            if c.status != ContractStatus::Accepted {
                return Ok(());
            }
            let accepted_at = c.timestamps.get(Phase::Accepted).unwrap_or(now);
            for (role, sig) in &tx.signatures {
                let phase = signer_phase(*role);
                if !c.timestamps.is_set(phase) {
                    c.timestamps.stamp(phase, sig.submitted_at.max(accepted_at))?;
                    stamped.push(phase);
                }
            }
            if tx.status >= TxStatus::Signed {
                c.transition(ContractStatus::Signed, "sign", now)?;
                c.deadlines.funding_broadcast_due = Some(broadcast_due);
                promoted = true;
            } else if !stamped.is_empty() {
                c.updated_at = now;
            }
            Ok(())
        })?;

        if promoted {
            self.reservations
                .renew(&updated.funding_inputs, draft, timers.funding_broadcast_window)?;
            info!(%contract_id, %draft, broadcast_due = %broadcast_due, "funding draft fully signed");
            let last = stamped.last().copied().unwrap_or(Phase::SignedAcc);
            self.emit(
                PhaseChanged::new(contract_id, ContractStatus::Accepted, ContractStatus::Signed, now)
                    .with_phase(last),
            );
        } else {
            for phase in stamped {
                debug!(%contract_id, %phase, "funding signature recorded");
                self.emit(
                    PhaseChanged::new(
                        contract_id,
                        ContractStatus::Accepted,
                        ContractStatus::Accepted,
                        now,
                    )
                    .with_phase(phase),
                );
            }
        }
        Ok(updated)
    }

    // -----------------------------------------------------------------
    // abort
    // -----------------------------------------------------------------

    /// Abandon a contract before its funding transaction is broadcast.
    ///
    /// # Errors
    /// `InvalidContractState` once funding is broadcast or the contract has
    /// already ended.
    pub fn abort(&self, contract_id: ContractId, reason: &str) -> Result<ContractSnapshot> {
        let now = self.clock.now();
        let mut from = ContractStatus::Created;
        let contract = self.contracts.update(&contract_id, &mut |c| {
            if !c.status.is_pre_funding() {
                return Err(c.invalid("abort"));
            }
            from = c.status;
            c.transition(ContractStatus::Aborted, "abort", now)?;
            c.terminal_reason = Some(reason.to_string());
            Ok(())
        })?;

        let (soft, hard) = self.release_reservations(&contract)?;
        warn!(%contract_id, %from, reason, released_soft = soft, released_hard = hard, "contract aborted");
        self.emit(
            PhaseChanged::new(contract_id, from, ContractStatus::Aborted, now).with_reason(reason),
        );
        Ok(contract.snapshot())
    }

    // -----------------------------------------------------------------
    // Shared helpers
    // -----------------------------------------------------------------

    pub(crate) fn timers(&self, contract: &DlcContract) -> ResolvedTimers {
        self.config.timers_for(contract.params.product_id())
    }

    /// Push `event` to the sink. Failures are logged, never propagated.
    pub(crate) fn emit(&self, event: PhaseChanged) {
        if let Err(e) = self.sink.notify(&event) {
            warn!(contract_id = %event.contract_id, to = %event.to, error = %e, "notification sink rejected event");
        }
    }

    /// Drop the soft earmarks and the funding hard reservation a contract
    /// holds. Returns `(soft, hard)` release counts.
    pub(crate) fn release_reservations(&self, contract: &DlcContract) -> Result<(usize, usize)> {
        let soft = self
            .reservations
            .release_soft_for(&contract.offered_inputs, contract.contract_id)?;
        let hard = match contract.funding_draft {
            Some(draft) => {
                let n = self
                    .reservations
                    .release_hard_for(&contract.funding_inputs, draft)?;
                self.signing.forget(draft)?;
                n
            }
            None => 0,
        };
        Ok((soft, hard))
    }

    /// Record the wallet-tagged outputs `tx` creates in the ledger.
    pub(crate) fn track_outputs(
        &self,
        tx: &Transaction,
        origin: OriginState,
        block_height: Option<u32>,
    ) -> Result<usize> {
        let mut tracked = 0;
        for (outpoint, out) in tx.created_outputs() {
            let Some(tag) = out.wallet_tag.as_deref() else {
                continue;
            };
            let mut utxo = Utxo::new(outpoint, out.value, out.script_pubkey.clone())
                .with_wallet_tag(tag)
                .with_origin(origin, Some(tx.draft_id));
            utxo.block_height = block_height;
            self.ledger().upsert(utxo)?;
            tracked += 1;
        }
        Ok(tracked)
    }

    /// Best-effort removal of drafts registered by a failed call.
    fn discard_drafts(&self, drafts: &[DraftId]) {
        for draft in drafts {
            if let Err(e) = self.signing.discard_draft(*draft) {
                warn!(%draft, error = %e, "could not discard draft");
            }
        }
    }
}

/// Validate an outcome draft supplied for `contract_id`.
pub(crate) fn check_outcome_draft(contract_id: ContractId, draft: &NewTransaction) -> Result<()> {
    if draft.tx_type != TxType::Outcome || draft.contract_id != contract_id {
        return Err(DlcError::ContractRejected {
            reason: format!("expected an outcome draft for {contract_id}"),
        });
    }
    Ok(())
}

pub(crate) fn signer_phase(role: SignerRole) -> Phase {
    match role {
        SignerRole::Initiator => Phase::SignedIni,
        SignerRole::Acceptor => Phase::SignedAcc,
    }
}

pub(crate) fn after(at: DateTime<Utc>, span: Duration) -> Result<DateTime<Utc>> {
    at.checked_add_signed(span)
        .ok_or_else(|| DlcError::Internal(format!("{at} + {span} is out of range")))
}

fn span_secs(secs: u64) -> Result<Duration> {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .ok_or_else(|| DlcError::ContractRejected {
            reason: format!("{secs} seconds is out of range"),
        })
}

#[cfg(test)]
mod tests {
    use dlcplaza_types::{ErrorKind, ManualClock};

    use super::*;
    use crate::testkit::{Fixture, t0};

    #[test]
    fn offer_earmarks_inputs_and_sets_deadlines() {
        let f = Fixture::new();
        let a = f.fund(200_000);
        let snap = f
            .engine
            .offer(ContractParams::dummy(vec![a], 150_000))
            .unwrap();

        assert_eq!(snap.status, ContractStatus::Offered);
        assert_eq!(snap.timestamps.offered_at, Some(t0()));
        assert_eq!(snap.deadlines.offer_expires_at, Some(t0() + Duration::hours(168)));
        assert_eq!(snap.deadlines.refund_locktime, Some(t0() + Duration::days(30)));
        assert_eq!(
            f.engine.reservations().earmarked_for(snap.contract_id).unwrap(),
            vec![a]
        );
        // Soft earmarks never block availability.
        assert!(f.engine.ledger().get(&a).unwrap().is_available_at(t0()));
    }

    #[test]
    fn selection_follows_reservation_config() {
        let clock = Arc::new(ManualClock::new(t0()));
        let mut config = EngineConfig::default();
        config.reservation.max_selected_inputs = 2;
        let engine = SettlementEngine::new(config, clock).unwrap();
        let fund = |value| {
            let utxo = Utxo::dummy(value);
            engine.ledger().upsert(utxo.clone()).unwrap();
            utxo.outpoint
        };
        let big = fund(90_000);
        let mid = fund(40_000);
        fund(30_000);
        fund(20_000);

        let sel = engine.select_inputs(120_000, None).unwrap();
        assert_eq!(sel.outpoints(), vec![big, mid]);

        // Earmarked outputs are skipped, and the cap stops the third pick.
        engine.offer(ContractParams::dummy(vec![big], 50_000)).unwrap();
        let err = engine.select_inputs(80_000, None).unwrap_err();
        assert!(matches!(err, DlcError::InsufficientFunds { needed: 80_000, available: 70_000 }));
    }

    #[test]
    fn offer_rejects_short_or_unknown_inputs() {
        let f = Fixture::new();
        let a = f.fund(10_000);
        let err = f
            .engine
            .offer(ContractParams::dummy(vec![a], 50_000))
            .unwrap_err();
        assert!(matches!(err, DlcError::InsufficientFunds { needed: 50_000, available: 10_000 }));

        let ghost = Utxo::dummy(1).outpoint;
        let err = f
            .engine
            .offer(ContractParams::dummy(vec![ghost], 1))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(f.engine.contracts.is_empty().unwrap());
    }

    #[test]
    fn offer_rejects_refund_locktime_in_the_past() {
        let f = Fixture::new();
        let a = f.fund(200_000);
        let mut params = ContractParams::dummy(vec![a], 100_000);
        params.refund_locktime = Some(u32::try_from(t0().timestamp() - 60).unwrap());
        let err = f.engine.offer(params).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Rejected);
    }

    #[test]
    fn accept_hard_reserves_every_funding_input() {
        let f = Fixture::new();
        let (id, draft) = f.accepted();
        let contract = f.engine.contracts.get(&id).unwrap();

        assert_eq!(contract.status, ContractStatus::Accepted);
        assert_eq!(contract.funding_inputs.len(), 2);
        let mut held = f.engine.reservations().held_by(draft).unwrap();
        held.sort();
        assert_eq!(held, contract.funding_inputs);
        assert!(f.engine.reservations().earmarked_for(id).unwrap().is_empty());
        assert_eq!(
            contract.deadlines.acc_signature_due,
            Some(t0() + Duration::minutes(60))
        );
        assert_eq!(
            contract.deadlines.ini_signature_due,
            Some(t0() + Duration::minutes(120))
        );

        // The wallet-tagged change output is tracked as a local draft.
        let change = OutPoint::new(contract.funding_txid.unwrap(), 1);
        let utxo = f.engine.ledger().get(&change).unwrap();
        assert_eq!(utxo.origin_state, OriginState::LocalDraft);
        assert_eq!(utxo.origin_draft, Some(draft));
    }

    #[test]
    fn accept_rejects_mismatched_funding_inputs() {
        let f = Fixture::new();
        let a = f.fund(120_000);
        let b = f.fund(80_000);
        let stray = f.fund(5_000);
        let id = f.offer(vec![a], 100_000);

        let mut params = f.accept_params(id, vec![b]);
        params.acceptor.funding_inputs.push(stray);
        let err = f.engine.accept(id, params).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Rejected);

        let mut params = f.accept_params(id, vec![b]);
        params.refund.tx_type = TxType::Outcome;
        assert_eq!(f.engine.accept(id, params).unwrap_err().kind(), ErrorKind::Rejected);

        assert_eq!(f.engine.get_contract(id).unwrap().status, ContractStatus::Offered);
        assert!(f.engine.signing().drafts_for(id).unwrap().is_empty());
    }

    #[test]
    fn accept_rejects_overflowing_input_values() {
        let f = Fixture::new();
        let a = f.fund(120_000);
        let b = f.fund(80_000);
        let id = f.offer(vec![a], 100_000);

        let mut params = f.accept_params(id, vec![b]);
        params.funding.inputs[0].value = u64::MAX;
        params.funding.inputs[1].value = 2;
        let err = f.engine.accept(id, params).unwrap_err();
        assert!(matches!(err, DlcError::InvalidTransaction { .. }));
        assert_eq!(err.kind(), ErrorKind::Rejected);

        assert_eq!(f.engine.get_contract(id).unwrap().status, ContractStatus::Offered);
        assert!(f.engine.signing().drafts_for(id).unwrap().is_empty());
    }

    #[test]
    fn accept_rejects_misstated_input_value() {
        let f = Fixture::new();
        let a = f.fund(120_000);
        let b = f.fund(80_000);
        let id = f.offer(vec![a], 100_000);

        // Inflate the acceptor's input; the draft stays internally balanced.
        let mut params = f.accept_params(id, vec![b]);
        let input = params
            .funding
            .inputs
            .iter_mut()
            .find(|i| i.outpoint == b)
            .unwrap();
        input.value += 40_000;
        assert!(params.funding.validate().is_ok());

        let err = f.engine.accept(id, params).unwrap_err();
        assert!(matches!(err, DlcError::InvalidTransaction { .. }));
        assert_eq!(f.engine.get_contract(id).unwrap().status, ContractStatus::Offered);
        assert!(!f.engine.ledger().get(&b).unwrap().is_hard_reserved_at(t0()));
        assert!(f.engine.signing().drafts_for(id).unwrap().is_empty());
    }

    #[test]
    fn accept_conflict_leaves_offer_open_and_drafts_discarded() {
        let f = Fixture::new();
        let a = f.fund(120_000);
        let b = f.fund(80_000);
        let id = f.offer(vec![a], 100_000);
        let params = f.accept_params(id, vec![b]);

        // Someone else holds the acceptor's input.
        f.engine
            .reservations()
            .hard_reserve(&[b], DraftId::new(), Duration::minutes(5))
            .unwrap();

        let err = f.engine.accept(id, params).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(err.is_recoverable());
        assert_eq!(f.engine.get_contract(id).unwrap().status, ContractStatus::Offered);
        assert!(f.engine.signing().drafts_for(id).unwrap().is_empty());
        assert!(!f.engine.ledger().get(&a).unwrap().is_hard_reserved_at(t0()));
    }

    #[test]
    fn accept_twice_is_invalid() {
        let f = Fixture::new();
        let (id, _) = f.accepted();
        let b = f.fund(80_000);
        let err = f.engine.accept(id, f.accept_params(id, vec![b])).unwrap_err();
        assert!(matches!(err, DlcError::InvalidContractState { action: "accept", .. }));
    }

    #[test]
    fn both_signatures_move_contract_to_signed() {
        let f = Fixture::new();
        let (id, draft) = f.accepted();

        f.clock.advance(Duration::minutes(5));
        let s = f
            .engine
            .submit_signature(draft, SignerRole::Acceptor, b"acc".to_vec())
            .unwrap();
        assert_eq!(s.status, TxStatus::PartiallySigned);
        let snap = f.engine.get_contract(id).unwrap();
        assert_eq!(snap.status, ContractStatus::Accepted);
        assert!(snap.timestamps.signed_acc_at.is_some());

        f.clock.advance(Duration::minutes(5));
        let s = f
            .engine
            .submit_signature(draft, SignerRole::Initiator, b"ini".to_vec())
            .unwrap();
        assert_eq!(s.status, TxStatus::Signed);

        let snap = f.engine.get_contract(id).unwrap();
        assert_eq!(snap.status, ContractStatus::Signed);
        assert_eq!(
            snap.deadlines.funding_broadcast_due,
            Some(t0() + Duration::minutes(70))
        );
        // Reservation now lasts for the broadcast window.
        let input = f.engine.contracts.get(&id).unwrap().funding_inputs[0];
        let hard = f.engine.ledger().get(&input).unwrap().hard.unwrap();
        assert_eq!(hard.expires_at, t0() + Duration::minutes(70));

        // An identical resubmission after signing is a no-op.
        let again = f
            .engine
            .submit_signature(draft, SignerRole::Initiator, b"ini".to_vec())
            .unwrap();
        assert!(!again.recorded);
    }

    #[test]
    fn late_signature_expires_contract() {
        let f = Fixture::new();
        let (id, draft) = f.accepted();

        f.clock.advance(Duration::minutes(61));
        let err = f
            .engine
            .submit_signature(draft, SignerRole::Initiator, b"ini".to_vec())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Expired);

        let snap = f.engine.get_contract(id).unwrap();
        assert_eq!(snap.status, ContractStatus::Expired);
        assert!(f.engine.reservations().held_by(draft).unwrap().is_empty());
        // No signature was recorded.
        assert!(f.engine.signing().get(draft).unwrap().signatures.is_empty());
    }

    #[test]
    fn abort_releases_and_is_final() {
        let f = Fixture::new();
        let (id, draft) = f.accepted();

        let snap = f.engine.abort(id, "counterparty withdrew").unwrap();
        assert_eq!(snap.status, ContractStatus::Aborted);
        assert_eq!(snap.terminal_reason.as_deref(), Some("counterparty withdrew"));
        assert!(f.engine.reservations().held_by(draft).unwrap().is_empty());

        assert!(f.engine.abort(id, "again").is_err());
        let err = f
            .engine
            .submit_signature(draft, SignerRole::Acceptor, vec![1])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }
}
