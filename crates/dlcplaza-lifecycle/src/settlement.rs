//! Post-signing lifecycle: funding broadcast, confirmation, attestation,
//! and the outcome or refund branch.
//!
//! ```text
//!   signed ──broadcast_funding──▶ funding_broadcast ──on_confirmation──▶ confirmed
//!   confirmed ──on_attestation──▶ attested ──broadcast_outcome──▶ (cet in mempool)
//!             ──on_confirmation(cet)──▶ settled
//!   confirmed | attested ──refund locktime──▶ refunded ──broadcast_refund──▶ ...
//! ```
//!
//! Chain and oracle input arrives either pushed by the caller
//! (`on_confirmation`, `on_attestation`) or pulled by
//! [`SettlementEngine::poll_collaborators`].

use chrono::{DateTime, Utc};
use dlcplaza_types::{
    Attestation, ContractId, ContractSnapshot, ContractStatus, DlcContract, DlcError, DraftId,
    NewTransaction, OriginState, OutPoint, Phase, PhaseChanged, Result, Transaction, TxStatus, TxType,
    Txid,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::engine::{SettlementEngine, check_outcome_draft};

/// What one [`SettlementEngine::poll_collaborators`] pass achieved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PollSummary {
    /// Contracts whose status or phase stamps moved on a confirmation.
    pub confirmations: usize,
    /// Contracts that became `attested`.
    pub attestations: usize,
    /// Collaborator or engine errors logged and skipped.
    pub failures: usize,
}

impl SettlementEngine {
    // -----------------------------------------------------------------
    // signed -> funding_broadcast
    // -----------------------------------------------------------------

    /// Record that the fully signed funding transaction was broadcast.
    ///
    /// The funding inputs stay hard-reserved until the refund locktime and
    /// the wallet-tagged outputs enter the ledger as `mempool`.
    pub fn broadcast_funding(&self, contract_id: ContractId) -> Result<ContractSnapshot> {
        let now = self.clock.now();
        let contract = self.contracts.get(&contract_id)?;
        if contract.status == ContractStatus::Signed && contract.is_past_deadline(now) {
            self.enforce_deadline(contract_id, now)?;
            return Err(DlcError::ContractExpired {
                contract_id,
                status: ContractStatus::Signed,
            });
        }
        if contract.status != ContractStatus::Signed {
            return Err(contract.invalid("broadcast funding for"));
        }
        let draft = draft_of(&contract, contract.funding_draft, "funding")?;

        // The contract moves first so a concurrent abort cannot release
        // inputs of a transaction already marked broadcast.
        let mut prior = None;
        let updated = self.contracts.update(&contract_id, &mut |c| {
            if c.status != ContractStatus::Signed {
                return Err(c.invalid("broadcast funding for"));
            }
            let status = self.signing.status(draft)?;
            if status != TxStatus::Signed {
                return Err(DlcError::InvalidTxTransition {
                    draft,
                    from: status,
                    to: TxStatus::Broadcast,
                });
            }
            prior = Some(c.clone());
            c.transition(ContractStatus::FundingBroadcast, "broadcast funding for", now)?;
            c.timestamps.stamp(Phase::BroadcastFunding, now)
        })?;
        let tx = match self.signing.mark_broadcast(draft) {
            Ok(tx) => tx,
            Err(e) => {
                warn!(%contract_id, %draft, error = %e, "funding broadcast mark failed, restoring signed");
                if let Some(prior) = prior {
                    self.contracts.update(&contract_id, &mut |c| {
                        if c.status == ContractStatus::FundingBroadcast {
                            *c = prior.clone();
                        }
                        Ok(())
                    })?;
                }
                return Err(e);
            }
        };

        let timers = self.timers(&updated);
        let hold = updated
            .deadlines
            .refund_locktime
            .map_or(timers.funding_broadcast_window, |refund_at| {
                (refund_at - now).max(timers.funding_broadcast_window)
            });
        self.reservations.renew(&updated.funding_inputs, draft, hold)?;
        self.track_outputs(&tx, OriginState::Mempool, None)?;

        info!(%contract_id, txid = %tx.txid, "funding transaction broadcast");
        self.emit(
            PhaseChanged::new(
                contract_id,
                ContractStatus::Signed,
                ContractStatus::FundingBroadcast,
                now,
            )
            .with_phase(Phase::BroadcastFunding),
        );
        Ok(updated.snapshot())
    }

    // -----------------------------------------------------------------
    // Chain input
    // -----------------------------------------------------------------

    /// Apply a confirmation report for `txid`.
    ///
    /// Wallet-tagged outputs are tracked at the origin the depth implies.
    /// At the configured depth the spent inputs are marked in the ledger and
    /// the owning contract advances: funding confirms the contract, the
    /// outcome transaction settles it, the refund transaction completes the
    /// refund. Repeated reports are no-ops.
    ///
    /// Returns `None` for a transaction no contract knows.
    pub fn on_confirmation(
        &self,
        txid: Txid,
        depth: u32,
        block_height: Option<u32>,
    ) -> Result<Option<ContractSnapshot>> {
        let Some(tx) = self.signing.find_by_txid(txid)? else {
            debug!(%txid, "confirmation for an unknown transaction");
            return Ok(None);
        };
        let contract_id = tx.contract_id;
        self.track_outputs(&tx, OriginState::from_depth(depth), block_height)?;

        if depth < self.config.confirmations.min_confirmations {
            debug!(%contract_id, %txid, depth, "below required confirmation depth");
            return Ok(Some(self.get_contract(contract_id)?));
        }

        let snapshot = match tx.tx_type {
            TxType::Funding => self.confirm_funding(&tx)?,
            TxType::Outcome => self.confirm_outcome(&tx)?,
            TxType::Refund => self.confirm_refund(&tx)?,
        };
        Ok(Some(snapshot))
    }

    fn confirm_funding(&self, tx: &Transaction) -> Result<ContractSnapshot> {
        let now = self.clock.now();
        let contract_id = tx.contract_id;
        let contract = self.contracts.get(&contract_id)?;

        match contract.status {
            ContractStatus::FundingBroadcast => {}
            ContractStatus::Confirmed
            | ContractStatus::Attested
            | ContractStatus::Settled
            | ContractStatus::Refunded => {
                debug!(%contract_id, "funding already confirmed");
                return Ok(contract.snapshot());
            }
            ContractStatus::Expired => {
                // The chain has the final say on the inputs.
                warn!(%contract_id, txid = %tx.txid, "funding confirmed after the contract expired");
                self.ledger().mark_spent_all(&tx.input_outpoints(), tx.txid)?;
                return Ok(contract.snapshot());
            }
            _ => return Err(contract.invalid("confirm funding for")),
        }

        self.ledger().mark_spent_all(&tx.input_outpoints(), tx.txid)?;
        let updated = self.contracts.update(&contract_id, &mut |c| {
            if c.status != ContractStatus::FundingBroadcast {
                return Err(c.invalid("confirm funding for"));
            }
            c.transition(ContractStatus::Confirmed, "confirm funding for", now)?;
            c.timestamps.stamp(Phase::ConfirmedFunding, now)
        })?;

        info!(%contract_id, txid = %tx.txid, "funding transaction confirmed");
        self.emit(
            PhaseChanged::new(
                contract_id,
                ContractStatus::FundingBroadcast,
                ContractStatus::Confirmed,
                now,
            )
            .with_phase(Phase::ConfirmedFunding),
        );
        Ok(updated.snapshot())
    }

    fn confirm_outcome(&self, tx: &Transaction) -> Result<ContractSnapshot> {
        let now = self.clock.now();
        let contract_id = tx.contract_id;
        self.mark_known_inputs_spent(tx)?;

        let mut settled = false;
        let mut late = false;
        let updated = self.contracts.update(&contract_id, &mut |c| {
            settled = false;
            late = false;
            match c.status {
                ContractStatus::Settled => Ok(()),
                ContractStatus::Attested if c.timestamps.is_set(Phase::BroadcastCet) => {
                    c.timestamps.stamp(Phase::ConfirmedCet, now)?;
                    c.transition(ContractStatus::Settled, "settle", now)?;
                    settled = true;
                    Ok(())
                }
                // Refunded at the locktime while the outcome was in flight.
                ContractStatus::Refunded
                    if c.timestamps.is_set(Phase::BroadcastCet)
                        && !c.timestamps.is_set(Phase::BroadcastRtx) =>
                {
                    if !c.timestamps.is_set(Phase::ConfirmedCet) {
                        c.timestamps.stamp(Phase::ConfirmedCet, now)?;
                        c.updated_at = now;
                        late = true;
                    }
                    Ok(())
                }
                _ => Err(c.invalid("settle")),
            }
        })?;

        if late {
            warn!(%contract_id, txid = %tx.txid, "outcome confirmed after the contract was refunded");
            self.emit(
                PhaseChanged::new(contract_id, ContractStatus::Refunded, ContractStatus::Refunded, now)
                    .with_phase(Phase::ConfirmedCet),
            );
        }
        if settled {
            info!(%contract_id, txid = %tx.txid, "outcome transaction confirmed, contract settled");
            self.emit(
                PhaseChanged::new(contract_id, ContractStatus::Attested, ContractStatus::Settled, now)
                    .with_phase(Phase::ConfirmedCet),
            );
        }
        Ok(updated.snapshot())
    }

    fn confirm_refund(&self, tx: &Transaction) -> Result<ContractSnapshot> {
        let now = self.clock.now();
        let contract_id = tx.contract_id;
        self.mark_known_inputs_spent(tx)?;

        let mut stamped = false;
        let updated = self.contracts.update(&contract_id, &mut |c| {
            stamped = false;
            if c.status != ContractStatus::Refunded || !c.timestamps.is_set(Phase::BroadcastRtx) {
                return Err(c.invalid("confirm refund for"));
            }
            if !c.timestamps.is_set(Phase::ConfirmedRtx) {
                c.timestamps.stamp(Phase::ConfirmedRtx, now)?;
                c.updated_at = now;
                stamped = true;
            }
            Ok(())
        })?;

        if stamped {
            info!(%contract_id, txid = %tx.txid, "refund transaction confirmed");
            self.emit(
                PhaseChanged::new(contract_id, ContractStatus::Refunded, ContractStatus::Refunded, now)
                    .with_phase(Phase::ConfirmedRtx),
            );
        }
        Ok(updated.snapshot())
    }

    /// Outcome and refund transactions spend the funding output, which the
    /// ledger only tracks when it is wallet-tagged.
    fn mark_known_inputs_spent(&self, tx: &Transaction) -> Result<()> {
        let known: Vec<OutPoint> = tx
            .input_outpoints()
            .into_iter()
            .filter(|op| self.ledger().get(op).is_ok())
            .collect();
        if known.is_empty() {
            return Ok(());
        }
        self.ledger().mark_spent_all(&known, tx.txid)
    }

    // -----------------------------------------------------------------
    // Oracle input
    // -----------------------------------------------------------------

    /// Apply the oracle's outcome to a confirmed contract.
    ///
    /// `outcome_draft` is the outcome transaction (CET) matching the
    /// attested value; it may also be registered later through
    /// [`Self::register_outcome_draft`]. A repeated identical attestation is
    /// a no-op. Past the refund locktime the contract takes the refund path
    /// instead and `ContractExpired` is returned.
    pub fn on_attestation(
        &self,
        contract_id: ContractId,
        attestation: Attestation,
        outcome_draft: Option<NewTransaction>,
    ) -> Result<ContractSnapshot> {
        let now = self.clock.now();
        let contract = self.contracts.get(&contract_id)?;

        if attestation.event_id != contract.params.oracle.event_id {
            return Err(DlcError::ContractRejected {
                reason: format!(
                    "attestation for event {} does not match {}",
                    attestation.event_id, contract.params.oracle.event_id
                ),
            });
        }
        match contract.status {
            ContractStatus::Attested if contract.attestation.as_ref() == Some(&attestation) => {
                debug!(%contract_id, "attestation already applied");
                return Ok(contract.snapshot());
            }
            ContractStatus::Confirmed if contract.is_past_deadline(now) => {
                self.enforce_deadline(contract_id, now)?;
                return Err(DlcError::ContractExpired {
                    contract_id,
                    status: ContractStatus::Confirmed,
                });
            }
            ContractStatus::Confirmed => {}
            _ => return Err(contract.invalid("attest")),
        }

        let outcome = match outcome_draft {
            Some(draft) => {
                check_outcome_draft(contract_id, &draft)?;
                let id = self.signing.register_draft(draft)?;
                Some((id, self.signing.get(id)?.txid))
            }
            None => None,
        };

        let res = self.contracts.update(&contract_id, &mut |c| {
            if c.status != ContractStatus::Confirmed {
                return Err(c.invalid("attest"));
            }
            c.transition(ContractStatus::Attested, "attest", now)?;
            c.timestamps.stamp(Phase::Attest, now)?;
            c.attestation = Some(attestation.clone());
            if let Some((draft, txid)) = outcome {
                c.outcome_draft = Some(draft);
                c.outcome_txid = Some(txid);
            }
            Ok(())
        });
        let updated = match res {
            Ok(c) => c,
            Err(e) => {
                if let Some((draft, _)) = outcome {
                    self.signing.discard_draft(draft)?;
                }
                return Err(e);
            }
        };

        info!(
            %contract_id,
            event_id = %attestation.event_id,
            outcome = %attestation.outcome_value,
            "oracle attestation applied"
        );
        self.emit(
            PhaseChanged::new(contract_id, ContractStatus::Confirmed, ContractStatus::Attested, now)
                .with_phase(Phase::Attest),
        );
        Ok(updated.snapshot())
    }

    /// Attach the outcome transaction to an attested contract that has none.
    pub fn register_outcome_draft(
        &self,
        contract_id: ContractId,
        draft: NewTransaction,
    ) -> Result<DraftId> {
        check_outcome_draft(contract_id, &draft)?;
        let contract = self.contracts.get(&contract_id)?;
        if contract.status != ContractStatus::Attested || contract.outcome_draft.is_some() {
            return Err(contract.invalid("register an outcome draft for"));
        }

        let now = self.clock.now();
        let id = self.signing.register_draft(draft)?;
        let txid = self.signing.get(id)?.txid;
        let res = self.contracts.update(&contract_id, &mut |c| {
            if c.status != ContractStatus::Attested || c.outcome_draft.is_some() {
                return Err(c.invalid("register an outcome draft for"));
            }
            c.outcome_draft = Some(id);
            c.outcome_txid = Some(txid);
            c.updated_at = now;
            Ok(())
        });
        if let Err(e) = res {
            self.signing.discard_draft(id)?;
            return Err(e);
        }
        info!(%contract_id, draft = %id, %txid, "outcome draft registered");
        Ok(id)
    }

    // -----------------------------------------------------------------
    // Outcome / refund broadcasts
    // -----------------------------------------------------------------

    /// Record that the signed outcome transaction was broadcast.
    pub fn broadcast_outcome(&self, contract_id: ContractId) -> Result<ContractSnapshot> {
        let now = self.clock.now();
        let contract = self.contracts.get(&contract_id)?;
        if contract.status == ContractStatus::Attested && contract.is_past_deadline(now) {
            self.enforce_deadline(contract_id, now)?;
            return Err(DlcError::ContractExpired {
                contract_id,
                status: ContractStatus::Attested,
            });
        }
        if contract.status != ContractStatus::Attested {
            return Err(contract.invalid("broadcast the outcome of"));
        }
        let Some(draft) = contract.outcome_draft else {
            return Err(contract.invalid("broadcast the outcome of"));
        };
        self.broadcast_branch(&contract, draft, Phase::BroadcastCet, now)
    }

    /// Record that the signed refund transaction was broadcast.
    pub fn broadcast_refund(&self, contract_id: ContractId) -> Result<ContractSnapshot> {
        let now = self.clock.now();
        let contract = self.contracts.get(&contract_id)?;
        if contract.status != ContractStatus::Refunded
            || contract.timestamps.is_set(Phase::ConfirmedCet)
        {
            return Err(contract.invalid("broadcast the refund of"));
        }
        let draft = draft_of(&contract, contract.refund_draft, "refund")?;
        self.broadcast_branch(&contract, draft, Phase::BroadcastRtx, now)
    }

    fn broadcast_branch(
        &self,
        contract: &DlcContract,
        draft: DraftId,
        phase: Phase,
        now: DateTime<Utc>,
    ) -> Result<ContractSnapshot> {
        let contract_id = contract.contract_id;
        let status = contract.status;
        let tx = self.signing.mark_broadcast(draft)?;
        let updated = self.contracts.update(&contract_id, &mut |c| {
            if c.status != status {
                return Err(c.invalid("broadcast"));
            }
            c.timestamps.stamp(phase, now)?;
            c.updated_at = now;
            Ok(())
        })?;
        self.track_outputs(&tx, OriginState::Mempool, None)?;

        info!(%contract_id, txid = %tx.txid, %phase, "settlement transaction broadcast");
        self.emit(PhaseChanged::new(contract_id, status, status, now).with_phase(phase));
        Ok(updated.snapshot())
    }

    // -----------------------------------------------------------------
    // Pull mode
    // -----------------------------------------------------------------

    /// Ask the chain observer and the oracle about every contract waiting
    /// on them. Errors are logged per contract and counted, never raised.
    pub fn poll_collaborators(&self) -> Result<PollSummary> {
        let mut summary = PollSummary::default();
        let waiting = self.contracts.scan(&|c| {
            matches!(
                c.status,
                ContractStatus::FundingBroadcast
                    | ContractStatus::Confirmed
                    | ContractStatus::Attested
                    | ContractStatus::Refunded
            )
        })?;

        for contract in waiting {
            let contract_id = contract.contract_id;

            if let (Some(chain), Some(txid)) = (&self.chain, awaited_txid(&contract)) {
                let res = chain.confirmation(txid).and_then(|conf| match conf {
                    Some(conf) => self.on_confirmation(txid, conf.depth, conf.block_height),
                    None => Ok(None),
                });
                match res {
                    Ok(Some(after))
                        if after.status != contract.status
                            || after.timestamps != contract.timestamps =>
                    {
                        summary.confirmations += 1;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(%contract_id, %txid, error = %e, "confirmation poll failed");
                        summary.failures += 1;
                    }
                }
            }

            if contract.status != ContractStatus::Confirmed {
                continue;
            }
            let Some(oracle) = &self.oracle else {
                continue;
            };
            match oracle.attestation(&contract.params.oracle) {
                Ok(Some(att)) => match self.on_attestation(contract_id, att, None) {
                    Ok(_) => summary.attestations += 1,
                    Err(e) => {
                        warn!(%contract_id, error = %e, "attestation could not be applied");
                        summary.failures += 1;
                    }
                },
                Ok(None) => {}
                Err(e) => {
                    warn!(%contract_id, error = %e, "oracle poll failed");
                    summary.failures += 1;
                }
            }
        }

        if summary != PollSummary::default() {
            info!(
                confirmations = summary.confirmations,
                attestations = summary.attestations,
                failures = summary.failures,
                "collaborator poll finished"
            );
        }
        Ok(summary)
    }
}

/// Transaction whose confirmation `contract` is waiting for.
fn awaited_txid(contract: &DlcContract) -> Option<Txid> {
    let ts = &contract.timestamps;
    match contract.status {
        ContractStatus::FundingBroadcast => contract.funding_txid,
        ContractStatus::Attested
            if ts.is_set(Phase::BroadcastCet) && !ts.is_set(Phase::ConfirmedCet) =>
        {
            contract.outcome_txid
        }
        ContractStatus::Refunded
            if ts.is_set(Phase::BroadcastRtx) && !ts.is_set(Phase::ConfirmedRtx) =>
        {
            contract.refund_txid
        }
        ContractStatus::Refunded
            if ts.is_set(Phase::BroadcastCet)
                && !ts.is_set(Phase::BroadcastRtx)
                && !ts.is_set(Phase::ConfirmedCet) =>
        {
            contract.outcome_txid
        }
        _ => None,
    }
}

fn draft_of(contract: &DlcContract, draft: Option<DraftId>, what: &str) -> Result<DraftId> {
    draft.ok_or_else(|| DlcError::Internal(format!(
        "contract {} has no {what} draft",
        contract.contract_id
    )))
}
