//! Shared fixture for the crate's unit tests.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dlcplaza_types::{
    AcceptParams, Attestation, Clock, ContractId, ContractParams, DraftId, EngineConfig, ManualClock,
    NewTransaction, OutPoint, PartyParams, SignerRole, TxOutput, TxType, Txid, Utxo,
};

use crate::engine::SettlementEngine;

pub(crate) fn t0() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

pub(crate) struct Fixture {
    pub engine: Arc<SettlementEngine>,
    pub clock: Arc<ManualClock>,
}

impl Fixture {
    pub fn new() -> Self {
        let clock = Arc::new(ManualClock::new(t0()));
        let engine = SettlementEngine::new(EngineConfig::default(), clock.clone()).unwrap();
        Self {
            engine: Arc::new(engine),
            clock,
        }
    }

    pub fn fund(&self, value: u64) -> OutPoint {
        let utxo = Utxo::dummy(value);
        self.engine.ledger().upsert(utxo.clone()).unwrap();
        utxo.outpoint
    }

    pub fn offer(&self, inputs: Vec<OutPoint>, collateral: u64) -> ContractId {
        self.engine
            .offer(ContractParams::dummy(inputs, collateral))
            .unwrap()
            .contract_id
    }

    /// Funding draft spending both parties' inputs plus a tagged change
    /// output, and a refund draft spending the funding output.
    pub fn accept_params(&self, id: ContractId, acceptor_inputs: Vec<OutPoint>) -> AcceptParams {
        let contract = self.engine.contracts.get(&id).unwrap();
        let all: Vec<(OutPoint, u64)> = contract
            .offered_inputs
            .iter()
            .chain(&acceptor_inputs)
            .map(|op| (*op, self.engine.ledger().get(op).unwrap().value))
            .collect();
        let mut funding = NewTransaction::dummy(id, TxType::Funding, &all);
        funding.outputs.push(TxOutput {
            value: 100,
            script_pubkey: vec![0x00, 0x14, 0xcc],
            wallet_tag: Some("hot".into()),
        });
        let refund = NewTransaction::dummy(id, TxType::Refund, &[funding_output(&funding)]);
        AcceptParams {
            acceptor: PartyParams::dummy(acceptor_inputs, 50_000),
            funding,
            refund,
        }
    }

    /// An accepted contract and its funding draft.
    pub fn accepted(&self) -> (ContractId, DraftId) {
        let a = self.fund(120_000);
        let b = self.fund(80_000);
        let id = self.offer(vec![a], 100_000);
        let snap = self
            .engine
            .accept(id, self.accept_params(id, vec![b]))
            .unwrap();
        (id, snap.funding_draft.unwrap())
    }

    pub fn sign_both(&self, draft: DraftId) {
        for signer in SignerRole::ALL {
            self.engine
                .submit_signature(draft, signer, signer.to_string().into_bytes())
                .unwrap();
        }
    }

    /// A contract whose funding transaction is confirmed.
    pub fn confirmed(&self) -> ContractId {
        let (id, draft) = self.accepted();
        self.sign_both(draft);
        let snap = self.engine.broadcast_funding(id).unwrap();
        self.engine
            .on_confirmation(snap.funding_txid.unwrap(), 1, Some(840_000))
            .unwrap();
        id
    }

    pub fn outcome_draft(&self, id: ContractId) -> NewTransaction {
        let contract = self.engine.contracts.get(&id).unwrap();
        let funding = self
            .engine
            .signing()
            .get(contract.funding_draft.unwrap())
            .unwrap();
        let fund_op = (OutPoint::new(funding.txid, 0), funding.outputs[0].value);
        NewTransaction::dummy(id, TxType::Outcome, &[fund_op])
    }

    pub fn attestation(&self, id: ContractId) -> Attestation {
        let contract = self.engine.contracts.get(&id).unwrap();
        Attestation {
            event_id: contract.params.oracle.event_id,
            outcome_value: "64250".into(),
            signatures: vec!["ab".repeat(32)],
            attested_at: self.clock.now(),
        }
    }
}

fn funding_output(funding: &NewTransaction) -> (OutPoint, u64) {
    (
        OutPoint::new(Txid::from_raw_tx(&funding.raw), 0),
        funding.outputs[0].value,
    )
}
