//! Integration test: two-of-two signing quorum
//!
//! A draft becomes broadcastable exactly when both parties have signed, a
//! signer can never overwrite its signature, and broadcast happens once.

use std::{sync::Arc, thread};

use dlcplaza_signing::SigningCoordinator;
use dlcplaza_types::*;

fn setup() -> (SigningCoordinator, DraftId) {
    let coord = SigningCoordinator::in_memory(Arc::new(SystemClock));
    let inputs = [
        (OutPoint::new(Txid([0xa1; 32]), 0), 120_000),
        (OutPoint::new(Txid([0xb2; 32]), 1), 80_000),
    ];
    let draft = coord
        .register_draft(NewTransaction::dummy(
            ContractId([1u8; 8]),
            TxType::Funding,
            &inputs,
        ))
        .unwrap();
    (coord, draft)
}

#[test]
fn t1_partially_signed_then_signed_then_broadcast_once() {
    let (coord, t1) = setup();

    let s = coord
        .submit_signature(t1, SignerRole::Initiator, b"sigI".to_vec())
        .unwrap();
    assert_eq!(s.status, TxStatus::PartiallySigned);

    let s = coord
        .submit_signature(t1, SignerRole::Acceptor, b"sigA".to_vec())
        .unwrap();
    assert_eq!(s.status, TxStatus::Signed);

    let results: Vec<_> = (0..3).map(|_| coord.mark_broadcast(t1)).collect();
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results[0].is_ok());
    assert_eq!(coord.status(t1).unwrap(), TxStatus::Broadcast);
}

#[test]
fn concurrent_conflicting_submissions_keep_exactly_one() {
    let (coord, t1) = setup();

    let outcomes: Vec<Result<_>> = thread::scope(|s| {
        let handles: Vec<_> = (0u8..8)
            .map(|i| {
                let coord = &coord;
                s.spawn(move || coord.submit_signature(t1, SignerRole::Initiator, vec![i]))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    for err in outcomes.iter().filter_map(|r| r.as_ref().err()) {
        assert_eq!(err.kind(), ErrorKind::DuplicateSignature);
    }
    let tx = coord.get(t1).unwrap();
    assert_eq!(tx.signatures.len(), 1);
    assert_eq!(tx.status, TxStatus::PartiallySigned);
}

#[test]
fn concurrent_counterparties_reach_signed() {
    let (coord, t1) = setup();
    thread::scope(|s| {
        for signer in SignerRole::ALL {
            let coord = &coord;
            s.spawn(move || {
                coord
                    .submit_signature(t1, signer, signer.to_string().into_bytes())
                    .unwrap();
            });
        }
    });
    assert_eq!(coord.status(t1).unwrap(), TxStatus::Signed);
}

#[test]
fn signed_iff_both_roles_signed() {
    let (coord, t1) = setup();
    for _ in 0..3 {
        coord
            .submit_signature(t1, SignerRole::Acceptor, vec![7])
            .unwrap();
    }
    // Repeating one signer never counts twice.
    assert_eq!(coord.status(t1).unwrap(), TxStatus::PartiallySigned);
    coord
        .submit_signature(t1, SignerRole::Initiator, vec![8])
        .unwrap();
    assert_eq!(coord.status(t1).unwrap(), TxStatus::Signed);
}
