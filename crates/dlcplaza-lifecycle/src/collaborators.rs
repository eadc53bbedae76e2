//! External collaborators of the settlement engine.
//!
//! The engine never talks to a node, an oracle, or a message bus directly.
//! It asks a [`ChainObserver`] about confirmations, an [`OracleClient`] about
//! attestations, and pushes every status change into a [`NotificationSink`].
//!
//! The in-memory implementations here back the tests and local runs.

use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};

use dlcplaza_types::{Attestation, DlcError, OracleRef, PhaseChanged, Result, Txid};
use tokio::sync::mpsc;
use tracing::info;

/// Confirmation data for one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confirmation {
    /// Zero while in the mempool.
    pub depth: u32,
    pub block_height: Option<u32>,
}

/// Reports whether a transaction has made it on chain.
pub trait ChainObserver: Send + Sync {
    /// `None` if the transaction is unknown to the observer.
    ///
    /// # Errors
    /// `ChainObserver` if the backend cannot be reached.
    fn confirmation(&self, txid: Txid) -> Result<Option<Confirmation>>;
}

/// Fetches oracle attestations for an announced event.
pub trait OracleClient: Send + Sync {
    /// `None` until the oracle has attested.
    ///
    /// # Errors
    /// `Oracle` if the oracle cannot be reached.
    fn attestation(&self, oracle: &OracleRef) -> Result<Option<Attestation>>;
}

/// Receives every contract status change.
///
/// A failing sink never rolls back the transition that produced the event.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, event: &PhaseChanged) -> Result<()>;
}

/// Writes events to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn notify(&self, event: &PhaseChanged) -> Result<()> {
        info!(
            contract_id = %event.contract_id,
            from = %event.from,
            to = %event.to,
            phase = ?event.phase,
            reason = event.reason.as_deref().unwrap_or(""),
            "contract status changed"
        );
        Ok(())
    }
}

/// Forwards events into an unbounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<PhaseChanged>,
}

impl ChannelSink {
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PhaseChanged>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl NotificationSink for ChannelSink {
    fn notify(&self, event: &PhaseChanged) -> Result<()> {
        self.tx
            .send(event.clone())
            .map_err(|_| DlcError::Notification("event receiver dropped".into()))
    }
}

fn poisoned<T>(_: PoisonError<T>) -> DlcError {
    DlcError::Internal("collaborator lock poisoned".into())
}

/// Chain observer fed by hand.
#[derive(Debug, Default)]
pub struct MemoryChainObserver {
    confirmations: Mutex<HashMap<Txid, Confirmation>>,
}

impl MemoryChainObserver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `txid` sits at `depth`, mined at `block_height` if any.
    pub fn set(&self, txid: Txid, depth: u32, block_height: Option<u32>) {
        self.confirmations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(txid, Confirmation { depth, block_height });
    }
}

impl ChainObserver for MemoryChainObserver {
    fn confirmation(&self, txid: Txid) -> Result<Option<Confirmation>> {
        Ok(self
            .confirmations
            .lock()
            .map_err(poisoned)?
            .get(&txid)
            .copied())
    }
}

/// Oracle answering from attestations published by hand, keyed by event id.
#[derive(Debug, Default)]
pub struct MemoryOracle {
    attestations: Mutex<HashMap<String, Attestation>>,
}

impl MemoryOracle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, attestation: Attestation) {
        self.attestations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(attestation.event_id.clone(), attestation);
    }
}

impl OracleClient for MemoryOracle {
    fn attestation(&self, oracle: &OracleRef) -> Result<Option<Attestation>> {
        Ok(self
            .attestations
            .lock()
            .map_err(poisoned)?
            .get(&oracle.event_id)
            .cloned())
    }
}
