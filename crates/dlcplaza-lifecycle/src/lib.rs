//! # dlcplaza-lifecycle
//!
//! Contract lifecycle state machine for **DLCPlaza** two-party DLC settlement,
//! and the API the rest of the platform calls:
//!
//! - [`SettlementEngine::offer`], [`SettlementEngine::accept`],
//!   [`SettlementEngine::submit_signature`], [`SettlementEngine::get_contract`],
//!   [`SettlementEngine::sweep`]
//! - funding broadcast, chain and oracle input, outcome/refund broadcasts
//! - [`Sweeper`]: background task running the sweep on an interval
//! - [`collaborators`]: the chain observer, oracle and notification seams
//! - [`telemetry::init_tracing`]: subscriber setup from [`LoggingConfig`]
//!
//! ## Contract Lifecycle
//!
//! ```text
//!   created ─▶ offered ─▶ accepted ─▶ signed ─▶ funding_broadcast ─▶ confirmed ─▶ attested ─▶ settled
//!                 │           │          │              │                 │            │
//!                 └───────────┴──────────┴──────────────┴─▶ expired       └────────────┴─▶ refunded
//!                 └───────────┴──────────┴─▶ aborted
//! ```
//!
//! [`LoggingConfig`]: dlcplaza_types::LoggingConfig

pub mod collaborators;
pub mod deadlines;
pub mod engine;
pub mod settlement;
pub mod sweeper;
pub mod telemetry;

#[cfg(test)]
mod testkit;

pub use collaborators::{
    ChainObserver, ChannelSink, Confirmation, LogSink, MemoryChainObserver, MemoryOracle,
    NotificationSink, OracleClient,
};
pub use deadlines::{Enforcement, SweepSummary};
pub use engine::SettlementEngine;
pub use settlement::PollSummary;
pub use sweeper::{Sweeper, SweeperHandle};
