//! # dlcplaza-types
//!
//! Shared types, errors, and configuration for the **DLCPlaza** settlement engine.
//!
//! This crate is the leaf dependency of the workspace. It defines:
//!
//! - **Identifiers**: [`Txid`], [`OutPoint`], [`DraftId`], [`ContractId`]
//! - **UTXO model**: [`Utxo`], [`OriginState`], [`SoftReservation`], [`HardReservation`], [`UtxoFilter`]
//! - **Transaction model**: [`Transaction`], [`NewTransaction`], [`TxType`], [`TxStatus`], [`SignerRole`], [`Signature`]
//! - **Contract model**: [`DlcContract`], [`ContractStatus`], [`Phase`], [`PhaseTimestamps`], [`ContractParams`], [`AcceptParams`], [`ProductTerms`]
//! - **Events**: [`PhaseChanged`]
//! - **Configuration**: [`EngineConfig`], [`TimeoutConfig`], [`ProductTimers`]
//! - **Time**: [`Clock`], [`SystemClock`], [`ManualClock`]
//! - **Errors**: [`DlcError`] with `DLC_ERR_` prefix codes
//! - **Constants**: system-wide limits and defaults

pub mod clock;
pub mod config;
pub mod constants;
pub mod contract;
pub mod error;
pub mod event;
pub mod ids;
pub mod transaction;
pub mod utxo;

// Re-export all primary types at crate root for ergonomic imports:
//   use dlcplaza_types::{Utxo, OutPoint, DlcContract, ...};

pub use clock::*;
pub use config::*;
pub use contract::*;
pub use error::*;
pub use event::*;
pub use ids::*;
pub use transaction::*;
pub use utxo::*;

// Constants are accessed via `dlcplaza_types::constants::FOO`
// (not re-exported to avoid name collisions).
