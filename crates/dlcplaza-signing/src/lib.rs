//! # dlcplaza-signing
//!
//! **Signing plane**: collects both parties' partial signatures on funding,
//! refund, and outcome drafts and decides when a draft may be broadcast.
//!
//! ## Invariants
//!
//! - At most one signature per `(draft, signer)`; conflicting bytes are rejected
//! - A draft is `signed` exactly when both signer roles have signed
//! - `broadcast` is reachable only from `signed`, once
//! - Every wait on the counterparty is bounded by an explicit deadline

pub mod coordinator;

pub use coordinator::{SigningCoordinator, Submission};
