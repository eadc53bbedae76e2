//! # dlcplaza-ledger
//!
//! **UTXO plane**: the record store abstraction, the UTXO ledger, the
//! reservation manager, and coin selection.
//!
//! ## Architecture
//!
//! 1. **RecordStore**: keyed create/read/update with an all-or-nothing batch update
//! 2. **UtxoLedger**: owns UTXO records; spends, origin state, availability queries
//! 3. **ReservationManager**: soft earmarks, atomic hard reservations, expiry sweep
//! 4. **select_inputs**: largest-first selection over available outputs
//!
//! ## Reservation Flow
//!
//! ```text
//! offer  → ReservationManager.soft_reserve()
//! accept → ReservationManager.hard_reserve()   (Conflict is recoverable)
//! signed → ReservationManager.renew()
//! funded → UtxoLedger.mark_spent_all()
//! expiry → ReservationManager.release_*() / sweep_expired()
//! ```

pub mod ledger;
pub mod reservation;
pub mod selection;
pub mod store;

pub use ledger::UtxoLedger;
pub use reservation::{ReservationManager, SweepOutcome};
pub use selection::{Selection, select_inputs};
pub use store::{MemoryStore, RecordStore};
