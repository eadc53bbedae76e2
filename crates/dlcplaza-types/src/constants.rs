//! System-wide constants for the DLCPlaza settlement engine.

/// Number of distinct signatures a draft needs before it is broadcastable.
pub const REQUIRED_SIGNATURES: usize = 2;

/// Length in bytes of a derived [`ContractId`](crate::ContractId).
pub const CONTRACT_ID_LEN: usize = 8;

/// Total bitcoin supply cap in satoshis (21M BTC).
pub const MAX_MONEY_SATS: u64 = 21_000_000 * 100_000_000;

/// Locktime values below this are block heights, at or above are UNIX seconds.
pub const LOCKTIME_THRESHOLD: u32 = 500_000_000;

/// DLC protocol version stamped on new contracts.
pub const PROTOCOL_VERSION: u32 = 1;

/// Genesis block hash of Bitcoin mainnet (default chain hash of an offer).
pub const MAINNET_CHAIN_HASH: &str =
    "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f";

/// Default offer lifetime when neither the offer nor the product sets one.
pub const DEFAULT_OFFER_EXPIRY_HOURS: u64 = 168;

/// Default window for the acceptor's funding signature after acceptance.
pub const DEFAULT_DEAL_ACC_MINUTES: u64 = 60;

/// Default window for the initiator's funding signature after acceptance.
pub const DEFAULT_DEAL_INI_MINUTES: u64 = 120;

/// Default refund delay when an offer carries no explicit refund locktime.
pub const DEFAULT_REFUND_DELAY_DAYS: u64 = 30;

/// Default window to broadcast the funding transaction once fully signed.
pub const DEFAULT_FUNDING_BROADCAST_MINUTES: u64 = 60;

/// Default interval of the background expiry sweep.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 30;

/// Default confirmation depth at which a funding transaction counts as confirmed.
pub const DEFAULT_MIN_CONFIRMATIONS: u32 = 1;

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "DLCPlaza";
