//! Identifiers used throughout DLCPlaza.
//!
//! Bitcoin-facing identifiers ([`Txid`], [`OutPoint`]) follow the on-chain
//! conventions. Local handles ([`DraftId`]) use UUIDv7 for time-ordered
//! sorting. [`ContractId`] is derived deterministically from the negotiation
//! id and the creation time so every party computes the same value.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{DlcError, constants};

// ---------------------------------------------------------------------------
// Txid
// ---------------------------------------------------------------------------

/// A Bitcoin transaction id (double SHA-256 of the non-witness serialization).
///
/// Stored in internal byte order; displayed and parsed in the reversed hex
/// form used by block explorers and RPC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Txid(pub [u8; 32]);

impl Txid {
    #[must_use]
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Compute the txid of a raw unsigned transaction payload.
    #[must_use]
    pub fn from_raw_tx(raw: &[u8]) -> Self {
        let first = Sha256::digest(raw);
        let second = Sha256::digest(first);
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&second);
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// First eight hex characters of the display form, for log lines.
    #[must_use]
    pub fn short(&self) -> String {
        let mut s = self.to_string();
        s.truncate(8);
        s
    }
}

impl fmt::Display for Txid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut reversed = self.0;
        reversed.reverse();
        write!(f, "{}", hex::encode(reversed))
    }
}

impl FromStr for Txid {
    type Err = DlcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = hex::decode(s).map_err(|e| DlcError::InvalidUtxo {
            reason: format!("txid is not hex: {e}"),
        })?;
        let mut bytes: [u8; 32] = raw.try_into().map_err(|_| DlcError::InvalidUtxo {
            reason: format!("txid must be 32 bytes, got {} hex chars", s.len()),
        })?;
        bytes.reverse();
        Ok(Self(bytes))
    }
}

// ---------------------------------------------------------------------------
// OutPoint
// ---------------------------------------------------------------------------

/// Reference to a transaction output: the creating txid plus output index.
///
/// This is the primary key of every UTXO record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct OutPoint {
    pub txid: Txid,
    pub vout: u32,
}

impl OutPoint {
    #[must_use]
    pub fn new(txid: Txid, vout: u32) -> Self {
        Self { txid, vout }
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.vout)
    }
}

impl FromStr for OutPoint {
    type Err = DlcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (txid, vout) = s.rsplit_once(':').ok_or_else(|| DlcError::InvalidUtxo {
            reason: format!("outpoint must be txid:vout, got {s}"),
        })?;
        let vout = vout.parse::<u32>().map_err(|e| DlcError::InvalidUtxo {
            reason: format!("bad vout in {s}: {e}"),
        })?;
        Ok(Self::new(txid.parse()?, vout))
    }
}

// ---------------------------------------------------------------------------
// DraftId
// ---------------------------------------------------------------------------

/// Local handle for a transaction draft, assigned before the transaction
/// is broadcast. Hard reservations point at a `DraftId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct DraftId(pub Uuid);

impl DraftId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for DraftId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DraftId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "draft:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// ContractId
// ---------------------------------------------------------------------------

/// Identifier of a DLC contract.
///
/// Derived as the first [`constants::CONTRACT_ID_LEN`] bytes of
/// `SHA-256(temp_contract_id || created_at)`, so the same negotiation
/// started at the same instant always maps to the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ContractId(pub [u8; constants::CONTRACT_ID_LEN]);

impl ContractId {
    #[must_use]
    pub fn derive(temp_contract_id: &str, created_at: DateTime<Utc>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(temp_contract_id.as_bytes());
        hasher.update(created_at.timestamp_micros().to_le_bytes());
        let hash = hasher.finalize();
        let mut bytes = [0u8; constants::CONTRACT_ID_LEN];
        bytes.copy_from_slice(&hash[..constants::CONTRACT_ID_LEN]);
        Self(bytes)
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dlc:{}", hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn txid_display_is_reversed_hex() {
        let mut bytes = [0u8; 32];
        bytes[0] = 0xab;
        let txid = Txid(bytes);
        let shown = txid.to_string();
        assert!(shown.ends_with("ab"), "Got: {shown}");
        assert_eq!(shown.len(), 64);
    }

    #[test]
    fn txid_parse_inverts_display() {
        let txid = Txid::from_raw_tx(b"some raw tx");
        let back: Txid = txid.to_string().parse().unwrap();
        assert_eq!(txid, back);
    }

    #[test]
    fn txid_parse_rejects_wrong_length() {
        let err = "abcd".parse::<Txid>().unwrap_err();
        assert!(matches!(err, DlcError::InvalidUtxo { .. }));
    }

    #[test]
    fn txid_from_raw_is_double_sha256() {
        // Known vector: sha256d("") = 5df6e0e2...
        let txid = Txid::from_raw_tx(b"");
        assert!(hex::encode(txid.0).starts_with("5df6e0e2"));
    }

    #[test]
    fn outpoint_parse_and_display() {
        let op = OutPoint::new(Txid([7u8; 32]), 3);
        let text = op.to_string();
        assert!(text.ends_with(":3"));
        assert_eq!(text.parse::<OutPoint>().unwrap(), op);
        assert!("nocolon".parse::<OutPoint>().is_err());
    }

    #[test]
    fn draft_ids_are_unique() {
        let a = DraftId::new();
        let b = DraftId::new();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("draft:"));
    }

    #[test]
    fn contract_id_is_deterministic() {
        let at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let a = ContractId::derive("tmp-1", at);
        let b = ContractId::derive("tmp-1", at);
        assert_eq!(a, b);
        assert_eq!(a.to_hex().len(), constants::CONTRACT_ID_LEN * 2);

        let later = at + chrono::Duration::seconds(1);
        assert_ne!(a, ContractId::derive("tmp-1", later));
        assert_ne!(a, ContractId::derive("tmp-2", at));
    }
}
