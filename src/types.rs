//! Core wallet types

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::*;
use crate::error::{LedgerError, Result};
use crate::script::Script;

/// Hash type: 256-bit hash, internal byte order
pub type Hash = [u8; 32];

/// Byte string type
pub type ByteString = Vec<u8>;

/// Amount in smallest units
pub type Value = u64;

/// 160-bit public key hash
pub type PubkeyHash = [u8; HASH160_SIZE];

/// Reference to one output of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutPoint {
    pub hash: Hash,
    pub index: u32,
}

impl OutPoint {
    pub fn new(hash: Hash, index: u32) -> Self {
        Self { hash, index }
    }

    /// The outpoint carried by coinbase-style inputs
    pub fn null() -> Self {
        Self {
            hash: [0u8; 32],
            index: NULL_OUTPUT_INDEX,
        }
    }

    pub fn is_null(&self) -> bool {
        self.index == NULL_OUTPUT_INDEX && self.hash == [0u8; 32]
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", display_hash(&self.hash), self.index)
    }
}

/// Reference to the input at `index` of the transaction `tx_hash`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputRef {
    pub tx_hash: Hash,
    pub index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionInput {
    pub prevout: OutPoint,
    pub script_sig: Script,
    pub sequence: u32,
}

impl TransactionInput {
    /// Unsigned input spending `prevout`
    pub fn unsigned(prevout: OutPoint) -> Self {
        Self {
            prevout,
            script_sig: Script::default(),
            sequence: SEQUENCE_FINAL,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOutput {
    pub value: Value,
    pub script_pubkey: Script,
}

impl TransactionOutput {
    /// Zero-value empty-script output used to fill gaps in sparse output lists
    pub fn placeholder() -> Self {
        Self {
            value: 0,
            script_pubkey: Script::default(),
        }
    }
}

/// A transaction with its identifying hash and local ledger metadata.
///
/// The hash is fixed at construction: either computed from the canonical
/// serialization or, for imported partial records, taken as supplied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    hash: Hash,
    pub version: u32,
    pub inputs: Vec<TransactionInput>,
    pub outputs: Vec<TransactionOutput>,
    pub lock_time: u32,
    /// Unix seconds, when known
    pub timestamp: Option<i64>,
    confirmed: bool,
}

impl Transaction {
    /// Build a transaction whose hash is the double SHA-256 of its serialization
    pub fn new(
        version: u32,
        inputs: Vec<TransactionInput>,
        outputs: Vec<TransactionOutput>,
        lock_time: u32,
    ) -> Self {
        let mut tx = Self {
            hash: [0u8; 32],
            version,
            inputs,
            outputs,
            lock_time,
            timestamp: None,
            confirmed: false,
        };
        tx.hash = crate::transaction::calculate_hash(&tx);
        tx
    }

    /// Build a transaction that keeps an externally supplied hash
    pub fn with_hash(
        hash: Hash,
        version: u32,
        inputs: Vec<TransactionInput>,
        outputs: Vec<TransactionOutput>,
        lock_time: u32,
    ) -> Self {
        Self {
            hash,
            version,
            inputs,
            outputs,
            lock_time,
            timestamp: None,
            confirmed: false,
        }
    }

    pub fn with_timestamp(mut self, timestamp: Option<i64>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn hash(&self) -> Hash {
        self.hash
    }

    /// Hash in display (reversed hex) form
    pub fn display_hash(&self) -> String {
        display_hash(&self.hash)
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmed
    }

    pub(crate) fn set_confirmed(&mut self, confirmed: bool) {
        self.confirmed = confirmed;
    }

    /// True when the stored hash equals the hash of the current contents
    pub fn has_canonical_hash(&self) -> bool {
        crate::transaction::calculate_hash(self) == self.hash
    }

    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].prevout.is_null()
    }

    pub fn outpoint(&self, index: u32) -> OutPoint {
        OutPoint::new(self.hash, index)
    }
}

/// Render a hash in display order: byte-reversed lowercase hex
pub fn display_hash(hash: &Hash) -> String {
    let mut bytes = *hash;
    bytes.reverse();
    hex::encode(bytes)
}

/// Parse a display-order hex hash into internal byte order
pub fn parse_display_hash(s: &str) -> Result<Hash> {
    let mut hash = parse_internal_hash(s)?;
    hash.reverse();
    Ok(hash)
}

/// Parse an internal-order hex hash
pub fn parse_internal_hash(s: &str) -> Result<Hash> {
    let bytes = hex::decode(s.trim())?;
    if bytes.len() != 32 {
        return Err(LedgerError::Parse(format!(
            "hash must be 32 bytes, got {}",
            bytes.len()
        )));
    }
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&bytes);
    Ok(hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_hash_reverses_bytes() {
        let mut hash = [0u8; 32];
        hash[0] = 0xab;
        let shown = display_hash(&hash);
        assert!(shown.ends_with("ab"));
        assert_eq!(parse_display_hash(&shown).unwrap(), hash);
    }

    #[test]
    fn test_parse_hash_wrong_length() {
        assert!(parse_display_hash("abcd").is_err());
        assert!(parse_internal_hash("zz").is_err());
    }

    #[test]
    fn test_null_outpoint() {
        assert!(OutPoint::null().is_null());
        assert!(!OutPoint::new([0u8; 32], 0).is_null());
    }
}
