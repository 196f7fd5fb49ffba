//! Base58Check pay-to-address addresses

use std::fmt;
use std::str::FromStr;

use crate::constants::HASH160_SIZE;
use crate::error::{LedgerError, Result};
use crate::keys::hash160;
use crate::types::PubkeyHash;

/// A 20-byte public key hash tagged with a network version byte.
/// Two addresses are equal iff both hash and version match.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address {
    version: u8,
    hash: PubkeyHash,
}

impl Address {
    pub fn new(version: u8, hash: PubkeyHash) -> Self {
        Self { version, hash }
    }

    pub fn from_pubkey(pubkey: &[u8], version: u8) -> Self {
        Self::new(version, hash160(pubkey))
    }

    /// Decode a Base58Check address string
    pub fn parse(s: &str) -> Result<Self> {
        let decoded = bs58::decode(s.trim())
            .with_check(None)
            .into_vec()
            .map_err(|e| LedgerError::InvalidAddress(format!("{}: {}", s, e)))?;
        if decoded.len() != HASH160_SIZE + 1 {
            return Err(LedgerError::InvalidAddress(format!(
                "{}: invalid length {}",
                s,
                decoded.len()
            )));
        }
        let mut hash = [0u8; HASH160_SIZE];
        hash.copy_from_slice(&decoded[1..]);
        Ok(Self::new(decoded[0], hash))
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn hash(&self) -> &PubkeyHash {
        &self.hash
    }

    /// Same hash under another network version
    pub fn with_version(&self, version: u8) -> Self {
        Self::new(version, self.hash)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut payload = Vec::with_capacity(HASH160_SIZE + 1);
        payload.push(self.version);
        payload.extend_from_slice(&self.hash);
        f.write_str(&bs58::encode(payload).with_check().into_string())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl FromStr for Address {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::*;

    #[test]
    fn test_zero_hash_address() {
        let addr = Address::new(MAINNET_ADDRESS_VERSION, [0u8; 20]);
        assert_eq!(addr.to_string(), "1111111111111111111114oLvT2");
    }

    #[test]
    fn test_parse_genesis_address() {
        let addr: Address = "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa".parse().unwrap();
        assert_eq!(addr.version(), MAINNET_ADDRESS_VERSION);
        assert_eq!(
            hex::encode(addr.hash()),
            "62e907b15cbf27d5425399ebf6f0fb50ebb88f18"
        );
        assert_eq!(addr.to_string(), "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa");
    }

    #[test]
    fn test_version_matters_for_equality() {
        let main = Address::new(MAINNET_ADDRESS_VERSION, [7u8; 20]);
        let test = main.with_version(TESTNET_ADDRESS_VERSION);
        assert_ne!(main, test);
        assert_eq!(main.hash(), test.hash());
        assert!(test.to_string().starts_with('m') || test.to_string().starts_with('n'));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Address::parse("").is_err());
        assert!(Address::parse("1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNb").is_err());
    }
}
