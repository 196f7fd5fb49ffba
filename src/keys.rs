//! Private keys, hashing helpers and ECDSA signing

use std::fmt;
use std::sync::OnceLock;

use bitcoin_hashes::{sha256d, Hash as BitcoinHash};
use ripemd::Ripemd160;
use secp256k1::{All, Message, PublicKey, Secp256k1, SecretKey};
use sha2::{Digest, Sha256};

use crate::address::Address;
use crate::constants::*;
use crate::error::{LedgerError, Result};
use crate::types::*;

fn secp() -> &'static Secp256k1<All> {
    static CONTEXT: OnceLock<Secp256k1<All>> = OnceLock::new();
    CONTEXT.get_or_init(Secp256k1::new)
}

/// Hash160 = RIPEMD160(SHA256(data))
pub fn hash160(data: &[u8]) -> PubkeyHash {
    let sha = Sha256::digest(data);
    let ripe = Ripemd160::digest(sha);
    let mut out = [0u8; HASH160_SIZE];
    out.copy_from_slice(&ripe);
    out
}

/// Double SHA-256
pub fn sha256d(data: &[u8]) -> Hash {
    sha256d::Hash::hash(data).into_inner()
}

/// A secp256k1 private key.
///
/// Keys derived from passphrases or generated randomly use the uncompressed
/// public key form; WIF keys keep the compression flag they were encoded with.
#[derive(Clone, PartialEq, Eq)]
pub struct Key {
    secret: SecretKey,
    compressed: bool,
}

impl Key {
    pub fn from_secret_bytes(bytes: &[u8], compressed: bool) -> Result<Self> {
        let secret = SecretKey::from_slice(bytes)
            .map_err(|e| LedgerError::InvalidKey(format!("bad secret: {}", e)))?;
        Ok(Self { secret, compressed })
    }

    /// Fresh random key
    pub fn random() -> Self {
        let secret = SecretKey::new(&mut secp256k1::rand::thread_rng());
        Self {
            secret,
            compressed: false,
        }
    }

    /// Brain-wallet key: the secret is the single SHA-256 of the passphrase
    pub fn from_passphrase(passphrase: &str) -> Result<Self> {
        let digest = Sha256::digest(passphrase.as_bytes());
        Self::from_secret_bytes(&digest, false)
    }

    /// Decode a WIF private key (mainnet or testnet, compressed or not)
    pub fn from_wif(wif: &str) -> Result<Self> {
        let decoded = bs58::decode(wif.trim())
            .with_check(None)
            .into_vec()
            .map_err(|e| LedgerError::InvalidKey(format!("invalid WIF: {}", e)))?;

        if decoded.is_empty()
            || (decoded[0] != MAINNET_WIF_VERSION && decoded[0] != TESTNET_WIF_VERSION)
        {
            return Err(LedgerError::InvalidKey("invalid WIF prefix".into()));
        }

        match decoded.len() {
            33 => Self::from_secret_bytes(&decoded[1..33], false),
            34 if decoded[33] == 0x01 => Self::from_secret_bytes(&decoded[1..33], true),
            n => Err(LedgerError::InvalidKey(format!("invalid WIF length: {}", n))),
        }
    }

    /// Accept a WIF key, fall back to treating the text as a passphrase.
    /// Empty input yields a random key.
    pub fn from_priv_or_pass(text: &str) -> Result<Self> {
        if text.is_empty() {
            return Ok(Self::random());
        }
        match Self::from_wif(text) {
            Ok(key) => Ok(key),
            Err(_) => Self::from_passphrase(text),
        }
    }

    pub fn to_wif(&self, wif_version: u8) -> String {
        let mut payload = Vec::with_capacity(34);
        payload.push(wif_version);
        payload.extend_from_slice(&self.secret.secret_bytes());
        if self.compressed {
            payload.push(0x01);
        }
        bs58::encode(payload).with_check().into_string()
    }

    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    pub fn public_key_bytes(&self) -> ByteString {
        let pk = PublicKey::from_secret_key(secp(), &self.secret);
        if self.compressed {
            pk.serialize().to_vec()
        } else {
            pk.serialize_uncompressed().to_vec()
        }
    }

    pub fn pubkey_hash(&self) -> PubkeyHash {
        hash160(&self.public_key_bytes())
    }

    pub fn address(&self, version: u8) -> Address {
        Address::new(version, self.pubkey_hash())
    }

    /// DER-encoded ECDSA signature over a 32-byte digest
    pub fn sign(&self, digest: &Hash) -> Result<ByteString> {
        let msg = Message::from_digest_slice(digest)
            .map_err(|e| LedgerError::InvalidKey(format!("bad digest: {}", e)))?;
        let sig = secp().sign_ecdsa(&msg, &self.secret);
        Ok(sig.serialize_der().to_vec())
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Key")
            .field("pubkey_hash", &hex::encode(self.pubkey_hash()))
            .field("compressed", &self.compressed)
            .finish()
    }
}

/// Check a DER signature against a public key and digest
pub fn verify_signature(pubkey: &[u8], der_sig: &[u8], digest: &Hash) -> bool {
    let pk = match PublicKey::from_slice(pubkey) {
        Ok(pk) => pk,
        Err(_) => return false,
    };
    let sig = match secp256k1::ecdsa::Signature::from_der(der_sig) {
        Ok(sig) => sig,
        Err(_) => return false,
    };
    let msg = match Message::from_digest_slice(digest) {
        Ok(msg) => msg,
        Err(_) => return false,
    };
    secp().verify_ecdsa(&msg, &sig, &pk).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one() -> [u8; 32] {
        let mut bytes = [0u8; 32];
        bytes[31] = 1;
        bytes
    }

    #[test]
    fn test_wif_roundtrip_uncompressed() {
        let key = Key::from_secret_bytes(&one(), false).unwrap();
        let wif = key.to_wif(MAINNET_WIF_VERSION);
        assert_eq!(wif, "5HpHagT65TZzG1PH3CSu63k8DbpvD8s5ip4nEB3kEsreAnchuDf");
        assert_eq!(Key::from_wif(&wif).unwrap(), key);
    }

    #[test]
    fn test_wif_compressed_flag() {
        let key = Key::from_wif("KwDiBf89QgGbjEhKnhXJuH7LrciVrZi3qYjgd9M7rFU73sVHnoWn").unwrap();
        assert!(key.is_compressed());
        assert_eq!(key.public_key_bytes().len(), 33);
    }

    #[test]
    fn test_known_addresses() {
        let plain = Key::from_secret_bytes(&one(), false).unwrap();
        let compressed = Key::from_secret_bytes(&one(), true).unwrap();
        assert_eq!(
            plain.address(MAINNET_ADDRESS_VERSION).to_string(),
            "1EHNa6Q4Jz2uvNExL497mE43ikXhwF6kZm"
        );
        assert_eq!(
            compressed.address(MAINNET_ADDRESS_VERSION).to_string(),
            "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH"
        );
    }

    #[test]
    fn test_priv_or_pass() {
        let wif = Key::from_priv_or_pass("5HpHagT65TZzG1PH3CSu63k8DbpvD8s5ip4nEB3kEsreAnchuDf").unwrap();
        assert_eq!(wif, Key::from_secret_bytes(&one(), false).unwrap());

        let pass = Key::from_priv_or_pass("correct horse battery staple").unwrap();
        assert_eq!(pass, Key::from_passphrase("correct horse battery staple").unwrap());
        assert!(!pass.is_compressed());

        let random = Key::from_priv_or_pass("").unwrap();
        assert_ne!(random, pass);
    }

    #[test]
    fn test_sign_and_verify() {
        let key = Key::from_passphrase("signing test").unwrap();
        let digest = sha256d(b"message");
        let sig = key.sign(&digest).unwrap();
        assert!(verify_signature(&key.public_key_bytes(), &sig, &digest));
        assert!(!verify_signature(&key.public_key_bytes(), &sig, &sha256d(b"other")));
    }

    #[test]
    fn test_bad_wif() {
        assert!(Key::from_wif("notakey").is_err());
        assert!(Key::from_secret_bytes(&[0u8; 32], false).is_err());
    }
}
