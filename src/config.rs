//! Wallet configuration
//!
//! Loaded from TOML. Every section is optional and falls back to defaults;
//! unset endpoints follow the selected network.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::constants::*;
use crate::error::{LedgerError, Result};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Mainnet,
    Testnet,
}

impl Network {
    pub fn address_version(self) -> u8 {
        match self {
            Network::Mainnet => MAINNET_ADDRESS_VERSION,
            Network::Testnet => TESTNET_ADDRESS_VERSION,
        }
    }

    pub fn wif_version(self) -> u8 {
        match self {
            Network::Mainnet => MAINNET_WIF_VERSION,
            Network::Testnet => TESTNET_WIF_VERSION,
        }
    }
}

/// Provider URLs and the JSON keys used to read their responses.
///
/// Address and transaction URLs are prefixes; the address list or hash is
/// appended to them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoints {
    pub address_txs: String,
    pub address_unconfirmed: String,
    pub raw_tx: String,
    pub broadcast: String,
    pub broadcast_field: String,
    /// Dotted path to the list of transaction summaries
    pub tx_list_path: String,
    pub unconfirmed_list_path: String,
    /// Key holding the hash inside each summary
    pub tx_hash_key: String,
}

impl Endpoints {
    pub fn mainnet() -> Self {
        Self::with_urls(
            MAINNET_ADDRESS_URL,
            MAINNET_UNCONFIRMED_URL,
            MAINNET_TX_URL,
            MAINNET_PUSH_URL,
        )
    }

    pub fn testnet() -> Self {
        Self::with_urls(
            TESTNET_ADDRESS_URL,
            TESTNET_UNCONFIRMED_URL,
            TESTNET_TX_URL,
            TESTNET_PUSH_URL,
        )
    }

    pub fn for_network(network: Network) -> Self {
        match network {
            Network::Mainnet => Self::mainnet(),
            Network::Testnet => Self::testnet(),
        }
    }

    fn with_urls(address_txs: &str, unconfirmed: &str, raw_tx: &str, broadcast: &str) -> Self {
        Self {
            address_txs: address_txs.into(),
            address_unconfirmed: unconfirmed.into(),
            raw_tx: raw_tx.into(),
            broadcast: broadcast.into(),
            broadcast_field: BROADCAST_FIELD.into(),
            tx_list_path: SUMMARY_LIST_PATH.into(),
            unconfirmed_list_path: UNCONFIRMED_LIST_PATH.into(),
            tx_hash_key: SUMMARY_HASH_KEY.into(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    pub strict: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub endpoints: Option<Endpoints>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SigningConfig {
    /// Time slice for the address miner, in milliseconds
    pub slice_ms: u64,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self { slice_ms: 250 }
    }
}

impl SigningConfig {
    pub fn slice(&self) -> Duration {
        Duration::from_millis(self.slice_ms.max(1))
    }
}

/// Top-level configuration
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    pub network: Network,
    pub import: ImportConfig,
    pub sync: SyncConfig,
    pub signing: SigningConfig,
}

impl WalletConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| LedgerError::Config(e.to_string()))
    }

    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = Self::from_toml_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Configured endpoints, or the network defaults
    pub fn endpoints(&self) -> Endpoints {
        self.sync
            .endpoints
            .clone()
            .unwrap_or_else(|| Endpoints::for_network(self.network))
    }

    pub fn address_version(&self) -> u8 {
        self.network.address_version()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = WalletConfig::default();
        assert_eq!(config.network, Network::Mainnet);
        assert!(!config.import.strict);
        assert_eq!(config.endpoints(), Endpoints::mainnet());
        assert_eq!(config.signing.slice(), Duration::from_millis(250));
    }

    #[test]
    fn test_parse_toml_config() {
        let config = WalletConfig::from_toml_str(
            r#"
network = "testnet"

[import]
strict = true

[signing]
slice_ms = 50
"#,
        )
        .unwrap();
        assert_eq!(config.address_version(), TESTNET_ADDRESS_VERSION);
        assert!(config.import.strict);
        assert_eq!(config.endpoints().raw_tx, TESTNET_TX_URL);
        assert_eq!(config.signing.slice_ms, 50);
    }

    #[test]
    fn test_custom_endpoints() {
        let config = WalletConfig::from_toml_str(
            r#"
[sync.endpoints]
address_txs = "http://local/txs/"
address_unconfirmed = "http://local/unconfirmed/"
raw_tx = "http://local/raw/"
broadcast = "http://local/push"
broadcast_field = "hex"
tx_list_path = "data.txs"
unconfirmed_list_path = "data.unconfirmed"
tx_hash_key = "tx"
"#,
        )
        .unwrap();
        assert_eq!(config.endpoints().broadcast, "http://local/push");
    }

    #[test]
    fn test_bad_toml_is_config_error() {
        let err = WalletConfig::from_toml_str("network = 5").unwrap_err();
        assert!(matches!(err, LedgerError::Config(_)));
    }

    #[test]
    fn test_missing_file_errors() {
        let path = std::env::temp_dir().join("wallet-ledger-missing-config.toml");
        assert!(WalletConfig::load_from_file(&path).is_err());
    }
}
