//! # Wallet Ledger
//!
//! Client-side UTXO wallet ledger and reconciliation engine.
//!
//! The crate keeps a set of transactions relevant to one wallet identity
//! (watched addresses or signing keys) and derives from them which outputs
//! are spendable, spent, or outgoing. On top of that ledger it selects
//! coins, builds and signs spends, imports and exports JSON transaction
//! feeds, and synchronizes against a block-explorer style provider.
//!
//! ## Architecture
//!
//! - `ledger`: transaction map plus the derived output partitions
//! - `selection`, `signing`: coin selection, unsigned builds, input scripts
//! - `import`: three feed layouts in, one export layout out
//! - `sync`: fetch orchestration over a pluggable [`Transport`]
//! - `script`, `transaction`, `keys`, `address`: wire-level primitives
//!
//! ## Usage
//!
//! ```rust
//! use wallet_ledger::{Key, Wallet, WalletConfig, MAINNET_ADDRESS_VERSION};
//!
//! let key = Key::from_passphrase("correct horse").unwrap();
//! let address = key.address(MAINNET_ADDRESS_VERSION);
//! let mut wallet = Wallet::with_keys(WalletConfig::default(), vec![key]);
//!
//! let feed = format!(
//!     r#"{{"t1": {{"hash": "{}", "out": [{{"value": "0.5", "Address": "{}"}}]}}}}"#,
//!     "11".repeat(32),
//!     address
//! );
//! let status = wallet.import(&feed).unwrap();
//! assert_eq!(status.accepted, 1);
//! assert_eq!(wallet.balance().available, 50_000_000);
//! ```

pub mod types;
pub mod constants;
pub mod error;
pub mod address;
pub mod keys;
pub mod amount;
pub mod script;
pub mod transaction;
pub mod ledger;
pub mod selection;
pub mod signing;
pub mod miner;
pub mod import;
pub mod sync;
pub mod config;

// Re-export commonly used types
pub use types::*;
pub use constants::*;
pub use error::{LedgerError, Result};
pub use address::Address;
pub use keys::Key;
pub use script::{Chunk, Script, ScriptDescriptor, ScriptKind};
pub use ledger::{
    Balance, Identity, InputFilter, InputRecord, Ledger, OutputFilter, OutputQuery, OutputRecord,
    Partition,
};
pub use selection::{Destination, SendTo, SpendPlan};
pub use signing::{SignProgress, SigningTask};
pub use miner::AddressMiner;
pub use import::{ExportStatus, FeedFormat, ImportOptions, ImportOutcome, ImportStatus, Importer};
pub use sync::{SyncReport, SyncState, Synchronizer, Transport};
#[cfg(feature = "http")]
pub use sync::HttpTransport;
pub use config::{Endpoints, Network, WalletConfig};

/// A ledger bundled with its configuration
///
/// # Examples
///
/// ```
/// use wallet_ledger::{Wallet, WalletConfig};
///
/// let wallet = Wallet::new(WalletConfig::default());
/// assert_eq!(wallet.ledger().transaction_count(), 0);
/// assert!(wallet.ledger().is_watch_only());
/// ```
#[derive(Debug, Clone)]
pub struct Wallet {
    ledger: Ledger,
    config: WalletConfig,
}

impl Wallet {
    /// Empty watch-only wallet
    pub fn new(config: WalletConfig) -> Self {
        Self {
            ledger: Ledger::new(config.address_version()),
            config,
        }
    }

    pub fn watch(config: WalletConfig, addresses: &[Address]) -> Self {
        Self {
            ledger: Ledger::watch(config.address_version(), addresses),
            config,
        }
    }

    pub fn with_keys(config: WalletConfig, keys: Vec<Key>) -> Self {
        Self {
            ledger: Ledger::with_keys(config.address_version(), keys),
            config,
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut Ledger {
        &mut self.ledger
    }

    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    pub fn balance(&self) -> Balance {
        self.ledger.balance()
    }

    /// Import a feed using the configured strictness
    pub fn import(&mut self, text: &str) -> Result<ImportStatus> {
        let options = ImportOptions {
            strict: self.config.import.strict,
        };
        import::import_all(text, &mut self.ledger, options)
    }

    pub fn export(&self) -> ExportStatus {
        import::export_all(&self.ledger)
    }

    /// Select, build and sign a spend with the ledger's own keys
    ///
    /// # Examples
    ///
    /// ```
    /// use wallet_ledger::{Key, LedgerError, SendTo, Wallet, WalletConfig, MAINNET_ADDRESS_VERSION};
    ///
    /// let key = Key::from_passphrase("empty").unwrap();
    /// let change = key.address(MAINNET_ADDRESS_VERSION);
    /// let wallet = Wallet::with_keys(WalletConfig::default(), vec![key]);
    /// let err = wallet
    ///     .create_send(&[SendTo::address(1000, change)], &change, 10, &[])
    ///     .unwrap_err();
    /// assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
    /// ```
    pub fn create_send(
        &self,
        sends: &[SendTo],
        change_address: &Address,
        fee: Value,
        exclusions: &[OutPoint],
    ) -> Result<Transaction> {
        signing::create_send(&self.ledger, sends, change_address, fee, exclusions, None)
    }

    /// Orchestrator over `transport` using the configured endpoints
    pub fn synchronizer<T: Transport>(&self, transport: T) -> Synchronizer<T> {
        Synchronizer::new(transport, self.config.endpoints()).with_import_options(ImportOptions {
            strict: self.config.import.strict,
        })
    }

    /// Vanity miner for this wallet's network
    pub fn miner(&self, prefixes: Vec<String>) -> AddressMiner {
        AddressMiner::new(prefixes, self.config.address_version())
            .with_slice(self.config.signing.slice())
    }
}
