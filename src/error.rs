//! Error types for the wallet ledger

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Invalid script: {0}")]
    InvalidScript(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Transaction hash validation failed: {0}")]
    HashMismatch(String),

    /// Two inputs consume the same outpoint. The ledger cannot be trusted until resynced.
    #[error("Wallet contains double spends, resync needed: {0}")]
    DoubleSpend(String),

    #[error("Insufficient funds: need {needed}, available {available}")]
    InsufficientFunds { needed: u64, available: u64 },

    #[error("Missing signing key for input {0}")]
    MissingSigningKey(usize),

    #[error("Signing canceled")]
    SigningCanceled,

    #[error("Import failed: {0}")]
    Import(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Operation canceled")]
    OperationCanceled,

    #[error("Resync blocked: {0}")]
    ResyncBlocked(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl LedgerError {
    /// True for errors after which the ledger must be rebuilt from scratch.
    pub fn is_fatal(&self) -> bool {
        matches!(self, LedgerError::DoubleSpend(_))
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        LedgerError::Serialization(err.to_string())
    }
}

impl From<hex::FromHexError> for LedgerError {
    fn from(err: hex::FromHexError) -> Self {
        LedgerError::Parse(format!("invalid hex: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
