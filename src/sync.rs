//! Sync orchestrator
//!
//! Pulls transactions for the ledger's addresses from a block-explorer
//! style provider: per address, a summary list of hashes is fetched, then
//! every hash not already held is fetched raw and imported. No URL is
//! requested twice in one run. URLs are
//! fetched one at a time. Progress is published on a watch channel and any
//! run can be canceled between or during fetches.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value as Json;
use std::collections::HashSet;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::address::Address;
use crate::config::Endpoints;
use crate::error::{LedgerError, Result};
use crate::import::{import_all, provider_error, ImportOptions};
use crate::ledger::{Balance, Ledger};
use crate::transaction::transaction_to_hex;
use crate::types::*;

/// Text transport used by the orchestrator
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str) -> Result<String>;
    async fn post_form(&self, url: &str, field: &str, value: &str) -> Result<String>;
}

#[cfg(feature = "http")]
pub use http::HttpTransport;

#[cfg(feature = "http")]
mod http {
    use super::*;

    /// reqwest-backed transport
    #[derive(Clone, Debug, Default)]
    pub struct HttpTransport {
        client: reqwest::Client,
    }

    impl HttpTransport {
        pub fn new() -> Self {
            Self::default()
        }

        async fn read(response: reqwest::Response) -> Result<String> {
            if response.status() == reqwest::StatusCode::NOT_FOUND {
                return Err(LedgerError::Transport("URL not found".into()));
            }
            let text = response.text().await.map_err(unresponsive)?;
            if text.is_empty() {
                return Err(LedgerError::Transport("No response".into()));
            }
            Ok(text)
        }
    }

    fn unresponsive(e: reqwest::Error) -> LedgerError {
        debug!(error = %e, "request failed");
        LedgerError::Transport("No connection or server unresponsive".into())
    }

    #[async_trait]
    impl Transport for HttpTransport {
        async fn get(&self, url: &str) -> Result<String> {
            let response = self.client.get(url).send().await.map_err(unresponsive)?;
            Self::read(response).await
        }

        async fn post_form(&self, url: &str, field: &str, value: &str) -> Result<String> {
            let response = self
                .client
                .post(url)
                .form(&[(field, value)])
                .send()
                .await
                .map_err(unresponsive)?;
            Self::read(response).await
        }
    }
}

/// Published progress of the orchestrator
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SyncState {
    #[default]
    Idle,
    CheckingUnconfirmed,
    LoadingAddresses,
    LoadingTransactions { accepted: usize },
    Complete { accepted: usize, known: usize, balance: Balance },
    Aborted(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    /// Transactions accepted during the run
    pub accepted: usize,
    /// Transactions held by the ledger once the run completed
    pub known: usize,
    pub balance: Balance,
}

fn select_path<'a>(doc: &'a Json, path: &str) -> Option<&'a Json> {
    path.split('.')
        .filter(|p| !p.is_empty())
        .try_fold(doc, |node, key| node.get(key))
}

/// Error carried by a provider response, if any
pub fn response_error(text: &str) -> Option<String> {
    if text.trim().is_empty() {
        return Some("No data".into());
    }
    match serde_json::from_str::<Json>(text) {
        Ok(doc) => provider_error(&doc),
        Err(_) => Some("Invalid data".into()),
    }
}

/// Hashes listed in a summary response, deduplicated in first-seen order.
/// Hashes already held by `known` are skipped.
pub fn extract_tx_hashes(
    text: &str,
    list_path: &str,
    hash_key: &str,
    known: Option<&Ledger>,
) -> Result<Vec<String>> {
    if let Some(err) = response_error(text) {
        return Err(LedgerError::Transport(err));
    }
    let doc: Json = serde_json::from_str(text)?;
    let entries = match select_path(&doc, list_path).and_then(Json::as_array) {
        Some(entries) => entries,
        None => return Ok(Vec::new()),
    };

    let mut seen = HashSet::new();
    let mut hashes = Vec::new();
    for entry in entries {
        let hash = match select_path(entry, hash_key).and_then(Json::as_str) {
            Some(h) => h,
            None => continue,
        };
        let held = match (known, parse_display_hash(hash)) {
            (Some(ledger), Ok(internal)) => ledger.contains(&internal),
            _ => false,
        };
        if !held && seen.insert(hash.to_string()) {
            hashes.push(hash.to_string());
        }
    }
    Ok(hashes)
}

fn address_urls(prefix: &str, addresses: &[Address]) -> Vec<String> {
    let mut urls: Vec<String> = Vec::with_capacity(addresses.len());
    for address in addresses {
        let url = format!("{}{}", prefix, address);
        if !urls.contains(&url) {
            urls.push(url);
        }
    }
    urls
}

/// Drives the transport against one set of endpoints
pub struct Synchronizer<T: Transport> {
    transport: T,
    endpoints: Endpoints,
    import: ImportOptions,
    cancel: Mutex<CancellationToken>,
    state: watch::Sender<SyncState>,
}

impl<T: Transport> Synchronizer<T> {
    pub fn new(transport: T, endpoints: Endpoints) -> Self {
        let (state, _) = watch::channel(SyncState::Idle);
        Self {
            transport,
            endpoints,
            import: ImportOptions::default(),
            cancel: Mutex::new(CancellationToken::new()),
            state,
        }
    }

    pub fn with_import_options(mut self, options: ImportOptions) -> Self {
        self.import = options;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> SyncState {
        self.state.borrow().clone()
    }

    /// Cancel the run in progress, if any
    pub fn cancel(&self) {
        self.cancel.lock().cancel();
    }

    fn set_state(&self, state: SyncState) {
        debug!(?state, "sync state");
        self.state.send_replace(state);
    }

    /// Fresh token for a new run
    fn arm(&self) -> CancellationToken {
        let mut guard = self.cancel.lock();
        *guard = CancellationToken::new();
        guard.clone()
    }

    fn settle<R>(&self, result: Result<R>) -> Result<R> {
        if let Err(e) = &result {
            warn!(error = %e, "sync aborted");
            self.set_state(SyncState::Aborted(e.to_string()));
        }
        result
    }

    async fn fetch(&self, token: &CancellationToken, url: &str) -> Result<String> {
        debug!(url, "fetching");
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(LedgerError::OperationCanceled),
            text = self.transport.get(url) => text,
        }
    }

    /// Number of unconfirmed transactions the provider lists for `addresses`
    pub async fn check_unconfirmed(&self, addresses: &[Address]) -> Result<usize> {
        let token = self.arm();
        let result = self.count_unconfirmed(&token, addresses).await;
        if let Ok(count) = &result {
            info!(count, "unconfirmed transactions checked");
            self.set_state(SyncState::Idle);
        }
        self.settle(result)
    }

    async fn count_unconfirmed(&self, token: &CancellationToken, addresses: &[Address]) -> Result<usize> {
        self.set_state(SyncState::CheckingUnconfirmed);
        let mut count = 0;
        for url in address_urls(&self.endpoints.address_unconfirmed, addresses) {
            let text = self.fetch(token, &url).await?;
            count += extract_tx_hashes(
                &text,
                &self.endpoints.unconfirmed_list_path,
                &self.endpoints.tx_hash_key,
                None,
            )?
            .len();
        }
        Ok(count)
    }

    /// Fetch and import `hashes` (display order) into `ledger`
    pub async fn load_transactions(&self, ledger: &mut Ledger, hashes: &[String]) -> Result<SyncReport> {
        let token = self.arm();
        let mut issued = HashSet::new();
        let result = self
            .fetch_transactions(&token, ledger, hashes, 0, &mut issued)
            .await;
        let result = result.map(|accepted| self.complete(ledger, accepted));
        self.settle(result)
    }

    async fn fetch_transactions(
        &self,
        token: &CancellationToken,
        ledger: &mut Ledger,
        hashes: &[String],
        mut accepted: usize,
        issued: &mut HashSet<String>,
    ) -> Result<usize> {
        self.set_state(SyncState::LoadingTransactions { accepted });
        for hash in hashes {
            let url = format!("{}{}", self.endpoints.raw_tx, hash);
            if !issued.insert(url.clone()) {
                continue;
            }
            let text = self.fetch(token, &url).await?;
            let status = import_all(&text, ledger, self.import)?;
            accepted += status.accepted;
            self.set_state(SyncState::LoadingTransactions { accepted });
        }
        Ok(accepted)
    }

    /// Load every transaction touching `addresses`, or the ledger's own
    /// addresses when `None`
    pub async fn load_addresses(&self, ledger: &mut Ledger, addresses: Option<&[Address]>) -> Result<SyncReport> {
        let token = self.arm();
        let addresses = match addresses {
            Some(list) => list.to_vec(),
            None => ledger.addresses(),
        };
        let result = self.fetch_addresses(&token, ledger, &addresses).await;
        let result = result.map(|accepted| self.complete(ledger, accepted));
        self.settle(result)
    }

    async fn fetch_addresses(
        &self,
        token: &CancellationToken,
        ledger: &mut Ledger,
        addresses: &[Address],
    ) -> Result<usize> {
        let mut accepted = 0;
        let mut issued = HashSet::new();
        for url in address_urls(&self.endpoints.address_txs, addresses) {
            self.set_state(SyncState::LoadingAddresses);
            let text = self.fetch(token, &url).await?;
            let hashes = extract_tx_hashes(
                &text,
                &self.endpoints.tx_list_path,
                &self.endpoints.tx_hash_key,
                Some(&*ledger),
            )?;
            debug!(url = %url, new = hashes.len(), "address summary loaded");
            accepted = self
                .fetch_transactions(token, ledger, &hashes, accepted, &mut issued)
                .await?;
        }
        Ok(accepted)
    }

    fn complete(&self, ledger: &Ledger, accepted: usize) -> SyncReport {
        let report = SyncReport {
            accepted,
            known: ledger.transaction_count(),
            balance: ledger.balance(),
        };
        info!(accepted, known = report.known, total = report.balance.total, "sync complete");
        self.set_state(SyncState::Complete {
            accepted,
            known: report.known,
            balance: report.balance,
        });
        report
    }

    /// Rebuild `ledger` from the provider.
    ///
    /// Refused while the provider lists unconfirmed transactions for the
    /// ledger's addresses; the ledger is left untouched in that case.
    pub async fn resync(&self, ledger: &mut Ledger) -> Result<SyncReport> {
        let token = self.arm();
        let addresses = ledger.addresses();
        let result = async {
            let pending = self.count_unconfirmed(&token, &addresses).await?;
            if pending > 0 {
                return Err(LedgerError::ResyncBlocked(
                    "unconfirmed transactions pending".into(),
                ));
            }
            ledger.clear();
            self.fetch_addresses(&token, ledger, &addresses).await
        }
        .await;
        let result = result.map(|accepted| self.complete(ledger, accepted));
        self.settle(result)
    }

    /// Post a signed transaction; returns the provider's response text
    pub async fn broadcast(&self, tx: &Transaction) -> Result<String> {
        let token = self.arm();
        let hex = transaction_to_hex(tx);
        let result = tokio::select! {
            biased;
            _ = token.cancelled() => Err(LedgerError::OperationCanceled),
            text = self.transport.post_form(&self.endpoints.broadcast, &self.endpoints.broadcast_field, &hex) => text,
        };
        let result = result.and_then(|text| match response_error(&text) {
            Some(err) => Err(LedgerError::Transport(err)),
            None => Ok(text),
        });
        if result.is_ok() {
            info!(tx = %tx.display_hash(), "transaction broadcast");
        }
        self.settle(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_dedupes_in_order() {
        let text = r#"{"status":"success","data":{"txs":[{"tx":"bb"},{"tx":"aa"},{"tx":"bb"}]}}"#;
        let hashes = extract_tx_hashes(text, "data.txs", "tx", None).unwrap();
        assert_eq!(hashes, vec!["bb".to_string(), "aa".to_string()]);
    }

    #[test]
    fn test_extract_errors() {
        assert_eq!(
            extract_tx_hashes("", "data.txs", "tx", None).unwrap_err(),
            LedgerError::Transport("No data".into())
        );
        assert_eq!(
            extract_tx_hashes("<html>", "data.txs", "tx", None).unwrap_err(),
            LedgerError::Transport("Invalid data".into())
        );
        assert_eq!(
            extract_tx_hashes(r#"{"status":"fail","data":"bad address"}"#, "data.txs", "tx", None)
                .unwrap_err(),
            LedgerError::Transport("bad address".into())
        );
    }

    #[test]
    fn test_extract_skips_known() {
        let mut ledger = Ledger::new(crate::constants::MAINNET_ADDRESS_VERSION);
        let tx = Transaction::with_hash(
            [5u8; 32],
            1,
            Vec::new(),
            vec![TransactionOutput::placeholder()],
            0,
        );
        ledger.insert(tx, false, false).unwrap();
        let text = format!(
            r#"{{"status":"success","data":{{"txs":[{{"tx":"{}"}},{{"tx":"{}"}}]}}}}"#,
            display_hash(&[5u8; 32]),
            display_hash(&[6u8; 32])
        );
        let hashes = extract_tx_hashes(&text, "data.txs", "tx", Some(&ledger)).unwrap();
        assert_eq!(hashes, vec![display_hash(&[6u8; 32])]);
    }

    #[test]
    fn test_missing_list_is_empty() {
        let hashes = extract_tx_hashes(r#"{"status":"success","data":{}}"#, "data.unconfirmed", "tx", None).unwrap();
        assert!(hashes.is_empty());
    }
}
