//! Vanity address miner

use std::ops::ControlFlow;
use std::time::{Duration, Instant};
use tracing::info;

use crate::keys::Key;

pub const DEFAULT_SLICE: Duration = Duration::from_millis(250);

/// Outcome of one mining slice
#[derive(Debug, Clone)]
pub enum MineStep {
    Found { key: Key, attempts: u64 },
    Progress { attempts: u64 },
}

/// Searches random keys for an address whose text, after the leading
/// version character, starts with one of the prefixes.
#[derive(Debug, Clone)]
pub struct AddressMiner {
    prefixes: Vec<String>,
    version: u8,
    slice: Duration,
    attempts: u64,
}

impl AddressMiner {
    pub fn new(prefixes: Vec<String>, version: u8) -> Self {
        Self {
            prefixes: prefixes.into_iter().filter(|p| !p.is_empty()).collect(),
            version,
            slice: DEFAULT_SLICE,
            attempts: 0,
        }
    }

    pub fn with_slice(mut self, slice: Duration) -> Self {
        self.slice = slice;
        self
    }

    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    pub fn matches(&self, key: &Key) -> bool {
        let text = key.address(self.version).to_string();
        let tail = text.get(1..).unwrap_or("");
        self.prefixes.iter().any(|p| tail.starts_with(p.as_str()))
    }

    /// Try keys until one matches or the time slice runs out.
    /// At least one key is tried per call.
    pub fn step(&mut self) -> MineStep {
        let deadline = Instant::now() + self.slice;
        loop {
            self.attempts += 1;
            let key = Key::random();
            if self.matches(&key) {
                info!(attempts = self.attempts, "vanity address found");
                return MineStep::Found {
                    key,
                    attempts: self.attempts,
                };
            }
            if Instant::now() >= deadline {
                return MineStep::Progress {
                    attempts: self.attempts,
                };
            }
        }
    }

    /// Mine until found, yielding to the runtime between slices.
    /// Returns `None` when `on_progress` breaks.
    pub async fn run<F>(mut self, mut on_progress: F) -> Option<Key>
    where
        F: FnMut(u64) -> ControlFlow<()>,
    {
        if self.prefixes.is_empty() {
            return None;
        }
        loop {
            match self.step() {
                MineStep::Found { key, .. } => return Some(key),
                MineStep::Progress { attempts } => {
                    if on_progress(attempts).is_break() {
                        info!(attempts, "address miner canceled");
                        return None;
                    }
                }
            }
            tokio::task::yield_now().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MAINNET_ADDRESS_VERSION;

    #[test]
    fn test_matches_after_version_character() {
        let key = Key::from_passphrase("vanity").unwrap();
        let text = key.address(MAINNET_ADDRESS_VERSION).to_string();
        let miner = AddressMiner::new(vec![text[1..3].to_string()], MAINNET_ADDRESS_VERSION);
        assert!(miner.matches(&key));
        let empty = AddressMiner::new(vec![String::new()], MAINNET_ADDRESS_VERSION);
        assert!(!empty.matches(&key));
    }

    #[test]
    fn test_step_progress_counts_attempts() {
        // '0' never appears in base58 text
        let mut miner = AddressMiner::new(vec!["0".into()], MAINNET_ADDRESS_VERSION)
            .with_slice(Duration::from_millis(1));
        match miner.step() {
            MineStep::Progress { attempts } => assert!(attempts >= 1),
            MineStep::Found { .. } => panic!("impossible prefix matched"),
        }
        assert!(miner.attempts() >= 1);
    }

    #[tokio::test]
    async fn test_run_cancels() {
        let miner = AddressMiner::new(vec!["0".into()], MAINNET_ADDRESS_VERSION)
            .with_slice(Duration::from_millis(1));
        let mut calls = 0;
        let found = miner
            .run(|_| {
                calls += 1;
                if calls >= 2 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
            .await;
        assert!(found.is_none());
        assert_eq!(calls, 2);
    }

    #[tokio::test]
    async fn test_run_finds_easy_prefix() {
        let chars = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";
        let prefixes = chars.chars().map(|c| c.to_string()).collect();
        let miner = AddressMiner::new(prefixes, MAINNET_ADDRESS_VERSION);
        let key = miner.run(|_| ControlFlow::Continue(())).await;
        assert!(key.is_some());
    }
}
