//! Secret fetcher seam
//!
//! The registry only needs a single operation from a secret store: read the
//! flat record at a path. [`VaultKvFetcher`](crate::VaultKvFetcher) talks to
//! Vault over HTTP; [`MemoryFetcher`] serves records from process memory.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use vault_ssl_bundle_core::{FetchError, SecretRecord};

/// Reads one secret record by path.
///
/// A missing path is `Ok(None)`, not an error. Implementations normalize
/// KV-v2 nesting before returning. Timeouts belong here too; the registry
/// never cancels a read.
#[async_trait]
pub trait SecretFetcher: Send + Sync {
    async fn read(&self, path: &str) -> Result<Option<SecretRecord>, FetchError>;
}

/// In-process secret store
#[derive(Default)]
pub struct MemoryFetcher {
    records: RwLock<HashMap<String, SecretRecord>>,
    failure: RwLock<Option<FetchError>>,
    latency: Option<Duration>,
    reads: AtomicUsize,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every read, to make concurrent loads overlap
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn insert(&self, path: impl Into<String>, record: SecretRecord) {
        self.records.write().insert(path.into(), record);
    }

    pub fn remove(&self, path: &str) -> Option<SecretRecord> {
        self.records.write().remove(path)
    }

    /// Make every subsequent read fail with `error` until cleared with `None`
    pub fn set_failure(&self, error: Option<FetchError>) {
        *self.failure.write() = error;
    }

    /// Number of reads served so far, including failed ones
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SecretFetcher for MemoryFetcher {
    async fn read(&self, path: &str) -> Result<Option<SecretRecord>, FetchError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let failure = self.failure.read().clone();
        if let Some(error) = failure {
            return Err(error);
        }
        Ok(self.records.read().get(path).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_fetcher_reads_and_counts() {
        let fetcher = MemoryFetcher::new();
        fetcher.insert("secret/a", SecretRecord::new().with("certificate", "CERT"));

        let record = fetcher.read("secret/a").await.unwrap().unwrap();
        assert_eq!(record.get("certificate"), Some("CERT"));
        assert!(fetcher.read("secret/missing").await.unwrap().is_none());
        assert_eq!(fetcher.read_count(), 2);

        fetcher.remove("secret/a");
        assert!(fetcher.read("secret/a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_fetcher_failure_injection() {
        let fetcher = MemoryFetcher::new();
        fetcher.set_failure(Some(FetchError::Transport("connection refused".into())));
        assert_eq!(
            fetcher.read("secret/a").await,
            Err(FetchError::Transport("connection refused".into()))
        );

        fetcher.set_failure(None);
        assert_eq!(fetcher.read("secret/a").await, Ok(None));
    }
}
