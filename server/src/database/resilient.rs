//! Retry wrapper for document stores
//!
//! `ResilientStore` retries transient failures (unavailable,
//! deadline-exceeded, cancelled, aborted) with capped exponential backoff
//! and jitter. When retries run out, read paths can degrade with
//! [`Fetched::from_read`] instead of failing the request.

use super::query::Query;
use super::store::{Document, DocumentStore, StoreResult};
use crate::config::{INITIAL_BACKOFF_MS, MAX_BACKOFF_MS, MAX_RETRIES, RETRY_JITTER_MS};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
            max_backoff: Duration::from_millis(MAX_BACKOFF_MS),
            jitter: Duration::from_millis(RETRY_JITTER_MS),
        }
    }
}

impl RetryPolicy {
    /// Policy without delays, for tests
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    fn delay(&self, attempt: u32) -> Duration {
        let base = self
            .initial_backoff
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_backoff);
        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            base
        } else {
            base + Duration::from_millis(rand::random::<u64>() % jitter_ms)
        }
    }
}

/// Store decorator adding bounded retries
pub struct ResilientStore {
    inner: Arc<dyn DocumentStore>,
    policy: RetryPolicy,
}

impl ResilientStore {
    pub fn new(inner: Arc<dyn DocumentStore>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    async fn with_retry<T, F, Fut>(&self, op: &str, collection: &str, mut call: F) -> StoreResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.policy.max_retries => {
                    let delay = self.policy.delay(attempt);
                    attempt += 1;
                    tracing::warn!(
                        "Store {} on {} failed ({}), retry {}/{} in {:?}",
                        op,
                        collection,
                        e,
                        attempt,
                        self.policy.max_retries,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl DocumentStore for ResilientStore {
    async fn insert(&self, collection: &str, id: &str, doc: Document) -> StoreResult<Document> {
        self.with_retry("insert", collection, || {
            self.inner.insert(collection, id, doc.clone())
        })
        .await
    }

    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        self.with_retry("get", collection, || self.inner.get(collection, id))
            .await
    }

    async fn merge(
        &self,
        collection: &str,
        id: &str,
        patch: Document,
        expected_version: Option<u64>,
    ) -> StoreResult<Option<Document>> {
        self.with_retry("merge", collection, || {
            self.inner
                .merge(collection, id, patch.clone(), expected_version)
        })
        .await
    }

    async fn list(&self, collection: &str) -> StoreResult<Vec<Document>> {
        self.with_retry("list", collection, || self.inner.list(collection))
            .await
    }

    async fn query(&self, collection: &str, query: &Query) -> StoreResult<Vec<Document>> {
        self.with_retry("query", collection, || self.inner.query(collection, query))
            .await
    }
}

/// Outcome of a read that may have been served degraded
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched<T> {
    Ok(T),
    /// The store stayed unavailable after retries; `reason` is the failure code
    Degraded { reason: String },
}

impl<T> Fetched<T> {
    /// Turn a transient failure into `Degraded`, keeping every other error.
    pub fn from_read(result: Result<T>) -> Result<Self> {
        match result {
            Ok(value) => Ok(Fetched::Ok(value)),
            Err(AppError::Store(e)) if e.is_transient() => {
                let reason = e
                    .transient_code()
                    .map(|c| c.as_str())
                    .unwrap_or("unavailable")
                    .to_string();
                tracing::warn!("Serving degraded read: {}", e);
                Ok(Fetched::Degraded { reason })
            }
            Err(e) => Err(e),
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Fetched::Degraded { .. })
    }
}

impl<T: Default> Fetched<T> {
    /// Data, or the empty value when degraded
    pub fn unwrap_or_default(self) -> T {
        match self {
            Fetched::Ok(value) => value,
            Fetched::Degraded { .. } => T::default(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::database::memory::MemoryStore;
    use crate::database::store::{StoreError, TransientCode};
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Store that fails the next `failures` calls with a transient error
    pub(crate) struct FlakyStore {
        inner: MemoryStore,
        failures: AtomicU32,
        pub calls: AtomicU32,
    }

    impl FlakyStore {
        pub(crate) fn new(failures: u32) -> Self {
            Self {
                inner: MemoryStore::new(),
                failures: AtomicU32::new(failures),
                calls: AtomicU32::new(0),
            }
        }

        pub(crate) fn fail_next(&self, failures: u32) {
            self.failures.store(failures, Ordering::SeqCst);
        }

        fn check(&self) -> StoreResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(StoreError::transient(
                    TransientCode::Unavailable,
                    "backend offline",
                ));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl DocumentStore for FlakyStore {
        async fn insert(&self, c: &str, id: &str, doc: Document) -> StoreResult<Document> {
            self.check()?;
            self.inner.insert(c, id, doc).await
        }

        async fn get(&self, c: &str, id: &str) -> StoreResult<Option<Document>> {
            self.check()?;
            self.inner.get(c, id).await
        }

        async fn merge(
            &self,
            c: &str,
            id: &str,
            patch: Document,
            expected: Option<u64>,
        ) -> StoreResult<Option<Document>> {
            self.check()?;
            self.inner.merge(c, id, patch, expected).await
        }

        async fn list(&self, c: &str) -> StoreResult<Vec<Document>> {
            self.check()?;
            self.inner.list(c).await
        }
    }

    fn doc() -> Document {
        json!({"title": "Lockdown drill"}).as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_recovers_within_retry_budget() {
        let flaky = Arc::new(FlakyStore::new(2));
        let store = ResilientStore::new(flaky.clone(), RetryPolicy::immediate(3));

        store.insert("drills", "d1", doc()).await.unwrap();

        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
        assert!(store.get("drills", "d1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_gives_up_after_retry_budget() {
        let flaky = Arc::new(FlakyStore::new(10));
        let store = ResilientStore::new(flaky.clone(), RetryPolicy::immediate(3));

        let err = store.list("drills").await.unwrap_err();

        assert!(err.is_transient());
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_non_transient_errors_are_not_retried() {
        let flaky = Arc::new(FlakyStore::new(0));
        let store = ResilientStore::new(flaky.clone(), RetryPolicy::immediate(3));
        store.insert("drills", "d1", doc()).await.unwrap();

        let err = store
            .merge("drills", "d1", doc(), Some(42))
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Conflict { .. }));
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_fetched_from_read() {
        let ok: Fetched<Vec<u8>> = Fetched::from_read(Ok(vec![1, 2])).unwrap();
        assert_eq!(ok, Fetched::Ok(vec![1, 2]));

        let degraded: Fetched<Vec<u8>> = Fetched::from_read(Err(AppError::Store(
            StoreError::transient(TransientCode::DeadlineExceeded, "slow"),
        )))
        .unwrap();
        assert!(degraded.is_degraded());
        assert_eq!(
            degraded,
            Fetched::Degraded {
                reason: "deadline-exceeded".to_string()
            }
        );
        assert!(degraded.unwrap_or_default().is_empty());

        let hard: Result<Fetched<Vec<u8>>> = Fetched::from_read(Err(AppError::Unauthorized));
        assert!(hard.is_err());
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy {
            max_retries: 10,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(1_000),
            jitter: Duration::ZERO,
        };

        assert_eq!(policy.delay(0), Duration::from_millis(100));
        assert_eq!(policy.delay(2), Duration::from_millis(400));
        assert_eq!(policy.delay(8), Duration::from_millis(1_000));
    }
}
