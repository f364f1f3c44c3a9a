//! Timeout and retry decoration for store calls.
//!
//! Backends report transient faults (connection drops, timeouts) that a
//! bounded retry absorbs. Non-transient errors (serialization) pass straight
//! through. Wrapping happens once at stack construction, so individual
//! components never reason about retries.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use super::{Item, Key, KeyValueStore, StoreError};

/// Retry/timeout knobs for [`RetryingStore`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts per call, including the first.
    pub attempts: u32,
    /// Per-attempt deadline.
    pub timeout: Duration,
    /// Delay before the second attempt; doubles per retry.
    pub base_delay: Duration,
    /// Backoff cap.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            timeout: Duration::from_secs(5),
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(1u32 << (attempt - 1).min(16))
            .min(self.max_delay)
    }
}

/// [`KeyValueStore`] decorator adding per-call timeouts and bounded
/// exponential backoff for transient failures.
pub struct RetryingStore {
    inner: Arc<dyn KeyValueStore>,
    policy: RetryPolicy,
}

impl RetryingStore {
    pub fn new(inner: Arc<dyn KeyValueStore>) -> Self {
        Self::with_policy(inner, RetryPolicy::default())
    }

    pub fn with_policy(inner: Arc<dyn KeyValueStore>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    async fn call<T, F, Fut>(&self, what: &str, f: F) -> Result<T, StoreError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempt = 1u32;
        loop {
            let outcome = match timeout(self.policy.timeout, f()).await {
                Ok(result) => result,
                Err(_) => Err(StoreError::Timeout(self.policy.timeout)),
            };
            match outcome {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(what, attempt, "store call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if err.is_transient() && attempt < self.policy.attempts => {
                    warn!(what, attempt, error = %err, "transient store failure, retrying");
                    sleep(self.policy.backoff(attempt)).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[async_trait]
impl KeyValueStore for RetryingStore {
    async fn get(&self, table: &str, key: &Key) -> Result<Option<Item>, StoreError> {
        self.call("get", || self.inner.get(table, key)).await
    }

    async fn put(&self, table: &str, key: &Key, item: Item) -> Result<(), StoreError> {
        self.call("put", || self.inner.put(table, key, item.clone()))
            .await
    }

    async fn update(&self, table: &str, key: &Key, patch: Item) -> Result<bool, StoreError> {
        self.call("update", || self.inner.update(table, key, patch.clone()))
            .await
    }

    async fn update_if(
        &self,
        table: &str,
        key: &Key,
        guard_field: &str,
        guard_value: &Value,
        patch: Item,
    ) -> Result<Option<Item>, StoreError> {
        self.call("update_if", || {
            self.inner
                .update_if(table, key, guard_field, guard_value, patch.clone())
        })
        .await
    }

    async fn delete(&self, table: &str, key: &Key) -> Result<bool, StoreError> {
        self.call("delete", || self.inner.delete(table, key)).await
    }

    async fn query_index(
        &self,
        table: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<Item>, StoreError> {
        self.call("query_index", || self.inner.query_index(table, field, value))
            .await
    }
}
