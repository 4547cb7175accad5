use std::sync::Arc;

use fate_retry::{RetryError, RetryPolicy, Sleeper, ThreadSleeper, retry_with};
use tracing::{debug, error};

use crate::traits::CoordinationStore;
use crate::{Result, StoreError};

/// Decorator that runs every call of the inner store under a retry session.
///
/// Transient errors are retried according to the policy; permanent errors
/// pass through unchanged; exhausting a bounded policy yields
/// [`StoreError::RetriesExhausted`].
pub struct RetryingStore {
    inner: Arc<dyn CoordinationStore>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl Clone for RetryingStore {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            policy: self.policy,
            sleeper: Arc::clone(&self.sleeper),
        }
    }
}

impl RetryingStore {
    #[must_use]
    pub fn new(inner: Arc<dyn CoordinationStore>, policy: RetryPolicy) -> Self {
        Self::with_sleeper(inner, policy, Arc::new(ThreadSleeper))
    }

    #[must_use]
    pub fn with_sleeper(
        inner: Arc<dyn CoordinationStore>,
        policy: RetryPolicy,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            inner,
            policy,
            sleeper,
        }
    }

    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn run<T>(
        &self,
        operation: &'static str,
        key: &str,
        op: impl FnMut() -> Result<T>,
    ) -> Result<T> {
        let label = format!("{operation} {key}");
        retry_with(
            &self.policy,
            self.sleeper.as_ref(),
            &label,
            StoreError::is_transient,
            op,
        )
        .map_err(|failure| match failure {
            RetryError::Exhausted { retries, last, .. } => {
                error!(operation, key, retries, error = %last, "coordination store call gave up");
                StoreError::RetriesExhausted {
                    operation,
                    key: key.to_string(),
                    retries,
                    last: Box::new(last),
                }
            }
            RetryError::Permanent { source, .. } => {
                debug!(operation, key, error = %source, "coordination store call failed");
                source
            }
        })
    }
}

impl CoordinationStore for RetryingStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.run("get", key, || self.inner.get(key))
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.run("put", key, || self.inner.put(key, value))
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.run("delete", key, || self.inner.delete(key))
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        self.run("list", prefix, || self.inner.list(prefix))
    }
}
