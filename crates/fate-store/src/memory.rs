use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::key::validate_key;
use crate::traits::CoordinationStore;
use crate::{Result, StoreError};

/// In-process store.
///
/// Clones of an `Arc<MemoryStore>` share state, which lets a test stop one
/// executor and start another against the same entries. `fail_next` injects
/// transient failures to exercise retry paths.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Vec<u8>>>,
    pending_failures: AtomicU32,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` calls fail with [`StoreError::Transient`].
    pub fn fail_next(&self, count: u32) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    /// Number of entries currently stored.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Poisoned`] if a writer panicked.
    pub fn len(&self) -> Result<usize> {
        Ok(self.entries.lock().map_err(|_| StoreError::Poisoned)?.len())
    }

    /// # Errors
    ///
    /// Returns [`StoreError::Poisoned`] if a writer panicked.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn inject_failure(&self, operation: &'static str, key: &str) -> Result<()> {
        let took = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if took {
            return Err(StoreError::Transient {
                operation,
                key: key.to_string(),
                reason: "injected session loss".to_string(),
            });
        }
        Ok(())
    }
}

impl CoordinationStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        validate_key(key)?;
        self.inject_failure("get", key)?;
        let entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        validate_key(key)?;
        self.inject_failure("put", key)?;
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        self.inject_failure("delete", key)?;
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        entries.remove(key);
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        self.inject_failure("list", prefix)?;
        let entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }
}
