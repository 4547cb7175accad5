use crate::Result;

/// Durable key/value store backing the transaction log and reservation table.
///
/// Keys are absolute `/`-separated paths such as `/fate/tx/000000000000002a`.
/// A single `put` replaces the whole value atomically.
pub trait CoordinationStore: Send + Sync {
    /// Returns `Ok(None)` if the key doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be read.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Creates or replaces the value stored at `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be written.
    fn put(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Removes `key`. Removing a missing key succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry exists but cannot be removed.
    fn delete(&self, key: &str) -> Result<()>;

    /// Lists all keys starting with `prefix`, in lexical order.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be enumerated.
    fn list(&self, prefix: &str) -> Result<Vec<String>>;
}
