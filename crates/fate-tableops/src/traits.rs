use crate::error::Result;

/// Table metadata bookkeeping that table operations drive.
///
/// Calls may be repeated after a crash or a transient error, so mutations
/// must be idempotent.
pub trait TableCatalog: Send + Sync {
    fn namespace_exists(&self, namespace: &str) -> Result<bool>;

    fn table_exists(&self, table: &str) -> Result<bool>;

    /// Registers `table` under `namespace`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::TableExists`](crate::CatalogError::TableExists)
    /// if the table is already registered under a different namespace.
    fn create_table(&self, namespace: &str, table: &str) -> Result<()>;

    /// Removes `table`; removing an absent table succeeds.
    fn remove_table(&self, table: &str) -> Result<()>;

    /// Cancels running compactions of `table` and returns the new
    /// cancellation id.
    fn cancel_compactions(&self, table: &str) -> Result<u64>;
}
