use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};

use indexmap::IndexMap;
use tracing::debug;

use crate::error::{CatalogError, Result};
use crate::traits::TableCatalog;

#[derive(Debug, Default)]
struct Catalog {
    namespaces: BTreeSet<String>,
    tables: IndexMap<String, String>,
    cancel_ids: HashMap<String, u64>,
}

/// Catalog held in process memory.
///
/// Supports failure injection: [`fail_next`](Self::fail_next) makes calls
/// report [`CatalogError::Unavailable`], and
/// [`set_read_only`](Self::set_read_only) rejects every mutation.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    state: Mutex<Catalog>,
    pending_failures: AtomicU32,
    read_only: AtomicBool,
}

impl InMemoryCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A catalog that already contains `namespaces`.
    #[must_use]
    pub fn with_namespaces<I, S>(namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let catalog = Catalog {
            namespaces: namespaces.into_iter().map(Into::into).collect(),
            ..Catalog::default()
        };
        Self {
            state: Mutex::new(catalog),
            ..Self::default()
        }
    }

    /// # Errors
    ///
    /// Returns [`CatalogError::Poisoned`] if the catalog lock is poisoned.
    pub fn add_namespace(&self, namespace: impl Into<String>) -> Result<()> {
        self.lock()?.namespaces.insert(namespace.into());
        Ok(())
    }

    /// Makes the next `count` calls fail with [`CatalogError::Unavailable`].
    pub fn fail_next(&self, count: u32) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    /// Registered tables in creation order, as `(table, namespace)`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Poisoned`] if the catalog lock is poisoned.
    pub fn tables(&self) -> Result<Vec<(String, String)>> {
        Ok(self
            .lock()?
            .tables
            .iter()
            .map(|(table, namespace)| (table.clone(), namespace.clone()))
            .collect())
    }

    /// Latest cancellation id issued for `table`, zero if none.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Poisoned`] if the catalog lock is poisoned.
    pub fn cancel_id(&self, table: &str) -> Result<u64> {
        Ok(self.lock()?.cancel_ids.get(table).copied().unwrap_or(0))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Catalog>> {
        self.state.lock().map_err(|_| CatalogError::Poisoned)
    }

    fn injected_failure(&self) -> Result<()> {
        let took = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if took {
            return Err(CatalogError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }

    fn writable(&self) -> Result<MutexGuard<'_, Catalog>> {
        self.injected_failure()?;
        if self.read_only.load(Ordering::SeqCst) {
            return Err(CatalogError::ReadOnly);
        }
        self.lock()
    }
}

impl TableCatalog for InMemoryCatalog {
    fn namespace_exists(&self, namespace: &str) -> Result<bool> {
        self.injected_failure()?;
        Ok(self.lock()?.namespaces.contains(namespace))
    }

    fn table_exists(&self, table: &str) -> Result<bool> {
        self.injected_failure()?;
        Ok(self.lock()?.tables.contains_key(table))
    }

    fn create_table(&self, namespace: &str, table: &str) -> Result<()> {
        let mut catalog = self.writable()?;
        if !catalog.namespaces.contains(namespace) {
            return Err(CatalogError::NamespaceNotFound(namespace.to_string()));
        }
        match catalog.tables.get(table) {
            Some(existing) if existing == namespace => Ok(()),
            Some(existing) => Err(CatalogError::TableExists {
                namespace: existing.clone(),
                table: table.to_string(),
            }),
            None => {
                catalog
                    .tables
                    .insert(table.to_string(), namespace.to_string());
                debug!(namespace, table, "registered table");
                Ok(())
            }
        }
    }

    fn remove_table(&self, table: &str) -> Result<()> {
        let mut catalog = self.writable()?;
        if catalog.tables.shift_remove(table).is_some() {
            catalog.cancel_ids.remove(table);
            debug!(table, "removed table");
        }
        Ok(())
    }

    fn cancel_compactions(&self, table: &str) -> Result<u64> {
        let mut catalog = self.writable()?;
        if !catalog.tables.contains_key(table) {
            return Err(CatalogError::TableNotFound(table.to_string()));
        }
        let id = catalog.cancel_ids.entry(table.to_string()).or_insert(0);
        *id += 1;
        Ok(*id)
    }
}
