use std::sync::{Arc, Mutex};

use fate_core::{LockMode, ResourceId, ResourceKind, TxId};
use fate_store::CoordinationStore;
use tracing::debug;

use crate::entry::Reservation;
use crate::locks::KeyLocks;
use crate::{ReservationError, Result};

const RESERVATION_ROOT: &str = "/reservations";

/// Grants and releases reservations on behalf of transactions.
///
/// Never waits: a conflicting request reports `false` and the caller retries
/// later. Inside FATE steps that means returning a transient error so the
/// executor paces the retry.
pub struct ReservationManager {
    store: Arc<dyn CoordinationStore>,
    locks: KeyLocks,
}

impl ReservationManager {
    #[must_use]
    pub fn new(store: Arc<dyn CoordinationStore>) -> Self {
        Self {
            store,
            locks: KeyLocks::default(),
        }
    }

    /// Reserves `resource` for `tid`.
    ///
    /// Returns `false` if another transaction holds a conflicting grant.
    /// Asking again for a grant already held succeeds, and a sole reader may
    /// upgrade to write.
    ///
    /// # Errors
    ///
    /// Returns an error if the reservation table cannot be read or written.
    pub fn reserve(&self, resource: &ResourceId, tid: TxId, mode: LockMode) -> Result<bool> {
        let granted = self.update(resource, |entry| entry.grant(tid, mode))?;
        if granted {
            debug!(%tid, %resource, %mode, "reserved");
        } else {
            debug!(%tid, %resource, %mode, "reservation conflict");
        }
        Ok(granted)
    }

    /// Releases the `mode` grant of `tid` on `resource`.
    ///
    /// Releasing a grant that was never acquired, or releasing twice, is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the reservation table cannot be read or written.
    pub fn unreserve(&self, resource: &ResourceId, tid: TxId, mode: LockMode) -> Result<()> {
        self.update(resource, |entry| entry.release(tid, mode))?;
        debug!(%tid, %resource, %mode, "unreserved");
        Ok(())
    }

    /// Current grants on `resource`.
    ///
    /// # Errors
    ///
    /// Returns an error if the reservation table cannot be read.
    pub fn holders(&self, resource: &ResourceId) -> Result<Reservation> {
        self.load(&entry_key(resource))
    }

    /// All grants held by `tid`, for diagnostics.
    ///
    /// # Errors
    ///
    /// Returns an error if the reservation table cannot be read.
    pub fn held_by(&self, tid: TxId) -> Result<Vec<(ResourceId, LockMode)>> {
        let mut held = Vec::new();
        for key in self.store.list(&format!("{RESERVATION_ROOT}/"))? {
            let Some(resource) = parse_key(&key) else {
                continue;
            };
            let entry = self.load(&key)?;
            if entry.holds(tid, LockMode::Write) {
                held.push((resource, LockMode::Write));
            } else if entry.holds(tid, LockMode::Read) {
                held.push((resource, LockMode::Read));
            }
        }
        Ok(held)
    }

    fn update<T>(&self, resource: &ResourceId, f: impl FnOnce(&mut Reservation) -> T) -> Result<T> {
        let key = entry_key(resource);
        let lock = self.locks.lock_for(&key)?;
        let outcome = self.update_locked(&key, &lock, f);
        self.locks.release(&key, lock)?;
        outcome
    }

    fn update_locked<T>(
        &self,
        key: &str,
        lock: &Mutex<()>,
        f: impl FnOnce(&mut Reservation) -> T,
    ) -> Result<T> {
        let _guard = lock.lock().map_err(|_| ReservationError::Poisoned)?;

        let mut entry = self.load(key)?;
        let before = entry.clone();
        let outcome = f(&mut entry);
        if entry != before {
            self.save(key, &entry)?;
        }
        Ok(outcome)
    }

    fn load(&self, key: &str) -> Result<Reservation> {
        match self.store.get(key)? {
            None => Ok(Reservation::default()),
            Some(bytes) => {
                serde_json::from_slice(&bytes).map_err(|source| ReservationError::Corrupt {
                    key: key.to_string(),
                    source,
                })
            }
        }
    }

    fn save(&self, key: &str, entry: &Reservation) -> Result<()> {
        if entry.is_free() {
            self.store.delete(key)?;
            return Ok(());
        }
        let bytes = serde_json::to_vec(entry).map_err(|source| ReservationError::Serialize {
            key: key.to_string(),
            source,
        })?;
        self.store.put(key, &bytes)?;
        Ok(())
    }
}

fn entry_key(resource: &ResourceId) -> String {
    format!("{RESERVATION_ROOT}/{}/{}", resource.kind(), resource.id())
}

fn parse_key(key: &str) -> Option<ResourceId> {
    let rest = key.strip_prefix(RESERVATION_ROOT)?.strip_prefix('/')?;
    let (kind, id) = rest.split_once('/')?;
    let kind: ResourceKind = kind.parse().ok()?;
    ResourceId::new(kind, id).ok()
}

#[cfg(test)]
mod tests {
    use fate_store::MemoryStore;

    use super::*;

    fn manager() -> (Arc<MemoryStore>, ReservationManager) {
        let store = Arc::new(MemoryStore::new());
        let manager = ReservationManager::new(Arc::clone(&store) as Arc<dyn CoordinationStore>);
        (store, manager)
    }

    fn table(id: &str) -> ResourceId {
        ResourceId::table(id).expect("valid table id")
    }

    #[test]
    fn key_layout_separates_kinds() {
        assert_eq!(entry_key(&table("3")), "/reservations/table/3");
        assert_eq!(
            entry_key(&ResourceId::namespace("3").expect("valid")),
            "/reservations/namespace/3"
        );
    }

    #[test]
    fn parse_key_inverts_entry_key() {
        let resource = ResourceId::namespace("ns1").expect("valid");
        assert_eq!(parse_key(&entry_key(&resource)), Some(resource));
        assert_eq!(parse_key("/reservations/tablet/1"), None);
    }

    #[test]
    fn grant_is_persisted_and_release_removes_entry() -> anyhow::Result<()> {
        let (store, manager) = manager();
        let tid = TxId::new(9);

        assert!(manager.reserve(&table("1"), tid, LockMode::Write)?);
        assert!(store.get("/reservations/table/1")?.is_some());

        manager.unreserve(&table("1"), tid, LockMode::Write)?;
        assert!(store.get("/reservations/table/1")?.is_none());
        Ok(())
    }

    #[test]
    fn unreserve_without_grant_is_noop() -> anyhow::Result<()> {
        let (_store, manager) = manager();

        manager.unreserve(&table("1"), TxId::new(1), LockMode::Read)?;
        manager.unreserve(&table("1"), TxId::new(1), LockMode::Write)?;

        assert!(manager.holders(&table("1"))?.is_free());
        Ok(())
    }

    #[test]
    fn conflicting_request_is_refused_without_waiting() -> anyhow::Result<()> {
        let (_store, manager) = manager();
        assert!(manager.reserve(&table("1"), TxId::new(1), LockMode::Write)?);

        let granted = manager.reserve(&table("1"), TxId::new(2), LockMode::Read)?;

        assert!(!granted);
        assert_eq!(manager.holders(&table("1"))?.writer(), Some(TxId::new(1)));
        Ok(())
    }

    #[test]
    fn released_keys_leave_no_lock_behind() -> anyhow::Result<()> {
        let (_store, manager) = manager();
        for n in 0..50_u64 {
            let resource = table(&format!("t{n}"));
            manager.reserve(&resource, TxId::new(n + 1), LockMode::Write)?;
            manager.unreserve(&resource, TxId::new(n + 1), LockMode::Write)?;
        }

        assert_eq!(manager.locks.len()?, 0);
        Ok(())
    }

    #[test]
    fn held_by_lists_grants_of_one_transaction() -> anyhow::Result<()> {
        let (_store, manager) = manager();
        let tid = TxId::new(5);
        let namespace = ResourceId::namespace("ns")?;

        manager.reserve(&namespace, tid, LockMode::Read)?;
        manager.reserve(&table("1"), tid, LockMode::Write)?;
        manager.reserve(&table("2"), TxId::new(6), LockMode::Write)?;

        let mut held = manager.held_by(tid)?;
        held.sort_by(|a, b| a.0.cmp(&b.0));

        assert_eq!(
            held,
            vec![(table("1"), LockMode::Write), (namespace, LockMode::Read)]
        );
        Ok(())
    }

    #[test]
    fn corrupt_entry_is_reported() {
        let (store, manager) = manager();
        store
            .put("/reservations/table/1", b"not json")
            .expect("put");

        let err = manager.holders(&table("1")).expect_err("corrupt");

        assert!(matches!(err, ReservationError::Corrupt { .. }));
    }
}
