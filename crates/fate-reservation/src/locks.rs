use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::{ReservationError, Result};

/// One in-process mutex per store key, so read-modify-write of a reservation
/// entry never interleaves between workers.
///
/// Only keys with an update in progress have an entry.
#[derive(Debug, Default)]
pub(crate) struct KeyLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyLocks {
    pub(crate) fn lock_for(&self, key: &str) -> Result<Arc<Mutex<()>>> {
        let mut locks = self.locks.lock().map_err(|_| ReservationError::Poisoned)?;
        Ok(Arc::clone(locks.entry(key.to_string()).or_default()))
    }

    /// Hands back a handle from [`lock_for`](Self::lock_for); the entry is
    /// dropped once no other caller holds one.
    pub(crate) fn release(&self, key: &str, handle: Arc<Mutex<()>>) -> Result<()> {
        let mut locks = self.locks.lock().map_err(|_| ReservationError::Poisoned)?;
        drop(handle);
        if locks
            .get(key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(key);
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> Result<usize> {
        Ok(self
            .locks
            .lock()
            .map_err(|_| ReservationError::Poisoned)?
            .len())
    }
}
