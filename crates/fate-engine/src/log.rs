use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use fate_core::TxId;
use fate_store::CoordinationStore;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{FateError, Result};
use crate::record::{RECORD_FORMAT, TxRecord};

const TX_PREFIX: &str = "/fate/tx/";
const NEXT_TID_KEY: &str = "/fate/next-tid";

/// Durable transaction log.
///
/// Each transaction is one JSON document at `/fate/tx/<16 hex digits>`,
/// replaced as a whole on every transition so recovery never observes half
/// of one. Transaction ids come from a counter at `/fate/next-tid`.
pub struct TxLog<R> {
    store: Arc<dyn CoordinationStore>,
    tid_lock: Mutex<()>,
    _marker: PhantomData<fn() -> R>,
}

impl<R> TxLog<R>
where
    R: Serialize + DeserializeOwned,
{
    #[must_use]
    pub fn new(store: Arc<dyn CoordinationStore>) -> Self {
        Self {
            store,
            tid_lock: Mutex::new(()),
            _marker: PhantomData,
        }
    }

    /// Hands out the next transaction id.
    ///
    /// # Errors
    ///
    /// Returns an error if the counter cannot be read or advanced.
    pub fn allocate_tid(&self) -> Result<TxId> {
        let _guard = self.tid_lock.lock().map_err(|_| FateError::Poisoned)?;
        let next: u64 = match self.store.get(NEXT_TID_KEY)? {
            None => 1,
            Some(bytes) => serde_json::from_slice(&bytes).map_err(FateError::CorruptCounter)?,
        };
        let bytes = serde_json::to_vec(&(next + 1)).map_err(FateError::CorruptCounter)?;
        self.store.put(NEXT_TID_KEY, &bytes)?;
        Ok(TxId::new(next))
    }

    /// Persists `record`, replacing any previous version.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be serialized or stored.
    pub fn write(&self, record: &TxRecord<R>) -> Result<()> {
        let tid = record.tid();
        let bytes =
            serde_json::to_vec(record).map_err(|source| FateError::Serialize { tid, source })?;
        self.store.put(&tx_key(tid), &bytes)?;
        Ok(())
    }

    /// Returns `Ok(None)` if no record exists for `tid`.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be read, parsed, or was written
    /// in an unknown format.
    pub fn read(&self, tid: TxId) -> Result<Option<TxRecord<R>>> {
        let Some(bytes) = self.store.get(&tx_key(tid))? else {
            return Ok(None);
        };
        let format = peek_format(&bytes).map_err(|source| FateError::Corrupt { tid, source })?;
        if format != RECORD_FORMAT {
            return Err(FateError::UnsupportedFormat { tid, found: format });
        }
        let record =
            serde_json::from_slice(&bytes).map_err(|source| FateError::Corrupt { tid, source })?;
        Ok(Some(record))
    }

    /// # Errors
    ///
    /// Returns an error if the entry exists but cannot be removed.
    pub fn delete(&self, tid: TxId) -> Result<()> {
        self.store.delete(&tx_key(tid))?;
        Ok(())
    }

    /// Ids of all logged transactions, ascending.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be listed.
    pub fn list(&self) -> Result<Vec<TxId>> {
        let mut tids: Vec<TxId> = self
            .store
            .list(TX_PREFIX)?
            .iter()
            .filter_map(|key| key.strip_prefix(TX_PREFIX)?.parse().ok())
            .collect();
        tids.sort();
        Ok(tids)
    }
}

fn tx_key(tid: TxId) -> String {
    format!("{TX_PREFIX}{}", tid.hex())
}

fn peek_format(bytes: &[u8]) -> serde_json::Result<u32> {
    #[derive(serde::Deserialize)]
    struct Header {
        format: u32,
    }
    serde_json::from_slice::<Header>(bytes).map(|header| header.format)
}
