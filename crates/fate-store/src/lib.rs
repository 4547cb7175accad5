//! Access to the durable coordination service.
//!
//! Every component that persists state talks to a [`CoordinationStore`].
//! Calls may fail with [`StoreError::Transient`] (session expired, connection
//! lost); [`RetryingStore`] absorbs those with a backoff retry so callers only
//! ever see permanent failures.

mod error;
mod file;
mod key;
mod memory;
mod retrying;
mod traits;

pub use error::{Result, StoreError};
pub use file::FileStore;
pub use key::validate_key;
pub use memory::MemoryStore;
pub use retrying::RetryingStore;
pub use traits::CoordinationStore;
