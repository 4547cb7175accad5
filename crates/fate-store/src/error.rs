use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("transient failure during {operation} of '{key}': {reason}")]
    Transient {
        operation: &'static str,
        key: String,
        reason: String,
    },

    #[error("{operation} of '{key}' gave up after {retries} retries")]
    RetriesExhausted {
        operation: &'static str,
        key: String,
        retries: u64,
        #[source]
        last: Box<StoreError>,
    },

    #[error("invalid store key '{key}': {reason}")]
    InvalidKey { key: String, reason: &'static str },

    #[error("failed to read store entry '{path}'")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write store entry '{path}'")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("store lock poisoned")]
    Poisoned,
}

impl StoreError {
    /// Whether retrying the same call may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
