use fate_core::{TxId, TxStatus};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FateError {
    #[error(transparent)]
    Store(#[from] fate_store::StoreError),

    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    #[error("transaction record for {tid} is corrupt")]
    Corrupt {
        tid: TxId,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize transaction record for {tid}")]
    Serialize {
        tid: TxId,
        #[source]
        source: serde_json::Error,
    },

    #[error("transaction record for {tid} has unsupported format {found}")]
    UnsupportedFormat { tid: TxId, found: u32 },

    #[error("next transaction id entry is corrupt")]
    CorruptCounter(#[source] serde_json::Error),

    #[error("unknown transaction {0}")]
    UnknownTx(TxId),

    #[error("{tid} cannot move from {from} to {to}")]
    InvalidTransition {
        tid: TxId,
        from: TxStatus,
        to: TxStatus,
    },

    #[error("{0} is in progress but has no current step")]
    MissingStep(TxId),

    #[error("{tid} is {status}; only finished transactions can be deleted")]
    NotTerminal { tid: TxId, status: TxStatus },

    #[error("failed to spawn worker thread")]
    SpawnWorker(#[source] std::io::Error),

    #[error("executor is shut down")]
    Shutdown,

    #[error("executor state lock poisoned")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, FateError>;
