use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReservationError {
    #[error(transparent)]
    Store(#[from] fate_store::StoreError),

    #[error("reservation entry '{key}' is corrupt")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize reservation entry '{key}'")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("reservation lock poisoned")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, ReservationError>;
