use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    /// The catalog could not be reached; the call may succeed later.
    #[error("catalog unavailable: {0}")]
    Unavailable(String),

    #[error("namespace '{0}' does not exist")]
    NamespaceNotFound(String),

    #[error("table '{0}' does not exist")]
    TableNotFound(String),

    #[error("table '{table}' already exists in namespace '{namespace}'")]
    TableExists { namespace: String, table: String },

    #[error("catalog is read-only")]
    ReadOnly,

    #[error("catalog lock poisoned")]
    Poisoned,
}

impl CatalogError {
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;
