use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid transaction id '{0}'")]
    InvalidTxId(String),

    #[error("unknown resource kind '{0}'")]
    UnknownResourceKind(String),

    #[error("resource id cannot be empty")]
    EmptyResourceId,

    #[error("resource id '{0}' must not contain '/'")]
    ResourceIdSeparator(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
