use std::fmt::Debug;

use thiserror::Error;

/// A bounded retry session has used up all of its retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("no retries left after {retries} attempt(s)")]
pub struct RetriesExhausted {
    /// Number of retries that were performed before giving up.
    pub retries: u64,
}

/// Error from [`retry_with`](crate::retry_with).
#[derive(Debug, Error)]
pub enum RetryError<E: Debug> {
    /// The operation kept failing transiently until the policy gave up.
    #[error("operation '{operation}' still failing after {retries} retries")]
    Exhausted {
        /// Label of the retried operation.
        operation: String,
        /// Number of retries performed.
        retries: u64,
        /// The last transient error observed.
        #[source]
        last: E,
    },

    /// The operation failed with an error that is not worth retrying.
    #[error("operation '{operation}' failed")]
    Permanent {
        /// Label of the retried operation.
        operation: String,
        /// The permanent error.
        #[source]
        source: E,
    },
}

impl<E: Debug> RetryError<E> {
    /// Returns the underlying operation error.
    pub fn into_inner(self) -> E {
        match self {
            Self::Exhausted { last, .. } => last,
            Self::Permanent { source, .. } => source,
        }
    }
}
