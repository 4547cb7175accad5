use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of a transaction.
///
/// `New → InProgress → Successful` on the happy path,
/// `InProgress → FailedInProgress → Failed` when a step fails and the
/// completed steps are rolled back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxStatus {
    New,
    InProgress,
    FailedInProgress,
    Failed,
    Successful,
}

impl TxStatus {
    /// No further work happens for a transaction in this status.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Successful | Self::Failed)
    }

    /// A worker has something to do for a transaction in this status.
    #[must_use]
    pub fn is_runnable(self) -> bool {
        matches!(self, Self::InProgress | Self::FailedInProgress)
    }

    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::New, Self::InProgress)
                | (Self::InProgress, Self::Successful | Self::FailedInProgress)
                | (Self::FailedInProgress, Self::Failed)
        )
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::New => "NEW",
            Self::InProgress => "IN_PROGRESS",
            Self::FailedInProgress => "FAILED_IN_PROGRESS",
            Self::Failed => "FAILED",
            Self::Successful => "SUCCESSFUL",
        };
        write!(f, "{s}")
    }
}
