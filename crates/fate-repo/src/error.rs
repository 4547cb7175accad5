use thiserror::Error;

type BoxedSource = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Outcome of a failed step, classified for the executor.
#[derive(Debug, Error)]
pub enum RepoError {
    /// Retrying later may succeed (lock contention, lost session). The
    /// executor calls the step again without advancing or rolling back.
    #[error("transient: {reason}")]
    Transient { reason: String },

    /// The step cannot succeed; the transaction is rolled back.
    #[error("{reason}")]
    Permanent {
        reason: String,
        #[source]
        source: Option<BoxedSource>,
    },
}

impl RepoError {
    pub fn transient(reason: impl Into<String>) -> Self {
        Self::Transient {
            reason: reason.into(),
        }
    }

    pub fn permanent(reason: impl Into<String>) -> Self {
        Self::Permanent {
            reason: reason.into(),
            source: None,
        }
    }

    pub fn permanent_with(
        reason: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Permanent {
            reason: reason.into(),
            source: Some(Box::new(source)),
        }
    }

    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Renders the error and its source chain on one line, for persisting.
    #[must_use]
    pub fn chain(&self) -> String {
        let mut rendered = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            rendered.push_str(": ");
            rendered.push_str(&cause.to_string());
            source = cause.source();
        }
        rendered
    }
}
