use chrono::{DateTime, Utc};
use fate_core::{TxId, TxStatus};
use fate_repo::{StepAudit, UndoFailure};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{FateError, Result};

/// Version of the persisted record layout.
pub const RECORD_FORMAT: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The step reported a permanent error.
    StepFailed,
    /// The step kept failing transiently until the step retry policy gave up.
    RetriesExhausted,
}

/// The failure that sent a transaction into rollback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxFailure {
    pub step: String,
    pub kind: FailureKind,
    pub message: String,
}

impl std::fmt::Display for TxFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            FailureKind::StepFailed => write!(f, "step '{}' failed: {}", self.step, self.message),
            FailureKind::RetriesExhausted => write!(
                f,
                "step '{}' gave up retrying: {}",
                self.step, self.message
            ),
        }
    }
}

/// Durable state of one transaction.
///
/// `current` is the step to execute next (or, during rollback, nothing);
/// `completed` holds the steps whose `call` returned, oldest first. The
/// methods below are the only transitions the executor performs, and each is
/// persisted as a whole before the next one starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "R: Serialize", deserialize = "R: DeserializeOwned"))]
pub struct TxRecord<R> {
    format: u32,
    tid: TxId,
    status: TxStatus,
    #[serde(default)]
    current: Option<R>,
    #[serde(default)]
    completed: Vec<R>,
    #[serde(default)]
    failure: Option<TxFailure>,
    #[serde(default)]
    undo_failures: Vec<UndoFailure>,
    #[serde(default)]
    audit: StepAudit,
    created_at: DateTime<Utc>,
}

impl<R> TxRecord<R> {
    /// A freshly submitted transaction whose first step is `first`.
    #[must_use]
    pub fn new(tid: TxId, first: R) -> Self {
        Self {
            format: RECORD_FORMAT,
            tid,
            status: TxStatus::New,
            current: Some(first),
            completed: Vec::new(),
            failure: None,
            undo_failures: Vec::new(),
            audit: StepAudit::new(),
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn format(&self) -> u32 {
        self.format
    }

    #[must_use]
    pub fn tid(&self) -> TxId {
        self.tid
    }

    #[must_use]
    pub fn status(&self) -> TxStatus {
        self.status
    }

    #[must_use]
    pub fn current(&self) -> Option<&R> {
        self.current.as_ref()
    }

    /// Completed steps, oldest first.
    #[must_use]
    pub fn completed(&self) -> &[R] {
        &self.completed
    }

    #[must_use]
    pub fn failure(&self) -> Option<&TxFailure> {
        self.failure.as_ref()
    }

    #[must_use]
    pub fn undo_failures(&self) -> &[UndoFailure] {
        &self.undo_failures
    }

    #[must_use]
    pub fn audit(&self) -> &StepAudit {
        &self.audit
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn transition(&mut self, to: TxStatus) -> Result<()> {
        if !self.status.can_transition_to(to) {
            return Err(FateError::InvalidTransition {
                tid: self.tid,
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    /// Hands the transaction to the workers: `NEW → IN_PROGRESS`.
    ///
    /// # Errors
    ///
    /// Returns [`FateError::InvalidTransition`] unless the record is `NEW`.
    pub fn seed(&mut self) -> Result<()> {
        self.transition(TxStatus::InProgress)
    }

    /// Records that the current step's `call` returned `next`.
    ///
    /// The current step moves onto the completed stack; `next` becomes
    /// current, or the transaction succeeds when there is none.
    ///
    /// # Errors
    ///
    /// Returns an error unless the record is `IN_PROGRESS` with a current step.
    pub fn complete_current(
        &mut self,
        name: &str,
        undo_description: String,
        next: Option<R>,
    ) -> Result<()> {
        if self.status != TxStatus::InProgress {
            return Err(FateError::InvalidTransition {
                tid: self.tid,
                from: self.status,
                to: TxStatus::InProgress,
            });
        }
        let done = self.current.take().ok_or(FateError::MissingStep(self.tid))?;
        self.audit.record_executed(name, undo_description);

        match next {
            Some(step) => {
                self.completed.push(done);
                self.current = Some(step);
            }
            None => {
                self.transition(TxStatus::Successful)?;
                self.completed.clear();
            }
        }
        Ok(())
    }

    /// Records that the current step failed and starts rollback.
    ///
    /// The failed step is discarded without undo: it never completed.
    ///
    /// # Errors
    ///
    /// Returns [`FateError::InvalidTransition`] unless the record is
    /// `IN_PROGRESS`.
    pub fn fail_current(&mut self, failure: TxFailure) -> Result<()> {
        self.transition(TxStatus::FailedInProgress)?;
        self.current = None;
        self.audit.record_failed(&failure.step);
        self.failure = Some(failure);
        Ok(())
    }

    /// The next step to undo, i.e. the most recently completed one.
    #[must_use]
    pub fn next_to_undo(&self) -> Option<&R> {
        if self.status == TxStatus::FailedInProgress {
            self.completed.last()
        } else {
            None
        }
    }

    /// Pops the step returned by [`next_to_undo`](Self::next_to_undo) after
    /// its undo ran, recording an undo failure if there was one.
    pub fn pop_undone(&mut self, name: &str, undo_failure: Option<UndoFailure>) {
        if self.status != TxStatus::FailedInProgress || self.completed.pop().is_none() {
            return;
        }
        match undo_failure {
            None => self.audit.record_undone(name),
            Some(failure) => {
                self.audit.record_undo_failed(name);
                self.undo_failures.push(failure);
            }
        }
    }

    /// Ends the rollback once every completed step has been undone.
    ///
    /// # Errors
    ///
    /// Returns [`FateError::InvalidTransition`] unless the record is
    /// `FAILED_IN_PROGRESS`.
    pub fn finish_rollback(&mut self) -> Result<()> {
        self.transition(TxStatus::Failed)?;
        self.completed.clear();
        Ok(())
    }
}
