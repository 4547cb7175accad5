use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a step in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Step executed successfully.
    Executed,
    /// Step failed during execution.
    Failed,
    /// Step was undone successfully.
    Undone,
    /// Step undo failed.
    UndoFailed,
}

/// Record of a step's execution in a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub name: String,
    pub status: StepStatus,
    /// When the step completed or failed.
    pub executed_at: DateTime<Utc>,
    /// When undo ran, if it did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub undone_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub undo_description: Option<String>,
}

/// An undo that failed during rollback.
///
/// Kept separate from the failure that caused the rollback so diagnostics can
/// tell the two apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndoFailure {
    pub step: String,
    pub description: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Audit trail of all step executions and undos of one transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepAudit {
    records: Vec<StepRecord>,
}

impl StepAudit {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a step whose `call` returned successfully.
    pub fn record_executed(&mut self, name: &str, undo_description: String) {
        self.records.push(StepRecord {
            name: name.to_string(),
            status: StepStatus::Executed,
            executed_at: Utc::now(),
            undone_at: None,
            undo_description: Some(undo_description),
        });
    }

    /// Record a step whose `call` failed permanently.
    pub fn record_failed(&mut self, name: &str) {
        self.records.push(StepRecord {
            name: name.to_string(),
            status: StepStatus::Failed,
            executed_at: Utc::now(),
            undone_at: None,
            undo_description: None,
        });
    }

    /// Record that the most recent executed step named `name` was undone.
    pub fn record_undone(&mut self, name: &str) {
        self.mark_latest_executed(name, StepStatus::Undone);
    }

    /// Record that undoing the most recent executed step named `name` failed.
    pub fn record_undo_failed(&mut self, name: &str) {
        self.mark_latest_executed(name, StepStatus::UndoFailed);
    }

    fn mark_latest_executed(&mut self, name: &str, status: StepStatus) {
        if let Some(record) = self
            .records
            .iter_mut()
            .rev()
            .find(|r| r.name == name && r.status == StepStatus::Executed)
        {
            record.status = status;
            record.undone_at = Some(Utc::now());
        }
    }

    #[must_use]
    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    /// One-line rendering of the trail, e.g. `reserve undone, update failed`.
    #[must_use]
    pub fn summary(&self) -> String {
        self.records
            .iter()
            .map(|record| {
                let status = match record.status {
                    StepStatus::Executed => "executed",
                    StepStatus::Failed => "failed",
                    StepStatus::Undone => "undone",
                    StepStatus::UndoFailed => "undo failed",
                };
                format!("{} {status}", record.name)
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}
