//! Steps of a durable transaction.
//!
//! A transaction is a chain of [`Repo`] steps. Each step does one unit of
//! work against a shared environment and names the step that follows it.
//! Steps that completed are kept so they can be undone, newest first, if a
//! later step fails.

mod audit;
mod error;
mod repo;

pub use audit::{StepAudit, StepRecord, StepStatus, UndoFailure};
pub use error::RepoError;
pub use repo::Repo;
