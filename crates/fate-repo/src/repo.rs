use fate_core::TxId;

use crate::error::RepoError;

/// A step in a transaction that can be executed and undone.
///
/// Implementors form a closed set of variants, usually an enum with one
/// variant per step of each administrative operation. The executor persists
/// steps between transitions, so implementors are also expected to be
/// serializable.
///
/// # Type Parameters
///
/// - `E`: Shared environment the step mutates (injected, not persisted)
pub trait Repo<E>: Sized + Send + Sync {
    /// Human-readable name for logging and the audit trail.
    fn name(&self) -> &'static str;

    /// Execute the step.
    ///
    /// Returns the next step, or `None` when the chain is complete. The step
    /// counts as completed only once this returns `Ok`. The executor may call
    /// this again with the same `tid` after a transient error, so the forward
    /// effects must tolerate re-execution.
    ///
    /// # Errors
    ///
    /// Returns [`RepoError::Transient`] to be called again later, or
    /// [`RepoError::Permanent`] to roll the transaction back.
    fn call(&self, tid: TxId, env: &E) -> Result<Option<Self>, RepoError>;

    /// Compensate the step's effects.
    ///
    /// Called only for steps whose `call` completed, newest first, when a
    /// later step fails. Must cope with forward effects that were only
    /// partially visible. The default implementation is a no-op, suitable for
    /// read-only steps.
    ///
    /// # Errors
    ///
    /// Returns an error if compensation fails. The rollback continues with
    /// the remaining steps regardless.
    fn undo(&self, tid: TxId, env: &E) -> Result<(), RepoError> {
        let _ = (tid, env);
        Ok(())
    }

    /// Human-readable description of what undo will do.
    fn undo_description(&self) -> String {
        format!("undo {}", self.name())
    }
}
