use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::Utc;
use fate_core::{TxId, TxStatus};
use fate_repo::{Repo, RepoError, StepAudit, UndoFailure};
use fate_retry::{RetriesExhausted, Retry};
use fate_store::{CoordinationStore, RetryingStore};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, info_span, warn};

use crate::config::FateConfig;
use crate::error::{FateError, Result};
use crate::log::TxLog;
use crate::record::{FailureKind, TxFailure, TxRecord};
use crate::scheduler::{Outcome, Scheduler};

/// The fault-tolerant executor.
///
/// Owns a pool of worker threads that advance submitted transactions one
/// transition at a time. Dropping the executor shuts the pool down; any
/// unfinished transaction is picked up again by the next executor started
/// on the same store.
///
/// # Type Parameters
///
/// - `R`: Step type, usually an enum with one variant per step
/// - `E`: Environment shared by all steps
pub struct Fate<R, E> {
    inner: Arc<Inner<R, E>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

struct Inner<R, E> {
    env: Arc<E>,
    log: TxLog<R>,
    scheduler: Scheduler,
    config: FateConfig,
}

impl<R, E> Fate<R, E>
where
    R: Repo<E> + Serialize + DeserializeOwned + 'static,
    E: Send + Sync + 'static,
{
    /// Starts an executor over `store`.
    ///
    /// Every store call is retried according to `config.store_retry()`.
    /// Transactions left `IN_PROGRESS` or `FAILED_IN_PROGRESS` by a previous
    /// executor are resumed; `NEW` ones were never handed over and stay put.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid, the log cannot be scanned,
    /// or a worker thread cannot be spawned.
    pub fn start(
        env: Arc<E>,
        store: Arc<dyn CoordinationStore>,
        config: FateConfig,
    ) -> Result<Self> {
        config.validate()?;
        let store: Arc<dyn CoordinationStore> =
            Arc::new(RetryingStore::new(store, *config.store_retry()));

        let inner = Arc::new(Inner {
            env,
            log: TxLog::new(store),
            scheduler: Scheduler::new(config.poll_interval()),
            config,
        });

        let resumed = inner.recover()?;
        info!(resumed, workers = inner.config.workers(), "starting executor");

        let fate = Self {
            inner,
            workers: Mutex::new(Vec::new()),
        };
        fate.spawn_workers()?;
        Ok(fate)
    }

    fn spawn_workers(&self) -> Result<()> {
        let mut workers = self.workers.lock().map_err(|_| FateError::Poisoned)?;
        for index in 0..self.inner.config.workers() {
            let inner = Arc::clone(&self.inner);
            let handle = thread::Builder::new()
                .name(format!("fate-worker-{index}"))
                .spawn(move || inner.run_worker())
                .map_err(FateError::SpawnWorker)?;
            workers.push(handle);
        }
        Ok(())
    }

    /// Submits a transaction whose first step is `first`.
    ///
    /// The record is persisted as `NEW`, then handed to the workers as
    /// `IN_PROGRESS`.
    ///
    /// # Errors
    ///
    /// Returns an error if the executor is shut down or the record cannot be
    /// persisted.
    pub fn submit(&self, first: R) -> Result<TxId> {
        if self.inner.scheduler.is_shutdown()? {
            return Err(FateError::Shutdown);
        }
        let log = &self.inner.log;
        let tid = log.allocate_tid()?;
        let mut record = TxRecord::new(tid, first);
        log.write(&record)?;
        record.seed()?;
        log.write(&record)?;
        info!(%tid, "submitted transaction");
        self.inner.scheduler.enqueue(tid)?;
        Ok(tid)
    }

    fn record(&self, tid: TxId) -> Result<TxRecord<R>> {
        self.inner.log.read(tid)?.ok_or(FateError::UnknownTx(tid))
    }

    /// # Errors
    ///
    /// Returns [`FateError::UnknownTx`] if no such transaction is logged.
    pub fn status(&self, tid: TxId) -> Result<TxStatus> {
        Ok(self.record(tid)?.status())
    }

    /// The failure that rolled the transaction back, if any.
    ///
    /// # Errors
    ///
    /// Returns [`FateError::UnknownTx`] if no such transaction is logged.
    pub fn failure(&self, tid: TxId) -> Result<Option<TxFailure>> {
        Ok(self.record(tid)?.failure().cloned())
    }

    /// Undo errors met while rolling the transaction back.
    ///
    /// # Errors
    ///
    /// Returns [`FateError::UnknownTx`] if no such transaction is logged.
    pub fn undo_failures(&self, tid: TxId) -> Result<Vec<UndoFailure>> {
        Ok(self.record(tid)?.undo_failures().to_vec())
    }

    /// Per-step history of the transaction.
    ///
    /// # Errors
    ///
    /// Returns [`FateError::UnknownTx`] if no such transaction is logged.
    pub fn audit(&self, tid: TxId) -> Result<StepAudit> {
        Ok(self.record(tid)?.audit().clone())
    }

    /// Blocks until the transaction is `SUCCESSFUL` or `FAILED`.
    ///
    /// # Errors
    ///
    /// Returns [`FateError::UnknownTx`] if no such transaction is logged and
    /// [`FateError::Shutdown`] if the executor stops first.
    pub fn wait_for_completion(&self, tid: TxId) -> Result<TxStatus> {
        self.inner.scheduler.wait_until(|| {
            let status = self.status(tid)?;
            Ok(status.is_terminal().then_some(status))
        })
    }

    /// All logged transactions with their status, by ascending id.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be listed or a record cannot be
    /// read.
    pub fn transactions(&self) -> Result<Vec<(TxId, TxStatus)>> {
        let log = &self.inner.log;
        let mut transactions = Vec::new();
        for tid in log.list()? {
            if let Some(record) = log.read(tid)? {
                transactions.push((tid, record.status()));
            }
        }
        Ok(transactions)
    }

    /// Removes a finished transaction from the log.
    ///
    /// # Errors
    ///
    /// Returns [`FateError::NotTerminal`] unless the transaction is
    /// `SUCCESSFUL` or `FAILED`.
    pub fn delete(&self, tid: TxId) -> Result<()> {
        let status = self.status(tid)?;
        if !status.is_terminal() {
            return Err(FateError::NotTerminal { tid, status });
        }
        self.inner.log.delete(tid)?;
        debug!(%tid, "deleted transaction");
        Ok(())
    }

    #[must_use]
    pub fn env(&self) -> &Arc<E> {
        &self.inner.env
    }

    #[must_use]
    pub fn config(&self) -> &FateConfig {
        &self.inner.config
    }

    /// Stops the workers after their current transition and joins them.
    ///
    /// # Errors
    ///
    /// Returns [`FateError::Poisoned`] if the executor state is poisoned.
    pub fn shutdown(&self) -> Result<()> {
        self.inner.scheduler.shutdown()?;
        let handles: Vec<_> = self
            .workers
            .lock()
            .map_err(|_| FateError::Poisoned)?
            .drain(..)
            .collect();
        if handles.is_empty() {
            return Ok(());
        }
        for handle in handles {
            if handle.join().is_err() {
                error!("worker thread panicked");
            }
        }
        info!("executor stopped");
        Ok(())
    }
}

impl<R, E> Drop for Fate<R, E> {
    fn drop(&mut self) {
        if self.inner.scheduler.shutdown().is_err() {
            return;
        }
        if let Ok(mut workers) = self.workers.lock() {
            for handle in workers.drain(..) {
                let _ = handle.join();
            }
        }
    }
}

impl<R, E> Inner<R, E>
where
    R: Repo<E> + Serialize + DeserializeOwned + 'static,
    E: Send + Sync + 'static,
{
    /// Queues every runnable transaction found in the log.
    fn recover(&self) -> Result<usize> {
        let mut resumed = 0;
        for tid in self.log.list()? {
            let record = match self.log.read(tid) {
                Ok(Some(record)) => record,
                Ok(None) => continue,
                Err(err @ (FateError::Corrupt { .. } | FateError::UnsupportedFormat { .. })) => {
                    error!(%tid, error = %err, "skipping unreadable transaction");
                    continue;
                }
                Err(err) => return Err(err),
            };
            if record.status().is_runnable() {
                debug!(%tid, status = %record.status(), "resuming transaction");
                self.scheduler.enqueue(tid)?;
                resumed += 1;
            }
        }
        Ok(resumed)
    }

    fn run_worker(&self) {
        loop {
            let tid = match self.scheduler.next() {
                Ok(Some(tid)) => tid,
                Ok(None) => return,
                Err(err) => {
                    error!(error = %err, "worker stopping");
                    return;
                }
            };

            let outcome = match panic::catch_unwind(AssertUnwindSafe(|| self.advance(tid))) {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(err)) => {
                    error!(%tid, error = %err, "transition failed; will try again");
                    Outcome::Defer(self.config.poll_interval())
                }
                Err(payload) => {
                    let panic = panic_message(payload.as_ref());
                    error!(%tid, panic, "transition panicked; will try again");
                    Outcome::Defer(self.config.poll_interval())
                }
            };

            if let Err(err) = self.scheduler.finish(tid, outcome) {
                error!(%tid, error = %err, "worker stopping");
                return;
            }
        }
    }

    /// Performs exactly one transition of `tid` and persists it.
    fn advance(&self, tid: TxId) -> Result<Outcome> {
        let Some(mut record) = self.log.read(tid)? else {
            warn!(%tid, "transaction disappeared from the log");
            return Ok(Outcome::Done);
        };
        match record.status() {
            TxStatus::InProgress => self.execute_current(&mut record),
            TxStatus::FailedInProgress => self.undo_next(&mut record),
            TxStatus::New | TxStatus::Successful | TxStatus::Failed => Ok(Outcome::Done),
        }
    }

    fn execute_current(&self, record: &mut TxRecord<R>) -> Result<Outcome> {
        let tid = record.tid();
        let step = record.current().ok_or(FateError::MissingStep(tid))?;
        let name = step.name();
        let span = info_span!("call", %tid, step = name);
        let _entered = span.enter();

        debug!("executing step");
        match contain_panic(|| step.call(tid, &self.env)) {
            Ok(next) => {
                let undo_description = step.undo_description();
                let next_name = next.as_ref().map(|next| next.name());
                record.complete_current(name, undo_description, next)?;
                self.log.write(record)?;
                self.scheduler.clear_retry(tid)?;
                match next_name {
                    Some(next) => {
                        debug!(next, "step completed");
                        Ok(Outcome::Requeue)
                    }
                    None => {
                        info!("transaction succeeded");
                        Ok(Outcome::Done)
                    }
                }
            }
            Err(err) if err.is_transient() => {
                let policy = self.config.step_retry();
                let decision = self
                    .scheduler
                    .with_retry(tid, policy, |retry| pace(retry, "step will be retried", &err))?;
                match decision {
                    Ok(wait) => Ok(Outcome::Defer(wait)),
                    Err(RetriesExhausted { retries }) => {
                        self.scheduler.clear_retry(tid)?;
                        let failure = TxFailure {
                            step: name.to_string(),
                            kind: FailureKind::RetriesExhausted,
                            message: format!("{} (after {retries} retries)", err.chain()),
                        };
                        self.fail(record, failure)
                    }
                }
            }
            Err(err) => {
                let failure = TxFailure {
                    step: name.to_string(),
                    kind: FailureKind::StepFailed,
                    message: err.chain(),
                };
                self.fail(record, failure)
            }
        }
    }

    fn fail(&self, record: &mut TxRecord<R>, failure: TxFailure) -> Result<Outcome> {
        warn!(failure = %failure, "rolling back transaction");
        record.fail_current(failure)?;
        self.log.write(record)?;
        Ok(Outcome::Requeue)
    }

    fn undo_next(&self, record: &mut TxRecord<R>) -> Result<Outcome> {
        let tid = record.tid();
        let Some(step) = record.next_to_undo() else {
            record.finish_rollback()?;
            self.log.write(record)?;
            info!(
                %tid,
                undo_failures = record.undo_failures().len(),
                steps = %record.audit().summary(),
                "transaction rolled back"
            );
            return Ok(Outcome::Done);
        };

        let name = step.name();
        let span = info_span!("undo", %tid, step = name);
        let _entered = span.enter();

        debug!("undoing step");
        let failure = match contain_panic(|| step.undo(tid, &self.env)) {
            Ok(()) => None,
            Err(err) if err.is_transient() => {
                let policy = self.config.step_retry();
                let decision = self
                    .scheduler
                    .with_retry(tid, policy, |retry| pace(retry, "undo will be retried", &err))?;
                match decision {
                    Ok(wait) => return Ok(Outcome::Defer(wait)),
                    Err(RetriesExhausted { .. }) => {
                        Some(undo_failure(name, step.undo_description(), &err))
                    }
                }
            }
            Err(err) => Some(undo_failure(name, step.undo_description(), &err)),
        };

        if let Some(failure) = &failure {
            warn!(error = %failure.message, "undo failed; continuing rollback");
        }
        record.pop_undone(name, failure);
        self.log.write(record)?;
        self.scheduler.clear_retry(tid)?;
        Ok(Outcome::Requeue)
    }
}

/// Consumes one retry of a transient step error and returns how long to
/// defer the transaction.
fn pace(
    retry: &mut Retry,
    message: &str,
    err: &RepoError,
) -> std::result::Result<Duration, RetriesExhausted> {
    retry.use_retry()?;
    retry.log_retry(message, err);
    Ok(retry.next_wait())
}

/// Runs a step callback, reporting a panic as a permanent error.
fn contain_panic<T>(
    f: impl FnOnce() -> std::result::Result<T, RepoError>,
) -> std::result::Result<T, RepoError> {
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        Err(RepoError::permanent(format!(
            "step panicked: {}",
            panic_message(payload.as_ref())
        )))
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

fn undo_failure(step: &str, description: String, err: &RepoError) -> UndoFailure {
    UndoFailure {
        step: step.to_string(),
        description,
        message: err.chain(),
        at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use fate_retry::RetryPolicy;
    use fate_store::MemoryStore;
    use serde::Deserialize;

    use super::*;

    #[derive(Default)]
    struct Counter {
        calls: AtomicUsize,
    }

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(tag = "op", rename_all = "snake_case")]
    enum Tick {
        Count { remaining: u32 },
    }

    impl Repo<Counter> for Tick {
        fn name(&self) -> &'static str {
            "count"
        }

        fn call(&self, _tid: TxId, env: &Counter) -> std::result::Result<Option<Self>, RepoError> {
            let Self::Count { remaining } = self;
            env.calls.fetch_add(1, Ordering::SeqCst);
            Ok((*remaining > 0).then(|| Self::Count {
                remaining: remaining - 1,
            }))
        }
    }

    fn fast_config() -> FateConfig {
        let fast = RetryPolicy::bounded(
            3,
            Duration::from_millis(1),
            Duration::from_millis(1),
            Duration::from_millis(5),
            Duration::from_secs(60),
        );
        FateConfig::default()
            .with_workers(2)
            .with_store_retry(fast)
            .with_step_retry(fast)
            .with_poll_interval(Duration::from_millis(5))
    }

    fn start() -> Result<Fate<Tick, Counter>> {
        Fate::start(
            Arc::new(Counter::default()),
            Arc::new(MemoryStore::new()),
            fast_config(),
        )
    }

    #[test]
    fn runs_chain_to_success() -> anyhow::Result<()> {
        let fate = start()?;

        let tid = fate.submit(Tick::Count { remaining: 2 })?;

        assert_eq!(fate.wait_for_completion(tid)?, TxStatus::Successful);
        assert_eq!(fate.env().calls.load(Ordering::SeqCst), 3);
        assert!(fate.failure(tid)?.is_none());
        Ok(())
    }

    #[test]
    fn unknown_transaction_is_an_error() -> anyhow::Result<()> {
        let fate = start()?;

        let err = fate.status(TxId::new(99)).expect_err("unknown");

        assert!(matches!(err, FateError::UnknownTx(_)));
        Ok(())
    }

    #[test]
    fn delete_removes_finished_transaction() -> anyhow::Result<()> {
        let fate = start()?;
        let tid = fate.submit(Tick::Count { remaining: 0 })?;
        fate.wait_for_completion(tid)?;

        fate.delete(tid)?;

        assert!(fate.transactions()?.is_empty());
        Ok(())
    }

    #[test]
    fn submit_after_shutdown_is_rejected() -> anyhow::Result<()> {
        let fate = start()?;
        fate.shutdown()?;

        let err = fate
            .submit(Tick::Count { remaining: 0 })
            .expect_err("shut down");

        assert!(matches!(err, FateError::Shutdown));
        Ok(())
    }

    #[test]
    fn rejects_zero_workers() {
        let result: Result<Fate<Tick, Counter>> = Fate::start(
            Arc::new(Counter::default()),
            Arc::new(MemoryStore::new()),
            FateConfig::default().with_workers(0),
        );

        assert!(matches!(result, Err(FateError::Config(_))));
    }

    #[test]
    fn lists_transactions_with_status() -> anyhow::Result<()> {
        let fate = start()?;
        let first = fate.submit(Tick::Count { remaining: 0 })?;
        let second = fate.submit(Tick::Count { remaining: 1 })?;
        fate.wait_for_completion(first)?;
        fate.wait_for_completion(second)?;

        let listed = fate.transactions()?;

        assert_eq!(
            listed,
            vec![
                (first, TxStatus::Successful),
                (second, TxStatus::Successful)
            ]
        );
        Ok(())
    }
}
