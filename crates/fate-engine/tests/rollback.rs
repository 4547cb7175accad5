//! Integration tests for forward execution, rollback and step retries.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use fate_core::{TxId, TxStatus};
use fate_engine::{Fate, FateConfig, FailureKind};
use fate_repo::{Repo, RepoError, StepStatus};
use fate_retry::RetryPolicy;
use fate_store::MemoryStore;
use serde::{Deserialize, Serialize};

#[derive(Default)]
struct Journal {
    entries: Mutex<Vec<String>>,
    fail_at: Option<u32>,
    broken_undo_at: Option<u32>,
    panicking_undo_at: Option<u32>,
    transient_at: Option<u32>,
    transient_failures: Mutex<u32>,
    gate_open: AtomicBool,
}

impl Journal {
    fn push(&self, entry: String) {
        self.entries.lock().expect("journal lock").push(entry);
    }

    fn entries(&self) -> Vec<String> {
        self.entries.lock().expect("journal lock").clone()
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Step {
    Stage { index: u32, last: u32 },
    Gated,
    Boom,
}

impl Repo<Journal> for Step {
    fn name(&self) -> &'static str {
        match self {
            Self::Stage { .. } => "stage",
            Self::Gated => "gated",
            Self::Boom => "boom",
        }
    }

    fn call(&self, _tid: TxId, env: &Journal) -> Result<Option<Self>, RepoError> {
        match *self {
            Self::Stage { index, last } => {
                env.push(format!("call {index}"));
                if env.transient_at == Some(index) {
                    let mut remaining = env.transient_failures.lock().expect("counter lock");
                    if *remaining > 0 {
                        *remaining -= 1;
                        return Err(RepoError::transient(format!("stage {index} busy")));
                    }
                }
                if env.fail_at == Some(index) {
                    return Err(RepoError::permanent(format!("stage {index} broke")));
                }
                Ok((index < last).then_some(Self::Stage {
                    index: index + 1,
                    last,
                }))
            }
            Self::Gated => {
                if env.gate_open.load(Ordering::SeqCst) {
                    env.push("gated passed".to_string());
                    Ok(None)
                } else {
                    Err(RepoError::transient("gate closed"))
                }
            }
            Self::Boom => panic!("catalog entry missing"),
        }
    }

    fn undo(&self, _tid: TxId, env: &Journal) -> Result<(), RepoError> {
        if let Self::Stage { index, .. } = *self {
            env.push(format!("undo {index}"));
            if env.broken_undo_at == Some(index) {
                return Err(RepoError::permanent(format!("undo of stage {index} broke")));
            }
            if env.panicking_undo_at == Some(index) {
                panic!("undo of stage {index} panicked");
            }
        }
        Ok(())
    }
}

fn fast_policy(max_retries: Option<u64>) -> RetryPolicy {
    let wait = Duration::from_millis(2);
    match max_retries {
        Some(max) => RetryPolicy::bounded(max, wait, wait, wait, Duration::from_secs(60)),
        None => RetryPolicy::unbounded(wait, wait, wait, Duration::from_secs(60)),
    }
}

fn start(journal: Journal, workers: usize, step_retries: Option<u64>) -> Fate<Step, Journal> {
    let config = FateConfig::default()
        .with_workers(workers)
        .with_store_retry(fast_policy(Some(3)))
        .with_step_retry(fast_policy(step_retries))
        .with_poll_interval(Duration::from_millis(5));
    Fate::start(Arc::new(journal), Arc::new(MemoryStore::new()), config).expect("start executor")
}

fn stages(last: u32) -> Step {
    Step::Stage { index: 1, last }
}

#[test]
fn chain_runs_every_stage_in_order() -> anyhow::Result<()> {
    let fate = start(Journal::default(), 2, None);

    let tid = fate.submit(stages(3))?;

    assert_eq!(fate.wait_for_completion(tid)?, TxStatus::Successful);
    assert_eq!(fate.env().entries(), vec!["call 1", "call 2", "call 3"]);
    Ok(())
}

#[test]
fn failing_step_undoes_completed_steps_only() -> anyhow::Result<()> {
    let journal = Journal {
        fail_at: Some(2),
        ..Journal::default()
    };
    let fate = start(journal, 2, None);

    let tid = fate.submit(stages(3))?;

    assert_eq!(fate.wait_for_completion(tid)?, TxStatus::Failed);
    assert_eq!(fate.env().entries(), vec!["call 1", "call 2", "undo 1"]);

    let failure = fate.failure(tid)?.expect("failure recorded");
    assert_eq!(failure.kind, FailureKind::StepFailed);
    assert!(failure.message.contains("stage 2 broke"));

    let statuses: Vec<_> = fate
        .audit(tid)?
        .records()
        .iter()
        .map(|record| record.status)
        .collect();
    assert_eq!(statuses, vec![StepStatus::Undone, StepStatus::Failed]);
    Ok(())
}

#[test]
fn undo_failure_does_not_stop_rollback() -> anyhow::Result<()> {
    let journal = Journal {
        fail_at: Some(3),
        broken_undo_at: Some(2),
        ..Journal::default()
    };
    let fate = start(journal, 2, None);

    let tid = fate.submit(stages(3))?;

    assert_eq!(fate.wait_for_completion(tid)?, TxStatus::Failed);
    assert_eq!(
        fate.env().entries(),
        vec!["call 1", "call 2", "call 3", "undo 2", "undo 1"]
    );

    let failure = fate.failure(tid)?.expect("failure recorded");
    assert!(failure.message.contains("stage 3 broke"));

    let undo_failures = fate.undo_failures(tid)?;
    assert_eq!(undo_failures.len(), 1);
    assert!(undo_failures[0].message.contains("undo of stage 2 broke"));
    Ok(())
}

#[test]
fn transient_step_is_called_again_until_it_succeeds() -> anyhow::Result<()> {
    let journal = Journal {
        transient_at: Some(2),
        transient_failures: Mutex::new(2),
        ..Journal::default()
    };
    let fate = start(journal, 1, None);

    let tid = fate.submit(stages(3))?;

    assert_eq!(fate.wait_for_completion(tid)?, TxStatus::Successful);
    assert_eq!(
        fate.env().entries(),
        vec!["call 1", "call 2", "call 2", "call 2", "call 3"]
    );
    assert!(fate.failure(tid)?.is_none());
    Ok(())
}

#[test]
fn bounded_step_retry_exhaustion_rolls_back() -> anyhow::Result<()> {
    let journal = Journal {
        transient_at: Some(2),
        transient_failures: Mutex::new(u32::MAX),
        ..Journal::default()
    };
    let fate = start(journal, 1, Some(2));

    let tid = fate.submit(stages(3))?;

    assert_eq!(fate.wait_for_completion(tid)?, TxStatus::Failed);
    assert_eq!(
        fate.env().entries(),
        vec!["call 1", "call 2", "call 2", "call 2", "undo 1"]
    );
    let failure = fate.failure(tid)?.expect("failure recorded");
    assert_eq!(failure.kind, FailureKind::RetriesExhausted);
    Ok(())
}

#[test]
fn waiting_transaction_does_not_hold_the_only_worker() -> anyhow::Result<()> {
    let fate = start(Journal::default(), 1, None);

    let gated = fate.submit(Step::Gated)?;
    let other = fate.submit(stages(1))?;

    assert_eq!(fate.wait_for_completion(other)?, TxStatus::Successful);
    assert_eq!(fate.status(gated)?, TxStatus::InProgress);

    fate.env().gate_open.store(true, Ordering::SeqCst);

    assert_eq!(fate.wait_for_completion(gated)?, TxStatus::Successful);
    assert_eq!(fate.env().entries(), vec!["call 1", "gated passed"]);
    Ok(())
}

#[test]
fn unfinished_transaction_cannot_be_deleted() -> anyhow::Result<()> {
    let fate = start(Journal::default(), 1, None);
    let gated = fate.submit(Step::Gated)?;

    let err = fate.delete(gated).expect_err("still running");

    assert!(matches!(err, fate_engine::FateError::NotTerminal { .. }));
    fate.env().gate_open.store(true, Ordering::SeqCst);
    fate.wait_for_completion(gated)?;
    fate.delete(gated)?;
    assert!(fate.transactions()?.is_empty());
    Ok(())
}

#[test]
fn panicking_step_rolls_back_and_frees_its_worker() -> anyhow::Result<()> {
    let fate = start(Journal::default(), 1, None);

    let broken = fate.submit(Step::Boom)?;
    let healthy = fate.submit(stages(1))?;

    assert_eq!(fate.wait_for_completion(broken)?, TxStatus::Failed);
    assert_eq!(fate.wait_for_completion(healthy)?, TxStatus::Successful);

    let failure = fate.failure(broken)?.expect("failure recorded");
    assert_eq!(failure.step, "boom");
    assert_eq!(failure.kind, FailureKind::StepFailed);
    assert!(failure.message.contains("catalog entry missing"));
    Ok(())
}

#[test]
fn panicking_undo_is_recorded_and_rollback_continues() -> anyhow::Result<()> {
    let journal = Journal {
        fail_at: Some(3),
        panicking_undo_at: Some(2),
        ..Journal::default()
    };
    let fate = start(journal, 1, None);

    let tid = fate.submit(stages(3))?;

    assert_eq!(fate.wait_for_completion(tid)?, TxStatus::Failed);
    assert_eq!(
        fate.env().entries(),
        vec!["call 1", "call 2", "call 3", "undo 2", "undo 1"]
    );
    let undo_failures = fate.undo_failures(tid)?;
    assert_eq!(undo_failures.len(), 1);
    assert_eq!(undo_failures[0].step, "stage");
    assert!(undo_failures[0].message.contains("undo of stage 2 panicked"));
    Ok(())
}
