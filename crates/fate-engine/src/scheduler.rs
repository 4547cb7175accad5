use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use fate_core::TxId;
use fate_retry::{Retry, RetryPolicy};

use crate::error::{FateError, Result};

/// What a worker wants done with a transaction after one transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    /// Run the next transition as soon as a worker is free.
    Requeue,
    /// Run the next transition no earlier than the given delay.
    Defer(Duration),
    /// The transaction reached a terminal state (or vanished).
    Done,
}

#[derive(Debug, Default)]
struct State {
    queue: VecDeque<TxId>,
    deferred: Vec<(Instant, TxId)>,
    in_flight: HashSet<TxId>,
    retries: HashMap<TxId, Retry>,
    /// Bumped on every finished transition.
    transitions: u64,
    shutdown: bool,
}

impl State {
    fn is_scheduled(&self, tid: TxId) -> bool {
        self.in_flight.contains(&tid)
            || self.queue.contains(&tid)
            || self.deferred.iter().any(|(_, deferred)| *deferred == tid)
    }

    fn promote_due(&mut self, now: Instant) {
        let mut index = 0;
        while index < self.deferred.len() {
            if self.deferred[index].0 <= now {
                let (_, tid) = self.deferred.swap_remove(index);
                self.queue.push_back(tid);
            } else {
                index += 1;
            }
        }
    }

    fn next_due(&self) -> Option<Instant> {
        self.deferred.iter().map(|(at, _)| *at).min()
    }
}

/// In-memory run queue shared by the worker pool.
///
/// A transaction is owned by at most one worker at a time: it is either
/// queued, deferred until a deadline, in flight, or not scheduled at all.
pub(crate) struct Scheduler {
    state: Mutex<State>,
    work_ready: Condvar,
    tx_finished: Condvar,
    poll_interval: Duration,
}

impl Scheduler {
    pub(crate) fn new(poll_interval: Duration) -> Self {
        Self {
            state: Mutex::new(State::default()),
            work_ready: Condvar::new(),
            tx_finished: Condvar::new(),
            poll_interval,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state.lock().map_err(|_| FateError::Poisoned)
    }

    /// Queues `tid` unless it is already scheduled.
    pub(crate) fn enqueue(&self, tid: TxId) -> Result<()> {
        let mut state = self.lock()?;
        if !state.is_scheduled(tid) {
            state.queue.push_back(tid);
            self.work_ready.notify_one();
        }
        Ok(())
    }

    /// Blocks until a transaction is runnable and claims it for the caller.
    ///
    /// Returns `None` once [`shutdown`](Self::shutdown) was called.
    pub(crate) fn next(&self) -> Result<Option<TxId>> {
        let mut state = self.lock()?;
        loop {
            if state.shutdown {
                return Ok(None);
            }
            let now = Instant::now();
            state.promote_due(now);
            if let Some(tid) = state.queue.pop_front() {
                state.in_flight.insert(tid);
                return Ok(Some(tid));
            }
            let timeout = state
                .next_due()
                .map_or(self.poll_interval, |due| {
                    due.saturating_duration_since(now).min(self.poll_interval)
                });
            state = self
                .work_ready
                .wait_timeout(state, timeout)
                .map_err(|_| FateError::Poisoned)?
                .0;
        }
    }

    /// Releases a claimed transaction according to `outcome`.
    pub(crate) fn finish(&self, tid: TxId, outcome: Outcome) -> Result<()> {
        let mut state = self.lock()?;
        state.in_flight.remove(&tid);
        state.transitions = state.transitions.wrapping_add(1);
        match outcome {
            Outcome::Requeue => {
                state.queue.push_back(tid);
                self.work_ready.notify_one();
            }
            Outcome::Defer(delay) => {
                state.deferred.push((Instant::now() + delay, tid));
                self.work_ready.notify_one();
            }
            Outcome::Done => {
                state.retries.remove(&tid);
            }
        }
        self.tx_finished.notify_all();
        Ok(())
    }

    /// Runs `f` on the step retry session of `tid`, creating it from
    /// `policy` on first use.
    pub(crate) fn with_retry<T>(
        &self,
        tid: TxId,
        policy: &RetryPolicy,
        f: impl FnOnce(&mut Retry) -> T,
    ) -> Result<T> {
        let mut state = self.lock()?;
        let retry = state.retries.entry(tid).or_insert_with(|| policy.create());
        Ok(f(retry))
    }

    /// Drops the retry session of `tid` after it made progress.
    pub(crate) fn clear_retry(&self, tid: TxId) -> Result<()> {
        self.lock()?.retries.remove(&tid);
        Ok(())
    }

    /// Blocks until `done` returns `Some`, re-checking whenever a transition
    /// finishes and at least once per poll interval.
    ///
    /// `done` runs without the scheduler lock, so a slow store read never
    /// stalls the workers. A transition finishing during the check is caught
    /// by comparing the transition counter before waiting. Fails with
    /// [`FateError::Shutdown`] once the workers are gone.
    pub(crate) fn wait_until<T>(&self, mut done: impl FnMut() -> Result<Option<T>>) -> Result<T> {
        loop {
            let seen = self.lock()?.transitions;
            if let Some(value) = done()? {
                return Ok(value);
            }
            let state = self.lock()?;
            if state.transitions != seen {
                continue;
            }
            if state.shutdown {
                return Err(FateError::Shutdown);
            }
            let (_state, _timeout) = self
                .tx_finished
                .wait_timeout(state, self.poll_interval)
                .map_err(|_| FateError::Poisoned)?;
        }
    }

    pub(crate) fn is_shutdown(&self) -> Result<bool> {
        Ok(self.lock()?.shutdown)
    }

    pub(crate) fn shutdown(&self) -> Result<()> {
        self.lock()?.shutdown = true;
        self.work_ready.notify_all();
        self.tx_finished.notify_all();
        Ok(())
    }
}
