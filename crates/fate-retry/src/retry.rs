use std::fmt::{Debug, Display};
use std::time::{Duration, Instant};

use tracing::{trace, warn};

use crate::error::{RetriesExhausted, RetryError};
use crate::policy::RetryPolicy;
use crate::sleeper::Sleeper;

/// One live retry session.
///
/// Created from a [`RetryPolicy`] for a single logical operation and dropped
/// once the operation succeeds or the session is exhausted. The wait between
/// attempts starts at the policy's `start_wait` and grows linearly by
/// `wait_increment`, never exceeding `max_wait`.
#[derive(Debug, Clone)]
pub struct Retry {
    max_retries: Option<u64>,
    wait_increment: Duration,
    max_wait: Duration,
    log_interval: Duration,
    current_wait: Duration,
    retries_completed: u64,
    first_retry: Option<Instant>,
    last_log: Option<Instant>,
}

impl Retry {
    pub(crate) fn new(policy: &RetryPolicy) -> Self {
        Self {
            max_retries: policy.max_retries(),
            wait_increment: policy.wait_increment(),
            max_wait: policy.max_wait(),
            log_interval: policy.log_interval(),
            current_wait: policy.start_wait(),
            retries_completed: 0,
            first_retry: None,
            last_log: None,
        }
    }

    /// Whether another retry is allowed. Always true for unbounded sessions.
    #[must_use]
    pub fn can_retry(&self) -> bool {
        self.max_retries
            .is_none_or(|max| self.retries_completed < max)
    }

    /// Consumes one retry.
    ///
    /// # Errors
    ///
    /// Returns [`RetriesExhausted`] if the session has no retries left; the
    /// caller must then treat the underlying failure as permanent.
    pub fn use_retry(&mut self) -> Result<(), RetriesExhausted> {
        if !self.can_retry() {
            return Err(RetriesExhausted {
                retries: self.retries_completed,
            });
        }
        self.retries_completed += 1;
        Ok(())
    }

    #[must_use]
    pub fn has_retried(&self) -> bool {
        self.retries_completed > 0
    }

    #[must_use]
    pub fn retries_completed(&self) -> u64 {
        self.retries_completed
    }

    /// The wait the next call to [`next_wait`](Self::next_wait) will return.
    #[must_use]
    pub fn current_wait(&self) -> Duration {
        self.current_wait.min(self.max_wait)
    }

    /// Returns the wait for this attempt and advances the backoff.
    ///
    /// For callers that schedule the next attempt themselves instead of
    /// blocking a thread.
    pub fn next_wait(&mut self) -> Duration {
        let wait = self.current_wait();
        self.current_wait = self.current_wait.saturating_add(self.wait_increment);
        wait
    }

    /// Sleeps for the current wait and advances the backoff.
    pub fn wait_for_next_attempt(&mut self, sleeper: &dyn Sleeper) {
        let wait = self.next_wait();
        trace!(wait_ms = wait.as_millis(), "sleeping before next attempt");
        sleeper.sleep(wait);
    }

    /// Logs a retry, emitting a warning at most once per log interval.
    ///
    /// Returns `true` if the warning was emitted; retries in between are only
    /// traced.
    pub fn log_retry(&mut self, message: &str, error: &dyn Display) -> bool {
        self.log_retry_at(Instant::now(), message, error)
    }

    pub(crate) fn log_retry_at(&mut self, now: Instant, message: &str, error: &dyn Display) -> bool {
        let first = *self.first_retry.get_or_insert(now);
        let due = self
            .last_log
            .is_none_or(|last| now.saturating_duration_since(last) >= self.log_interval);
        let elapsed_ms = now.saturating_duration_since(first).as_millis();

        if due {
            self.last_log = Some(now);
            warn!(
                retries = self.retries_completed,
                elapsed_ms,
                error = %error,
                "{message}"
            );
        } else {
            trace!(
                retries = self.retries_completed,
                elapsed_ms,
                error = %error,
                "{message}"
            );
        }
        due
    }
}

/// Runs `op` under a fresh session of `policy`, retrying errors for which
/// `is_transient` returns true.
///
/// # Errors
///
/// Returns [`RetryError::Permanent`] for the first non-transient error and
/// [`RetryError::Exhausted`] once a bounded policy has no retries left.
pub fn retry_with<T, E, F, C>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    operation: &str,
    is_transient: C,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    E: Debug + Display,
    F: FnMut() -> Result<T, E>,
    C: Fn(&E) -> bool,
{
    let mut retry = policy.create();
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(error) if is_transient(&error) => {
                if let Err(exhausted) = retry.use_retry() {
                    return Err(RetryError::Exhausted {
                        operation: operation.to_string(),
                        retries: exhausted.retries,
                        last: error,
                    });
                }
                retry.log_retry(&format!("retrying {operation}"), &error);
                retry.wait_for_next_attempt(sleeper);
            }
            Err(source) => {
                return Err(RetryError::Permanent {
                    operation: operation.to_string(),
                    source,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sleeper::RecordingSleeper;

    fn millis(ms: u64) -> Duration {
        Duration::from_millis(ms)
    }

    fn default_unbounded() -> RetryPolicy {
        RetryPolicy::unbounded(millis(250), millis(250), millis(5000), Duration::from_secs(180))
    }

    #[test]
    fn waits_grow_linearly_until_capped() {
        let mut retry = default_unbounded().create();

        let waits: Vec<Duration> = (0..25).map(|_| retry.next_wait()).collect();

        assert_eq!(waits[0], millis(250));
        assert_eq!(waits[1], millis(500));
        assert_eq!(waits[2], millis(750));
        assert_eq!(waits[18], millis(4750));
        assert_eq!(waits[19], millis(5000));
        assert!(waits[19..].iter().all(|wait| *wait == millis(5000)));
    }

    #[test]
    fn bounded_session_exhausts_after_max_retries() {
        let mut retry = RetryPolicy::default().create();

        for _ in 0..10 {
            assert!(retry.can_retry());
            retry.use_retry().expect("retry available");
        }

        assert!(!retry.can_retry());
        assert_eq!(retry.use_retry(), Err(RetriesExhausted { retries: 10 }));
        assert_eq!(retry.retries_completed(), 10);
    }

    #[test]
    fn unbounded_session_never_exhausts() {
        let mut retry = default_unbounded().create();

        for _ in 0..10_000 {
            retry.use_retry().expect("unbounded retry");
        }

        assert!(retry.can_retry());
    }

    #[test]
    fn has_retried_flips_after_first_use() {
        let mut retry = RetryPolicy::default().create();
        assert!(!retry.has_retried());

        retry.use_retry().expect("retry available");

        assert!(retry.has_retried());
    }

    #[test]
    fn wait_for_next_attempt_sleeps_through_sleeper() {
        let sleeper = RecordingSleeper::new();
        let mut retry = RetryPolicy::default().create();

        retry.wait_for_next_attempt(&sleeper);
        retry.wait_for_next_attempt(&sleeper);

        assert_eq!(sleeper.sleeps(), vec![millis(250), millis(500)]);
    }

    #[test]
    fn log_retry_warns_once_per_interval() {
        let policy = RetryPolicy::bounded(
            100,
            millis(1),
            millis(1),
            millis(1),
            Duration::from_secs(60),
        );
        let mut retry = policy.create();
        let start = Instant::now();

        assert!(retry.log_retry_at(start, "retrying", &"boom"));
        assert!(!retry.log_retry_at(start + Duration::from_secs(10), "retrying", &"boom"));
        assert!(!retry.log_retry_at(start + Duration::from_secs(59), "retrying", &"boom"));
        assert!(retry.log_retry_at(start + Duration::from_secs(60), "retrying", &"boom"));
        assert!(!retry.log_retry_at(start + Duration::from_secs(90), "retrying", &"boom"));
    }

    #[test]
    fn retry_with_returns_value_after_transient_failures() {
        let sleeper = RecordingSleeper::new();
        let mut calls = 0;

        let result: Result<u32, RetryError<String>> = retry_with(
            &RetryPolicy::default(),
            &sleeper,
            "flaky",
            |_| true,
            || {
                calls += 1;
                if calls < 3 {
                    Err("session expired".to_string())
                } else {
                    Ok(7)
                }
            },
        );

        assert_eq!(result.expect("eventually succeeds"), 7);
        assert_eq!(sleeper.sleeps(), vec![millis(250), millis(500)]);
    }

    #[test]
    fn retry_with_stops_on_permanent_error() {
        let sleeper = RecordingSleeper::new();

        let result: Result<(), RetryError<String>> = retry_with(
            &RetryPolicy::default(),
            &sleeper,
            "doomed",
            |error: &String| error.starts_with("transient"),
            || Err("no such table".to_string()),
        );

        assert!(matches!(result, Err(RetryError::Permanent { .. })));
        assert!(sleeper.sleeps().is_empty());
    }

    #[test]
    fn retry_with_reports_exhaustion_with_last_error() {
        let sleeper = RecordingSleeper::new();
        let policy = RetryPolicy::bounded(2, millis(1), millis(1), millis(5), millis(1000));

        let result: Result<(), RetryError<String>> =
            retry_with(&policy, &sleeper, "down", |_| true, || Err("timeout".to_string()));

        match result {
            Err(RetryError::Exhausted { retries, last, .. }) => {
                assert_eq!(retries, 2);
                assert_eq!(last, "timeout");
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
        assert_eq!(sleeper.sleeps().len(), 2);
    }
}
