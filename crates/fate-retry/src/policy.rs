use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::Retry;

const DEFAULT_MAX_RETRIES: u64 = 10;
const DEFAULT_START_WAIT: Duration = Duration::from_millis(250);
const DEFAULT_WAIT_INCREMENT: Duration = Duration::from_millis(250);
const DEFAULT_MAX_WAIT: Duration = Duration::from_millis(5000);
const DEFAULT_LOG_INTERVAL: Duration = Duration::from_secs(3 * 60);

/// Immutable description of how a retry session backs off and when it gives up.
///
/// `max_retries` of `None` means the session never gives up. Such policies are
/// meant for infrastructure-level maintenance (re-establishing a coordination
/// session) where stopping is never the right call; bounded policies wrap
/// operations whose caller can surface a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawRetryPolicy", into = "RawRetryPolicy")]
pub struct RetryPolicy {
    max_retries: Option<u64>,
    start_wait: Duration,
    wait_increment: Duration,
    max_wait: Duration,
    log_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::bounded(
            DEFAULT_MAX_RETRIES,
            DEFAULT_START_WAIT,
            DEFAULT_WAIT_INCREMENT,
            DEFAULT_MAX_WAIT,
            DEFAULT_LOG_INTERVAL,
        )
    }
}

impl RetryPolicy {
    /// Policy that gives up after `max_retries` retries.
    #[must_use]
    pub fn bounded(
        max_retries: u64,
        start_wait: Duration,
        wait_increment: Duration,
        max_wait: Duration,
        log_interval: Duration,
    ) -> Self {
        Self {
            max_retries: Some(max_retries),
            start_wait,
            wait_increment,
            max_wait,
            log_interval,
        }
    }

    /// Policy that retries forever.
    #[must_use]
    pub fn unbounded(
        start_wait: Duration,
        wait_increment: Duration,
        max_wait: Duration,
        log_interval: Duration,
    ) -> Self {
        Self {
            max_retries: None,
            start_wait,
            wait_increment,
            max_wait,
            log_interval,
        }
    }

    #[must_use]
    pub fn max_retries(&self) -> Option<u64> {
        self.max_retries
    }

    #[must_use]
    pub fn is_unbounded(&self) -> bool {
        self.max_retries.is_none()
    }

    #[must_use]
    pub fn start_wait(&self) -> Duration {
        self.start_wait
    }

    #[must_use]
    pub fn wait_increment(&self) -> Duration {
        self.wait_increment
    }

    #[must_use]
    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }

    #[must_use]
    pub fn log_interval(&self) -> Duration {
        self.log_interval
    }

    /// Starts a fresh retry session for one logical operation.
    #[must_use]
    pub fn create(&self) -> Retry {
        Retry::new(self)
    }
}

/// On-disk form of a policy: durations in milliseconds, and `max-retries`
/// either a count or the keyword `"unlimited"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
struct RawRetryPolicy {
    max_retries: RawMaxRetries,
    start_wait_ms: u64,
    wait_increment_ms: u64,
    max_wait_ms: u64,
    log_interval_ms: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(untagged)]
enum RawMaxRetries {
    Count(u64),
    Keyword(Unlimited),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Unlimited {
    Unlimited,
}

impl Default for RawRetryPolicy {
    fn default() -> Self {
        RetryPolicy::default().into()
    }
}

impl From<RawRetryPolicy> for RetryPolicy {
    fn from(raw: RawRetryPolicy) -> Self {
        Self {
            max_retries: match raw.max_retries {
                RawMaxRetries::Count(count) => Some(count),
                RawMaxRetries::Keyword(Unlimited::Unlimited) => None,
            },
            start_wait: Duration::from_millis(raw.start_wait_ms),
            wait_increment: Duration::from_millis(raw.wait_increment_ms),
            max_wait: Duration::from_millis(raw.max_wait_ms),
            log_interval: Duration::from_millis(raw.log_interval_ms),
        }
    }
}

impl From<RetryPolicy> for RawRetryPolicy {
    fn from(policy: RetryPolicy) -> Self {
        Self {
            max_retries: policy
                .max_retries
                .map_or(RawMaxRetries::Keyword(Unlimited::Unlimited), RawMaxRetries::Count),
            start_wait_ms: millis(policy.start_wait),
            wait_increment_ms: millis(policy.wait_increment),
            max_wait_ms: millis(policy.max_wait),
            log_interval_ms: millis(policy.log_interval),
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
