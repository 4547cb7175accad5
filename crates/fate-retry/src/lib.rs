//! Backoff retry for operations that fail transiently.
//!
//! A [`RetryPolicy`] is an immutable value describing how long to wait between
//! attempts and when to give up. Each logical operation creates its own
//! [`Retry`] session from the policy, which tracks attempts, the growing wait
//! and log throttling for that one invocation.

mod error;
mod policy;
mod retry;
mod sleeper;

pub use error::{RetriesExhausted, RetryError};
pub use policy::RetryPolicy;
pub use retry::{Retry, retry_with};
#[cfg(any(test, feature = "testing"))]
pub use sleeper::RecordingSleeper;
pub use sleeper::{Sleeper, ThreadSleeper};
