//! The fault-tolerant executor.
//!
//! [`Fate`] runs transactions made of [`Repo`](fate_repo::Repo) steps on a
//! fixed pool of worker threads. Every transition is persisted through a
//! [`TxLog`] before the next one starts, so a restarted executor resumes each
//! unfinished transaction where it stopped: forward execution for
//! `IN_PROGRESS`, the undo walk for `FAILED_IN_PROGRESS`.

mod config;
mod engine;
mod error;
mod log;
mod record;
mod scheduler;

pub use config::{ConfigError, FateConfig};
pub use engine::Fate;
pub use error::{FateError, Result};
pub use log::TxLog;
pub use record::{FailureKind, RECORD_FORMAT, TxFailure, TxRecord};
