//! Mutual exclusion between transactions touching the same table or namespace.
//!
//! A resource may be held by any number of readers or by exactly one
//! writer. Grants are persisted in the coordination store so they survive a
//! coordinator restart along with the transactions that own them.

mod entry;
mod error;
mod locks;
mod manager;

pub use entry::Reservation;
pub use error::{ReservationError, Result};
pub use manager::ReservationManager;
