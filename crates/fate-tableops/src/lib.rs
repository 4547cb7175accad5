//! Administrative table operations as fault-tolerant step chains.
//!
//! Each operation starts from one [`TableOp`] constructor and is run by a
//! `Fate` executor whose environment is a [`TableOpsEnv`].
//! Steps reserve the namespace and table they touch, so conflicting
//! operations on the same table run one after another.

mod env;
mod error;
mod ops;
mod providers;
mod traits;

pub use env::TableOpsEnv;
pub use error::{CatalogError, Result};
pub use ops::{TableOp, TableTarget};
pub use providers::InMemoryCatalog;
pub use traits::TableCatalog;
