pub mod error;
mod resource;
mod status;
mod tid;

pub use error::*;
pub use resource::{LockMode, ResourceId, ResourceKind};
pub use status::TxStatus;
pub use tid::TxId;
