mod compaction;
mod create;
mod delete;
mod reserve;

use fate_core::{LockMode, TxId};
use fate_repo::{Repo, RepoError};
use serde::{Deserialize, Serialize};

pub use reserve::TableTarget;
use reserve::release_all;

use crate::env::TableOpsEnv;
use crate::traits::TableCatalog;

/// Every step of every table operation.
///
/// Persisted with an explicit `op` tag so a restarted executor can resume a
/// chain from its log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TableOp {
    PrepareCreateTable(TableTarget),
    PopulateCatalog(TableTarget),
    FinishCreateTable(TableTarget),
    PreDeleteTable(TableTarget),
    CleanUpTable(TableTarget),
    FinishDeleteTable(TableTarget),
    CancelCompactions(TableTarget),
    FinishCancelCompaction(TableTarget),
}

impl TableOp {
    /// First step of creating `table` in `namespace`.
    pub fn create_table(namespace: impl Into<String>, table: impl Into<String>) -> Self {
        Self::PrepareCreateTable(TableTarget::new(namespace, table))
    }

    /// First step of deleting `table` from `namespace`.
    pub fn delete_table(namespace: impl Into<String>, table: impl Into<String>) -> Self {
        Self::PreDeleteTable(TableTarget::new(namespace, table))
    }

    /// First step of cancelling the running compactions of `table`.
    pub fn cancel_compactions(namespace: impl Into<String>, table: impl Into<String>) -> Self {
        Self::CancelCompactions(TableTarget::new(namespace, table))
    }

    #[must_use]
    pub fn target(&self) -> &TableTarget {
        match self {
            Self::PrepareCreateTable(target)
            | Self::PopulateCatalog(target)
            | Self::FinishCreateTable(target)
            | Self::PreDeleteTable(target)
            | Self::CleanUpTable(target)
            | Self::FinishDeleteTable(target)
            | Self::CancelCompactions(target)
            | Self::FinishCancelCompaction(target) => target,
        }
    }
}

impl<C> Repo<TableOpsEnv<C>> for TableOp
where
    C: TableCatalog,
{
    fn name(&self) -> &'static str {
        match self {
            Self::PrepareCreateTable(_) => "prepare_create_table",
            Self::PopulateCatalog(_) => "populate_catalog",
            Self::FinishCreateTable(_) => "finish_create_table",
            Self::PreDeleteTable(_) => "pre_delete_table",
            Self::CleanUpTable(_) => "clean_up_table",
            Self::FinishDeleteTable(_) => "finish_delete_table",
            Self::CancelCompactions(_) => "cancel_compactions",
            Self::FinishCancelCompaction(_) => "finish_cancel_compaction",
        }
    }

    fn call(&self, tid: TxId, env: &TableOpsEnv<C>) -> Result<Option<Self>, RepoError> {
        match self {
            Self::PrepareCreateTable(target) => create::prepare(target, tid, env),
            Self::PopulateCatalog(target) => create::populate(target, env),
            Self::FinishCreateTable(target) => create::finish(target, tid, env),
            Self::PreDeleteTable(target) => delete::pre_delete(target, tid, env),
            Self::CleanUpTable(target) => delete::clean_up(target, env),
            Self::FinishDeleteTable(target) => delete::finish(target, tid, env),
            Self::CancelCompactions(target) => compaction::cancel(target, tid, env),
            Self::FinishCancelCompaction(target) => compaction::finish(target, tid, env),
        }
    }

    fn undo(&self, tid: TxId, env: &TableOpsEnv<C>) -> Result<(), RepoError> {
        match self {
            Self::PrepareCreateTable(target) | Self::PreDeleteTable(target) => {
                release_all(env.reservations(), tid, &target.grants(LockMode::Write)?)
            }
            Self::CancelCompactions(target) => {
                release_all(env.reservations(), tid, &target.grants(LockMode::Read)?)
            }
            Self::PopulateCatalog(target) => create::unpopulate(target, env),
            Self::FinishCreateTable(_)
            | Self::CleanUpTable(_)
            | Self::FinishDeleteTable(_)
            | Self::FinishCancelCompaction(_) => Ok(()),
        }
    }

    fn undo_description(&self) -> String {
        let target = self.target();
        match self {
            Self::PrepareCreateTable(_) | Self::PreDeleteTable(_) => format!(
                "release reservations on namespace '{}' and table '{}'",
                target.namespace, target.table
            ),
            Self::CancelCompactions(_) => format!(
                "release read reservations on namespace '{}' and table '{}'",
                target.namespace, target.table
            ),
            Self::PopulateCatalog(_) => format!("remove table '{}' from the catalog", target.table),
            Self::CleanUpTable(_) => format!("table '{}' stays removed", target.table),
            Self::FinishCreateTable(_)
            | Self::FinishDeleteTable(_)
            | Self::FinishCancelCompaction(_) => "nothing to undo".to_string(),
        }
    }
}
