use fate_core::{LockMode, TxId};
use fate_repo::RepoError;
use tracing::{debug, info};

use super::TableOp;
use super::reserve::{TableTarget, catalog_error, release_all, release_quietly, reserve_all};
use crate::env::TableOpsEnv;
use crate::error::CatalogError;
use crate::traits::TableCatalog;

pub(super) fn pre_delete<C: TableCatalog>(
    target: &TableTarget,
    tid: TxId,
    env: &TableOpsEnv<C>,
) -> Result<Option<TableOp>, RepoError> {
    let grants = target.grants(LockMode::Write)?;
    reserve_all(env.reservations(), tid, &grants)?;

    let exists = env
        .catalog()
        .table_exists(&target.table)
        .map_err(catalog_error)
        .and_then(|exists| {
            if exists {
                Ok(())
            } else {
                Err(catalog_error(CatalogError::TableNotFound(
                    target.table.clone(),
                )))
            }
        });
    if let Err(err) = exists {
        release_quietly(env.reservations(), tid, &grants);
        return Err(err);
    }

    debug!(table = %target.table, "reserved table for deletion");
    Ok(Some(TableOp::CleanUpTable(target.clone())))
}

pub(super) fn clean_up<C: TableCatalog>(
    target: &TableTarget,
    env: &TableOpsEnv<C>,
) -> Result<Option<TableOp>, RepoError> {
    env.catalog()
        .remove_table(&target.table)
        .map_err(catalog_error)?;
    Ok(Some(TableOp::FinishDeleteTable(target.clone())))
}

pub(super) fn finish<C: TableCatalog>(
    target: &TableTarget,
    tid: TxId,
    env: &TableOpsEnv<C>,
) -> Result<Option<TableOp>, RepoError> {
    release_all(env.reservations(), tid, &target.grants(LockMode::Write)?)?;
    info!(namespace = %target.namespace, table = %target.table, "deleted table");
    Ok(None)
}
