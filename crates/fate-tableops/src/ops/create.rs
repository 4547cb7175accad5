use fate_core::{LockMode, TxId};
use fate_repo::RepoError;
use tracing::{debug, info};

use super::TableOp;
use super::reserve::{TableTarget, catalog_error, release_all, release_quietly, reserve_all};
use crate::env::TableOpsEnv;
use crate::error::CatalogError;
use crate::traits::TableCatalog;

pub(super) fn prepare<C: TableCatalog>(
    target: &TableTarget,
    tid: TxId,
    env: &TableOpsEnv<C>,
) -> Result<Option<TableOp>, RepoError> {
    let grants = target.grants(LockMode::Write)?;
    reserve_all(env.reservations(), tid, &grants)?;

    if let Err(err) = check_absent(target, env.catalog()) {
        release_quietly(env.reservations(), tid, &grants);
        return Err(err);
    }

    debug!(namespace = %target.namespace, table = %target.table, "reserved table for creation");
    Ok(Some(TableOp::PopulateCatalog(target.clone())))
}

fn check_absent<C: TableCatalog>(target: &TableTarget, catalog: &C) -> Result<(), RepoError> {
    if !catalog
        .namespace_exists(&target.namespace)
        .map_err(catalog_error)?
    {
        return Err(catalog_error(CatalogError::NamespaceNotFound(
            target.namespace.clone(),
        )));
    }
    if catalog.table_exists(&target.table).map_err(catalog_error)? {
        return Err(catalog_error(CatalogError::TableExists {
            namespace: target.namespace.clone(),
            table: target.table.clone(),
        }));
    }
    Ok(())
}

pub(super) fn populate<C: TableCatalog>(
    target: &TableTarget,
    env: &TableOpsEnv<C>,
) -> Result<Option<TableOp>, RepoError> {
    env.catalog()
        .create_table(&target.namespace, &target.table)
        .map_err(catalog_error)?;
    Ok(Some(TableOp::FinishCreateTable(target.clone())))
}

pub(super) fn unpopulate<C: TableCatalog>(
    target: &TableTarget,
    env: &TableOpsEnv<C>,
) -> Result<(), RepoError> {
    debug!(table = %target.table, "removing partially created table");
    env.catalog()
        .remove_table(&target.table)
        .map_err(catalog_error)
}

pub(super) fn finish<C: TableCatalog>(
    target: &TableTarget,
    tid: TxId,
    env: &TableOpsEnv<C>,
) -> Result<Option<TableOp>, RepoError> {
    release_all(env.reservations(), tid, &target.grants(LockMode::Write)?)?;
    info!(namespace = %target.namespace, table = %target.table, "created table");
    Ok(None)
}
