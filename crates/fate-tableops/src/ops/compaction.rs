use fate_core::{LockMode, TxId};
use fate_repo::RepoError;
use tracing::info;

use super::TableOp;
use super::reserve::{TableTarget, catalog_error, release_all, release_quietly, reserve_all};
use crate::env::TableOpsEnv;
use crate::traits::TableCatalog;

pub(super) fn cancel<C: TableCatalog>(
    target: &TableTarget,
    tid: TxId,
    env: &TableOpsEnv<C>,
) -> Result<Option<TableOp>, RepoError> {
    let grants = target.grants(LockMode::Read)?;
    reserve_all(env.reservations(), tid, &grants)?;

    match env.catalog().cancel_compactions(&target.table) {
        Ok(cancel_id) => {
            info!(table = %target.table, cancel_id, "cancelled compactions");
            Ok(Some(TableOp::FinishCancelCompaction(target.clone())))
        }
        Err(err) => {
            release_quietly(env.reservations(), tid, &grants);
            Err(catalog_error(err))
        }
    }
}

/// Releases the read grants taken by [`cancel`]; nothing to undo.
pub(super) fn finish<C: TableCatalog>(
    target: &TableTarget,
    tid: TxId,
    env: &TableOpsEnv<C>,
) -> Result<Option<TableOp>, RepoError> {
    release_all(env.reservations(), tid, &target.grants(LockMode::Read)?)?;
    Ok(None)
}
