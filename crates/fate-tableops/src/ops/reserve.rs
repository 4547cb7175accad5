use fate_core::{LockMode, ResourceId, TxId};
use fate_repo::RepoError;
use fate_reservation::{ReservationError, ReservationManager};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::CatalogError;

/// The table an operation works on, and the namespace it lives in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableTarget {
    pub namespace: String,
    pub table: String,
}

impl TableTarget {
    pub fn new(namespace: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            table: table.into(),
        }
    }

    /// Grants an operation needs: the namespace for reading, the table in
    /// `table_mode`. Namespace first, so every operation acquires in the same
    /// order.
    pub(crate) fn grants(
        &self,
        table_mode: LockMode,
    ) -> Result<[(ResourceId, LockMode); 2], RepoError> {
        let namespace = ResourceId::namespace(self.namespace.clone())
            .map_err(|err| RepoError::permanent_with("invalid namespace id", err))?;
        let table = ResourceId::table(self.table.clone())
            .map_err(|err| RepoError::permanent_with("invalid table id", err))?;
        Ok([(namespace, LockMode::Read), (table, table_mode)])
    }
}

pub(crate) fn reservation_error(err: ReservationError) -> RepoError {
    match err {
        ReservationError::Store(store) if store.is_transient() => {
            RepoError::transient(store.to_string())
        }
        other => RepoError::permanent_with("reservation bookkeeping failed", other),
    }
}

pub(crate) fn catalog_error(err: CatalogError) -> RepoError {
    if err.is_transient() {
        RepoError::transient(err.to_string())
    } else {
        RepoError::permanent_with("catalog rejected the operation", err)
    }
}

/// Acquires every grant in `wanted` for `tid`, or none of them.
///
/// A conflict is transient: the step is called again later and tries the
/// whole set afresh.
pub(crate) fn reserve_all(
    reservations: &ReservationManager,
    tid: TxId,
    wanted: &[(ResourceId, LockMode)],
) -> Result<(), RepoError> {
    for (index, (resource, mode)) in wanted.iter().enumerate() {
        match reservations.reserve(resource, tid, *mode) {
            Ok(true) => {}
            Ok(false) => {
                release_quietly(reservations, tid, &wanted[..index]);
                return Err(RepoError::transient(format!(
                    "{resource} is reserved by another transaction"
                )));
            }
            Err(err) => {
                release_quietly(reservations, tid, &wanted[..index]);
                return Err(reservation_error(err));
            }
        }
    }
    Ok(())
}

/// Releases `held` in reverse acquisition order. Releasing a grant that is
/// not held is a no-op.
pub(crate) fn release_all(
    reservations: &ReservationManager,
    tid: TxId,
    held: &[(ResourceId, LockMode)],
) -> Result<(), RepoError> {
    for (resource, mode) in held.iter().rev() {
        reservations
            .unreserve(resource, tid, *mode)
            .map_err(reservation_error)?;
    }
    Ok(())
}

/// Releases `held` on a path that is already failing; a release error is
/// logged rather than masking the original one.
pub(crate) fn release_quietly(
    reservations: &ReservationManager,
    tid: TxId,
    held: &[(ResourceId, LockMode)],
) {
    if let Err(err) = release_all(reservations, tid, held) {
        warn!(%tid, error = %err.chain(), "failed to release reservations");
    }
}
