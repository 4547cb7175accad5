use std::sync::Arc;

use fate_reservation::ReservationManager;

use crate::traits::TableCatalog;

/// Environment shared by every table operation step.
pub struct TableOpsEnv<C> {
    catalog: Arc<C>,
    reservations: Arc<ReservationManager>,
}

impl<C> Clone for TableOpsEnv<C> {
    fn clone(&self) -> Self {
        Self {
            catalog: Arc::clone(&self.catalog),
            reservations: Arc::clone(&self.reservations),
        }
    }
}

impl<C> TableOpsEnv<C>
where
    C: TableCatalog,
{
    pub fn new(catalog: Arc<C>, reservations: Arc<ReservationManager>) -> Self {
        Self {
            catalog,
            reservations,
        }
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn reservations(&self) -> &ReservationManager {
        &self.reservations
    }
}
