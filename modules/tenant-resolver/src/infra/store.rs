//! [`TenantStore`] backed by the `tenants` table.

use async_trait::async_trait;
use sea_orm::{ColumnTrait, Condition};
use tenancy_db::{TenantGuard, tenants};
use tenancy_security::Tenant;

use crate::domain::directory::{StoreError, TenantStore};

/// Reads the tenant registry through the guard; the registry is tenant-exempt,
/// so this works before any tenant is bound.
#[derive(Debug, Clone)]
pub struct DbTenantStore {
    guard: TenantGuard,
}

impl DbTenantStore {
    #[must_use]
    pub fn new(guard: TenantGuard) -> Self {
        Self { guard }
    }
}

#[async_trait]
impl TenantStore for DbTenantStore {
    async fn find_by_key(&self, key: &str) -> Result<Option<Tenant>, StoreError> {
        let row = self
            .guard
            .find::<tenants::Entity>()
            .map_err(|e| StoreError::new(e.to_string()))?
            .filter(Condition::all().add(tenants::Column::Key.eq(key)))
            .one(&self.guard)
            .await
            .map_err(|e| StoreError::new(e.to_string()))?;

        row.map(Tenant::try_from)
            .transpose()
            .map_err(|e| StoreError::new(e.to_string()))
    }
}
