//! The tenant-scoped access path used by ordinary request code.
//!
//! `TenantGuard` never takes a tenant from its caller: every operation reads
//! the tenant bound by [`tenancy_security::context`] and fails closed with
//! [`AccessError::NoTenantContext`] when there is none.
//!
//! # Example
//!
//! ```ignore
//! pub struct ProductsRepo {
//!     db: TenantGuard,
//! }
//!
//! impl ProductsRepo {
//!     pub async fn by_sku(&self, sku: &str) -> Result<Option<product::Model>, AccessError> {
//!         self.db
//!             .find::<product::Entity>()?
//!             .filter(Condition::all().add(product::Column::Sku.eq(sku)))
//!             .one(&self.db)
//!             .await
//!     }
//! }
//! ```

use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel,
};
use uuid::Uuid;

use crate::secure::db_ops::{self, SecureDeleteExt, SecureUpdateExt};
use crate::secure::{
    AccessError, AccessScope, ScopableEntity, Scoped, SecureDeleteMany, SecureEntityExt,
    SecureSelect, SecureUpdateMany,
};

/// Tenant-scoped data access handle.
///
/// Cheap to clone; holds a pooled connection handle only.
#[derive(Clone)]
pub struct TenantGuard {
    pub(crate) conn: DatabaseConnection,
}

impl std::fmt::Debug for TenantGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantGuard").finish_non_exhaustive()
    }
}

impl TenantGuard {
    pub(crate) fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Scoped select over `E` for the current tenant.
    ///
    /// # Errors
    /// Returns `AccessError::NoTenantContext` if no tenant is bound and `E` is
    /// not tenant-exempt.
    #[allow(clippy::unused_self)] // method form keeps call sites uniform with PlatformConn
    pub fn find<E>(&self) -> Result<SecureSelect<E, Scoped>, AccessError>
    where
        E: ScopableEntity + EntityTrait,
        E::Column: ColumnTrait + Copy,
    {
        let scope = AccessScope::for_entity::<E>()?;
        Ok(E::find().secure().scope_with(&scope))
    }

    /// Scoped select narrowed to one resource id.
    ///
    /// # Errors
    /// Same as [`TenantGuard::find`].
    pub fn find_by_id<E>(&self, id: Uuid) -> Result<SecureSelect<E, Scoped>, AccessError>
    where
        E: ScopableEntity + EntityTrait,
        E::Column: ColumnTrait + Copy,
    {
        Ok(self.find::<E>()?.and_id(id))
    }

    /// Fetch one row of the current tenant.
    ///
    /// # Errors
    /// Returns `AccessError::NotFound` when the row does not exist in the
    /// current tenant, including when it belongs to another tenant.
    #[tracing::instrument(skip_all, fields(entity = std::any::type_name::<E>(), %id))]
    pub async fn get<E>(&self, id: Uuid) -> Result<E::Model, AccessError>
    where
        E: ScopableEntity + EntityTrait,
        E::Column: ColumnTrait + Copy,
    {
        self.find_by_id::<E>(id)?
            .one(self)
            .await?
            .ok_or(AccessError::NotFound)
    }

    /// All rows of the current tenant.
    ///
    /// # Errors
    /// Same as [`TenantGuard::find`], plus `AccessError::Db`.
    pub async fn list<E>(&self) -> Result<Vec<E::Model>, AccessError>
    where
        E: ScopableEntity + EntityTrait,
        E::Column: ColumnTrait + Copy,
    {
        self.find::<E>()?.all(self).await
    }

    /// Create a row owned by the current tenant.
    ///
    /// The tenant column is stamped from context. Supplying a different tenant
    /// id fails; supplying the same one is accepted.
    ///
    /// # Errors
    /// - `AccessError::NoTenantContext` if no tenant is bound
    /// - `AccessError::TenantMismatch` for a foreign `tenant_id`
    /// - `AccessError::ScopedUniquenessViolation` when a scoped unique rule is hit
    /// - `AccessError::Invalid` for tenant-exempt entities
    #[tracing::instrument(skip_all, fields(entity = std::any::type_name::<E>()))]
    pub async fn create<E>(&self, am: E::ActiveModel) -> Result<E::Model, AccessError>
    where
        E: ScopableEntity + EntityTrait,
        E::Column: ColumnTrait + Copy,
        E::ActiveModel: ActiveModelTrait<Entity = E> + Send,
        E::Model: IntoActiveModel<E::ActiveModel>,
    {
        let scope = Self::write_scope::<E>()?;
        db_ops::insert_owned::<E>(&self.conn, scope.tenant_id(), am).await
    }

    /// Update a row of the current tenant.
    ///
    /// Only `Set` fields are written. Rows of other tenants are reported as
    /// not found.
    ///
    /// # Errors
    /// - `AccessError::NotFound` when `id` is not visible in the current tenant
    /// - `AccessError::TenantMismatch` when the update tries to move the row
    /// - `AccessError::ScopedUniquenessViolation` when a scoped unique rule is hit
    #[tracing::instrument(skip_all, fields(entity = std::any::type_name::<E>(), %id))]
    pub async fn update<E>(&self, id: Uuid, am: E::ActiveModel) -> Result<E::Model, AccessError>
    where
        E: ScopableEntity + EntityTrait,
        E::Column: ColumnTrait + Copy,
        E::ActiveModel: ActiveModelTrait<Entity = E> + Send,
    {
        let scope = Self::write_scope::<E>()?;
        db_ops::update_scoped::<E>(&self.conn, &scope, id, am).await
    }

    /// Delete a row of the current tenant.
    ///
    /// # Errors
    /// Returns `AccessError::NotFound` when `id` is not visible in the current tenant.
    #[tracing::instrument(skip_all, fields(entity = std::any::type_name::<E>(), %id))]
    pub async fn delete<E>(&self, id: Uuid) -> Result<(), AccessError>
    where
        E: ScopableEntity + EntityTrait,
        E::Column: ColumnTrait + Copy,
    {
        let scope = Self::write_scope::<E>()?;
        db_ops::delete_scoped::<E>(&self.conn, &scope, id).await
    }

    /// Scoped bulk update over the current tenant's rows.
    ///
    /// # Errors
    /// Same as [`TenantGuard::create`] for scope resolution.
    #[allow(clippy::unused_self)]
    pub fn update_many<E>(&self) -> Result<SecureUpdateMany<E, Scoped>, AccessError>
    where
        E: ScopableEntity + EntityTrait,
        E::Column: ColumnTrait + Copy,
    {
        let scope = Self::write_scope::<E>()?;
        Ok(E::update_many().secure_update().scope_with(&scope))
    }

    /// Scoped bulk delete over the current tenant's rows.
    ///
    /// # Errors
    /// Same as [`TenantGuard::create`] for scope resolution.
    #[allow(clippy::unused_self)]
    pub fn delete_many<E>(&self) -> Result<SecureDeleteMany<E, Scoped>, AccessError>
    where
        E: ScopableEntity + EntityTrait,
        E::Column: ColumnTrait + Copy,
    {
        let scope = Self::write_scope::<E>()?;
        Ok(E::delete_many().secure_delete().scope_with(&scope))
    }

    fn write_scope<E: ScopableEntity>() -> Result<AccessScope, AccessError> {
        if E::IS_TENANT_EXEMPT {
            return Err(AccessError::Invalid(
                "tenant-exempt entities are writable through the escape hatch only",
            ));
        }
        AccessScope::for_entity::<E>()
    }
}
