use tenancy_security::{TenantId, context};

use crate::secure::{AccessError, ScopableEntity};

/// Tenant scope applied to a query.
///
/// Request code can only obtain a scope through [`AccessScope::current`],
/// which reads the task-local tenant. The unrestricted scope is constructed
/// inside this crate and handed out by the escape hatch alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessScope {
    // `None` means every tenant.
    tenant: Option<TenantId>,
}

impl AccessScope {
    /// Scope of the tenant bound to the running task.
    ///
    /// # Errors
    /// Returns [`AccessError::NoTenantContext`] when no tenant is bound.
    pub fn current() -> Result<Self, AccessError> {
        context::current_id()
            .map(Self::tenant)
            .ok_or(AccessError::NoTenantContext { entity: "<any>" })
    }

    pub(crate) fn tenant(id: TenantId) -> Self {
        Self { tenant: Some(id) }
    }

    pub(crate) fn all_tenants() -> Self {
        Self { tenant: None }
    }

    /// The tenant this scope is restricted to, or `None` for the unrestricted scope.
    #[must_use]
    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant
    }

    #[must_use]
    pub fn is_unrestricted(&self) -> bool {
        self.tenant.is_none()
    }

    /// Scope for an operation on `E` issued by ordinary request code.
    ///
    /// Fails closed: a tenant-owned entity with no bound tenant is a
    /// programming error in the caller and is logged as such.
    pub(crate) fn for_entity<E: ScopableEntity>() -> Result<Self, AccessError> {
        if let Some(id) = context::current_id() {
            return Ok(Self::tenant(id));
        }
        if E::IS_TENANT_EXEMPT {
            // no tenant column to filter on
            return Ok(Self::all_tenants());
        }
        let entity = std::any::type_name::<E>();
        tracing::error!(
            entity,
            "tenant-owned entity accessed without a bound tenant context"
        );
        Err(AccessError::NoTenantContext { entity })
    }
}
