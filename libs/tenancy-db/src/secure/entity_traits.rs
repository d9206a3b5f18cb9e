use sea_orm::EntityTrait;

/// A uniqueness rule that holds within one tenant.
///
/// Registered as a storage-level unique index over `(tenant_col, columns...)`
/// by [`Db::register_entity`](crate::Db::register_entity), so the same values
/// may exist once per tenant.
#[derive(Debug, Clone)]
pub struct ScopedUnique<C> {
    /// Index name; also reported back in
    /// [`AccessError::ScopedUniquenessViolation`](crate::AccessError::ScopedUniquenessViolation).
    pub name: &'static str,
    /// Columns that must be unique within a tenant. The tenant column is
    /// prepended automatically.
    pub columns: Vec<C>,
}

impl<C> ScopedUnique<C> {
    #[must_use]
    pub fn new(name: &'static str, columns: Vec<C>) -> Self {
        Self { name, columns }
    }
}

/// Declares how an entity participates in tenant isolation.
///
/// Every entity read or written through [`TenantGuard`](crate::TenantGuard)
/// must implement this trait.
///
/// # Example
/// ```rust,ignore
/// impl ScopableEntity for product::Entity {
///     fn tenant_col() -> Option<Self::Column> {
///         Some(product::Column::TenantId)
///     }
///     fn resource_col() -> Self::Column {
///         product::Column::Id
///     }
///     fn scoped_unique() -> Vec<ScopedUnique<Self::Column>> {
///         vec![ScopedUnique::new("ux_products_tenant_sku", vec![product::Column::Sku])]
///     }
/// }
/// ```
///
/// # Tenant-exempt entities
/// Global tables (the tenant registry itself, lookup tables) set
/// `IS_TENANT_EXEMPT = true` and return `None` from `tenant_col()`. They can be
/// read without a bound tenant, but are only writable through the escape hatch.
pub trait ScopableEntity: EntityTrait {
    /// Marks an entity that is not owned by any tenant.
    ///
    /// Default: `false`.
    const IS_TENANT_EXEMPT: bool = false;

    /// Column that stores the owning tenant id.
    ///
    /// `None` on a non-exempt entity makes every scoped query deny-all.
    fn tenant_col() -> Option<Self::Column>;

    /// Column that stores the primary resource identifier (a UUID).
    fn resource_col() -> Self::Column;

    /// Uniqueness rules qualified by tenant.
    fn scoped_unique() -> Vec<ScopedUnique<Self::Column>> {
        Vec::new()
    }
}
