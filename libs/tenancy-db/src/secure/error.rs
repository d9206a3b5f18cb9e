use tenancy_security::TenantId;

/// Errors raised by tenant-scoped data access.
#[derive(thiserror::Error, Debug)]
pub enum AccessError {
    /// A tenant-owned entity was touched outside any tenant binding.
    #[error("no tenant context bound while accessing {entity}")]
    NoTenantContext { entity: &'static str },

    /// A write carried a `tenant_id` other than the bound tenant, or tried to
    /// change the `tenant_id` of an existing row.
    #[error("tenant mismatch: operation is bound to tenant {expected}")]
    TenantMismatch { expected: TenantId },

    /// A tenant-scoped uniqueness rule rejected the write. The caller may retry
    /// with different input.
    #[error("scoped uniqueness violation on {constraint}")]
    ScopedUniquenessViolation { constraint: &'static str },

    /// No row with that id exists in the current scope.
    #[error("entity not found")]
    NotFound,

    /// Invalid use of the access layer.
    #[error("invalid access: {0}")]
    Invalid(&'static str),

    /// Database error occurred during query execution.
    #[error("database error: {0}")]
    Db(#[from] sea_orm::DbErr),
}

impl AccessError {
    /// Whether the caller can reasonably retry with adjusted input.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ScopedUniquenessViolation { .. })
    }
}
