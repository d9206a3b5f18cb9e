//! Tenant-scoped ORM layer.
//!
//! Every query against a tenant-owned entity carries a `tenant_id = current()`
//! predicate that is applied by the access path itself, using the typestate
//! pattern to make unscoped execution a compile error.
//!
//! # Policy
//!
//! | Bound tenant | Entity           | Behavior                          |
//! |--------------|------------------|-----------------------------------|
//! | `Some(t)`    | tenant-owned     | Filter by `tenant_col = t`        |
//! | `None`       | tenant-owned     | `AccessError::NoTenantContext`    |
//! | any          | tenant-exempt    | No filter, read-only              |
//! | escape hatch | any              | No filter, audited                |
//!
//! Writes stamp the tenant column from context, updates never change it, and
//! updates or deletes of rows owned by other tenants report not-found.

mod cond;
mod db_ops;
mod entity_traits;
mod error;
pub(crate) mod guard;
pub(crate) mod runner;
mod scope;
mod select;

pub use entity_traits::{ScopableEntity, ScopedUnique};
pub use error::AccessError;
pub use guard::TenantGuard;
pub use runner::DbRunner;
pub use scope::AccessScope;
pub use select::{Scoped, SecureEntityExt, SecureSelect, Unscoped};
pub use db_ops::{SecureDeleteMany, SecureUpdateMany};

pub(crate) use db_ops::{delete_scoped, insert_owned, update_scoped};
