#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Tenant-isolated data access on a shared store.
//!
//! Ordinary code reads and writes tenant-owned entities through
//! [`TenantGuard`], which takes the tenant from the task-local context and
//! injects it into every statement. Cross-tenant work goes through
//! [`EscapeHatch`], which requires a platform administrator and writes an
//! audit record for every call.

pub mod config;
mod db;
pub mod escape;
mod migrations;
pub mod secure;
pub mod tenants;

pub use config::DbConfig;
pub use db::Db;
pub use escape::audit::{
    AuditOutcome, AuditRecord, AuditScope, AuditSink, MemoryAuditSink, TracingAuditSink,
};
pub use escape::{EscapeError, EscapeHatch, PlatformConn};
pub use secure::{
    AccessError, AccessScope, DbRunner, ScopableEntity, ScopedUnique, Scoped, SecureDeleteMany,
    SecureEntityExt, SecureSelect, SecureUpdateMany, TenantGuard, Unscoped,
};
