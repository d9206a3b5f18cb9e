#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Tenant identity, actor identity and the task-local tenant context.

pub mod context;
pub mod subject;
pub mod tenant;

pub use context::{BindTenantExt, bind, bind_sync, current, current_id, is_bound, spawn_for_tenant};
pub use subject::{Subject, SubjectKind};
pub use tenant::{Tenant, TenantId, TenantStatus, UnknownTenantStatus};
