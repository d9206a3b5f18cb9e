#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Tenant resolution for inbound requests.
//!
//! [`TenantResolver`] turns a request host into a [`Tenant`](tenancy_security::Tenant)
//! through the cached [`TenantDirectory`]; [`tenant_context_middleware`] binds
//! the result around the axum handler. [`TenantProvisioning`] is the audited
//! writer of tenant records.

pub mod module;
pub use module::TenancyModule;

pub mod api;
pub mod config;
pub mod domain;
pub mod infra;

pub use api::middleware::tenant_context_middleware;
pub use api::problem::Problem;
pub use config::TenancyConfig;
pub use domain::directory::{DirectoryError, Lookup, StoreError, TenantDirectory, TenantStore};
pub use domain::jobs::{JobReport, for_each_active_tenant, run_for_tenant, spawn_for_tenant};
pub use domain::key::{KeyError, KeyRules};
pub use domain::onboarding::OnboardingMonitor;
pub use domain::provisioning::{NewTenant, ProvisioningError, TenantProvisioning};
pub use domain::resolver::{HostKey, InboundRequest, Resolution, ResolveError, TenantResolver};
pub use infra::store::DbTenantStore;
