//! Task-local "current tenant" binding.
//!
//! The binding lives in tokio task-local storage, so every request task sees
//! only its own tenant. Nothing here is inherited by `tokio::spawn`, timers or
//! queued work: deferred code must receive a [`Tenant`] as a parameter and
//! bind it again with [`bind`], [`spawn_for_tenant`] or
//! [`BindTenantExt::bind_tenant`].
//!
//! ```ignore
//! let tenant = directory.lookup("acme").await?;
//! context::bind(Some(tenant), async {
//!     // every TenantGuard call in here is filtered by acme's id
//!     handler().await
//! })
//! .await;
//! ```

use std::future::Future;

use tokio::task::JoinHandle;
use tokio::task::futures::TaskLocalFuture;

use crate::tenant::{Tenant, TenantId};

tokio::task_local! {
    // `None` marks an explicitly tenant-less unit (exempt routes).
    static CURRENT_TENANT: Option<Tenant>;
}

/// Run `fut` with `tenant` bound as the current tenant.
///
/// Passing `None` binds an explicit "no tenant" context. The previous binding
/// is restored when the returned future completes or is dropped.
pub fn bind<F>(tenant: Option<Tenant>, fut: F) -> TaskLocalFuture<Option<Tenant>, F>
where
    F: Future,
{
    if let Some(t) = &tenant {
        tracing::trace!(tenant_id = %t.id, tenant_key = %t.key, "binding tenant context");
    }
    CURRENT_TENANT.scope(tenant, fut)
}

/// Synchronous counterpart of [`bind`] for blocking sections.
pub fn bind_sync<R>(tenant: Option<Tenant>, f: impl FnOnce() -> R) -> R {
    CURRENT_TENANT.sync_scope(tenant, f)
}

/// The tenant bound to the running task, if any.
#[must_use]
pub fn current() -> Option<Tenant> {
    CURRENT_TENANT.try_with(Clone::clone).ok().flatten()
}

/// Id of the tenant bound to the running task, without cloning the tenant.
#[must_use]
pub fn current_id() -> Option<TenantId> {
    CURRENT_TENANT
        .try_with(|t| t.as_ref().map(|t| t.id))
        .ok()
        .flatten()
}

/// Whether the running task executes inside any binding, including an explicit
/// tenant-less one.
#[must_use]
pub fn is_bound() -> bool {
    CURRENT_TENANT.try_with(|_| ()).is_ok()
}

/// Spawn `fut` on the runtime with `tenant` bound inside the new task.
pub fn spawn_for_tenant<F>(tenant: Tenant, fut: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(bind(Some(tenant), fut))
}

/// Extension for binding a tenant onto an arbitrary future.
pub trait BindTenantExt: Future + Sized {
    /// Wrap `self` so it runs with `tenant` as the current tenant.
    fn bind_tenant(self, tenant: Tenant) -> TaskLocalFuture<Option<Tenant>, Self> {
        bind(Some(tenant), self)
    }
}

impl<F: Future> BindTenantExt for F {}
