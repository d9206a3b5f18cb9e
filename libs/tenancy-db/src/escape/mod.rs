//! Audited exit from tenant scope.
//!
//! [`EscapeHatch`] is the only way to run cross-tenant or tenant-less data
//! access: onboarding, platform-admin tooling, jobs that iterate all tenants.
//! Both entry points require a platform-admin [`Subject`] and emit exactly one
//! [`AuditRecord`](audit::AuditRecord) per invocation, whatever the outcome.
//!
//! ```ignore
//! let tenants = escape
//!     .without_tenant_scope(&admin, "list_tenants", |db| {
//!         Box::pin(async move { db.find::<tenants::Entity>().all(db).await })
//!     })
//!     .await?;
//! ```

pub mod audit;

use std::{future::Future, pin::Pin, sync::Arc};

use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel};
use tenancy_security::{Subject, Tenant, TenantId, context};
use uuid::Uuid;

use crate::secure::{
    self, AccessError, AccessScope, ScopableEntity, Scoped, SecureEntityExt, SecureSelect,
    TenantGuard,
};
use audit::{AuditGuard, AuditOutcome, AuditScope, AuditSink};

/// Failure of an escape-hatch invocation.
#[derive(thiserror::Error, Debug)]
pub enum EscapeError<E> {
    /// The actor is not a platform administrator. Always audited.
    #[error("subject {subject} is not authorized to leave tenant scope")]
    Unauthorized { subject: Uuid },

    /// The wrapped operation failed.
    #[error("{0}")]
    Operation(E),
}

impl<E> EscapeError<E> {
    /// Collapse into the operation's error type, mapping the authorization failure.
    pub fn into_operation<F>(self, map_unauthorized: F) -> E
    where
        F: FnOnce(Uuid) -> E,
    {
        match self {
            Self::Unauthorized { subject } => map_unauthorized(subject),
            Self::Operation(e) => e,
        }
    }
}

/// Handle for audited cross-tenant work.
#[derive(Clone)]
pub struct EscapeHatch {
    conn: DatabaseConnection,
    sink: Arc<dyn AuditSink>,
}

impl std::fmt::Debug for EscapeHatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EscapeHatch").finish_non_exhaustive()
    }
}

type BoxedWork<'c, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'c>>;

impl EscapeHatch {
    pub(crate) fn new(conn: DatabaseConnection, sink: Arc<dyn AuditSink>) -> Self {
        Self { conn, sink }
    }

    /// Run `f` with an unfiltered [`PlatformConn`].
    ///
    /// The ambient tenant binding is cleared for the duration of `f`, so any
    /// [`TenantGuard`] use inside it fails closed instead of widening scope.
    ///
    /// # Errors
    /// - `EscapeError::Unauthorized` if `actor` is not a platform administrator
    /// - `EscapeError::Operation` with the error returned by `f`
    #[tracing::instrument(skip_all, fields(%operation, actor = %actor.id()))]
    pub async fn without_tenant_scope<T, E, F>(
        &self,
        actor: &Subject,
        operation: &str,
        f: F,
    ) -> Result<T, EscapeError<E>>
    where
        T: Send,
        E: std::fmt::Display + Send,
        F: for<'c> FnOnce(&'c PlatformConn) -> BoxedWork<'c, T, E> + Send,
    {
        let audit = self.authorize(actor, operation, AuditScope::AllTenants)?;
        let platform = PlatformConn {
            conn: self.conn.clone(),
        };
        let res = context::bind(None, f(&platform)).await;
        Self::settle(audit, res)
    }

    /// Run `f` with `tenant` bound as the current tenant.
    ///
    /// `f` receives an ordinary [`TenantGuard`]; all of its operations are
    /// scoped to `tenant`.
    ///
    /// # Errors
    /// - `EscapeError::Unauthorized` if `actor` is not a platform administrator
    /// - `EscapeError::Operation` with the error returned by `f`
    #[tracing::instrument(skip_all, fields(%operation, actor = %actor.id(), tenant_id = %tenant.id))]
    pub async fn with_explicit_tenant<T, E, F>(
        &self,
        actor: &Subject,
        tenant: &Tenant,
        operation: &str,
        f: F,
    ) -> Result<T, EscapeError<E>>
    where
        T: Send,
        E: std::fmt::Display + Send,
        F: for<'c> FnOnce(&'c TenantGuard) -> BoxedWork<'c, T, E> + Send,
    {
        let audit = self.authorize(actor, operation, AuditScope::Tenant(tenant.id))?;
        let guard = TenantGuard::new(self.conn.clone());
        let res = context::bind(Some(tenant.clone()), f(&guard)).await;
        Self::settle(audit, res)
    }

    fn authorize<E>(
        &self,
        actor: &Subject,
        operation: &str,
        scope: AuditScope,
    ) -> Result<AuditGuard, EscapeError<E>> {
        let audit = AuditGuard::start(Arc::clone(&self.sink), actor, operation, scope);
        if !actor.is_platform_admin() {
            tracing::warn!(
                actor = %actor.id(),
                kind = ?actor.kind(),
                operation,
                "escape hatch denied for non-admin subject"
            );
            audit.finish(AuditOutcome::Denied, None);
            return Err(EscapeError::Unauthorized {
                subject: actor.id(),
            });
        }
        Ok(audit)
    }

    fn settle<T, E: std::fmt::Display>(
        audit: AuditGuard,
        res: Result<T, E>,
    ) -> Result<T, EscapeError<E>> {
        match res {
            Ok(v) => {
                audit.finish(AuditOutcome::Succeeded, None);
                Ok(v)
            }
            Err(e) => {
                audit.finish(AuditOutcome::Failed, Some(e.to_string()));
                Err(EscapeError::Operation(e))
            }
        }
    }
}

/// Unfiltered data access capability, only reachable inside
/// [`EscapeHatch::without_tenant_scope`].
pub struct PlatformConn {
    pub(crate) conn: DatabaseConnection,
}

impl PlatformConn {
    /// Select over `E` across all tenants.
    #[allow(clippy::unused_self)] // same call shape as TenantGuard::find
    pub fn find<E>(&self) -> SecureSelect<E, Scoped>
    where
        E: ScopableEntity + EntityTrait,
        E::Column: ColumnTrait + Copy,
    {
        E::find().secure().scope_with(&AccessScope::all_tenants())
    }

    /// Select over `E` restricted to one named tenant.
    #[allow(clippy::unused_self)]
    pub fn find_in<E>(&self, tenant_id: TenantId) -> SecureSelect<E, Scoped>
    where
        E: ScopableEntity + EntityTrait,
        E::Column: ColumnTrait + Copy,
    {
        E::find().secure().scope_with(&AccessScope::tenant(tenant_id))
    }

    /// Fetch one row by id regardless of owner.
    ///
    /// # Errors
    /// Returns `AccessError::NotFound` if no such row exists.
    pub async fn get<E>(&self, id: Uuid) -> Result<E::Model, AccessError>
    where
        E: ScopableEntity + EntityTrait,
        E::Column: ColumnTrait + Copy,
    {
        self.find::<E>()
            .and_id(id)
            .one(self)
            .await?
            .ok_or(AccessError::NotFound)
    }

    /// Create a tenant-owned row for an explicitly named tenant.
    ///
    /// # Errors
    /// Same as [`TenantGuard::create`].
    pub async fn create_in<E>(
        &self,
        tenant_id: TenantId,
        am: E::ActiveModel,
    ) -> Result<E::Model, AccessError>
    where
        E: ScopableEntity + EntityTrait,
        E::Column: ColumnTrait + Copy,
        E::ActiveModel: ActiveModelTrait<Entity = E> + Send,
        E::Model: IntoActiveModel<E::ActiveModel>,
    {
        secure::insert_owned::<E>(&self.conn, Some(tenant_id), am).await
    }

    /// Insert a row of an entity without a tenant column (tenant-exempt tables).
    ///
    /// # Errors
    /// Returns `AccessError::Invalid` for tenant-owned entities; use
    /// [`PlatformConn::create_in`] for those.
    pub async fn insert<E>(&self, am: E::ActiveModel) -> Result<E::Model, AccessError>
    where
        E: ScopableEntity + EntityTrait,
        E::Column: ColumnTrait + Copy,
        E::ActiveModel: ActiveModelTrait<Entity = E> + Send,
        E::Model: IntoActiveModel<E::ActiveModel>,
    {
        secure::insert_owned::<E>(&self.conn, None, am).await
    }

    /// Update any row by id. The tenant column stays immutable.
    ///
    /// # Errors
    /// `AccessError::NotFound`, `AccessError::Invalid` on a tenant change, or
    /// `AccessError::ScopedUniquenessViolation`.
    pub async fn update<E>(&self, id: Uuid, am: E::ActiveModel) -> Result<E::Model, AccessError>
    where
        E: ScopableEntity + EntityTrait,
        E::Column: ColumnTrait + Copy,
        E::ActiveModel: ActiveModelTrait<Entity = E> + Send,
    {
        secure::update_scoped::<E>(&self.conn, &AccessScope::all_tenants(), id, am).await
    }

    /// Delete any row by id.
    ///
    /// # Errors
    /// Returns `AccessError::NotFound` if no such row exists.
    pub async fn delete<E>(&self, id: Uuid) -> Result<(), AccessError>
    where
        E: ScopableEntity + EntityTrait,
        E::Column: ColumnTrait + Copy,
    {
        secure::delete_scoped::<E>(&self.conn, &AccessScope::all_tenants(), id).await
    }
}
