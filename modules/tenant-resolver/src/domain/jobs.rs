//! Helpers for deferred and per-tenant background work.
//!
//! Background work never inherits a request's tenant. These helpers take the
//! tenant as an argument and bind it inside the job.

use std::future::Future;

use sea_orm::{ColumnTrait, Condition, Order};
use tenancy_db::{AccessError, EscapeError, EscapeHatch, tenants};
use tenancy_security::{Subject, Tenant, TenantId, TenantStatus, context};

pub use tenancy_security::spawn_for_tenant;

/// Run `work` on the current task with `tenant` bound.
pub async fn run_for_tenant<F>(tenant: Tenant, work: F) -> F::Output
where
    F: Future,
{
    context::bind(Some(tenant), work).await
}

/// Outcome of [`for_each_active_tenant`].
#[derive(Debug, Default)]
pub struct JobReport {
    pub succeeded: usize,
    pub failed: Vec<(TenantId, String)>,
}

impl JobReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Run `work` once for every active tenant, with that tenant bound.
///
/// Tenants are listed through the escape hatch (one audit record for the
/// listing). Tenants run one after another; a failure is recorded in the
/// report and does not stop the rest.
///
/// # Errors
/// Returns the escape-hatch error if listing the tenants fails or `actor` is
/// not a platform admin.
#[tracing::instrument(skip(escape, actor, work), fields(actor = %actor.id()))]
pub async fn for_each_active_tenant<F, Fut, E>(
    escape: &EscapeHatch,
    actor: &Subject,
    operation: &str,
    mut work: F,
) -> Result<JobReport, EscapeError<AccessError>>
where
    F: FnMut(Tenant) -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: std::fmt::Display,
{
    let rows = escape
        .without_tenant_scope(actor, operation, |db| {
            Box::pin(async move {
                db.find::<tenants::Entity>()
                    .filter(Condition::all().add(
                        tenants::Column::Status.eq(TenantStatus::Active.as_str()),
                    ))
                    .order_by(tenants::Column::Key, Order::Asc)
                    .all(db)
                    .await
            })
        })
        .await?;

    let mut report = JobReport::default();
    for row in rows {
        let tenant = match Tenant::try_from(row) {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(error = %e, "skipping tenant row with unknown status");
                continue;
            }
        };
        let id = tenant.id;
        match run_for_tenant(tenant.clone(), work(tenant)).await {
            Ok(()) => report.succeeded += 1,
            Err(e) => {
                tracing::warn!(tenant_id = %id, error = %e, "per-tenant job failed");
                report.failed.push((id, e.to_string()));
            }
        }
    }

    tracing::info!(
        succeeded = report.succeeded,
        failed = report.failed.len(),
        "per-tenant job finished"
    );
    Ok(report)
}
