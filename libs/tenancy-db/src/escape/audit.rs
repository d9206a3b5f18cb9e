//! Audit trail for escape-hatch invocations.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tenancy_security::{Subject, SubjectKind, TenantId};
use uuid::Uuid;

/// Tenants affected by an escape-hatch invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "tenant_id", rename_all = "snake_case")]
pub enum AuditScope {
    AllTenants,
    Tenant(TenantId),
}

/// How an escape-hatch invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Succeeded,
    Failed,
    /// The actor was not a platform administrator.
    Denied,
    /// The wrapped future was dropped before completing.
    Cancelled,
}

/// One structured audit entry. Exactly one is emitted per invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub at: DateTime<Utc>,
    pub actor_id: Uuid,
    pub actor_kind: SubjectKind,
    pub operation: String,
    pub scope: AuditScope,
    pub outcome: AuditOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Destination for audit records.
///
/// Called synchronously, possibly from `Drop`; implementations must not block
/// for long.
pub trait AuditSink: Send + Sync {
    fn record(&self, record: AuditRecord);
}

/// Emits audit records as `tracing` events on the `audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: AuditRecord) {
        let scope = match record.scope {
            AuditScope::AllTenants => "all_tenants".to_owned(),
            AuditScope::Tenant(id) => id.to_string(),
        };
        tracing::info!(
            target: "audit",
            audit_id = %record.id,
            at = %record.at.to_rfc3339(),
            actor_id = %record.actor_id,
            actor_kind = ?record.actor_kind,
            operation = %record.operation,
            scope = %scope,
            outcome = ?record.outcome,
            detail = record.detail.as_deref().unwrap_or_default(),
            "escape hatch invoked"
        );
    }
}

/// Keeps audit records in memory. Intended for tests and local tooling.
#[derive(Debug, Default, Clone)]
pub struct MemoryAuditSink {
    records: Arc<Mutex<Vec<AuditRecord>>>,
}

impl MemoryAuditSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every record received so far.
    #[must_use]
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, record: AuditRecord) {
        self.records.lock().push(record);
    }
}

/// Emits exactly one record for an invocation: on [`AuditGuard::finish`], or
/// as `Cancelled` when dropped unfinished.
pub(crate) struct AuditGuard {
    sink: Arc<dyn AuditSink>,
    pending: Option<AuditRecord>,
}

impl AuditGuard {
    pub(crate) fn start(
        sink: Arc<dyn AuditSink>,
        actor: &Subject,
        operation: &str,
        scope: AuditScope,
    ) -> Self {
        Self {
            sink,
            pending: Some(AuditRecord {
                id: Uuid::new_v4(),
                at: Utc::now(),
                actor_id: actor.id(),
                actor_kind: actor.kind(),
                operation: operation.to_owned(),
                scope,
                outcome: AuditOutcome::Cancelled,
                detail: None,
            }),
        }
    }

    pub(crate) fn finish(mut self, outcome: AuditOutcome, detail: Option<String>) {
        if let Some(mut record) = self.pending.take() {
            record.outcome = outcome;
            record.detail = detail;
            self.sink.record(record);
        }
    }
}

impl Drop for AuditGuard {
    fn drop(&mut self) {
        if let Some(record) = self.pending.take() {
            self.sink.record(record);
        }
    }
}
