//! Database handle and entry points to the two access paths.
//!
//! - [`Db::guard`]: the tenant-scoped path for request code.
//! - [`Db::escape_hatch`]: the audited, platform-admin-only path.
//!
//! The raw `SeaORM` connection never leaves this crate.

use std::sync::Arc;

use sea_orm::{
    ColumnTrait, ConnectOptions, ConnectionTrait, Database, DatabaseBackend, DatabaseConnection,
    DbErr, EntityTrait, Schema, sea_query::Index,
};
use sea_orm_migration::MigratorTrait;

use crate::config::DbConfig;
use crate::escape::EscapeHatch;
use crate::escape::audit::{AuditSink, TracingAuditSink};
use crate::migrations::Migrator;
use crate::secure::{ScopableEntity, TenantGuard};

/// Shared database handle.
#[derive(Clone)]
pub struct Db {
    conn: DatabaseConnection,
    audit: Arc<dyn AuditSink>,
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db")
            .field("engine", &self.engine())
            .finish_non_exhaustive()
    }
}

impl Db {
    /// Open the connection pool described by `cfg`.
    ///
    /// Audit records go to [`TracingAuditSink`] until replaced with
    /// [`Db::with_audit_sink`].
    ///
    /// # Errors
    /// Returns `DbErr` if the pool cannot be created.
    pub async fn connect(cfg: &DbConfig) -> Result<Self, DbErr> {
        let mut opts = ConnectOptions::new(cfg.url.clone());
        opts.max_connections(cfg.max_connections)
            .acquire_timeout(cfg.acquire_timeout)
            .sqlx_logging(cfg.sqlx_logging);

        let conn = Database::connect(opts).await?;
        tracing::info!(
            engine = backend_name(conn.get_database_backend()),
            max_connections = cfg.max_connections,
            "database connected"
        );

        Ok(Self {
            conn,
            audit: Arc::new(TracingAuditSink),
        })
    }

    /// Replace the audit sink used by escape-hatch invocations.
    #[must_use]
    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = sink;
        self
    }

    /// Tenant-scoped access path.
    #[must_use]
    pub fn guard(&self) -> TenantGuard {
        TenantGuard::new(self.conn.clone())
    }

    /// Audited access path for cross-tenant work.
    #[must_use]
    pub fn escape_hatch(&self) -> EscapeHatch {
        EscapeHatch::new(self.conn.clone(), Arc::clone(&self.audit))
    }

    /// Apply pending schema migrations for the tenant registry.
    ///
    /// # Errors
    /// Returns `DbErr` if a migration fails.
    pub async fn migrate(&self) -> Result<(), DbErr> {
        Migrator::up(&self.conn, None).await
    }

    /// Create the table for a tenant-owned entity, its tenant index and its
    /// scoped unique indexes, skipping anything that already exists.
    ///
    /// # Errors
    /// Returns `DbErr` if a DDL statement fails.
    pub async fn register_entity<E>(&self) -> Result<(), DbErr>
    where
        E: ScopableEntity + EntityTrait,
        E::Column: ColumnTrait + Copy,
    {
        let backend = self.conn.get_database_backend();
        let table = E::default().table_name().to_owned();

        let mut create = Schema::new(backend).create_table_from_entity(E::default());
        create.if_not_exists();
        self.conn.execute(backend.build(&create)).await?;

        let tenant_col = E::tenant_col();
        if let Some(tcol) = tenant_col {
            let mut idx = Index::create();
            idx.name(format!("ix_{table}_tenant"))
                .table(E::default())
                .col(tcol)
                .if_not_exists();
            self.conn.execute(backend.build(&idx)).await?;
        } else if !E::IS_TENANT_EXEMPT {
            tracing::warn!(%table, "registering tenant-owned entity without a tenant column");
        }

        for rule in E::scoped_unique() {
            let mut idx = Index::create();
            idx.name(rule.name).table(E::default()).unique().if_not_exists();
            if let Some(tcol) = tenant_col {
                idx.col(tcol);
            }
            for col in rule.columns {
                idx.col(col);
            }
            self.conn.execute(backend.build(&idx)).await?;
            tracing::debug!(%table, constraint = rule.name, "scoped unique index ensured");
        }

        Ok(())
    }

    /// Return database engine identifier for tracing / logging.
    #[must_use]
    pub fn engine(&self) -> &'static str {
        backend_name(self.conn.get_database_backend())
    }
}

fn backend_name(backend: DatabaseBackend) -> &'static str {
    match backend {
        DatabaseBackend::Postgres => "postgres",
        DatabaseBackend::MySql => "mysql",
        DatabaseBackend::Sqlite => "sqlite",
    }
}
