//! Hidden database runner capability.
//!
//! Downstream crates never see the raw `SeaORM` connection. Scoped queries
//! execute against a [`DbRunner`], which only [`TenantGuard`](crate::TenantGuard)
//! and [`PlatformConn`](crate::PlatformConn) implement.
//!
//! The trait is **sealed**, so user code cannot build a runner around a
//! connection of its own and skip the guard.

use sea_orm::DatabaseConnection;

use crate::escape::PlatformConn;
use crate::secure::guard::TenantGuard;

mod sealed {
    pub trait Sealed {}
}

/// Internal-only bridge to the `SeaORM` executor.
pub trait DbRunnerInternal: sealed::Sealed + Send + Sync {
    fn as_seaorm(&self) -> &DatabaseConnection;
}

/// Capability marker accepted by scoped query executors.
///
/// Has no methods of its own and cannot be implemented outside this crate.
#[doc(hidden)]
pub trait DbRunner: DbRunnerInternal {}

impl sealed::Sealed for TenantGuard {}
impl DbRunnerInternal for TenantGuard {
    fn as_seaorm(&self) -> &DatabaseConnection {
        &self.conn
    }
}
impl DbRunner for TenantGuard {}

impl sealed::Sealed for PlatformConn {}
impl DbRunnerInternal for PlatformConn {
    fn as_seaorm(&self) -> &DatabaseConnection {
        &self.conn
    }
}
impl DbRunner for PlatformConn {}
