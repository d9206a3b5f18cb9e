//! Wiring of the tenancy services over one database handle.

use std::sync::Arc;

use tenancy_db::Db;

use crate::config::TenancyConfig;
use crate::domain::directory::TenantDirectory;
use crate::domain::onboarding::OnboardingMonitor;
use crate::domain::provisioning::TenantProvisioning;
use crate::domain::resolver::TenantResolver;
use crate::infra::store::DbTenantStore;

/// Resolver, directory and provisioning sharing one directory cache, plus
/// the onboarding attempt monitor.
#[derive(Debug, Clone)]
pub struct TenancyModule {
    pub resolver: Arc<TenantResolver>,
    pub directory: Arc<TenantDirectory>,
    pub provisioning: TenantProvisioning,
    pub onboarding: Arc<OnboardingMonitor>,
}

impl TenancyModule {
    #[must_use]
    pub fn new(db: &Db, cfg: &TenancyConfig) -> Self {
        let store = Arc::new(DbTenantStore::new(db.guard()));
        let directory = Arc::new(TenantDirectory::new(store, cfg));
        let resolver = Arc::new(TenantResolver::new(cfg, Arc::clone(&directory)));
        let provisioning = TenantProvisioning::new(db.escape_hatch(), Arc::clone(&directory), cfg);
        let onboarding = Arc::new(OnboardingMonitor::new(cfg));
        tracing::info!(base_domain = %cfg.base_domain, "tenancy module initialized");
        Self {
            resolver,
            directory,
            provisioning,
            onboarding,
        }
    }
}
