#![allow(clippy::unwrap_used, clippy::expect_used)]
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tenancy_security::{Tenant, TenantStatus};
use tenant_resolver::{StoreError, TenancyConfig, TenantDirectory, TenantResolver, TenantStore};
use uuid::Uuid;

/// In-memory store that counts lookups.
#[derive(Default)]
pub struct FakeStore {
    tenants: HashMap<String, Tenant>,
    lookups: AtomicUsize,
    delay: Option<Duration>,
    failing: bool,
}

impl FakeStore {
    pub fn with(tenants: impl IntoIterator<Item = Tenant>) -> Self {
        Self {
            tenants: tenants.into_iter().map(|t| (t.key.clone(), t)).collect(),
            ..Self::default()
        }
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TenantStore for FakeStore {
    async fn find_by_key(&self, key: &str) -> Result<Option<Tenant>, StoreError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        if self.failing {
            return Err(StoreError::new("connection refused"));
        }
        Ok(self.tenants.get(key).cloned())
    }
}

pub fn tenant(key: &str, status: TenantStatus) -> Tenant {
    Tenant {
        id: Uuid::new_v4(),
        key: key.to_owned(),
        name: key.to_owned(),
        status,
        settings: serde_json::json!({}),
    }
}

pub fn config() -> TenancyConfig {
    TenancyConfig {
        base_domain: "example.com".to_owned(),
        ..TenancyConfig::default()
    }
}

/// Resolver over a store holding `acme` (active), `frozen` (suspended) and
/// `newbie` (pending).
pub fn resolver() -> (Arc<TenantResolver>, Arc<FakeStore>) {
    resolver_over(FakeStore::with([
        tenant("acme", TenantStatus::Active),
        tenant("frozen", TenantStatus::Suspended),
        tenant("newbie", TenantStatus::Pending),
    ]))
}

pub fn resolver_over(store: FakeStore) -> (Arc<TenantResolver>, Arc<FakeStore>) {
    let cfg = config();
    let store = Arc::new(store);
    let directory = Arc::new(TenantDirectory::new(store.clone(), &cfg));
    (Arc::new(TenantResolver::new(&cfg, directory)), store)
}
