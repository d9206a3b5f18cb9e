//! Tenant directory: key to tenant lookup with a bounded-staleness cache.
//!
//! The cache is a size-bounded `moka` cache. Found tenants live for
//! `cache_ttl`, "no such tenant" answers for `negative_cache_ttl`; expired
//! and over-capacity entries are evicted by the cache itself. A status change
//! made on another replica becomes visible here once the entry expires, or
//! immediately after a local [`TenantDirectory::invalidate`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::{Expiry, future::Cache};
use tenancy_security::{Tenant, TenantStatus};

use crate::config::TenancyConfig;

/// Failure of the backing store, as opposed to a missing tenant.
#[derive(thiserror::Error, Debug, Clone)]
#[error("tenant store failure: {message}")]
pub struct StoreError {
    message: String,
}

impl StoreError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Authoritative tenant storage.
#[async_trait]
pub trait TenantStore: Send + Sync {
    /// Find a tenant by its normalized key.
    async fn find_by_key(&self, key: &str) -> Result<Option<Tenant>, StoreError>;
}

/// Result of a directory lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Found(Tenant),
    NotFound,
    Suspended(Tenant),
    /// Onboarded but not yet activated.
    Pending(Tenant),
}

#[derive(thiserror::Error, Debug, Clone)]
pub enum DirectoryError {
    #[error("tenant lookup timed out")]
    Timeout,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug)]
struct CacheEntry {
    tenant: Option<Tenant>,
}

impl CacheEntry {
    fn lookup(&self) -> Lookup {
        match &self.tenant {
            None => Lookup::NotFound,
            Some(t) => match t.status {
                TenantStatus::Active => Lookup::Found(t.clone()),
                TenantStatus::Suspended => Lookup::Suspended(t.clone()),
                TenantStatus::Pending => Lookup::Pending(t.clone()),
            },
        }
    }
}

/// Per-entry TTL: positive and negative answers age out independently.
struct LookupExpiry {
    ttl: Duration,
    negative_ttl: Duration,
}

impl LookupExpiry {
    fn ttl_for(&self, entry: &CacheEntry) -> Duration {
        if entry.tenant.is_some() {
            self.ttl
        } else {
            self.negative_ttl
        }
    }
}

impl Expiry<String, Arc<CacheEntry>> for LookupExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Arc<CacheEntry>,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(self.ttl_for(value))
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Arc<CacheEntry>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(self.ttl_for(value))
    }
}

/// Cached view over a [`TenantStore`].
pub struct TenantDirectory {
    store: Arc<dyn TenantStore>,
    cache: Cache<String, Arc<CacheEntry>>,
    ttl: Duration,
    negative_ttl: Duration,
    lookup_timeout: Duration,
}

impl std::fmt::Debug for TenantDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantDirectory")
            .field("cached", &self.cache.entry_count())
            .field("ttl", &self.ttl)
            .field("negative_ttl", &self.negative_ttl)
            .field("lookup_timeout", &self.lookup_timeout)
            .finish_non_exhaustive()
    }
}

impl TenantDirectory {
    #[must_use]
    pub fn new(store: Arc<dyn TenantStore>, cfg: &TenancyConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(cfg.max_entries)
            .expire_after(LookupExpiry {
                ttl: cfg.cache_ttl,
                negative_ttl: cfg.negative_cache_ttl,
            })
            .build();
        Self {
            store,
            cache,
            ttl: cfg.cache_ttl,
            negative_ttl: cfg.negative_cache_ttl,
            lookup_timeout: cfg.lookup_timeout,
        }
    }

    /// Resolve `key` to a tenant.
    ///
    /// # Errors
    /// - `DirectoryError::Timeout` when the store does not answer within
    ///   `lookup_timeout`
    /// - `DirectoryError::Store` when the store fails
    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn lookup(&self, key: &str) -> Result<Lookup, DirectoryError> {
        if let Some(hit) = self.cache.get(key).await {
            tracing::debug!("tenant cache hit");
            return Ok(hit.lookup());
        }
        tracing::debug!("tenant cache miss");

        let found = tokio::time::timeout(self.lookup_timeout, self.store.find_by_key(key))
            .await
            .map_err(|_| {
                tracing::warn!(timeout = ?self.lookup_timeout, "tenant store lookup timed out");
                DirectoryError::Timeout
            })?
            .inspect_err(|e| tracing::error!(error = %e, "tenant store lookup failed"))?;

        let entry = Arc::new(CacheEntry { tenant: found });
        self.cache.insert(key.to_owned(), Arc::clone(&entry)).await;
        Ok(entry.lookup())
    }

    /// Drop the cached entry for `key`.
    pub async fn invalidate(&self, key: &str) {
        if self.cache.remove(key).await.is_some() {
            tracing::debug!(key, "tenant cache entry invalidated");
        }
    }

    /// Drop every cached entry.
    pub fn clear(&self) {
        self.cache.invalidate_all();
    }
}
