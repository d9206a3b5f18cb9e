//! Tenancy settings, read from the `tenancy` section of the application config.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tenant resolution and provisioning settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TenancyConfig {
    /// Domain under which tenants get their subdomain, e.g. `shop.example.com`.
    pub base_domain: String,
    /// Keys that can never be resolved or provisioned.
    pub reserved_keys: Vec<String>,
    /// Path prefixes served without a tenant, matched on whole segments.
    pub exempt_paths: Vec<String>,
    /// Public subdomains served without a tenant.
    pub exempt_subdomains: Vec<String>,
    /// Tenant names refused at provisioning time.
    pub blocked_names: Vec<String>,
    /// Upper bound on cached directory entries, positive and negative alike.
    pub max_entries: u64,
    #[serde(with = "humantime_serde")]
    pub cache_ttl: Duration,
    /// TTL for "no such tenant" results.
    #[serde(with = "humantime_serde")]
    pub negative_cache_ttl: Duration,
    /// Upper bound for a directory lookup that misses the cache.
    #[serde(with = "humantime_serde")]
    pub lookup_timeout: Duration,
    /// Failed onboarding attempts from one source before a warning is logged.
    pub onboarding_failure_threshold: u32,
    /// How long a source's failed attempts are remembered.
    #[serde(with = "humantime_serde")]
    pub onboarding_failure_window: Duration,
}

impl Default for TenancyConfig {
    fn default() -> Self {
        Self {
            base_domain: "example.com".to_owned(),
            reserved_keys: [
                "admin", "api", "app", "assets", "auth", "billing", "cdn", "dashboard", "docs",
                "help", "internal", "login", "mail", "root", "static", "status", "support",
                "system",
            ]
            .map(str::to_owned)
            .to_vec(),
            exempt_paths: ["/health", "/onboarding/", "/metrics"]
                .map(str::to_owned)
                .to_vec(),
            exempt_subdomains: vec!["www".to_owned()],
            blocked_names: ["test", "admin", "root", "system", "null", "demo"]
                .map(str::to_owned)
                .to_vec(),
            max_entries: 10_000,
            cache_ttl: Duration::from_secs(300),
            negative_cache_ttl: Duration::from_secs(60),
            lookup_timeout: Duration::from_secs(2),
            onboarding_failure_threshold: 5,
            onboarding_failure_window: Duration::from_secs(3600),
        }
    }
}
