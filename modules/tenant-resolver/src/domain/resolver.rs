//! Request-to-tenant resolution.
//!
//! Order of checks for every request:
//! 1. exempt path prefix → [`Resolution::Exempt`]
//! 2. host parsing; bare base domain or public subdomain → [`Resolution::Exempt`]
//! 3. key syntax and reserved words → [`ResolveError::MalformedKey`], no lookup
//! 4. directory lookup → tenant, [`ResolveError::UnknownTenant`],
//!    [`ResolveError::Suspended`] or [`ResolveError::Timeout`]

use std::collections::HashSet;
use std::sync::Arc;

use http::uri::Authority;
use tenancy_security::Tenant;

use crate::config::TenancyConfig;
use crate::domain::directory::{DirectoryError, Lookup, StoreError, TenantDirectory};
use crate::domain::key::{KeyError, KeyRules};

/// The parts of an inbound request the resolver looks at.
#[derive(Debug, Clone, Copy)]
pub struct InboundRequest<'a> {
    /// Host or authority, port allowed (`acme.example.com:8080`).
    pub host: &'a str,
    pub path: &'a str,
}

/// Successful resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Tenant(Tenant),
    /// Tenant-exempt route; handled with an explicit "no tenant" context.
    Exempt,
}

#[derive(thiserror::Error, Debug, Clone)]
pub enum ResolveError {
    #[error("malformed tenant key: {reason}")]
    MalformedKey { reason: String },

    #[error("unknown tenant '{key}'")]
    UnknownTenant { key: String },

    #[error("tenant '{key}' is suspended")]
    Suspended { key: String },

    #[error("tenant resolution timed out")]
    Timeout,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ResolveError {
    fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedKey {
            reason: reason.into(),
        }
    }

    /// Stable machine-readable code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::MalformedKey { .. } => "MALFORMED_TENANT_KEY",
            Self::UnknownTenant { .. } => "UNKNOWN_TENANT",
            Self::Suspended { .. } => "TENANT_SUSPENDED",
            Self::Timeout => "TENANT_RESOLUTION_TIMEOUT",
            Self::Store(_) => "TENANT_STORE_UNAVAILABLE",
        }
    }
}

impl From<KeyError> for ResolveError {
    fn from(e: KeyError) -> Self {
        Self::malformed(e.to_string())
    }
}

/// Host label extracted from a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostKey {
    /// The host is the base domain itself or a public subdomain.
    Public,
    /// Candidate tenant key, lowercased, not yet validated.
    Candidate(String),
}

/// Resolves inbound requests to tenants.
#[derive(Debug)]
pub struct TenantResolver {
    directory: Arc<TenantDirectory>,
    rules: KeyRules,
    base_domain: String,
    exempt_paths: Vec<String>,
    exempt_subdomains: HashSet<String>,
}

impl TenantResolver {
    #[must_use]
    pub fn new(cfg: &TenancyConfig, directory: Arc<TenantDirectory>) -> Self {
        Self {
            directory,
            rules: KeyRules::from_config(cfg),
            base_domain: cfg
                .base_domain
                .trim()
                .trim_end_matches('.')
                .to_ascii_lowercase(),
            exempt_paths: cfg.exempt_paths.clone(),
            exempt_subdomains: cfg
                .exempt_subdomains
                .iter()
                .map(|s| s.to_ascii_lowercase())
                .collect(),
        }
    }

    #[must_use]
    pub fn directory(&self) -> &Arc<TenantDirectory> {
        &self.directory
    }

    /// Whether `path` is served without a tenant.
    ///
    /// Prefixes match whole segments: `/health` covers `/health` and
    /// `/health/live` but not `/healthz`. A prefix ending in `/` covers
    /// everything below it.
    #[must_use]
    pub fn is_exempt_path(&self, path: &str) -> bool {
        self.exempt_paths.iter().any(|prefix| {
            path.strip_prefix(prefix.as_str()).is_some_and(|rest| {
                rest.is_empty() || rest.starts_with('/') || prefix.ends_with('/')
            })
        })
    }

    /// Extract the tenant label from `host`.
    ///
    /// Only a single label directly under the base domain is accepted;
    /// `a.b.example.com` and foreign hosts are malformed.
    ///
    /// # Errors
    /// Returns `ResolveError::MalformedKey` when no single label can be extracted.
    pub fn host_key(&self, host: &str) -> Result<HostKey, ResolveError> {
        let authority: Authority = host
            .trim()
            .parse()
            .map_err(|_| ResolveError::malformed("unparsable host"))?;
        let name = authority.host().trim_end_matches('.').to_ascii_lowercase();

        if name == self.base_domain {
            return Ok(HostKey::Public);
        }
        let label = name
            .strip_suffix(self.base_domain.as_str())
            .and_then(|rest| rest.strip_suffix('.'))
            .ok_or_else(|| ResolveError::malformed("host is not under the base domain"))?;
        if label.contains('.') {
            return Err(ResolveError::malformed("nested subdomains are not tenant keys"));
        }
        if self.exempt_subdomains.contains(label) {
            return Ok(HostKey::Public);
        }
        Ok(HostKey::Candidate(label.to_owned()))
    }

    /// Resolve `req` to a tenant or an exempt marker.
    ///
    /// Malformed and reserved keys are rejected before the directory is
    /// consulted. Pending tenants are reported as unknown.
    ///
    /// # Errors
    /// See [`ResolveError`].
    #[tracing::instrument(skip_all, fields(host = %req.host, path = %req.path))]
    pub async fn resolve(&self, req: &InboundRequest<'_>) -> Result<Resolution, ResolveError> {
        if self.is_exempt_path(req.path) {
            tracing::debug!("exempt path");
            return Ok(Resolution::Exempt);
        }

        let key = match self.host_key(req.host) {
            Ok(HostKey::Public) => {
                tracing::debug!("public host");
                return Ok(Resolution::Exempt);
            }
            Ok(HostKey::Candidate(key)) => key,
            Err(e) => {
                tracing::warn!(error = %e, "rejected request host");
                return Err(e);
            }
        };

        if let Err(e) = self.rules.validate(&key) {
            tracing::warn!(%key, error = %e, "rejected tenant key before lookup");
            return Err(e.into());
        }

        match self.directory.lookup(&key).await {
            Ok(Lookup::Found(tenant)) => {
                tracing::debug!(tenant_id = %tenant.id, "tenant resolved");
                Ok(Resolution::Tenant(tenant))
            }
            Ok(Lookup::NotFound | Lookup::Pending(_)) => {
                tracing::warn!(%key, "unknown tenant");
                Err(ResolveError::UnknownTenant { key })
            }
            Ok(Lookup::Suspended(tenant)) => {
                tracing::warn!(%key, tenant_id = %tenant.id, "suspended tenant");
                Err(ResolveError::Suspended { key })
            }
            Err(DirectoryError::Timeout) => Err(ResolveError::Timeout),
            Err(DirectoryError::Store(e)) => Err(ResolveError::Store(e)),
        }
    }
}
