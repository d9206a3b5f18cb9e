//! Tenant identity model shared by the resolver, the context and the data layer.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a tenant.
pub type TenantId = Uuid;

/// Tenant lifecycle status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantStatus {
    /// Onboarded but not yet activated. Not routable.
    #[default]
    Pending,
    /// Serving traffic.
    Active,
    /// Temporarily blocked; requests are rejected with a dedicated error.
    Suspended,
}

impl TenantStatus {
    /// Storage representation of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Suspended => "suspended",
        }
    }
}

impl fmt::Display for TenantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a stored status string is not one of the known values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown tenant status: {0}")]
pub struct UnknownTenantStatus(pub String);

impl FromStr for TenantStatus {
    type Err = UnknownTenantStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "suspended" => Ok(Self::Suspended),
            other => Err(UnknownTenantStatus(other.to_owned())),
        }
    }
}

/// A tenant as seen by request handling code.
///
/// Values are snapshots: the directory may hand out a copy that is up to one
/// cache TTL old.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    /// Stable, opaque identifier. Never changes.
    pub id: TenantId,
    /// Subdomain slug the tenant is addressed by.
    pub key: String,
    /// Human-readable display name.
    pub name: String,
    /// Current lifecycle status.
    pub status: TenantStatus,
    /// Branding/config blob, opaque to the isolation layer.
    #[serde(default)]
    pub settings: serde_json::Value,
}

impl Tenant {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == TenantStatus::Active
    }
}
