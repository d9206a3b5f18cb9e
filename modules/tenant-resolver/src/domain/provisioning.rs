//! Tenant provisioning: the only writer of tenant identities.
//!
//! Every call runs through the escape hatch, so it requires a platform-admin
//! subject and leaves one audit record. Status and key changes update the
//! store first and invalidate the directory cache afterwards.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use sea_orm::{ActiveValue::Set, ColumnTrait, Condition};
use serde::Deserialize;
use tenancy_db::{AccessError, EscapeError, EscapeHatch, PlatformConn, tenants};
use tenancy_security::{Subject, Tenant, TenantStatus};
use uuid::Uuid;

use crate::config::TenancyConfig;
use crate::domain::directory::TenantDirectory;
use crate::domain::key::{KeyError, KeyRules};

const MIN_NAME_LEN: usize = 3;

/// Input for [`TenantProvisioning::create_tenant`].
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewTenant {
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub settings: serde_json::Value,
}

#[derive(thiserror::Error, Debug)]
pub enum ProvisioningError {
    #[error("invalid tenant key '{key}': {source}")]
    InvalidKey { key: String, source: KeyError },

    #[error("invalid tenant name: {reason}")]
    InvalidName { reason: String },

    #[error("tenant key '{key}' is already taken")]
    KeyTaken { key: String },

    #[error("tenant '{key}' not found")]
    NotFound { key: String },

    #[error("subject {subject} may not provision tenants")]
    Unauthorized { subject: Uuid },

    #[error(transparent)]
    Access(#[from] AccessError),
}

impl From<EscapeError<ProvisioningError>> for ProvisioningError {
    fn from(e: EscapeError<ProvisioningError>) -> Self {
        e.into_operation(|subject| Self::Unauthorized { subject })
    }
}

/// Tenant onboarding and lifecycle operations.
#[derive(Clone)]
pub struct TenantProvisioning {
    escape: EscapeHatch,
    directory: Arc<TenantDirectory>,
    rules: KeyRules,
    blocked_names: HashSet<String>,
}

impl std::fmt::Debug for TenantProvisioning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantProvisioning").finish_non_exhaustive()
    }
}

impl TenantProvisioning {
    #[must_use]
    pub fn new(escape: EscapeHatch, directory: Arc<TenantDirectory>, cfg: &TenancyConfig) -> Self {
        Self {
            escape,
            directory,
            rules: KeyRules::from_config(cfg),
            blocked_names: cfg
                .blocked_names
                .iter()
                .map(|n| n.trim().to_lowercase())
                .collect(),
        }
    }

    /// Create a tenant in `pending` status.
    ///
    /// # Errors
    /// - `ProvisioningError::InvalidKey` for malformed or reserved keys
    /// - `ProvisioningError::InvalidName` for blocked or too short names
    /// - `ProvisioningError::KeyTaken` when the key exists, including a
    ///   concurrent creation that won the race
    /// - `ProvisioningError::Unauthorized` unless `actor` is a platform admin
    #[tracing::instrument(skip_all, fields(key = %new.key))]
    pub async fn create_tenant(
        &self,
        actor: &Subject,
        new: NewTenant,
    ) -> Result<Tenant, ProvisioningError> {
        let key = self.checked_key(&new.key)?;
        let name = self.checked_name(&new.name)?;
        let settings = if new.settings.is_null() {
            serde_json::json!({})
        } else {
            new.settings
        };

        let model = self
            .escape
            .without_tenant_scope(actor, "create_tenant", |db| {
                Box::pin(async move {
                    if find_by_key(db, &key).await?.is_some() {
                        return Err(ProvisioningError::KeyTaken { key });
                    }
                    let now = Utc::now();
                    let am = tenants::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        key: Set(key.clone()),
                        name: Set(name),
                        status: Set(TenantStatus::Pending.as_str().to_owned()),
                        settings: Set(settings),
                        created_at: Set(now),
                        updated_at: Set(now),
                    };
                    db.insert::<tenants::Entity>(am)
                        .await
                        .map_err(|e| taken_or(e, &key))
                })
            })
            .await?;

        // a negative entry may be cached from earlier lookups
        self.directory.invalidate(&model.key).await;
        let tenant = into_tenant(model)?;
        tracing::info!(tenant_id = %tenant.id, "tenant provisioned");
        Ok(tenant)
    }

    /// Move a tenant to `active`.
    ///
    /// # Errors
    /// `ProvisioningError::NotFound`, `ProvisioningError::Unauthorized` or
    /// `ProvisioningError::Access`.
    pub async fn activate(&self, actor: &Subject, key: &str) -> Result<Tenant, ProvisioningError> {
        self.set_status(actor, key, TenantStatus::Active, "activate_tenant")
            .await
    }

    /// Move a tenant to `suspended`. Other replicas keep serving it until
    /// their cache entry expires.
    ///
    /// # Errors
    /// Same as [`TenantProvisioning::activate`].
    pub async fn suspend(&self, actor: &Subject, key: &str) -> Result<Tenant, ProvisioningError> {
        self.set_status(actor, key, TenantStatus::Suspended, "suspend_tenant")
            .await
    }

    /// Change a tenant's key. The tenant id is unchanged.
    ///
    /// # Errors
    /// Same as [`TenantProvisioning::create_tenant`] for the new key, plus
    /// `ProvisioningError::NotFound` for the old one.
    #[tracing::instrument(skip_all, fields(from = %from, to = %to))]
    pub async fn rename_key(
        &self,
        actor: &Subject,
        from: &str,
        to: &str,
    ) -> Result<Tenant, ProvisioningError> {
        let from = KeyRules::normalize(from);
        let to = self.checked_key(to)?;

        let model = {
            let (from, to) = (from.clone(), to.clone());
            self.escape
                .without_tenant_scope(actor, "rename_tenant_key", |db| {
                    Box::pin(async move {
                        let current = find_by_key(db, &from)
                            .await?
                            .ok_or(ProvisioningError::NotFound { key: from })?;
                        if find_by_key(db, &to).await?.is_some() {
                            return Err(ProvisioningError::KeyTaken { key: to });
                        }
                        let am = tenants::ActiveModel {
                            key: Set(to.clone()),
                            updated_at: Set(Utc::now()),
                            ..Default::default()
                        };
                        db.update::<tenants::Entity>(current.id, am)
                            .await
                            .map_err(|e| taken_or(e, &to))
                    })
                })
                .await?
        };

        self.directory.invalidate(&from).await;
        self.directory.invalidate(&to).await;
        into_tenant(model)
    }

    #[tracing::instrument(skip(self, actor))]
    async fn set_status(
        &self,
        actor: &Subject,
        key: &str,
        status: TenantStatus,
        operation: &str,
    ) -> Result<Tenant, ProvisioningError> {
        let key = KeyRules::normalize(key);
        let model = {
            let key = key.clone();
            self.escape
                .without_tenant_scope(actor, operation, |db| {
                    Box::pin(async move {
                        let current = find_by_key(db, &key)
                            .await?
                            .ok_or(ProvisioningError::NotFound { key })?;
                        let am = tenants::ActiveModel {
                            status: Set(status.as_str().to_owned()),
                            updated_at: Set(Utc::now()),
                            ..Default::default()
                        };
                        Ok(db.update::<tenants::Entity>(current.id, am).await?)
                    })
                })
                .await?
        };

        self.directory.invalidate(&key).await;
        tracing::info!(tenant_id = %model.id, status = status.as_str(), "tenant status changed");
        into_tenant(model)
    }

    fn checked_key(&self, raw: &str) -> Result<String, ProvisioningError> {
        let key = KeyRules::normalize(raw);
        self.rules
            .validate(&key)
            .map_err(|source| ProvisioningError::InvalidKey {
                key: key.clone(),
                source,
            })?;
        Ok(key)
    }

    fn checked_name(&self, raw: &str) -> Result<String, ProvisioningError> {
        let name = raw.trim();
        if self.blocked_names.contains(&name.to_lowercase()) {
            return Err(ProvisioningError::InvalidName {
                reason: format!("'{name}' is not allowed"),
            });
        }
        if name.chars().count() < MIN_NAME_LEN {
            return Err(ProvisioningError::InvalidName {
                reason: format!("must be at least {MIN_NAME_LEN} characters"),
            });
        }
        Ok(name.to_owned())
    }
}

async fn find_by_key(db: &PlatformConn, key: &str) -> Result<Option<tenants::Model>, AccessError> {
    db.find::<tenants::Entity>()
        .filter(Condition::all().add(tenants::Column::Key.eq(key)))
        .one(db)
        .await
}

fn taken_or(e: AccessError, key: &str) -> ProvisioningError {
    match e {
        AccessError::ScopedUniquenessViolation { .. } => ProvisioningError::KeyTaken {
            key: key.to_owned(),
        },
        other => other.into(),
    }
}

fn into_tenant(model: tenants::Model) -> Result<Tenant, ProvisioningError> {
    Tenant::try_from(model).map_err(|e| {
        tracing::error!(error = %e, "tenant row carries an unknown status");
        AccessError::Invalid("tenant row carries an unknown status").into()
    })
}
