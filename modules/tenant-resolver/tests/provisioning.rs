#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use parking_lot::Mutex;
use tenancy_db::{AuditOutcome, Db, DbConfig, MemoryAuditSink};
use tenancy_security::{Subject, TenantStatus, context};
use tenant_resolver::{
    InboundRequest, KeyError, NewTenant, ProvisioningError, Resolution, ResolveError,
    TenancyConfig, TenancyModule, for_each_active_tenant,
};
use uuid::Uuid;

struct Harness {
    db: Db,
    module: TenancyModule,
    audit: MemoryAuditSink,
    admin: Subject,
}

async fn setup() -> Harness {
    let audit = MemoryAuditSink::new();
    let db = Db::connect(&DbConfig {
        url: "sqlite::memory:".to_owned(),
        max_connections: 1,
        ..DbConfig::default()
    })
    .await
    .expect("Failed to connect to database")
    .with_audit_sink(Arc::new(audit.clone()));
    db.migrate().await.expect("migrations failed");

    let module = TenancyModule::new(&db, &TenancyConfig::default());
    Harness {
        db,
        module,
        audit,
        admin: Subject::platform_admin(Uuid::new_v4()),
    }
}

fn new_tenant(key: &str, name: &str) -> NewTenant {
    NewTenant {
        key: key.to_owned(),
        name: name.to_owned(),
        settings: serde_json::Value::Null,
    }
}

async fn resolve(h: &Harness, key: &str) -> Result<Resolution, ResolveError> {
    let host = format!("{key}.example.com");
    h.module
        .resolver
        .resolve(&InboundRequest {
            host: &host,
            path: "/products",
        })
        .await
}

#[tokio::test]
async fn onboarding_lifecycle() {
    let h = setup().await;
    let p = &h.module.provisioning;

    // look it up first so a negative entry is cached
    assert!(matches!(
        resolve(&h, "acme").await,
        Err(ResolveError::UnknownTenant { .. })
    ));

    let created = p
        .create_tenant(&h.admin, new_tenant("  Acme ", "Acme Widgets"))
        .await
        .unwrap();
    assert_eq!(created.key, "acme");
    assert_eq!(created.status, TenantStatus::Pending);
    assert_eq!(created.settings, serde_json::json!({}));
    assert!(matches!(
        resolve(&h, "acme").await,
        Err(ResolveError::UnknownTenant { .. })
    ));

    p.activate(&h.admin, "acme").await.unwrap();
    let resolved = resolve(&h, "acme").await.unwrap();
    assert!(matches!(resolved, Resolution::Tenant(ref t) if t.id == created.id));

    p.suspend(&h.admin, "acme").await.unwrap();
    assert!(matches!(
        resolve(&h, "acme").await,
        Err(ResolveError::Suspended { .. })
    ));

    let records = h.audit.records();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].operation, "create_tenant");
    assert_eq!(records[1].operation, "activate_tenant");
    assert_eq!(records[2].operation, "suspend_tenant");
    assert!(records.iter().all(|r| r.actor_id == h.admin.id()));
}

#[tokio::test]
async fn reserved_and_malformed_keys_are_refused() {
    let h = setup().await;
    let p = &h.module.provisioning;

    for (key, expected) in [
        ("admin", KeyError::Reserved),
        ("www", KeyError::Reserved),
        ("bad_key", KeyError::Syntax),
        ("   ", KeyError::Empty),
    ] {
        let err = p
            .create_tenant(&h.admin, new_tenant(key, "Some Shop"))
            .await
            .unwrap_err();
        assert!(
            matches!(err, ProvisioningError::InvalidKey { source, .. } if source == expected),
            "{key}"
        );
    }
    // rejected before the escape hatch is entered
    assert!(h.audit.is_empty());
}

#[tokio::test]
async fn blocked_and_short_names_are_refused() {
    let h = setup().await;
    let p = &h.module.provisioning;

    for name in ["Admin", " test ", "ab"] {
        let err = p
            .create_tenant(&h.admin, new_tenant("shop", name))
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisioningError::InvalidName { .. }), "{name}");
    }
}

#[tokio::test]
async fn existing_key_is_taken() {
    let h = setup().await;
    let p = &h.module.provisioning;

    p.create_tenant(&h.admin, new_tenant("acme", "Acme Widgets"))
        .await
        .unwrap();
    let err = p
        .create_tenant(&h.admin, new_tenant("ACME", "Other Acme"))
        .await
        .unwrap_err();
    assert!(matches!(err, ProvisioningError::KeyTaken { ref key } if key == "acme"));

    let records = h.audit.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].outcome, AuditOutcome::Failed);
}

#[tokio::test]
async fn concurrent_onboarding_of_one_key_has_one_winner() {
    let h = setup().await;
    let p = &h.module.provisioning;

    let attempts = (0..6).map(|i| p.create_tenant(&h.admin, new_tenant("race", &format!("Racer {i}"))));
    let results = futures::future::join_all(attempts).await;

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(
        results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, ProvisioningError::KeyTaken { .. }))
    );
}

#[tokio::test]
async fn non_admin_cannot_provision() {
    let h = setup().await;
    let user = Subject::tenant_user(Uuid::new_v4());

    let err = h
        .module
        .provisioning
        .create_tenant(&user, new_tenant("acme", "Acme Widgets"))
        .await
        .unwrap_err();
    assert!(matches!(err, ProvisioningError::Unauthorized { subject } if subject == user.id()));

    let records = h.audit.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome, AuditOutcome::Denied);
}

#[tokio::test]
async fn rename_moves_the_key_and_keeps_the_id() {
    let h = setup().await;
    let p = &h.module.provisioning;

    let t = p
        .create_tenant(&h.admin, new_tenant("acme", "Acme Widgets"))
        .await
        .unwrap();
    p.activate(&h.admin, "acme").await.unwrap();
    p.create_tenant(&h.admin, new_tenant("globex", "Globex"))
        .await
        .unwrap();
    assert!(resolve(&h, "acme").await.is_ok());

    let taken = p.rename_key(&h.admin, "acme", "globex").await.unwrap_err();
    assert!(matches!(taken, ProvisioningError::KeyTaken { .. }));

    let reserved = p.rename_key(&h.admin, "acme", "admin").await.unwrap_err();
    assert!(matches!(reserved, ProvisioningError::InvalidKey { .. }));

    let missing = p.rename_key(&h.admin, "nobody", "fresh").await.unwrap_err();
    assert!(matches!(missing, ProvisioningError::NotFound { .. }));

    let renamed = p.rename_key(&h.admin, "acme", "acme-corp").await.unwrap();
    assert_eq!(renamed.id, t.id);
    assert_eq!(renamed.key, "acme-corp");

    assert!(matches!(
        resolve(&h, "acme").await,
        Err(ResolveError::UnknownTenant { .. })
    ));
    assert!(matches!(
        resolve(&h, "acme-corp").await,
        Ok(Resolution::Tenant(ref r)) if r.id == t.id
    ));
}

#[tokio::test]
async fn per_tenant_job_visits_active_tenants_with_context() {
    let h = setup().await;
    let p = &h.module.provisioning;

    for key in ["alpha", "beta", "gamma"] {
        p.create_tenant(&h.admin, new_tenant(key, &format!("{key} shop")))
            .await
            .unwrap();
    }
    p.activate(&h.admin, "alpha").await.unwrap();
    p.activate(&h.admin, "gamma").await.unwrap();
    let audited_before = h.audit.len();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let report = for_each_active_tenant(&h.db.escape_hatch(), &h.admin, "nightly_reindex", |t| {
        let seen = Arc::clone(&seen);
        async move {
            let bound = context::current().expect("tenant bound inside job");
            assert_eq!(bound.id, t.id);
            seen.lock().push(bound.key.clone());
            if bound.key == "gamma" {
                return Err("index corrupted");
            }
            Ok(())
        }
    })
    .await
    .unwrap();

    assert_eq!(*seen.lock(), vec!["alpha".to_owned(), "gamma".to_owned()]);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed.len(), 1);
    assert!(!report.is_clean());
    assert_eq!(h.audit.len(), audited_before + 1);
}
