#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{item, new_item, new_product, product, setup, tenant};
use futures::future::join_all;
use sea_orm::ActiveValue::Set;
use tenancy_db::AccessError;
use tenancy_security::context;

#[tokio::test]
async fn same_value_is_allowed_in_different_tenants() {
    let h = setup().await;
    let guard = h.db.guard();

    for key in ["alpha", "beta"] {
        let created = context::bind(
            Some(tenant(key)),
            guard.create::<product::Entity>(new_product("SKU-1", "kettle")),
        )
        .await
        .unwrap();
        assert_eq!(created.sku, "SKU-1");
    }
}

#[tokio::test]
async fn duplicate_within_tenant_names_the_rule() {
    let h = setup().await;
    let guard = h.db.guard();

    context::bind(Some(tenant("alpha")), async {
        guard
            .create::<product::Entity>(new_product("SKU-1", "kettle"))
            .await
            .unwrap();
        let err = guard
            .create::<product::Entity>(new_product("SKU-1", "another kettle"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AccessError::ScopedUniquenessViolation {
                constraint: "ux_products_tenant_sku"
            }
        ));
        assert!(err.is_retryable());
    })
    .await;
}

/// `barcode` contains `code`; the violated rule is still told apart.
#[tokio::test]
async fn overlapping_column_names_report_the_right_rule() {
    let h = setup().await;
    let guard = h.db.guard();

    context::bind(Some(tenant("alpha")), async {
        guard
            .create::<item::Entity>(new_item("C-1", "4006381333931"))
            .await
            .unwrap();

        let barcode_clash = guard
            .create::<item::Entity>(new_item("C-2", "4006381333931"))
            .await
            .unwrap_err();
        assert!(matches!(
            barcode_clash,
            AccessError::ScopedUniquenessViolation {
                constraint: "ux_items_barcode"
            }
        ));

        let code_clash = guard
            .create::<item::Entity>(new_item("C-1", "5012345678900"))
            .await
            .unwrap_err();
        assert!(matches!(
            code_clash,
            AccessError::ScopedUniquenessViolation {
                constraint: "ux_items_code"
            }
        ));
    })
    .await;
}

#[tokio::test]
async fn update_into_taken_value_is_a_violation() {
    let h = setup().await;
    let guard = h.db.guard();

    context::bind(Some(tenant("alpha")), async {
        guard
            .create::<product::Entity>(new_product("SKU-1", "kettle"))
            .await
            .unwrap();
        let second = guard
            .create::<product::Entity>(new_product("SKU-2", "toaster"))
            .await
            .unwrap();

        let am = product::ActiveModel {
            sku: Set("SKU-1".to_owned()),
            ..Default::default()
        };
        let err = guard
            .update::<product::Entity>(second.id, am)
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::ScopedUniquenessViolation { .. }));
    })
    .await;
}

#[tokio::test]
async fn concurrent_creators_produce_exactly_one_winner() {
    const CREATORS: usize = 8;

    let h = setup().await;
    let guard = h.db.guard();
    let t1 = tenant("alpha");

    let attempts = (0..CREATORS).map(|i| {
        context::bind(
            Some(t1.clone()),
            guard.create::<product::Entity>(new_product("RACE", &format!("racer {i}"))),
        )
    });
    let results = join_all(attempts).await;

    let winners = results.iter().filter(|r| r.is_ok()).count();
    let losers = results
        .iter()
        .filter(|r| {
            matches!(
                r,
                Err(AccessError::ScopedUniquenessViolation {
                    constraint: "ux_products_tenant_sku"
                })
            )
        })
        .count();
    assert_eq!(winners, 1);
    assert_eq!(losers, CREATORS - 1);

    let stored = context::bind(Some(t1), guard.list::<product::Entity>())
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].sku, "RACE");
}

#[tokio::test]
async fn concurrent_creators_in_distinct_tenants_all_succeed() {
    let h = setup().await;
    let guard = h.db.guard();

    let tenants: Vec<_> = (0..4).map(|i| tenant(&format!("tenant-{i}"))).collect();
    let attempts = tenants.iter().map(|t| {
        context::bind(
            Some(t.clone()),
            guard.create::<product::Entity>(new_product("RACE", "racer")),
        )
    });
    let results = join_all(attempts).await;
    assert!(results.iter().all(Result::is_ok));
}
