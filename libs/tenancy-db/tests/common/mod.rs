#![allow(clippy::unwrap_used, clippy::expect_used)]
#![allow(dead_code)]

use std::sync::Arc;

use sea_orm::{ActiveValue::Set, entity::prelude::*};
use tenancy_db::{Db, DbConfig, MemoryAuditSink};
use tenancy_security::{Tenant, TenantStatus};

pub mod product {
    use sea_orm::entity::prelude::*;
    use tenancy_db::{ScopableEntity, ScopedUnique};

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "products")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: Uuid,
        pub tenant_id: Uuid,
        pub sku: String,
        pub name: String,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}

    impl ScopableEntity for Entity {
        fn tenant_col() -> Option<Self::Column> {
            Some(Column::TenantId)
        }

        fn resource_col() -> Self::Column {
            Column::Id
        }

        fn scoped_unique() -> Vec<ScopedUnique<Self::Column>> {
            vec![ScopedUnique::new("ux_products_tenant_sku", vec![Column::Sku])]
        }
    }
}

/// Two unique rules whose column names overlap as substrings.
pub mod item {
    use sea_orm::entity::prelude::*;
    use tenancy_db::{ScopableEntity, ScopedUnique};

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "items")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: Uuid,
        pub tenant_id: Uuid,
        pub code: String,
        pub barcode: String,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}

    impl ScopableEntity for Entity {
        fn tenant_col() -> Option<Self::Column> {
            Some(Column::TenantId)
        }

        fn resource_col() -> Self::Column {
            Column::Id
        }

        fn scoped_unique() -> Vec<ScopedUnique<Self::Column>> {
            vec![
                ScopedUnique::new("ux_items_code", vec![Column::Code]),
                ScopedUnique::new("ux_items_barcode", vec![Column::Barcode]),
            ]
        }
    }
}

/// Declares itself tenant-owned but forgets its tenant column.
pub mod orphan {
    use sea_orm::entity::prelude::*;
    use tenancy_db::ScopableEntity;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "orphans")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: Uuid,
        pub label: String,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}

    impl ScopableEntity for Entity {
        fn tenant_col() -> Option<Self::Column> {
            None
        }

        fn resource_col() -> Self::Column {
            Column::Id
        }
    }
}

pub struct Harness {
    pub db: Db,
    pub audit: MemoryAuditSink,
}

/// In-memory SQLite with the tenant registry and the test tables.
pub async fn setup() -> Harness {
    let cfg = DbConfig {
        url: "sqlite::memory:".to_owned(),
        max_connections: 1,
        ..DbConfig::default()
    };
    let audit = MemoryAuditSink::new();
    let db = Db::connect(&cfg)
        .await
        .expect("Failed to connect to database")
        .with_audit_sink(Arc::new(audit.clone()));
    db.migrate().await.expect("migrations failed");
    db.register_entity::<product::Entity>()
        .await
        .expect("register products");
    db.register_entity::<item::Entity>()
        .await
        .expect("register items");
    db.register_entity::<orphan::Entity>()
        .await
        .expect("register orphans");
    Harness { db, audit }
}

pub fn tenant(key: &str) -> Tenant {
    Tenant {
        id: Uuid::new_v4(),
        key: key.to_owned(),
        name: key.to_owned(),
        status: TenantStatus::Active,
        settings: serde_json::Value::Null,
    }
}

pub fn new_product(sku: &str, name: &str) -> product::ActiveModel {
    product::ActiveModel {
        id: Set(Uuid::new_v4()),
        sku: Set(sku.to_owned()),
        name: Set(name.to_owned()),
        ..Default::default()
    }
}

pub fn new_item(code: &str, barcode: &str) -> item::ActiveModel {
    item::ActiveModel {
        id: Set(Uuid::new_v4()),
        code: Set(code.to_owned()),
        barcode: Set(barcode.to_owned()),
        ..Default::default()
    }
}
