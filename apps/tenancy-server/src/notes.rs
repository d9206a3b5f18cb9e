//! Demo tenant-owned entity served by the reference host.

use sea_orm::entity::prelude::*;
use serde::Serialize;
use tenancy_db::{ScopableEntity, ScopedUnique};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "notes")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub title: String,
    pub body: String,
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
        vec![ScopedUnique::new("ux_notes_tenant_title", vec![Column::Title])]
    }
}
