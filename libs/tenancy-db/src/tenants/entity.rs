use sea_orm::entity::prelude::*;
use tenancy_security::{Tenant, TenantStatus, UnknownTenantStatus};

use crate::secure::{ScopableEntity, ScopedUnique};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "tenants")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub key: String,
    pub name: String,
    pub status: String,
    pub settings: Json,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

// The tenant registry is global: readable before a tenant is resolved,
// writable through the escape hatch only.
impl ScopableEntity for Entity {
    const IS_TENANT_EXEMPT: bool = true;

    fn tenant_col() -> Option<Self::Column> {
        None
    }

    fn resource_col() -> Self::Column {
        Column::Id
    }

    // global, not per tenant: the registry has no tenant column
    fn scoped_unique() -> Vec<ScopedUnique<Self::Column>> {
        vec![ScopedUnique::new("ux_tenants_key", vec![Column::Key])]
    }
}

impl TryFrom<Model> for Tenant {
    type Error = UnknownTenantStatus;

    fn try_from(m: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: m.id,
            status: m.status.parse::<TenantStatus>()?,
            key: m.key,
            name: m.name,
            settings: m.settings,
        })
    }
}
