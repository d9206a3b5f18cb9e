use sea_orm::{ColumnTrait, Condition, EntityTrait, sea_query::Expr};

use crate::secure::{AccessScope, ScopableEntity};

/// Builds the tenant predicate for `E` under `scope`.
///
/// # Policy Rules
/// 1. **Tenant-exempt entity** → no predicate
/// 2. **Unrestricted scope** (escape hatch) → no predicate
/// 3. **Tenant scope** → `tenant_col = tenant_id`
/// 4. **Tenant scope, entity has no tenant column** → deny all (`false`)
pub fn build_scope_condition<E>(scope: &AccessScope) -> Condition
where
    E: ScopableEntity + EntityTrait,
    E::Column: ColumnTrait + Copy,
{
    let deny_all = || Condition::all().add(Expr::value(false));

    if E::IS_TENANT_EXEMPT {
        return Condition::all();
    }

    match (scope.tenant_id(), E::tenant_col()) {
        (None, _) => Condition::all(),
        (Some(tenant_id), Some(tcol)) => Condition::all().add(tcol.eq(tenant_id)),
        (Some(_), None) => {
            tracing::warn!(
                entity = std::any::type_name::<E>(),
                "entity declares no tenant column; denying scoped access"
            );
            deny_all()
        }
    }
}
