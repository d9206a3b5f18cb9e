use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, IdenStatic,
    IntoActiveModel, QueryFilter, SqlErr, Value, sea_query::SimpleExpr,
};
use std::collections::BTreeSet;
use std::marker::PhantomData;
use uuid::Uuid;

use crate::secure::cond::build_scope_condition;
use crate::secure::error::AccessError;
use crate::secure::runner::DbRunner;
use crate::secure::{AccessScope, ScopableEntity, Scoped, SecureEntityExt, Unscoped};
use tenancy_security::TenantId;

/// Insert `am` as a row owned by `owner`.
///
/// The tenant column is always written from `owner`; a caller-supplied value
/// that disagrees fails with [`AccessError::TenantMismatch`].
pub(crate) async fn insert_owned<E>(
    conn: &DatabaseConnection,
    owner: Option<TenantId>,
    mut am: E::ActiveModel,
) -> Result<E::Model, AccessError>
where
    E: ScopableEntity + EntityTrait,
    E::Column: ColumnTrait + Copy,
    E::ActiveModel: ActiveModelTrait<Entity = E> + Send,
    E::Model: IntoActiveModel<E::ActiveModel>,
{
    match (E::tenant_col(), owner) {
        (Some(tcol), Some(owner)) => stamp_tenant::<E>(&mut am, tcol, owner)?,
        (Some(_), None) => {
            return Err(AccessError::Invalid(
                "tenant-owned rows must be created for an explicit tenant",
            ));
        }
        (None, _) => {}
    }

    am.insert(conn).await.map_err(map_write_err::<E>)
}

fn stamp_tenant<E>(am: &mut E::ActiveModel, tcol: E::Column, owner: TenantId) -> Result<(), AccessError>
where
    E: ScopableEntity + EntityTrait,
    E::ActiveModel: ActiveModelTrait<Entity = E>,
{
    let stamped = Value::from(owner);
    if let ActiveValue::Set(supplied) | ActiveValue::Unchanged(supplied) = am.get(tcol)
        && supplied != stamped
    {
        tracing::warn!(
            entity = std::any::type_name::<E>(),
            tenant_id = %owner,
            "rejected create carrying a foreign tenant id"
        );
        return Err(AccessError::TenantMismatch { expected: owner });
    }
    am.set(tcol, stamped);
    Ok(())
}

/// Update the row `id` within `scope`.
///
/// Rows outside the scope are reported as [`AccessError::NotFound`]. The tenant
/// and resource columns are never part of the `SET` list.
pub(crate) async fn update_scoped<E>(
    conn: &DatabaseConnection,
    scope: &AccessScope,
    id: Uuid,
    mut am: E::ActiveModel,
) -> Result<E::Model, AccessError>
where
    E: ScopableEntity + EntityTrait,
    E::Column: ColumnTrait + Copy,
    E::ActiveModel: ActiveModelTrait<Entity = E> + Send,
{
    if let Some(tcol) = E::tenant_col() {
        if let ActiveValue::Set(supplied) = am.get(tcol) {
            match scope.tenant_id() {
                Some(tid) if supplied == Value::from(tid) => {}
                Some(tid) => return Err(AccessError::TenantMismatch { expected: tid }),
                None => return Err(AccessError::Invalid("tenant_id is immutable")),
            }
        }
        am.not_set(tcol);
    }
    am.not_set(E::resource_col());

    if am.is_changed() {
        let res = E::update_many()
            .set(am)
            .filter(E::resource_col().eq(id))
            .secure_update()
            .scope_with(scope)
            .exec_on(conn)
            .await?;
        if res.rows_affected == 0 {
            return Err(AccessError::NotFound);
        }
    }

    E::find()
        .secure()
        .scope_with(scope)
        .and_id(id)
        .inner
        .one(conn)
        .await?
        .ok_or(AccessError::NotFound)
}

/// Delete the row `id` within `scope`.
pub(crate) async fn delete_scoped<E>(
    conn: &DatabaseConnection,
    scope: &AccessScope,
    id: Uuid,
) -> Result<(), AccessError>
where
    E: ScopableEntity + EntityTrait,
    E::Column: ColumnTrait + Copy,
{
    let res = E::delete_many()
        .filter(E::resource_col().eq(id))
        .secure_delete()
        .scope_with(scope)
        .inner
        .exec(conn)
        .await?;
    if res.rows_affected == 0 {
        return Err(AccessError::NotFound);
    }
    Ok(())
}

/// Map a write error, translating unique-index violations into
/// [`AccessError::ScopedUniquenessViolation`] for the matching rule.
pub(crate) fn map_write_err<E>(err: DbErr) -> AccessError
where
    E: ScopableEntity + EntityTrait,
    E::Column: ColumnTrait + Copy,
{
    let Some(SqlErr::UniqueConstraintViolation(message)) = err.sql_err() else {
        return AccessError::Db(err);
    };

    let tenant_col = E::tenant_col();
    let hit = E::scoped_unique().into_iter().find(|rule| {
        let indexed: BTreeSet<&str> = tenant_col
            .iter()
            .chain(&rule.columns)
            .map(IdenStatic::as_str)
            .collect();
        violates(&message, rule.name, &indexed)
    });

    match hit {
        Some(rule) => {
            tracing::debug!(constraint = rule.name, "scoped uniqueness violation");
            AccessError::ScopedUniquenessViolation {
                constraint: rule.name,
            }
        }
        None => AccessError::Db(err),
    }
}

const SQLITE_UNIQUE_FAILED: &str = "UNIQUE constraint failed:";

/// Whether `message` reports a violation of the index `name` over `indexed`.
///
/// SQLite lists the offending `table.column` pairs (or `index 'name'` for
/// expression indexes); the list must equal the indexed column set. Postgres
/// quotes the constraint name, which must match exactly.
fn violates(message: &str, name: &str, indexed: &BTreeSet<&str>) -> bool {
    let Some((_, target)) = message.split_once(SQLITE_UNIQUE_FAILED) else {
        return message.contains(&format!("\"{name}\""));
    };
    let target = target.trim();
    if let Some(index) = target.strip_prefix("index '") {
        return index.trim_end_matches('\'') == name;
    }
    let failed: BTreeSet<&str> = target
        .split(',')
        .map(|qualified| {
            let qualified = qualified.trim();
            qualified.rsplit_once('.').map_or(qualified, |(_, col)| col)
        })
        .collect();
    failed == *indexed
}

/// Bulk update confined to the bound tenant.
///
/// Obtained from [`TenantGuard::update_many`](crate::TenantGuard::update_many)
/// already scoped; the tenant column cannot be assigned through it.
#[derive(Clone, Debug)]
pub struct SecureUpdateMany<E: EntityTrait, S> {
    pub(crate) inner: sea_orm::UpdateMany<E>,
    pub(crate) _state: PhantomData<S>,
}

pub(crate) trait SecureUpdateExt<E: EntityTrait>: Sized {
    fn secure_update(self) -> SecureUpdateMany<E, Unscoped>;
}

impl<E> SecureUpdateExt<E> for sea_orm::UpdateMany<E>
where
    E: EntityTrait,
{
    fn secure_update(self) -> SecureUpdateMany<E, Unscoped> {
        SecureUpdateMany {
            inner: self,
            _state: PhantomData,
        }
    }
}

impl<E> SecureUpdateMany<E, Unscoped>
where
    E: ScopableEntity + EntityTrait,
    E::Column: ColumnTrait + Copy,
{
    #[must_use]
    pub(crate) fn scope_with(self, scope: &AccessScope) -> SecureUpdateMany<E, Scoped> {
        let cond = build_scope_condition::<E>(scope);
        SecureUpdateMany {
            inner: self.inner.filter(cond),
            _state: PhantomData,
        }
    }
}

impl<E> SecureUpdateMany<E, Scoped>
where
    E: ScopableEntity + EntityTrait,
    E::Column: ColumnTrait + Copy,
{
    /// Assign `expr` to `col` for every row in scope.
    ///
    /// # Errors
    /// Returns `AccessError::Invalid` when `col` is the tenant or resource column.
    pub fn col_expr(mut self, col: E::Column, expr: SimpleExpr) -> Result<Self, AccessError> {
        let name = IdenStatic::as_str(&col);
        if E::tenant_col().is_some_and(|t| IdenStatic::as_str(&t) == name) {
            return Err(AccessError::Invalid("tenant_id is immutable"));
        }
        if IdenStatic::as_str(&E::resource_col()) == name {
            return Err(AccessError::Invalid("resource id is immutable"));
        }
        self.inner = self.inner.col_expr(col, expr);
        Ok(self)
    }

    /// Narrow the update; the tenant predicate stays.
    #[must_use]
    pub fn filter(mut self, filter: sea_orm::Condition) -> Self {
        self.inner = QueryFilter::filter(self.inner, filter);
        self
    }

    /// Returns the number of rows changed.
    ///
    /// # Errors
    /// `AccessError::ScopedUniquenessViolation` when a rule is hit, otherwise `AccessError::Db`.
    pub async fn exec<R: DbRunner>(self, runner: &R) -> Result<u64, AccessError> {
        Ok(self.exec_on(runner.as_seaorm()).await?.rows_affected)
    }

    pub(crate) async fn exec_on(
        self,
        conn: &DatabaseConnection,
    ) -> Result<sea_orm::UpdateResult, AccessError> {
        self.inner.exec(conn).await.map_err(map_write_err::<E>)
    }
}

/// Bulk delete confined to the bound tenant.
#[derive(Clone, Debug)]
pub struct SecureDeleteMany<E: EntityTrait, S> {
    pub(crate) inner: sea_orm::DeleteMany<E>,
    pub(crate) _state: PhantomData<S>,
}

pub(crate) trait SecureDeleteExt<E: EntityTrait>: Sized {
    fn secure_delete(self) -> SecureDeleteMany<E, Unscoped>;
}

impl<E> SecureDeleteExt<E> for sea_orm::DeleteMany<E>
where
    E: EntityTrait,
{
    fn secure_delete(self) -> SecureDeleteMany<E, Unscoped> {
        SecureDeleteMany {
            inner: self,
            _state: PhantomData,
        }
    }
}

impl<E> SecureDeleteMany<E, Unscoped>
where
    E: ScopableEntity + EntityTrait,
    E::Column: ColumnTrait + Copy,
{
    #[must_use]
    pub(crate) fn scope_with(self, scope: &AccessScope) -> SecureDeleteMany<E, Scoped> {
        let cond = build_scope_condition::<E>(scope);
        SecureDeleteMany {
            inner: self.inner.filter(cond),
            _state: PhantomData,
        }
    }
}

impl<E> SecureDeleteMany<E, Scoped>
where
    E: EntityTrait,
{
    /// Narrow the delete; the tenant predicate stays.
    #[must_use]
    pub fn filter(mut self, filter: sea_orm::Condition) -> Self {
        self.inner = QueryFilter::filter(self.inner, filter);
        self
    }

    /// Returns the number of rows removed.
    ///
    /// # Errors
    /// `AccessError::Db` on a driver failure.
    pub async fn exec<R: DbRunner>(self, runner: &R) -> Result<u64, AccessError> {
        Ok(self.inner.exec(runner.as_seaorm()).await?.rows_affected)
    }
}
