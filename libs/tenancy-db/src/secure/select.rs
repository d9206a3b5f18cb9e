use sea_orm::{
    ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
};
use std::marker::PhantomData;
use uuid::Uuid;

use crate::secure::cond::build_scope_condition;
use crate::secure::error::AccessError;
use crate::secure::runner::DbRunner;
use crate::secure::{AccessScope, ScopableEntity};

/// Query built but not yet narrowed to a tenant; not executable.
#[derive(Debug, Clone, Copy)]
pub struct Unscoped;

/// Query carrying the tenant predicate; executable through a [`DbRunner`].
#[derive(Debug, Clone, Copy)]
pub struct Scoped;

/// `Select` that only runs after the tenant predicate has been attached.
///
/// # Example
/// ```rust,ignore
/// let products = guard
///     .find::<product::Entity>()?
///     .filter(Condition::all().add(product::Column::Name.contains("lamp")))
///     .all(&guard)
///     .await?;
/// ```
#[must_use]
#[derive(Clone, Debug)]
pub struct SecureSelect<E: EntityTrait, S> {
    pub(crate) inner: sea_orm::Select<E>,
    pub(crate) _state: PhantomData<S>,
}

pub trait SecureEntityExt<E: EntityTrait>: Sized {
    /// Wrap a plain select; it stays unusable until `scope_with` runs.
    fn secure(self) -> SecureSelect<E, Unscoped>;
}

impl<E> SecureEntityExt<E> for sea_orm::Select<E>
where
    E: EntityTrait,
{
    fn secure(self) -> SecureSelect<E, Unscoped> {
        SecureSelect {
            inner: self,
            _state: PhantomData,
        }
    }
}

impl<E> SecureSelect<E, Unscoped>
where
    E: ScopableEntity + EntityTrait,
    E::Column: ColumnTrait + Copy,
{
    /// AND the predicate for `scope` into the query.
    pub fn scope_with(self, scope: &AccessScope) -> SecureSelect<E, Scoped> {
        let cond = build_scope_condition::<E>(scope);
        SecureSelect {
            inner: self.inner.filter(cond),
            _state: PhantomData,
        }
    }
}

impl<E> SecureSelect<E, Scoped>
where
    E: EntityTrait,
{
    /// # Errors
    /// `AccessError::Db` on a driver failure.
    pub async fn all<R: DbRunner>(self, runner: &R) -> Result<Vec<E::Model>, AccessError> {
        Ok(self.inner.all(runner.as_seaorm()).await?)
    }

    /// # Errors
    /// `AccessError::Db` on a driver failure.
    pub async fn one<R: DbRunner>(self, runner: &R) -> Result<Option<E::Model>, AccessError> {
        Ok(self.inner.one(runner.as_seaorm()).await?)
    }

    /// Number of rows visible in scope.
    ///
    /// # Errors
    /// `AccessError::Db` on a driver failure.
    pub async fn count<R: DbRunner>(self, runner: &R) -> Result<u64, AccessError>
    where
        E::Model: sea_orm::FromQueryResult + Send + Sync,
    {
        Ok(self.inner.count(runner.as_seaorm()).await?)
    }

    /// Narrow the scoped query to a single resource id.
    pub fn and_id(self, id: Uuid) -> Self
    where
        E: ScopableEntity,
        E::Column: ColumnTrait + Copy,
    {
        let cond = sea_orm::Condition::all().add(E::resource_col().eq(id));
        self.filter(cond)
    }

    /// Extra predicates are ANDed; they cannot widen the tenant filter.
    pub fn filter(self, filter: sea_orm::Condition) -> Self {
        Self {
            inner: QueryFilter::filter(self.inner, filter),
            _state: PhantomData,
        }
    }

    pub fn order_by<C>(mut self, col: C, order: sea_orm::Order) -> Self
    where
        C: sea_orm::IntoSimpleExpr,
    {
        self.inner = QueryOrder::order_by(self.inner, col, order);
        self
    }

    /// Page window over the scoped rows.
    pub fn page(mut self, offset: u64, limit: u64) -> Self {
        self.inner = QuerySelect::limit(QuerySelect::offset(self.inner, offset), limit);
        self
    }
}
