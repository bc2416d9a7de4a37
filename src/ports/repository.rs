//! Repository port - per-entity read access.
//!
//! A repository answers lookups for one entity role. Repositories move
//! [`Record`]s; [`TypedRepository`] decodes them into concrete entities.
//!
//! # Design
//!
//! - **Read-only**: writes go through the entity manager's unit of work
//! - **Role-scoped**: one repository per entity role
//! - **Replaceable**: custom repositories may be registered per role

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{Entity, EntityError, Record, Value};

/// Errors raised by repositories and the unit of work.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Unknown entity role '{0}'")]
    UnknownRole(String),

    #[error("Unknown column '{column}' for entity '{role}'")]
    UnknownColumn { role: String, column: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error(transparent)]
    Entity(#[from] EntityError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

impl Order {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Order::Asc => "ASC",
            Order::Desc => "DESC",
        }
    }
}

/// Equality filters, ordering and paging for a lookup.
///
/// ```ignore
/// let criteria = Criteria::new()
///     .where_eq("status", "published")
///     .order_by("id", Order::Desc)
///     .limit(20);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Criteria {
    pub filters: Vec<(String, Value)>,
    pub order: Vec<(String, Order)>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl Criteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn where_eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push((column.into(), value.into()));
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, order: Order) -> Self {
        self.order.push((column.into(), order));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Same filters without ordering or paging, for counting
    pub fn unpaged(&self) -> Self {
        Self {
            filters: self.filters.clone(),
            ..Self::default()
        }
    }
}

/// Repository port.
///
/// Required capabilities of every repository, default or custom:
/// `find_by_pk`, `find_one` and `find_all`. `count` backs pagination.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Role this repository serves
    fn role(&self) -> &str;

    /// Find a record by primary key.
    ///
    /// Returns `None` if not found.
    async fn find_by_pk(&self, pk: &Value) -> Result<Option<Record>, RepositoryError>;

    /// First record matching the criteria.
    async fn find_one(&self, criteria: &Criteria) -> Result<Option<Record>, RepositoryError>;

    /// Every record matching the criteria.
    async fn find_all(&self, criteria: &Criteria) -> Result<Vec<Record>, RepositoryError>;

    /// Number of records matching the criteria's filters.
    async fn count(&self, criteria: &Criteria) -> Result<u64, RepositoryError>;
}

/// A repository that decodes records into `E`.
pub struct TypedRepository<E> {
    inner: Arc<dyn Repository>,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for TypedRepository<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            _entity: PhantomData,
        }
    }
}

impl<E> fmt::Debug for TypedRepository<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedRepository")
            .field("role", &self.inner.role())
            .finish()
    }
}

impl<E: Entity> TypedRepository<E> {
    pub fn new(inner: Arc<dyn Repository>) -> Self {
        Self {
            inner,
            _entity: PhantomData,
        }
    }

    /// The untyped repository
    pub fn inner(&self) -> &Arc<dyn Repository> {
        &self.inner
    }

    pub async fn find_by_pk(&self, pk: impl Into<Value>) -> Result<Option<E>, RepositoryError> {
        match self.inner.find_by_pk(&pk.into()).await? {
            Some(record) => Ok(Some(E::from_record(&record)?)),
            None => Ok(None),
        }
    }

    pub async fn find_one(&self, criteria: &Criteria) -> Result<Option<E>, RepositoryError> {
        match self.inner.find_one(criteria).await? {
            Some(record) => Ok(Some(E::from_record(&record)?)),
            None => Ok(None),
        }
    }

    pub async fn find_all(&self, criteria: &Criteria) -> Result<Vec<E>, RepositoryError> {
        self.inner
            .find_all(criteria)
            .await?
            .iter()
            .map(|record| E::from_record(record).map_err(RepositoryError::from))
            .collect()
    }

    pub async fn count(&self, criteria: &Criteria) -> Result<u64, RepositoryError> {
        self.inner.count(criteria).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Compile-time check that trait is object-safe
    #[allow(dead_code)]
    fn assert_object_safe(_: &dyn Repository) {}

    #[test]
    fn criteria_builder_accumulates() {
        let criteria = Criteria::new()
            .where_eq("status", "draft")
            .where_eq("views", 3i64)
            .order_by("id", Order::Desc)
            .limit(5)
            .offset(10);

        assert_eq!(criteria.filters.len(), 2);
        assert_eq!(criteria.filters[1].1, Value::Int(3));
        assert_eq!(criteria.order, vec![("id".to_string(), Order::Desc)]);
        assert_eq!(criteria.limit, Some(5));
        assert_eq!(criteria.offset, Some(10));
    }

    #[test]
    fn unpaged_keeps_only_filters() {
        let criteria = Criteria::new()
            .where_eq("status", "draft")
            .order_by("id", Order::Asc)
            .limit(5);
        let unpaged = criteria.unpaged();
        assert_eq!(unpaged.filters, criteria.filters);
        assert!(unpaged.order.is_empty());
        assert_eq!(unpaged.limit, None);
    }
}
