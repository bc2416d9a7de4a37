//! Per-request ORM access for handlers.
//!
//! - `OrmContext` - placed in request extensions by `inject_middleware`
//! - `OrmRequest` - extractor wrapping the context and the request parts
//!
//! ```text
//! Request → inject_middleware → OrmContext in extensions
//!                                      ↓
//!                        Handler → OrmRequest extractor reads it
//! ```
//!
//! # Example
//!
//! ```ignore
//! async fn show_post(orm: OrmRequest, Path(id): Path<i64>) -> Result<Json<Post>, StatusCode> {
//!     orm.find::<Post>(id)
//!         .await
//!         .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
//!         .map(Json)
//!         .ok_or(StatusCode::NOT_FOUND)
//! }
//! ```

use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use http::request::Parts;
use serde::Serialize;

use crate::adapters::orm::{EntityManager, Orm};
use crate::application::RepositoryFactory;
use crate::domain::{Entity, EntityError, EntityRef, Record, Value};
use crate::ports::{Criteria, Order, Repository, RepositoryError, TypedRepository};

/// Largest page size `paginate` hands out
pub const MAX_PER_PAGE: u64 = 100;

/// ORM services for one request. The entity manager is never shared
/// between requests.
#[derive(Clone)]
pub struct OrmContext {
    orm: Arc<Orm>,
    repositories: Arc<RepositoryFactory>,
    entity_manager: Arc<EntityManager>,
}

impl OrmContext {
    pub fn new(orm: Arc<Orm>, repositories: Arc<RepositoryFactory>) -> Self {
        let entity_manager = Arc::new(orm.entity_manager());
        Self {
            orm,
            repositories,
            entity_manager,
        }
    }

    pub fn orm(&self) -> &Arc<Orm> {
        &self.orm
    }

    pub fn repositories(&self) -> &Arc<RepositoryFactory> {
        &self.repositories
    }

    pub fn entity_manager(&self) -> &Arc<EntityManager> {
        &self.entity_manager
    }
}

/// One page of records
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
    pub last_page: u64,
}

/// Request decorator with ORM conveniences.
///
/// Anything beyond these operations goes through [`OrmRequest::request`].
#[derive(Clone)]
pub struct OrmRequest {
    context: OrmContext,
    parts: Parts,
}

impl OrmRequest {
    /// Cached repository for a role
    pub fn repository(&self, entity: impl Into<EntityRef>) -> Result<Arc<dyn Repository>, RepositoryError> {
        self.context.repositories.get_repository(entity)
    }

    pub fn typed<E: Entity>(&self) -> Result<TypedRepository<E>, RepositoryError> {
        self.context.repositories.typed::<E>()
    }

    /// Build an entity from a JSON object, column by column.
    pub fn entity<E: Entity>(&self, payload: &serde_json::Value) -> Result<E, EntityError> {
        let object = payload
            .as_object()
            .ok_or_else(|| EntityError::InvalidPayload("expected a JSON object".to_string()))?;

        let mut record = Record::new();
        for (key, value) in object {
            let value = Value::from_json(value).ok_or_else(|| {
                EntityError::InvalidPayload(format!("field '{}' is not a scalar", key))
            })?;
            record.insert(key.clone(), value);
        }
        E::from_record(&record)
    }

    pub async fn find<E: Entity>(&self, pk: impl Into<Value>) -> Result<Option<E>, RepositoryError> {
        self.typed::<E>()?.find_by_pk(pk).await
    }

    /// Page `page` (1-based) of a role's records, ordered by primary key.
    ///
    /// `per_page` is clamped to `1..=MAX_PER_PAGE`; pages past the end are empty.
    pub async fn paginate(
        &self,
        entity: impl Into<EntityRef>,
        page: u64,
        per_page: u64,
    ) -> Result<Page<Record>, RepositoryError> {
        let entity = entity.into();
        let page = page.max(1);
        let per_page = per_page.clamp(1, MAX_PER_PAGE);
        let schema = self.context.orm.entity_schema(entity.role())?;
        let repository = self.repository(entity.clone())?;

        let total = repository.count(&Criteria::new()).await?;
        let last_page = total.div_ceil(per_page).max(1);
        let items = if page > last_page {
            Vec::new()
        } else {
            repository
                .find_all(
                    &Criteria::new()
                        .order_by(schema.primary_key.as_str(), Order::Asc)
                        .limit(per_page)
                        .offset((page - 1) * per_page),
                )
                .await?
        };

        Ok(Page {
            items,
            total,
            page,
            per_page,
            last_page,
        })
    }

    /// `page` query parameter, defaulting to 1
    pub fn page_param(&self) -> u64 {
        self.parts
            .uri
            .query()
            .into_iter()
            .flat_map(|query| query.split('&'))
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| *key == "page")
            .and_then(|(_, value)| value.parse().ok())
            .unwrap_or(1)
    }

    /// The request's entity manager; changes are committed by the
    /// transaction middleware.
    pub fn entity_manager(&self) -> &Arc<EntityManager> {
        self.context.entity_manager()
    }

    pub fn context(&self) -> &OrmContext {
        &self.context
    }

    /// The wrapped request head
    pub fn request(&self) -> &Parts {
        &self.parts
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for OrmRequest
where
    S: Send + Sync,
{
    type Rejection = OrmRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let context = parts
            .extensions
            .get::<OrmContext>()
            .cloned()
            .ok_or(OrmRejection::MissingContext)?;
        Ok(Self {
            context,
            parts: parts.clone(),
        })
    }
}

/// Rejection when the inject middleware did not run.
#[derive(Debug, Clone)]
pub enum OrmRejection {
    MissingContext,
}

impl IntoResponse for OrmRejection {
    fn into_response(self) -> Response {
        tracing::error!("OrmRequest used on a route without inject_middleware");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({
                "error": "ORM is not available for this route",
                "code": "ORM_CONTEXT_MISSING"
            })),
        )
            .into_response()
    }
}
