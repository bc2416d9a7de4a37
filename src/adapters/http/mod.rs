//! HTTP adapters - axum integration of the ORM services.
//!
//! - `context` - Per-request `OrmContext` and the `OrmRequest` extractor
//! - `middleware` - Inject, validation and transaction layers
//! - `health` - Health and metrics endpoints

pub mod context;
pub mod health;
pub mod middleware;

use std::sync::Arc;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::application::ServiceRegistry;

pub use context::{OrmContext, OrmRejection, OrmRequest, Page, MAX_PER_PAGE};
pub use health::health_router;
pub use middleware::{
    inject_middleware, transaction_middleware, validation_middleware, with_orm_middleware,
    with_transaction, MiddlewareRegistry, TransactionError,
};

/// Build the application router.
///
/// `routes` get the ORM middleware stack; the health and metrics endpoints
/// are mounted beside them without it, so they keep answering when the
/// ORM cannot be resolved.
pub fn app_router(services: Arc<ServiceRegistry>, routes: Router) -> Router {
    with_orm_middleware(routes, services.clone())
        .merge(health_router(services))
        .layer(TraceLayer::new_for_http())
}
