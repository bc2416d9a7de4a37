//! HTTP middleware for axum.
//!
//! - `inject` - Attaches the per-request `OrmContext`
//! - `validation` - Rejects invalid entity payloads
//! - `transaction` - Commits or discards the request's entity manager
//! - `registry` - Named middleware and per-role validators

pub mod inject;
pub mod registry;
pub mod transaction;
pub mod validation;

use std::sync::Arc;

use axum::{middleware, Router};

use crate::application::ServiceRegistry;

pub use inject::{inject_middleware, OrmState};
pub use registry::{MiddlewareRegistry, INJECT, TRANSACTION, VALIDATE};
pub use transaction::{transaction_middleware, with_transaction, TransactionError};
pub use validation::{validation_middleware, ENTITY_HEADER, MAX_BODY_BYTES};

/// Wrap `router` in the ORM middleware stack.
///
/// Requests pass inject, then validation, then transaction before reaching
/// a handler.
pub fn with_orm_middleware<S>(router: Router<S>, services: Arc<ServiceRegistry>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router
        .layer(middleware::from_fn(transaction_middleware))
        .layer(middleware::from_fn_with_state(services.clone(), validation_middleware))
        .layer(middleware::from_fn_with_state(services, inject_middleware))
}
