//! ORM injection middleware.
//!
//! Resolves the ORM and repository factory from the service registry and
//! attaches a fresh [`OrmContext`] to every request.
//!
//! # Example
//!
//! ```ignore
//! let app = Router::new()
//!     .route("/posts", get(list_posts))
//!     .layer(middleware::from_fn_with_state(services.clone(), inject_middleware));
//! ```

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

use crate::adapters::http::context::OrmContext;
use crate::adapters::orm::Orm;
use crate::application::{services, ContainerError, RepositoryFactory, ServiceRegistry};

/// Middleware state: the application's service registry.
pub type OrmState = Arc<ServiceRegistry>;

pub async fn inject_middleware(State(registry): State<OrmState>, mut request: Request, next: Next) -> Response {
    match context(&registry) {
        Ok(context) => {
            request.extensions_mut().insert(context);
            next.run(request).await
        }
        Err(e) => {
            tracing::error!("ORM services unavailable: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({
                    "error": "ORM services are unavailable",
                    "code": "ORM_UNAVAILABLE"
                })),
            )
                .into_response()
        }
    }
}

fn context(registry: &ServiceRegistry) -> Result<OrmContext, ContainerError> {
    let orm = registry.make::<Orm>(services::ORM)?;
    let repositories = registry.make::<RepositoryFactory>(services::REPOSITORY_FACTORY)?;
    Ok(OrmContext::new(orm, repositories))
}
