//! Payload validation middleware.
//!
//! Write requests (`POST`, `PUT`, `PATCH`) that name an entity role in the
//! `x-cycle-entity` header have their JSON body checked against the
//! compiled schema and every validator registered for the role. The body is
//! handed on unchanged when it passes.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{header, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use super::registry::MiddlewareRegistry;
use crate::adapters::orm::SchemaValidator;
use crate::application::{services, ServiceRegistry};
use crate::domain::schema::Schema;
use crate::ports::{EntityValidator, FieldError};

/// Header naming the entity role of the request body
pub const ENTITY_HEADER: &str = "x-cycle-entity";

/// Largest body the middleware buffers
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

pub async fn validation_middleware(
    State(registry): State<Arc<ServiceRegistry>>,
    request: Request,
    next: Next,
) -> Response {
    if !matches!(*request.method(), Method::POST | Method::PUT | Method::PATCH) {
        return next.run(request).await;
    }
    let Some(role) = request
        .headers()
        .get(ENTITY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
    else {
        return next.run(request).await;
    };

    let declared_length = request
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<usize>().ok());
    if declared_length.is_some_and(|len| len > MAX_BODY_BYTES) {
        return too_large();
    }

    let (parts, body) = request.into_parts();
    let bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!("Failed to read request body: {}", e);
            return too_large();
        }
    };

    let payload = match serde_json::from_slice::<serde_json::Value>(&bytes) {
        Ok(serde_json::Value::Object(payload)) => payload,
        _ => {
            return rejection(vec![FieldError::new("_body", "must be a JSON object")]);
        }
    };

    let errors = validate(&registry, &role, &payload);
    if !errors.is_empty() {
        tracing::debug!(role = %role, errors = errors.len(), "payload rejected");
        return rejection(errors);
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

fn validate(
    registry: &ServiceRegistry,
    role: &str,
    payload: &serde_json::Map<String, serde_json::Value>,
) -> Vec<FieldError> {
    let mut errors = match registry.make::<Schema>(services::SCHEMA) {
        Ok(schema) => SchemaValidator::new(schema).validate(role, payload),
        Err(e) => {
            tracing::warn!("Schema unavailable for validation: {}", e);
            Vec::new()
        }
    };
    if let Ok(middleware) = registry.make::<MiddlewareRegistry>(services::MIDDLEWARE) {
        errors.extend(middleware.validate(role, payload));
    }
    errors
}

fn rejection(errors: Vec<FieldError>) -> Response {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({
            "error": "Validation failed",
            "code": "VALIDATION_FAILED",
            "errors": errors
        })),
    )
        .into_response()
}

fn too_large() -> Response {
    (
        StatusCode::PAYLOAD_TOO_LARGE,
        Json(json!({
            "error": "Request body too large",
            "code": "PAYLOAD_TOO_LARGE"
        })),
    )
        .into_response()
}
