//! Health and metrics endpoints.
//!
//! # Routes
//!
//! - `GET /health` - Health report, `?detailed=true` adds runtime details
//! - `GET /health/cycle` - Same report under the ORM-specific path
//! - `GET /metrics` - Prometheus exposition of the ORM counters
//!
//! The health routes answer 200 when the report is healthy and 503
//! otherwise. A performance warning alone keeps the status at 200.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::application::{services, HealthCheck, ServiceRegistry};
use crate::monitoring::MetricsCollector;

const NO_CACHE: &str = "no-cache, no-store, must-revalidate";

#[derive(Debug, Default, Deserialize)]
pub struct HealthParams {
    #[serde(default)]
    pub detailed: bool,
}

pub fn health_router(services: Arc<ServiceRegistry>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/health/cycle", get(health))
        .route("/metrics", get(metrics))
        .with_state(services)
}

pub async fn health(
    State(registry): State<Arc<ServiceRegistry>>,
    Query(params): Query<HealthParams>,
) -> Response {
    let check = HealthCheck::new(registry);
    let (healthy, body) = if params.detailed {
        let report = check.check_detailed().await;
        (report.report.is_healthy(), serde_json::to_value(&report))
    } else {
        let report = check.check().await;
        (report.is_healthy(), serde_json::to_value(&report))
    };

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = body.unwrap_or_else(|e| {
        tracing::error!("Failed to serialize health report: {}", e);
        serde_json::json!({"status": "unhealthy", "error": "report unavailable"})
    });

    let mut response = (status, Json(body)).into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static(NO_CACHE));
    response
}

pub async fn metrics(State(registry): State<Arc<ServiceRegistry>>) -> Response {
    match registry.make::<MetricsCollector>(services::METRICS) {
        Ok(metrics) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            metrics.to_prometheus(),
        )
            .into_response(),
        Err(e) => {
            tracing::warn!("Metrics unavailable: {}", e);
            (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({
                    "error": "Metrics are not enabled",
                    "code": "METRICS_UNAVAILABLE"
                })),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    async fn get_json(router: Router, uri: &str) -> (StatusCode, Option<HeaderValue>, serde_json::Value) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let cache = response.headers().get(header::CACHE_CONTROL).cloned();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, cache, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn empty_registry_is_unavailable() {
        let router = health_router(Arc::new(ServiceRegistry::new()));
        let (status, cache, body) = get_json(router, "/health").await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(cache.unwrap(), NO_CACHE);
        assert_eq!(body["status"], "unhealthy");
        assert_eq!(body["checks"]["services"]["missing"].as_array().unwrap().len(), 6);
    }

    #[tokio::test]
    async fn detailed_flag_adds_environment() {
        let router = health_router(Arc::new(ServiceRegistry::new()));
        let (_, _, body) = get_json(router, "/health/cycle?detailed=true").await;

        assert!(body["environment"].is_object());
        assert!(body["checks"].is_object());
    }

    #[tokio::test]
    async fn metrics_are_exposed_as_prometheus_text() {
        let registry = Arc::new(ServiceRegistry::new());
        let collector = Arc::new(MetricsCollector::new());
        collector.record_query_failure();
        registry.instance(services::METRICS, collector);

        let response = health_router(registry)
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("cycle_orm_queries_failed 1"));
    }
}
