//! Integration tests for the HTTP layer.
//!
//! These tests drive the full router with `tower::ServiceExt::oneshot`:
//! 1. Handlers reach the ORM through the `OrmRequest` extractor
//! 2. The transaction middleware commits or discards queued changes
//! 3. The validation middleware rejects invalid payloads
//! 4. Health and metrics endpoints answer beside the ORM routes

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value as JsonValue};
use tower::ServiceExt;

use cycle_bridge::adapters::http::{app_router, OrmRequest};
use cycle_bridge::adapters::migrations::Migrator;
use cycle_bridge::adapters::orm::Orm;
use cycle_bridge::application::{services, CycleServiceProvider, RuntimeContext, ServiceRegistry};
use cycle_bridge::config::{ConnectionConfig, CycleConfig, DatabaseConfig, Environment};
use cycle_bridge::domain::schema::{EntityRegistry, Schema};
use cycle_bridge::domain::{field, ColumnDef, Entity, EntityDescriptor, EntityError, Record, Value};
use cycle_bridge::ports::Criteria;

// =============================================================================
// Test Infrastructure
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
struct Post {
    id: Option<i64>,
    title: String,
}

impl Entity for Post {
    const ROLE: &'static str = "post";

    fn describe() -> EntityDescriptor {
        EntityDescriptor::new(Self::ROLE, module_path!())
            .table("posts")
            .column(ColumnDef::primary("id"))
            .column(ColumnDef::string("title"))
    }

    fn to_record(&self) -> Record {
        let mut record = Record::new();
        record.insert("id".into(), self.id.into());
        record.insert("title".into(), self.title.clone().into());
        record
    }

    fn from_record(record: &Record) -> Result<Self, EntityError> {
        Ok(Self {
            id: field(record, "id")?,
            title: field(record, "title")?,
        })
    }

    fn primary_key(&self) -> Option<Value> {
        self.id.map(Value::Int)
    }

    fn set_primary_key(&mut self, value: Value) {
        self.id = value.as_i64();
    }
}

async fn create_post(orm: OrmRequest, Json(body): Json<JsonValue>) -> StatusCode {
    match orm.entity::<Post>(&body) {
        Ok(post) => {
            orm.entity_manager().persist(post);
            StatusCode::CREATED
        }
        Err(_) => StatusCode::BAD_REQUEST,
    }
}

async fn create_then_fail(orm: OrmRequest, Json(body): Json<JsonValue>) -> StatusCode {
    if let Ok(post) = orm.entity::<Post>(&body) {
        orm.entity_manager().persist(post);
    }
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn list_posts(orm: OrmRequest) -> Result<Json<JsonValue>, StatusCode> {
    let page = orm
        .paginate("post", orm.page_param(), 2)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(json!({
        "count": page.items.len(),
        "total": page.total,
        "page": page.page,
        "last_page": page.last_page,
    })))
}

async fn setup() -> (Arc<ServiceRegistry>, Router, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = CycleConfig::default();
    config.server.environment = Environment::Testing;
    config.database = DatabaseConfig::single("default", ConnectionConfig::memory());

    let mut provider = CycleServiceProvider::new(
        config,
        EntityRegistry::new().register::<Post>(),
        RuntimeContext::Http,
    )
    .with_base_path(dir.path());
    provider.register().unwrap();
    provider.boot().await.unwrap();

    let registry = provider.services().clone();
    let migrator = registry.make::<Migrator>(services::MIGRATOR).unwrap();
    let schema = registry.make::<Schema>(services::SCHEMA).unwrap();
    migrator.sync_schema(&schema).await.unwrap();

    let routes = Router::new()
        .route("/posts", post(create_post).get(list_posts))
        .route("/posts/fail", post(create_then_fail));
    let app = app_router(registry.clone(), routes);
    (registry, app, dir)
}

fn post_json(uri: &str, body: JsonValue) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-cycle-entity", "post")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> JsonValue {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn post_count(registry: &ServiceRegistry) -> u64 {
    let orm = registry.make::<Orm>(services::ORM).unwrap();
    orm.repository("post")
        .unwrap()
        .count(&Criteria::new())
        .await
        .unwrap()
}

// =============================================================================
// Transactions
// =============================================================================

#[tokio::test]
async fn successful_request_commits_changes() {
    let (registry, app, _dir) = setup().await;

    let response = app
        .oneshot(post_json("/posts", json!({"title": "Hello"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(post_count(&registry).await, 1);
}

#[tokio::test]
async fn failing_request_discards_changes() {
    let (registry, app, _dir) = setup().await;

    let response = app
        .oneshot(post_json("/posts/fail", json!({"title": "Never saved"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(post_count(&registry).await, 0);
}

// =============================================================================
// Validation
// =============================================================================

#[tokio::test]
async fn invalid_payload_is_rejected_before_the_handler() {
    let (registry, app, _dir) = setup().await;

    let response = app
        .oneshot(post_json("/posts", json!({"title": 42})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert_eq!(body["code"], "VALIDATION_FAILED");
    assert_eq!(body["errors"][0]["field"], "title");
    assert_eq!(post_count(&registry).await, 0);
}

#[tokio::test]
async fn non_object_body_is_rejected() {
    let (_registry, app, _dir) = setup().await;

    let response = app.oneshot(post_json("/posts", json!([1, 2]))).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

// =============================================================================
// Request decorator
// =============================================================================

#[tokio::test]
async fn pagination_reports_pages() {
    let (_registry, app, _dir) = setup().await;

    for title in ["a", "b", "c"] {
        let response = app
            .clone()
            .oneshot(post_json("/posts", json!({ "title": title })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let response = app.oneshot(get_request("/posts?page=2")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["total"], 3);
    assert_eq!(body["page"], 2);
    assert_eq!(body["last_page"], 2);
}

#[tokio::test]
async fn page_far_past_the_end_is_empty() {
    let (_registry, app, _dir) = setup().await;

    app.clone()
        .oneshot(post_json("/posts", json!({"title": "only"})))
        .await
        .unwrap();

    let response = app
        .oneshot(get_request("/posts?page=18446744073709551615"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["count"], 0);
    assert_eq!(body["total"], 1);
    assert_eq!(body["last_page"], 1);
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn health_endpoint_reports_healthy() {
    let (_registry, app, _dir) = setup().await;

    let response = app.oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CACHE_CONTROL).unwrap(),
        "no-cache, no-store, must-revalidate"
    );
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn unreachable_database_reports_check_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = CycleConfig::default();
    config.server.environment = Environment::Testing;
    config.database = DatabaseConfig::single(
        "default",
        ConnectionConfig::sqlite("/nonexistent/dir/cycle.db"),
    );
    let mut provider = CycleServiceProvider::new(
        config,
        EntityRegistry::new().register::<Post>(),
        RuntimeContext::Http,
    )
    .with_base_path(dir.path());
    provider.register().unwrap();
    provider.boot().await.unwrap();
    let app = app_router(provider.services().clone(), Router::new());

    let response = app.oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    assert_eq!(body["status"], "unhealthy");
    assert_eq!(body["checks"]["database"]["status"], "unhealthy");
    assert!(body["checks"]["database"]["error"].is_string());
    assert!(body["checks"]["database"].get("message").is_none());
}

#[tokio::test]
async fn metrics_endpoint_counts_requests() {
    let (_registry, app, _dir) = setup().await;

    app.clone()
        .oneshot(post_json("/posts", json!({"title": "Counted"})))
        .await
        .unwrap();

    let response = app.oneshot(get_request("/metrics")).await.unwrap();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("cycle_orm_entities_persisted 1"));
}
