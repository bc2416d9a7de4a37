//! Consolidated health report over the registered ORM services.
//!
//! Four checks run in a fixed order: services, database, schema and
//! performance. A failing check never stops the ones after it. Overall
//! status is healthy when the first three are healthy; performance may only
//! add a `warning`, which is reported but does not change the rollup.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::FutureExt;
use serde::Serialize;

use super::container::ServiceRegistry;
use super::provider::services;
use crate::adapters::database::DatabaseManager;
use crate::adapters::orm::Orm;
use crate::config::CycleConfig;
use crate::monitoring::{process_memory_mb, round2};

/// Services that must be registered for the ORM to be usable
pub const EXPECTED_SERVICES: [&str; 6] = [
    services::DATABASE,
    services::ORM,
    services::ENTITY_MANAGER,
    services::SCHEMA,
    services::MIGRATOR,
    services::REPOSITORY_FACTORY,
];

/// Response time above which performance reports a warning
pub const MAX_RESPONSE_TIME_MS: f64 = 1000.0;

/// Process memory above which performance reports a warning
pub const MAX_MEMORY_MB: f64 = 128.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Unhealthy,
}

/// Outcome of one check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckResult {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl CheckResult {
    pub fn healthy() -> Self {
        Self {
            status: HealthStatus::Healthy,
            error: None,
            missing: Vec::new(),
            warnings: Vec::new(),
            details: None,
        }
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            error: Some(message.into()),
            ..Self::healthy()
        }
    }

    fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub timestamp: String,
    pub response_time_ms: f64,
    /// Checks keyed by name
    pub checks: BTreeMap<String, CheckResult>,
    /// Set when a check failed unexpectedly and the run was cut short
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }

    pub fn check(&self, name: &str) -> Option<&CheckResult> {
        self.checks.get(name)
    }
}

/// Basic report plus static runtime introspection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailedHealthReport {
    #[serde(flatten)]
    pub report: HealthReport,
    pub environment: serde_json::Value,
}

/// Runs the health checks against a service registry.
pub struct HealthCheck {
    services: Arc<ServiceRegistry>,
    max_response_time_ms: f64,
    max_memory_mb: f64,
}

impl HealthCheck {
    pub fn new(services: Arc<ServiceRegistry>) -> Self {
        Self {
            services,
            max_response_time_ms: MAX_RESPONSE_TIME_MS,
            max_memory_mb: MAX_MEMORY_MB,
        }
    }

    pub fn with_thresholds(mut self, max_response_time_ms: f64, max_memory_mb: f64) -> Self {
        self.max_response_time_ms = max_response_time_ms;
        self.max_memory_mb = max_memory_mb;
        self
    }

    pub async fn check(&self) -> HealthReport {
        let started = Instant::now();
        let mut checks = BTreeMap::new();
        let mut error = None;

        let outcome = AssertUnwindSafe(self.run_checks(&mut checks, started))
            .catch_unwind()
            .await;
        if let Err(panic) = outcome {
            let message = panic_message(panic.as_ref());
            tracing::error!("Health check aborted: {}", message);
            error = Some(message);
        }

        let gated = ["services", "database", "schema"];
        let healthy = error.is_none()
            && gated
                .iter()
                .all(|name| checks.get(*name).map(CheckResult::is_healthy).unwrap_or(false));

        HealthReport {
            status: if healthy {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy
            },
            timestamp: Utc::now().to_rfc3339(),
            response_time_ms: round2(started.elapsed().as_secs_f64() * 1000.0),
            checks,
            error,
        }
    }

    /// Basic report wrapped with runtime details; the probes run once.
    pub async fn check_detailed(&self) -> DetailedHealthReport {
        let report = self.check().await;
        DetailedHealthReport {
            report,
            environment: self.environment(),
        }
    }

    async fn run_checks(&self, checks: &mut BTreeMap<String, CheckResult>, started: Instant) {
        checks.insert("services".to_string(), self.check_services());
        checks.insert("database".to_string(), self.check_database().await);
        checks.insert("schema".to_string(), self.check_schema());
        checks.insert("performance".to_string(), self.check_performance(started));
    }

    fn check_services(&self) -> CheckResult {
        let missing: Vec<String> = EXPECTED_SERVICES
            .iter()
            .filter(|name| !self.services.has(name))
            .map(|name| name.to_string())
            .collect();

        if missing.is_empty() {
            CheckResult::healthy()
        } else {
            CheckResult {
                missing,
                ..CheckResult::unhealthy("Required services are not registered")
            }
        }
    }

    async fn check_database(&self) -> CheckResult {
        let database = match self.services.make::<DatabaseManager>(services::DATABASE) {
            Ok(database) => database,
            Err(e) => return CheckResult::unhealthy(e.to_string()),
        };
        let connection = match database.default_connection() {
            Ok(connection) => connection,
            Err(e) => return CheckResult::unhealthy(e.to_string()),
        };

        let probe_started = Instant::now();
        let details = serde_json::json!({
            "connection": connection.name(),
            "driver": connection.dialect().driver().as_str(),
        });
        match connection.ping().await {
            Ok(()) => {
                let mut details = details;
                details["latency_ms"] = serde_json::json!(round2(probe_started.elapsed().as_secs_f64() * 1000.0));
                CheckResult::healthy().with_details(details)
            }
            Err(e) => {
                tracing::warn!("Database health probe failed: {}", e);
                CheckResult::unhealthy(e.to_string()).with_details(details)
            }
        }
    }

    fn check_schema(&self) -> CheckResult {
        match self.services.make::<Orm>(services::ORM) {
            Ok(orm) => {
                let schema = orm.schema();
                CheckResult::healthy().with_details(serde_json::json!({
                    "entities": schema.len(),
                    "tables": schema.tables().count(),
                }))
            }
            Err(e) => CheckResult::unhealthy(e.to_string()),
        }
    }

    fn check_performance(&self, started: Instant) -> CheckResult {
        let elapsed_ms = round2(started.elapsed().as_secs_f64() * 1000.0);
        let memory_mb = round2(process_memory_mb());

        let mut warnings = Vec::new();
        if elapsed_ms > self.max_response_time_ms {
            warnings.push(format!("High response time: {}ms", elapsed_ms));
        }
        if memory_mb > self.max_memory_mb {
            warnings.push(format!("High memory usage: {}MB", memory_mb));
        }

        CheckResult {
            status: if warnings.is_empty() {
                HealthStatus::Healthy
            } else {
                HealthStatus::Warning
            },
            warnings,
            ..CheckResult::healthy()
        }
        .with_details(serde_json::json!({
            "response_time_ms": elapsed_ms,
            "memory_mb": memory_mb,
        }))
    }

    fn environment(&self) -> serde_json::Value {
        let drivers = self
            .services
            .make::<DatabaseManager>(services::DATABASE)
            .map(|database| database.available_drivers())
            .unwrap_or_default();

        let mut environment = serde_json::json!({
            "package_version": env!("CARGO_PKG_VERSION"),
            "os": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
            "drivers": drivers,
            "services": self.services.names(),
        });

        if let Ok(config) = self.services.make::<CycleConfig>(services::CONFIG) {
            environment["config"] = serde_json::json!({
                "environment": config.server.environment.as_str(),
                "default_connection": config.database.default,
                "schema_cache": config.schema.cache,
                "schema_auto_sync": config.schema.auto_sync,
                "schema_strict": config.schema.strict,
                "migrations_table": config.migrations.table,
            });
        }
        environment
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "health check panicked".to_string()
    }
}
