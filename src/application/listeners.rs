//! Event listeners wired at boot.

use std::sync::{Arc, Weak};

use super::container::ServiceRegistry;
use super::provider::services;
use super::repository_factory::RepositoryFactory;
use crate::monitoring::{MetricsCollector, QueryLogger, QueryRecord};
use crate::ports::{OrmEvent, OrmListener};

/// Records executed queries in the query log. Subscribed in development only.
pub struct QueryLogListener {
    logger: Arc<QueryLogger>,
}

impl QueryLogListener {
    pub fn new(logger: Arc<QueryLogger>) -> Self {
        Self { logger }
    }
}

impl OrmListener for QueryLogListener {
    fn handle(&self, event: &OrmEvent) {
        if let OrmEvent::QueryExecuted {
            connection,
            sql,
            bindings,
            duration_ms,
        } = event
        {
            self.logger.log(QueryRecord::new(
                connection.as_str(),
                sql.as_str(),
                bindings.clone(),
                *duration_ms,
            ));
        }
    }

    fn name(&self) -> &'static str {
        "query_log"
    }
}

/// Feeds query timings and entity counts into the metrics collector.
pub struct MetricsListener {
    metrics: Arc<MetricsCollector>,
}

impl MetricsListener {
    pub fn new(metrics: Arc<MetricsCollector>) -> Self {
        Self { metrics }
    }
}

impl OrmListener for MetricsListener {
    fn handle(&self, event: &OrmEvent) {
        match event {
            OrmEvent::QueryExecuted { sql, duration_ms, .. } => {
                self.metrics.record_query_time(sql, *duration_ms)
            }
            OrmEvent::QueryFailed { .. } => self.metrics.record_query_failure(),
            OrmEvent::EntityPersisted { .. } => self.metrics.record_persisted(1),
            OrmEvent::EntityLoaded { count, .. } => self.metrics.record_loaded(*count as u64),
        }
    }

    fn name(&self) -> &'static str {
        "metrics"
    }
}

/// Evicts a role's cached repository once one of its entities is written.
///
/// The factory is looked up on each event and only when it has already been
/// constructed; a factory that was never built has nothing cached.
pub struct CacheInvalidationListener {
    services: Weak<ServiceRegistry>,
}

impl CacheInvalidationListener {
    pub fn new(services: &Arc<ServiceRegistry>) -> Self {
        Self {
            services: Arc::downgrade(services),
        }
    }

    fn factory(&self) -> Option<Arc<RepositoryFactory>> {
        let registry = self.services.upgrade()?;
        if !registry.is_resolved(services::REPOSITORY_FACTORY) {
            return None;
        }
        registry.make::<RepositoryFactory>(services::REPOSITORY_FACTORY).ok()
    }
}

impl OrmListener for CacheInvalidationListener {
    fn handle(&self, event: &OrmEvent) {
        if let OrmEvent::EntityPersisted { role, operation } = event {
            let evicted = self.factory().map(|factory| factory.forget(role)).unwrap_or(false);
            if evicted {
                tracing::trace!(role = %role, ?operation, "repository cache entry evicted");
            }
        }
    }

    fn name(&self) -> &'static str {
        "cache_invalidation"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::Operation;

    fn executed(sql: &str, duration_ms: f64) -> OrmEvent {
        OrmEvent::QueryExecuted {
            connection: "default".to_string(),
            sql: sql.to_string(),
            bindings: vec!["1".to_string()],
            duration_ms,
        }
    }

    #[test]
    fn query_log_listener_records_executed_queries_only() {
        let logger = Arc::new(QueryLogger::default());
        let listener = QueryLogListener::new(Arc::clone(&logger));

        listener.handle(&executed("SELECT 1", 0.4));
        listener.handle(&OrmEvent::QueryFailed {
            connection: "default".to_string(),
            sql: "SELECT nope".to_string(),
            error: "no such column".to_string(),
        });

        let recent = logger.recent(10);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].sql, "SELECT 1");
        assert_eq!(recent[0].bindings, vec!["1".to_string()]);
    }

    #[test]
    fn metrics_listener_counts_every_event_kind() {
        let metrics = Arc::new(MetricsCollector::new());
        let listener = MetricsListener::new(Arc::clone(&metrics));

        listener.handle(&executed("SELECT 1", 250.0));
        listener.handle(&OrmEvent::QueryFailed {
            connection: "default".to_string(),
            sql: "SELECT".to_string(),
            error: "syntax".to_string(),
        });
        listener.handle(&OrmEvent::EntityPersisted {
            role: "post".to_string(),
            operation: Operation::Insert,
        });
        listener.handle(&OrmEvent::EntityLoaded {
            role: "post".to_string(),
            count: 4,
        });

        assert_eq!(metrics.get("queries_executed"), 1);
        assert_eq!(metrics.get("slow_queries"), 1);
        assert_eq!(metrics.get("queries_failed"), 1);
        assert_eq!(metrics.get("entities_persisted"), 1);
        assert_eq!(metrics.get("entities_loaded"), 4);
    }

    #[test]
    fn cache_invalidation_ignores_unbuilt_factory() {
        let registry = Arc::new(ServiceRegistry::new());
        registry.singleton::<RepositoryFactory, _>(services::REPOSITORY_FACTORY, |_| {
            Err(crate::application::ContainerError::factory("factory", "must stay lazy"))
        });
        let listener = CacheInvalidationListener::new(&registry);

        listener.handle(&OrmEvent::EntityPersisted {
            role: "post".to_string(),
            operation: Operation::Update,
        });
        assert!(!registry.is_resolved(services::REPOSITORY_FACTORY));
    }
}
