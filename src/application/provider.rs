//! CycleServiceProvider - registers the ORM services and boots them.
//!
//! ```text
//! Unregistered ──register()──▶ Registered ──boot()──▶ Booted
//! ```
//!
//! `register()` binds lazy singletons only; nothing touches the database
//! until a service is first resolved. `boot()` wires middleware and
//! listeners, publishes templates and optionally synchronizes the schema.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use super::commands::CommandRegistry;
use super::container::{ContainerError, ServiceRegistry};
use super::health::{HealthCheck, HealthReport};
use super::listeners::{CacheInvalidationListener, MetricsListener, QueryLogListener};
use super::repository_factory::{RepositoryFactory, DEFAULT_REPOSITORY_CLASS};
use crate::adapters::database::DatabaseManager;
use crate::adapters::events::{EventDispatcher, ALL_EVENTS};
use crate::adapters::http::MiddlewareRegistry;
use crate::adapters::migrations::Migrator;
use crate::adapters::orm::{EntityManager, Orm, RepositoryClass};
use crate::config::{CycleConfig, MigrationsConfig, SchemaConfig, ValidationError};
use crate::domain::schema::{EntityRegistry, Schema, SchemaCompiler};
use crate::monitoring::{MetricsCollector, PerformanceProfiler, QueryLogger};
use crate::ports::{OrmEvent, OrmEventPublisher};

/// Names the ORM services are bound under.
pub mod services {
    pub const DATABASE: &str = "cycle.database";
    /// Short alias of [`DATABASE`]
    pub const DATABASE_ALIAS: &str = "db";
    pub const SCHEMA: &str = "cycle.schema";
    pub const ORM: &str = "cycle.orm";
    pub const ENTITY_MANAGER: &str = "cycle.em";
    pub const REPOSITORY_FACTORY: &str = "cycle.repository_factory";
    pub const MIGRATOR: &str = "cycle.migrator";
    /// Console only
    pub const COMMANDS: &str = "cycle.commands";
    pub const METRICS: &str = "cycle.metrics";
    pub const PROFILER: &str = "cycle.profiler";
    pub const QUERY_LOGGER: &str = "cycle.query_logger";
    pub const EVENTS: &str = "cycle.events";
    pub const MIDDLEWARE: &str = "cycle.middleware";
    pub const ENTITIES: &str = "cycle.entities";
    pub const CONFIG: &str = "cycle.config";
}

/// Published config template, relative to the base path
pub const CONFIG_TEMPLATE_PATH: &str = "config/cycle.yaml";

/// Where the application is running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeContext {
    Http,
    Console,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderState {
    Unregistered,
    Registered,
    Booted,
}

impl fmt::Display for ProviderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProviderState::Unregistered => "unregistered",
            ProviderState::Registered => "registered",
            ProviderState::Booted => "booted",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ValidationError),

    #[error("Cannot {action} a provider that is {state}")]
    IllegalState {
        action: &'static str,
        state: ProviderState,
    },

    #[error(transparent)]
    Container(#[from] ContainerError),
}

type RepositoryInstaller = Arc<dyn Fn(&RepositoryFactory) + Send + Sync>;

/// Registers and boots the ORM services in a [`ServiceRegistry`].
///
/// # Example
///
/// ```ignore
/// let mut provider = CycleServiceProvider::new(config, entities, RuntimeContext::Http)
///     .repository_class::<AuditedRepository>("audited");
/// provider.register()?;
/// provider.boot().await?;
/// let orm = provider.services().make::<Orm>(services::ORM)?;
/// ```
pub struct CycleServiceProvider {
    config: Arc<CycleConfig>,
    entities: Arc<EntityRegistry>,
    context: RuntimeContext,
    base_path: PathBuf,
    repository_classes: Vec<(String, RepositoryInstaller)>,
    services: Arc<ServiceRegistry>,
    state: ProviderState,
}

impl CycleServiceProvider {
    pub fn new(config: CycleConfig, entities: EntityRegistry, context: RuntimeContext) -> Self {
        Self {
            config: Arc::new(config),
            entities: Arc::new(entities),
            context,
            base_path: PathBuf::from("."),
            repository_classes: Vec::new(),
            services: Arc::new(ServiceRegistry::new()),
            state: ProviderState::Unregistered,
        }
    }

    /// Directory that relative paths in the configuration resolve against
    pub fn with_base_path(mut self, base_path: impl Into<PathBuf>) -> Self {
        self.base_path = base_path.into();
        self
    }

    /// Make a repository class available to the factory under `name`.
    pub fn repository_class<R: RepositoryClass>(mut self, name: &str) -> Self {
        let class = name.to_string();
        let installer: RepositoryInstaller =
            Arc::new(move |factory: &RepositoryFactory| factory.register_class::<R>(&class));
        self.repository_classes.push((name.to_string(), installer));
        self
    }

    pub fn services(&self) -> &Arc<ServiceRegistry> {
        &self.services
    }

    pub fn config(&self) -> &CycleConfig {
        &self.config
    }

    pub fn state(&self) -> ProviderState {
        self.state
    }

    pub fn context(&self) -> RuntimeContext {
        self.context
    }

    /// Bind every ORM service.
    ///
    /// # Errors
    ///
    /// - `Config` if the configuration is invalid
    /// - `IllegalState` if the provider was already registered
    pub fn register(&mut self) -> Result<(), ProviderError> {
        if self.state != ProviderState::Unregistered {
            return Err(ProviderError::IllegalState {
                action: "register",
                state: self.state,
            });
        }
        self.validate()?;

        let registry = &self.services;
        registry.instance(services::CONFIG, Arc::clone(&self.config));
        registry.instance(services::ENTITIES, Arc::clone(&self.entities));
        registry.instance(services::EVENTS, Arc::new(EventDispatcher::new()));
        registry.instance(services::METRICS, Arc::new(MetricsCollector::new()));
        registry.instance(services::PROFILER, Arc::new(PerformanceProfiler::new()));
        registry.instance(services::QUERY_LOGGER, Arc::new(QueryLogger::default()));

        self.register_database();
        self.register_orm();
        self.register_repositories();
        self.register_migrator();

        if self.context == RuntimeContext::Console {
            registry.instance(services::COMMANDS, Arc::new(CommandRegistry::new(&self.base_path)));
        }

        self.state = ProviderState::Registered;
        tracing::info!(
            services = registry.names().len(),
            context = ?self.context,
            "ORM services registered"
        );
        Ok(())
    }

    /// Wire middleware and listeners, publish templates and run the
    /// development auto-sync.
    ///
    /// Template and auto-sync failures are logged and never fail boot.
    ///
    /// # Errors
    ///
    /// - `IllegalState` unless the provider is registered and not yet booted
    /// - `Container` if the event dispatcher cannot be resolved
    pub async fn boot(&mut self) -> Result<(), ProviderError> {
        if self.state != ProviderState::Registered {
            return Err(ProviderError::IllegalState {
                action: "boot",
                state: self.state,
            });
        }

        self.services
            .instance(services::MIDDLEWARE, Arc::new(MiddlewareRegistry::with_defaults()));
        self.register_listeners()?;

        match self.publish_templates() {
            Ok(published) => {
                for path in published {
                    tracing::info!(path = %path.display(), "published template");
                }
            }
            Err(e) => tracing::warn!("Failed to publish ORM templates: {}", e),
        }

        if self.config.is_development() && self.config.schema.auto_sync {
            self.auto_sync().await;
        }

        self.state = ProviderState::Booted;
        tracing::info!("ORM services booted");
        Ok(())
    }

    /// Health report over this provider's services
    pub async fn health_check(&self) -> HealthReport {
        HealthCheck::new(Arc::clone(&self.services)).check().await
    }

    fn validate(&self) -> Result<(), ValidationError> {
        self.config.validate()?;
        let default = &self.config.repositories.default;
        let known = default == DEFAULT_REPOSITORY_CLASS
            || self.repository_classes.iter().any(|(name, _)| name == default);
        if !known {
            return Err(ValidationError::UnknownRepositoryClass(default.clone()));
        }
        Ok(())
    }

    fn register_database(&self) {
        let config = self.config.database.clone();
        self.services
            .singleton::<DatabaseManager, _>(services::DATABASE, move |registry| {
                let events = registry.make::<EventDispatcher>(services::EVENTS)?;
                Ok(Arc::new(DatabaseManager::new(config.clone()).with_events(events)))
            });
        self.services.alias(services::DATABASE_ALIAS, services::DATABASE);
    }

    fn register_orm(&self) {
        let entities_config = self.config.entities.clone();
        let schema_config = SchemaConfig {
            cache_path: self.base_path.join(&self.config.schema.cache_path),
            ..self.config.schema.clone()
        };
        self.services.singleton::<Schema, _>(services::SCHEMA, move |registry| {
            let entities = registry.make::<EntityRegistry>(services::ENTITIES)?;
            SchemaCompiler::new(&entities_config, &schema_config)
                .compile(&entities)
                .map(Arc::new)
                .map_err(|e| ContainerError::factory(services::SCHEMA, e))
        });

        self.services.singleton::<Orm, _>(services::ORM, |registry| {
            let database = registry.make::<DatabaseManager>(services::DATABASE)?;
            let schema = registry.make::<Schema>(services::SCHEMA)?;
            let events = registry.make::<EventDispatcher>(services::EVENTS)?;
            Ok(Arc::new(Orm::new(database, schema).with_events(events)))
        });

        self.services
            .singleton::<EntityManager, _>(services::ENTITY_MANAGER, |registry| {
                let orm = registry.make::<Orm>(services::ORM)?;
                Ok(Arc::new(orm.entity_manager()))
            });
    }

    fn register_repositories(&self) {
        let default_class = self.config.repositories.default.clone();
        let installers: Vec<RepositoryInstaller> = self
            .repository_classes
            .iter()
            .map(|(_, installer)| Arc::clone(installer))
            .collect();

        self.services
            .singleton::<RepositoryFactory, _>(services::REPOSITORY_FACTORY, move |registry| {
                let orm = registry.make::<Orm>(services::ORM)?;
                let metrics = registry.make::<MetricsCollector>(services::METRICS)?;
                let factory = RepositoryFactory::new(orm).with_metrics(metrics);
                for install in &installers {
                    install(&factory);
                }
                factory
                    .set_default_class(&default_class)
                    .map_err(|e| ContainerError::factory(services::REPOSITORY_FACTORY, e))?;
                Ok(Arc::new(factory))
            });
    }

    fn register_migrator(&self) {
        let config = MigrationsConfig {
            directory: self.base_path.join(&self.config.migrations.directory),
            ..self.config.migrations.clone()
        };
        let environment = self.config.server.environment;
        self.services.singleton::<Migrator, _>(services::MIGRATOR, move |registry| {
            let database = registry.make::<DatabaseManager>(services::DATABASE)?;
            Ok(Arc::new(Migrator::new(database, config.clone(), environment)))
        });
    }

    fn register_listeners(&self) -> Result<(), ContainerError> {
        let events = self.services.make::<EventDispatcher>(services::EVENTS)?;
        let metrics = self.services.make::<MetricsCollector>(services::METRICS)?;
        events.subscribe(ALL_EVENTS, Arc::new(MetricsListener::new(metrics)));

        if self.config.is_development() {
            let logger = self.services.make::<QueryLogger>(services::QUERY_LOGGER)?;
            events.subscribe(OrmEvent::QUERY_EXECUTED, Arc::new(QueryLogListener::new(logger)));
        }

        events.subscribe(
            OrmEvent::ENTITY_PERSISTED,
            Arc::new(CacheInvalidationListener::new(&self.services)),
        );
        tracing::debug!(listeners = events.listener_count(), "ORM listeners subscribed");
        Ok(())
    }

    /// Write the config template and the migrations directory. Existing
    /// files are left alone. Returns the paths that were created.
    fn publish_templates(&self) -> std::io::Result<Vec<PathBuf>> {
        let mut published = Vec::new();

        let config_path = self.base_path.join(CONFIG_TEMPLATE_PATH);
        if !config_path.exists() {
            let rendered = serde_yaml::to_string(&CycleConfig::template())
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            write_new(&config_path, &rendered)?;
            published.push(config_path);
        }

        let keep = self
            .base_path
            .join(&self.config.migrations.directory)
            .join(".gitkeep");
        if !keep.exists() {
            write_new(&keep, "")?;
            published.push(keep);
        }

        Ok(published)
    }

    async fn auto_sync(&self) {
        let migrator = match self.services.make::<Migrator>(services::MIGRATOR) {
            Ok(migrator) => migrator,
            Err(e) => {
                tracing::warn!("Schema auto-sync skipped: {}", e);
                return;
            }
        };
        match migrator.run().await {
            Ok(applied) if !applied.is_empty() => {
                tracing::info!(count = applied.len(), "applied pending migrations")
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Auto-sync migrations failed: {}", e),
        }

        let schema = match self.services.make::<Schema>(services::SCHEMA) {
            Ok(schema) => schema,
            Err(e) => {
                tracing::warn!("Schema auto-sync skipped: {}", e);
                return;
            }
        };
        match migrator.sync_schema(&schema).await {
            Ok(tables) => tracing::info!(tables = tables.len(), "schema synchronized"),
            Err(e) => tracing::warn!("Schema synchronization failed: {}", e),
        }
    }
}

fn write_new(path: &Path, contents: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConnectionConfig, DatabaseConfig, Environment};
    use crate::domain::{ColumnDef, EntityDescriptor};
    use crate::domain::{Record, Value};
    use crate::ports::{Criteria, Repository, RepositoryError};

    fn config(environment: Environment) -> CycleConfig {
        let mut config = CycleConfig::default();
        config.server.environment = environment;
        config.database = DatabaseConfig::single("default", ConnectionConfig::memory());
        config
    }

    fn entities() -> EntityRegistry {
        EntityRegistry::new().register_descriptor(
            EntityDescriptor::new("post", "app")
                .column(ColumnDef::primary("id"))
                .column(ColumnDef::string("title")),
        )
    }

    fn provider(environment: Environment, base: &Path) -> CycleServiceProvider {
        CycleServiceProvider::new(config(environment), entities(), RuntimeContext::Http)
            .with_base_path(base)
    }

    // ════════════════════════════════════════════════════════════════════════════════
    // Lifecycle
    // ════════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn boot_before_register_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut provider = provider(Environment::Testing, dir.path());

        let err = provider.boot().await.unwrap_err();
        assert!(matches!(
            err,
            ProviderError::IllegalState {
                action: "boot",
                state: ProviderState::Unregistered
            }
        ));
    }

    #[tokio::test]
    async fn register_twice_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut provider = provider(Environment::Testing, dir.path());
        provider.register().unwrap();

        assert!(matches!(
            provider.register(),
            Err(ProviderError::IllegalState { action: "register", .. })
        ));
        assert_eq!(provider.state(), ProviderState::Registered);
    }

    #[test]
    fn unknown_default_repository_class_fails_registration() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(Environment::Testing);
        config.repositories.default = "audited".to_string();
        let mut provider = CycleServiceProvider::new(config, entities(), RuntimeContext::Http)
            .with_base_path(dir.path());

        let err = provider.register().unwrap_err();
        assert!(matches!(
            err,
            ProviderError::Config(ValidationError::UnknownRepositoryClass(ref class)) if class == "audited"
        ));
        assert!(!provider.services().has(services::ORM));
    }

    // ════════════════════════════════════════════════════════════════════════════════
    // Registration
    // ════════════════════════════════════════════════════════════════════════════════

    #[test]
    fn register_binds_lazily() {
        let dir = tempfile::tempdir().unwrap();
        let mut provider = provider(Environment::Testing, dir.path());
        provider.register().unwrap();
        let registry = provider.services();

        for name in super::super::health::EXPECTED_SERVICES {
            assert!(registry.has(name), "{} should be bound", name);
            assert!(!registry.is_resolved(name), "{} should stay lazy", name);
        }
        assert!(registry.has(services::DATABASE_ALIAS));
        assert!(!registry.has(services::COMMANDS));
    }

    #[test]
    fn console_context_binds_commands() {
        let dir = tempfile::tempdir().unwrap();
        let mut provider =
            CycleServiceProvider::new(config(Environment::Testing), entities(), RuntimeContext::Console)
                .with_base_path(dir.path());
        provider.register().unwrap();

        assert!(provider.services().has(services::COMMANDS));
    }

    #[tokio::test]
    async fn services_resolve_to_single_instances() {
        let dir = tempfile::tempdir().unwrap();
        let mut provider = provider(Environment::Testing, dir.path());
        provider.register().unwrap();
        let registry = provider.services();

        let first = registry.make::<Orm>(services::ORM).unwrap();
        let second = registry.make::<Orm>(services::ORM).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let via_alias = registry.make::<DatabaseManager>(services::DATABASE_ALIAS).unwrap();
        assert!(Arc::ptr_eq(first.database(), &via_alias));
    }

    struct Audited;

    #[async_trait::async_trait]
    impl Repository for Audited {
        fn role(&self) -> &str {
            "post"
        }

        async fn find_by_pk(&self, _pk: &Value) -> Result<Option<Record>, RepositoryError> {
            Ok(None)
        }

        async fn find_one(&self, _criteria: &Criteria) -> Result<Option<Record>, RepositoryError> {
            Ok(None)
        }

        async fn find_all(&self, _criteria: &Criteria) -> Result<Vec<Record>, RepositoryError> {
            Ok(Vec::new())
        }

        async fn count(&self, _criteria: &Criteria) -> Result<u64, RepositoryError> {
            Ok(0)
        }
    }

    impl RepositoryClass for Audited {
        fn build(_orm: &Orm, _role: &str) -> Result<Self, RepositoryError> {
            Ok(Audited)
        }
    }

    #[test]
    fn custom_repository_class_can_be_the_default() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(Environment::Testing);
        config.repositories.default = "audited".to_string();
        let mut provider = CycleServiceProvider::new(config, entities(), RuntimeContext::Http)
            .with_base_path(dir.path())
            .repository_class::<Audited>("audited");
        provider.register().unwrap();

        let factory = provider
            .services()
            .make::<RepositoryFactory>(services::REPOSITORY_FACTORY)
            .unwrap();
        assert!(factory.has_class("audited"));
        assert!(factory.has_class(DEFAULT_REPOSITORY_CLASS));
    }

    // ════════════════════════════════════════════════════════════════════════════════
    // Boot
    // ════════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn boot_wires_middleware_and_listeners() {
        let dir = tempfile::tempdir().unwrap();
        let mut provider = provider(Environment::Development, dir.path());
        provider.register().unwrap();
        provider.boot().await.unwrap();
        let registry = provider.services();

        let middleware = registry.make::<MiddlewareRegistry>(services::MIDDLEWARE).unwrap();
        assert_eq!(middleware.names().len(), 3);

        let events = registry.make::<EventDispatcher>(services::EVENTS).unwrap();
        assert_eq!(
            events.listener_names(OrmEvent::QUERY_EXECUTED),
            vec!["query_log", "metrics"]
        );
        assert_eq!(
            events.listener_names(OrmEvent::ENTITY_PERSISTED),
            vec!["cache_invalidation", "metrics"]
        );
        assert_eq!(provider.state(), ProviderState::Booted);
    }

    #[tokio::test]
    async fn query_log_listener_is_development_only() {
        let dir = tempfile::tempdir().unwrap();
        let mut provider = provider(Environment::Production, dir.path());
        provider.register().unwrap();
        provider.boot().await.unwrap();

        let events = provider
            .services()
            .make::<EventDispatcher>(services::EVENTS)
            .unwrap();
        assert_eq!(events.listener_names(OrmEvent::QUERY_EXECUTED), vec!["metrics"]);
    }

    #[tokio::test]
    async fn boot_publishes_templates_without_overwriting() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("config")).unwrap();
        std::fs::write(dir.path().join(CONFIG_TEMPLATE_PATH), "custom: true\n").unwrap();

        let mut provider = provider(Environment::Testing, dir.path());
        provider.register().unwrap();
        provider.boot().await.unwrap();

        let kept = std::fs::read_to_string(dir.path().join(CONFIG_TEMPLATE_PATH)).unwrap();
        assert_eq!(kept, "custom: true\n");
        assert!(dir.path().join("migrations/.gitkeep").exists());
    }

    fn auto_sync_provider(base: &Path) -> CycleServiceProvider {
        let mut config = config(Environment::Development);
        config.schema.auto_sync = true;
        CycleServiceProvider::new(config, entities(), RuntimeContext::Http).with_base_path(base)
    }

    #[tokio::test]
    async fn auto_sync_applies_migrations_and_creates_tables() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("migrations")).unwrap();
        std::fs::write(
            dir.path().join("migrations/1_create_audit.sql"),
            "CREATE TABLE audit (id INTEGER PRIMARY KEY);",
        )
        .unwrap();

        let mut provider = auto_sync_provider(dir.path());
        provider.register().unwrap();
        provider.boot().await.unwrap();
        let registry = provider.services();

        let migrator = registry.make::<Migrator>(services::MIGRATOR).unwrap();
        let status = migrator.status().await.unwrap();
        assert_eq!(status.applied.len(), 1);
        assert!(status.pending.is_empty());

        let orm = registry.make::<Orm>(services::ORM).unwrap();
        let posts = orm.repository("post").unwrap();
        assert_eq!(posts.count(&Criteria::new()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn failed_auto_sync_does_not_fail_boot() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("migrations")).unwrap();
        std::fs::write(dir.path().join("migrations/1_broken.sql"), "THIS IS NOT SQL;").unwrap();

        let mut provider = auto_sync_provider(dir.path());
        provider.register().unwrap();

        assert!(provider.boot().await.is_ok());
        assert_eq!(provider.state(), ProviderState::Booted);

        let migrator = provider.services().make::<Migrator>(services::MIGRATOR).unwrap();
        let status = migrator.status().await.unwrap();
        assert!(status.applied.is_empty());
        assert_eq!(status.pending, vec!["1_broken".to_string()]);
    }

    #[tokio::test]
    async fn auto_sync_is_skipped_outside_development() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(Environment::Testing);
        config.schema.auto_sync = true;
        let mut provider = CycleServiceProvider::new(config, entities(), RuntimeContext::Http)
            .with_base_path(dir.path());
        provider.register().unwrap();
        provider.boot().await.unwrap();

        let orm = provider.services().make::<Orm>(services::ORM).unwrap();
        let posts = orm.repository("post").unwrap();
        assert!(posts.count(&Criteria::new()).await.is_err());
    }

    #[tokio::test]
    async fn boot_twice_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut provider = provider(Environment::Testing, dir.path());
        provider.register().unwrap();
        provider.boot().await.unwrap();

        assert!(matches!(
            provider.boot().await,
            Err(ProviderError::IllegalState { action: "boot", state: ProviderState::Booted })
        ));
    }

    #[tokio::test]
    async fn registered_provider_reports_healthy() {
        let dir = tempfile::tempdir().unwrap();
        let mut provider = provider(Environment::Testing, dir.path());
        provider.register().unwrap();
        provider.boot().await.unwrap();

        let report = provider.health_check().await;
        assert!(report.is_healthy(), "{:?}", report);
    }
}
