//! Cached repository handles with per-role overrides.
//!
//! - A role's repository is built once and then served from the cache until
//!   the cache is cleared or the role is evicted.
//! - Repository implementations are registered by class name. The built-in
//!   `select` class is always available.
//! - A custom repository maps a role to a class name. Registering one evicts
//!   the role's warm cache entry, so the next lookup builds the override.

use std::any::type_name;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde::Serialize;
use thiserror::Error;

use crate::adapters::orm::{Orm, RepositoryClass, SelectRepository};
use crate::domain::{Entity, EntityRef};
use crate::monitoring::MetricsCollector;
use crate::ports::{Repository, RepositoryError, TypedRepository};

/// Class name of the built-in repository
pub const DEFAULT_REPOSITORY_CLASS: &str = "select";

type RepositoryConstructor =
    Arc<dyn Fn(&Orm, &str) -> Result<Arc<dyn Repository>, RepositoryError> + Send + Sync>;

/// Rejected custom repository registration
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RepositoryFactoryError {
    #[error("Repository class '{0}' does not exist")]
    UnknownClass(String),

    #[error("Cannot register a repository for unknown entity '{0}'")]
    UnknownRole(String),
}

/// Live factory state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryStats {
    pub cached_repository_count: usize,
    pub custom_repository_count: usize,
    /// Roles with a cached repository, sorted
    pub entity_list: Vec<String>,
}

pub struct RepositoryFactory {
    orm: Arc<Orm>,
    default_class: RwLock<String>,
    classes: RwLock<HashMap<String, RepositoryConstructor>>,
    custom: RwLock<HashMap<String, String>>,
    cache: Mutex<HashMap<String, Arc<dyn Repository>>>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl fmt::Debug for RepositoryFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepositoryFactory")
            .field("stats", &self.get_stats())
            .finish()
    }
}

impl RepositoryFactory {
    pub fn new(orm: Arc<Orm>) -> Self {
        let factory = Self {
            orm,
            default_class: RwLock::new(DEFAULT_REPOSITORY_CLASS.to_string()),
            classes: RwLock::new(HashMap::new()),
            custom: RwLock::new(HashMap::new()),
            cache: Mutex::new(HashMap::new()),
            metrics: None,
        };
        factory.register_class::<SelectRepository>(DEFAULT_REPOSITORY_CLASS);
        factory
    }

    /// Count cache hits and misses
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn orm(&self) -> &Arc<Orm> {
        &self.orm
    }

    /// Make a repository type available under `name`.
    pub fn register_class<R: RepositoryClass>(&self, name: &str) {
        self.register_constructor(name, |orm, role| {
            Ok(Arc::new(R::build(orm, role)?) as Arc<dyn Repository>)
        });
    }

    /// Make a repository constructor available under `name`.
    pub fn register_constructor<F>(&self, name: &str, constructor: F)
    where
        F: Fn(&Orm, &str) -> Result<Arc<dyn Repository>, RepositoryError> + Send + Sync + 'static,
    {
        self.classes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), Arc::new(constructor));
    }

    pub fn has_class(&self, name: &str) -> bool {
        self.classes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Class used for roles without an override.
    ///
    /// # Errors
    ///
    /// `UnknownClass` if `name` was never registered.
    pub fn set_default_class(&self, name: &str) -> Result<(), RepositoryFactoryError> {
        if !self.has_class(name) {
            return Err(RepositoryFactoryError::UnknownClass(name.to_string()));
        }
        *self.default_class.write().unwrap_or_else(PoisonError::into_inner) = name.to_string();
        self.clear_cache();
        Ok(())
    }

    /// Serve `entity` through the repository class named `class`.
    ///
    /// Nothing changes when validation fails.
    ///
    /// # Errors
    ///
    /// - `UnknownClass` if no repository class is registered under `class`
    /// - `UnknownRole` if the entity is not part of the compiled schema
    pub fn register_custom_repository(
        &self,
        entity: impl Into<EntityRef>,
        class: &str,
    ) -> Result<(), RepositoryFactoryError> {
        let entity = entity.into();
        if !self.has_class(class) {
            return Err(RepositoryFactoryError::UnknownClass(class.to_string()));
        }
        if !self.orm.schema().has_role(entity.role()) {
            return Err(RepositoryFactoryError::UnknownRole(entity.role().to_string()));
        }

        self.custom
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(entity.role().to_string(), class.to_string());
        self.forget(entity.role());
        tracing::debug!(role = %entity, class = %class, "custom repository registered");
        Ok(())
    }

    /// Register `R` under its type name and serve `E` through it.
    pub fn register_custom<E: Entity, R: RepositoryClass>(&self) -> Result<(), RepositoryFactoryError> {
        let class = type_name::<R>();
        self.register_class::<R>(class);
        self.register_custom_repository(EntityRef::of::<E>(), class)
    }

    /// Cached repository for a role, built on first use.
    ///
    /// # Errors
    ///
    /// Whatever the repository class returns when building, typically
    /// `UnknownRole` or a connection error.
    pub fn get_repository(&self, entity: impl Into<EntityRef>) -> Result<Arc<dyn Repository>, RepositoryError> {
        let entity = entity.into();
        let role = entity.role();

        // held while building so concurrent first lookups share one handle
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(repository) = cache.get(role) {
            if let Some(metrics) = &self.metrics {
                metrics.record_cache_hit();
            }
            return Ok(Arc::clone(repository));
        }
        if let Some(metrics) = &self.metrics {
            metrics.record_cache_miss();
        }

        let repository = self.build(role)?;
        cache.insert(role.to_string(), Arc::clone(&repository));
        Ok(repository)
    }

    /// Repository for the role of a live entity; shares the type's cache entry.
    pub fn get_repository_for<E: Entity>(&self, entity: &E) -> Result<Arc<dyn Repository>, RepositoryError> {
        self.get_repository(EntityRef::instance(entity))
    }

    pub fn typed<E: Entity>(&self) -> Result<TypedRepository<E>, RepositoryError> {
        Ok(TypedRepository::new(self.get_repository(EntityRef::of::<E>())?))
    }

    /// Drop every cached repository; custom registrations are kept.
    pub fn clear_cache(&self) {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Drop one role's cached repository. Returns whether one was cached.
    pub fn forget(&self, role: &str) -> bool {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(role)
            .is_some()
    }

    pub fn get_stats(&self) -> RepositoryStats {
        let mut entity_list: Vec<String> = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        entity_list.sort();

        RepositoryStats {
            cached_repository_count: entity_list.len(),
            custom_repository_count: self.custom.read().unwrap_or_else(PoisonError::into_inner).len(),
            entity_list,
        }
    }

    fn build(&self, role: &str) -> Result<Arc<dyn Repository>, RepositoryError> {
        let class = self
            .custom
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(role)
            .cloned()
            .unwrap_or_else(|| {
                self.default_class
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone()
            });

        let constructor = self
            .classes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&class)
            .cloned()
            .ok_or_else(|| RepositoryError::Database(format!("repository class '{}' is not registered", class)))?;

        tracing::debug!(role = %role, class = %class, "building repository");
        constructor(&self.orm, role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::adapters::database::DatabaseManager;
    use crate::config::{ConnectionConfig, DatabaseConfig, EntitiesConfig, SchemaConfig};
    use crate::domain::schema::{EntityRegistry, SchemaCompiler};
    use crate::domain::{field, ColumnDef, EntityDescriptor, EntityError, Record, Value};
    use crate::ports::Criteria;

    #[derive(Debug, Clone)]
    struct Note {
        id: Option<i64>,
        body: String,
    }

    impl Entity for Note {
        const ROLE: &'static str = "note";

        fn describe() -> EntityDescriptor {
            EntityDescriptor::new(Self::ROLE, module_path!())
                .column(ColumnDef::primary("id"))
                .column(ColumnDef::text("body"))
        }

        fn to_record(&self) -> Record {
            let mut record = Record::new();
            record.insert("id".into(), self.id.into());
            record.insert("body".into(), self.body.clone().into());
            record
        }

        fn from_record(record: &Record) -> Result<Self, EntityError> {
            Ok(Self {
                id: field(record, "id")?,
                body: field(record, "body")?,
            })
        }

        fn primary_key(&self) -> Option<Value> {
            self.id.map(Value::Int)
        }

        fn set_primary_key(&mut self, value: Value) {
            self.id = value.as_i64();
        }
    }

    /// Repository that never finds anything
    struct EmptyRepository {
        role: String,
    }

    #[async_trait]
    impl Repository for EmptyRepository {
        fn role(&self) -> &str {
            &self.role
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

    impl RepositoryClass for EmptyRepository {
        fn build(_orm: &Orm, role: &str) -> Result<Self, RepositoryError> {
            Ok(Self { role: role.to_string() })
        }
    }

    fn factory() -> RepositoryFactory {
        let schema = SchemaCompiler::new(&EntitiesConfig::default(), &SchemaConfig::default())
            .compile(&EntityRegistry::new().register::<Note>())
            .unwrap();
        let database = Arc::new(DatabaseManager::new(DatabaseConfig::single(
            "default",
            ConnectionConfig::memory(),
        )));
        RepositoryFactory::new(Arc::new(Orm::new(database, Arc::new(schema))))
    }

    #[test]
    fn repeated_lookups_return_the_same_handle() {
        let factory = factory();
        let first = factory.get_repository(EntityRef::of::<Note>()).unwrap();
        let second = factory.get_repository("note").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn lookup_by_instance_hits_the_type_entry() {
        let factory = factory();
        let note = Note {
            id: None,
            body: "hello".to_string(),
        };
        let by_type = factory.get_repository(EntityRef::of::<Note>()).unwrap();
        let by_instance = factory.get_repository_for(&note).unwrap();
        assert!(Arc::ptr_eq(&by_type, &by_instance));
        assert_eq!(factory.get_stats().cached_repository_count, 1);
    }

    #[test]
    fn clear_cache_keeps_custom_repositories() {
        let factory = factory();
        factory.register_custom::<Note, EmptyRepository>().unwrap();
        factory.get_repository("note").unwrap();

        factory.clear_cache();

        let stats = factory.get_stats();
        assert_eq!(stats.cached_repository_count, 0);
        assert_eq!(stats.custom_repository_count, 1);
        assert!(stats.entity_list.is_empty());
    }

    #[test]
    fn unknown_class_is_rejected_without_side_effects() {
        let factory = factory();
        let err = factory
            .register_custom_repository("note", "app::NoSuchRepository")
            .unwrap_err();
        assert_eq!(
            err,
            RepositoryFactoryError::UnknownClass("app::NoSuchRepository".to_string())
        );
        assert_eq!(err.to_string(), "Repository class 'app::NoSuchRepository' does not exist");
        assert_eq!(factory.get_stats().custom_repository_count, 0);
    }

    #[test]
    fn unknown_role_is_rejected() {
        let factory = factory();
        assert_eq!(
            factory.register_custom_repository("ghost", DEFAULT_REPOSITORY_CLASS),
            Err(RepositoryFactoryError::UnknownRole("ghost".to_string()))
        );
    }

    #[tokio::test]
    async fn registration_evicts_warm_entry() {
        let factory = factory();
        let before = factory.get_repository("note").unwrap();

        factory.register_class::<EmptyRepository>("empty");
        factory.register_custom_repository("note", "empty").unwrap();

        let after = factory.get_repository("note").unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert!(after.find_all(&Criteria::new()).await.unwrap().is_empty());
    }

    #[test]
    fn default_class_must_exist() {
        let factory = factory();
        assert!(factory.set_default_class("missing").is_err());
        factory.register_class::<EmptyRepository>("empty");
        assert!(factory.set_default_class("empty").is_ok());
    }

    #[test]
    fn cache_hits_and_misses_are_counted() {
        let metrics = Arc::new(MetricsCollector::new());
        let factory = factory().with_metrics(Arc::clone(&metrics));
        factory.get_repository("note").unwrap();
        factory.get_repository("note").unwrap();
        factory.get_repository("note").unwrap();

        assert_eq!(metrics.get("cache_misses"), 1);
        assert_eq!(metrics.get("cache_hits"), 2);
    }

    #[test]
    fn stats_reflect_live_state() {
        let factory = factory();
        let stats = factory.get_stats();
        assert_eq!(stats.cached_repository_count, 0);

        factory.get_repository("note").unwrap();
        assert_eq!(factory.get_stats().entity_list, vec!["note".to_string()]);

        assert!(factory.forget("note"));
        assert!(!factory.forget("note"));
        assert_eq!(factory.get_stats().cached_repository_count, 0);
    }
}
