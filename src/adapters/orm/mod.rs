//! The ORM: database manager plus compiled schema.
//!
//! - `Orm` - resolves default repositories and entity schemas by role
//! - `RepositoryClass` - a repository type constructible for any role
//! - `SelectRepository` - the default repository implementation
//! - `EntityManager` - pending change set with `persist`, `delete`, `run`
//! - `SchemaValidator` - payload checks derived from the compiled schema

mod entity_manager;
mod select;
mod validator;

pub use entity_manager::{EntityManager, Tracked};
pub use select::SelectRepository;
pub use validator::SchemaValidator;

use std::fmt;
use std::sync::Arc;

use crate::adapters::database::DatabaseManager;
use crate::domain::schema::{EntitySchema, Schema};
use crate::domain::EntityRef;
use crate::ports::{OrmEvent, OrmEventPublisher, Repository, RepositoryError};

/// A repository implementation that can be built for a role.
///
/// This is the contract a custom repository must satisfy to be registered
/// with the repository factory. The `Repository` supertrait carries the
/// lookup operations, so a type without them cannot be registered:
///
/// ```compile_fail
/// use cycle_bridge::adapters::orm::{Orm, RepositoryClass};
/// use cycle_bridge::ports::RepositoryError;
///
/// struct NotARepository;
///
/// impl RepositoryClass for NotARepository {
///     fn build(_orm: &Orm, _role: &str) -> Result<Self, RepositoryError> {
///         Ok(NotARepository)
///     }
/// }
/// ```
pub trait RepositoryClass: Repository + Sized + 'static {
    fn build(orm: &Orm, role: &str) -> Result<Self, RepositoryError>;
}

impl RepositoryClass for SelectRepository {
    fn build(orm: &Orm, role: &str) -> Result<Self, RepositoryError> {
        let schema = orm.entity_schema(role)?.clone();
        let connection = orm.database().default_connection()?;
        Ok(SelectRepository::new(schema, connection, orm.events().cloned()))
    }
}

pub struct Orm {
    database: Arc<DatabaseManager>,
    schema: Arc<Schema>,
    events: Option<Arc<dyn OrmEventPublisher>>,
}

impl fmt::Debug for Orm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orm")
            .field("roles", &self.schema.roles().collect::<Vec<_>>())
            .finish()
    }
}

impl Orm {
    pub fn new(database: Arc<DatabaseManager>, schema: Arc<Schema>) -> Self {
        Self {
            database,
            schema,
            events: None,
        }
    }

    pub fn with_events(mut self, events: Arc<dyn OrmEventPublisher>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn database(&self) -> &Arc<DatabaseManager> {
        &self.database
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn events(&self) -> Option<&Arc<dyn OrmEventPublisher>> {
        self.events.as_ref()
    }

    /// Schema of a role.
    ///
    /// # Errors
    ///
    /// `UnknownRole` if the role is not part of the compiled schema.
    pub fn entity_schema(&self, role: &str) -> Result<&EntitySchema, RepositoryError> {
        self.schema
            .entity(role)
            .ok_or_else(|| RepositoryError::UnknownRole(role.to_string()))
    }

    /// Build the default repository for a role.
    ///
    /// Every call constructs a new repository; callers that want a stable
    /// handle go through the repository factory.
    pub fn repository(&self, entity: impl Into<EntityRef>) -> Result<Arc<dyn Repository>, RepositoryError> {
        let entity = entity.into();
        Ok(Arc::new(SelectRepository::build(self, entity.role())?))
    }

    /// Fresh entity manager over this ORM
    pub fn entity_manager(self: &Arc<Self>) -> EntityManager {
        EntityManager::new(Arc::clone(self))
    }

    pub(crate) fn emit(&self, event: OrmEvent) {
        if let Some(events) = &self.events {
            events.publish(event);
        }
    }
}
