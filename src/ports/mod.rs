//! Ports - Interfaces between the ORM core and its collaborators.
//!
//! Adapters implement these ports; the application layer depends only on
//! the traits.
//!
//! ## Persistence Ports
//!
//! - `Repository` - Per-role lookups over records
//! - `UnitOfWork` - Pending change set applied as one transaction
//! - `MigrationSource` - Ordered migration scripts
//!
//! ## Cross-cutting Ports
//!
//! - `OrmEventPublisher` / `OrmListener` - Query and persistence events
//! - `EntityValidator` - Request payload validation

mod entity_validator;
mod migration_source;
mod orm_events;
mod repository;
mod unit_of_work;

pub use entity_validator::{EntityValidator, FieldError};
pub use migration_source::{MigrationScript, MigrationSource, MigrationSourceError};
pub use orm_events::{Operation, OrmEvent, OrmEventPublisher, OrmListener};
pub use repository::{Criteria, Order, Repository, RepositoryError, TypedRepository};
pub use unit_of_work::UnitOfWork;
