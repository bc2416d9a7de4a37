//! ORM event port.
//!
//! The database layer and entity manager emit [`OrmEvent`]s; listeners
//! subscribe by event type. Delivery is synchronous on the emitting task.

use std::sync::Arc;

use serde::Serialize;

/// Kind of write applied to an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

/// Events emitted by the ORM layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrmEvent {
    QueryExecuted {
        connection: String,
        sql: String,
        bindings: Vec<String>,
        duration_ms: f64,
    },
    QueryFailed {
        connection: String,
        sql: String,
        error: String,
    },
    EntityPersisted {
        role: String,
        operation: Operation,
    },
    EntityLoaded {
        role: String,
        count: usize,
    },
}

impl OrmEvent {
    pub const QUERY_EXECUTED: &'static str = "query.executed";
    pub const QUERY_FAILED: &'static str = "query.failed";
    pub const ENTITY_PERSISTED: &'static str = "entity.persisted";
    pub const ENTITY_LOADED: &'static str = "entity.loaded";

    /// Routing key listeners subscribe to
    pub fn event_type(&self) -> &'static str {
        match self {
            OrmEvent::QueryExecuted { .. } => Self::QUERY_EXECUTED,
            OrmEvent::QueryFailed { .. } => Self::QUERY_FAILED,
            OrmEvent::EntityPersisted { .. } => Self::ENTITY_PERSISTED,
            OrmEvent::EntityLoaded { .. } => Self::ENTITY_LOADED,
        }
    }
}

/// Listener for ORM events.
///
/// Implementations should be quick; they run inline with the query.
pub trait OrmListener: Send + Sync {
    fn handle(&self, event: &OrmEvent);

    /// Listener name for logging.
    fn name(&self) -> &'static str;
}

/// Port for emitting ORM events.
pub trait OrmEventPublisher: Send + Sync {
    fn publish(&self, event: OrmEvent);

    fn subscribe(&self, event_type: &str, listener: Arc<dyn OrmListener>);
}
