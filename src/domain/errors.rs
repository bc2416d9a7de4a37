//! Error types for the domain layer.

use thiserror::Error;

/// Errors converting between entities and records.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EntityError {
    #[error("Field '{0}' is missing")]
    MissingField(String),

    #[error("Field '{field}' has unexpected type {found}")]
    InvalidType { field: String, found: &'static str },

    #[error("Entity '{0}' has no primary key; persist and run it first")]
    NotPersisted(String),

    #[error("Invalid entity payload: {0}")]
    InvalidPayload(String),
}

/// Errors raised while compiling entity descriptors into a schema.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Schema pass '{pass}' requires '{requires}' to run first")]
    PassOrder {
        pass: &'static str,
        requires: &'static str,
    },

    #[error("Entity role '{0}' is registered more than once")]
    DuplicateRole(String),

    #[error("Entity '{role}' extends unknown entity '{parent}'")]
    UnknownParent { role: String, parent: String },

    #[error("Column '{column}' of table '{table}' is declared with conflicting types")]
    ColumnConflict { table: String, column: String },

    #[error("Column '{column}' is declared twice on entity '{role}'")]
    DuplicateColumn { role: String, column: String },

    #[error("Relation '{relation}' of '{role}' targets unknown entity '{target}'")]
    UnknownRelationTarget {
        role: String,
        relation: String,
        target: String,
    },

    #[error("Entity '{0}' must declare exactly one primary column")]
    PrimaryKey(String),

    #[error("Index on table '{table}' references unknown column '{column}'")]
    UnknownIndexColumn { table: String, column: String },

    #[error("Invalid identifier '{0}'")]
    InvalidIdentifier(String),

    #[error("Schema cache error: {0}")]
    Cache(String),
}
