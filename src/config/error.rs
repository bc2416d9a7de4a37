//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid request timeout")]
    InvalidTimeout,

    #[error("Default connection '{0}' is not defined under database.connections")]
    UnknownDefaultConnection(String),

    #[error("Connection '{connection}' is missing '{field}'")]
    IncompleteConnection {
        connection: String,
        field: &'static str,
    },

    #[error("Connection '{0}': max_connections must be between 1 and 100")]
    InvalidPoolSize(String),

    #[error("Entity source directories must not be empty")]
    NoEntityDirectories,

    #[error("Invalid entity namespace: {0}")]
    InvalidNamespace(String),

    #[error("Invalid identifier for {field}: {value}")]
    InvalidIdentifier { field: &'static str, value: String },

    #[error("Unknown default repository class: {0}")]
    UnknownRepositoryClass(String),
}
