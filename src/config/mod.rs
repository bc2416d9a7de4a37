//! Application configuration module
//!
//! Configuration is loaded from an optional `config/cycle.yaml` file and then
//! from environment variables with the `CYCLE` prefix. Nested values use double
//! underscores as separators, so `CYCLE__DATABASE__DEFAULT=main` sets
//! `database.default`.
//!
//! # Example
//!
//! ```no_run
//! use cycle_bridge::config::CycleConfig;
//!
//! let config = CycleConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Default connection: {}", config.database.default);
//! ```

mod database;
mod entities;
mod error;
mod migrations;
mod server;

pub use database::{ConnectionConfig, DatabaseConfig, Driver};
pub use entities::{EntitiesConfig, RepositoriesConfig, SchemaConfig};
pub use error::{ConfigError, ValidationError};
pub use migrations::MigrationsConfig;
pub use server::{Environment, ServerConfig};

use std::path::Path;

use serde::Deserialize;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CycleConfig {
    /// Server configuration (host, port, environment)
    #[serde(default)]
    pub server: ServerConfig,

    /// Connections
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Entity source directories and namespace
    #[serde(default)]
    pub entities: EntitiesConfig,

    /// Schema compilation flags
    #[serde(default)]
    pub schema: SchemaConfig,

    /// Migration directory and table
    #[serde(default)]
    pub migrations: MigrationsConfig,

    /// Default repository class
    #[serde(default)]
    pub repositories: RepositoriesConfig,
}

impl CycleConfig {
    /// Load configuration relative to the current directory.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if values cannot be parsed into expected types.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Path::new("."))
    }

    /// Load configuration relative to `base`.
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads `<base>/config/cycle.yaml` when it exists
    /// 3. Overlays environment variables with the `CYCLE` prefix
    ///
    /// # Environment Variable Format
    ///
    /// - `CYCLE__SERVER__ENVIRONMENT=production` -> `server.environment`
    /// - `CYCLE__DATABASE__CONNECTIONS__MAIN__DRIVER=sqlite` -> `database.connections.main.driver`
    /// - `CYCLE__ENTITIES__DIRECTORIES=src/entities,src/models` -> list of directories
    pub fn load_from(base: &Path) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let file = base.join("config").join("cycle");
        let config = config::Config::builder()
            .add_source(config::File::with_name(&file.to_string_lossy()).required(false))
            .add_source(
                config::Environment::default()
                    .prefix("CYCLE")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("entities.directories")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.database.validate()?;
        self.entities.validate()?;
        self.migrations.validate()?;
        if self.repositories.default.is_empty() {
            return Err(ValidationError::MissingRequired("repositories.default"));
        }
        Ok(())
    }

    /// Check if running in the development environment
    pub fn is_development(&self) -> bool {
        self.server.is_development()
    }

    /// Check if running in production environment
    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }

    /// Default configuration rendered as a publishable template.
    ///
    /// Secrets are never included.
    pub fn template() -> serde_json::Value {
        let defaults = CycleConfig::default();
        let mut connections = serde_json::Map::new();
        if let Some(connection) = defaults.database.default_connection() {
            connections.insert(
                defaults.database.default.clone(),
                serde_json::json!({
                    "driver": connection.driver.as_str(),
                    "host": connection.host,
                    "port": connection.port(),
                    "database": connection.database,
                    "username": connection.username,
                }),
            );
        }
        serde_json::json!({
            "server": {
                "environment": defaults.server.environment.as_str(),
                "log_level": defaults.server.log_level,
            },
            "database": {
                "default": defaults.database.default,
                "connections": connections,
            },
            "entities": {
                "directories": defaults.entities.directories,
                "namespace": defaults.entities.namespace,
            },
            "schema": {
                "cache": defaults.schema.cache,
                "auto_sync": defaults.schema.auto_sync,
                "strict": defaults.schema.strict,
            },
            "migrations": {
                "directory": defaults.migrations.directory,
                "table": defaults.migrations.table,
                "safe": defaults.migrations.safe,
            },
            "repositories": {
                "default": defaults.repositories.default,
            }
        })
    }
}
