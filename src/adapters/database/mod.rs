//! Database manager over the sqlx `Any` driver.
//!
//! Connections are created lazily, one pool per configured connection name,
//! and cached for the lifetime of the manager.

mod connection;
mod dialect;
mod rows;

pub use connection::{Connection, ConnectionTransaction};
pub use dialect::Dialect;

pub(crate) use connection::split_statements;
pub(crate) use rows::decode_row;

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;

use crate::config::{DatabaseConfig, Driver};
use crate::ports::{OrmEventPublisher, RepositoryError};

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Unknown database connection '{0}'")]
    UnknownConnection(String),

    #[error("Failed to open connection '{connection}': {source}")]
    Connect {
        connection: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Query failed: {source} [{sql}]")]
    Query {
        sql: String,
        #[source]
        source: sqlx::Error,
    },
}

impl From<DatabaseError> for RepositoryError {
    fn from(e: DatabaseError) -> Self {
        RepositoryError::Database(e.to_string())
    }
}

/// Owns every named connection.
pub struct DatabaseManager {
    config: DatabaseConfig,
    connections: RwLock<HashMap<String, Arc<Connection>>>,
    events: Option<Arc<dyn OrmEventPublisher>>,
}

impl DatabaseManager {
    pub fn new(config: DatabaseConfig) -> Self {
        sqlx::any::install_default_drivers();
        Self {
            config,
            connections: RwLock::new(HashMap::new()),
            events: None,
        }
    }

    /// Report queries from every connection to `events`
    pub fn with_events(mut self, events: Arc<dyn OrmEventPublisher>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn default_connection_name(&self) -> &str {
        &self.config.default
    }

    /// Named connection, or the default one when `name` is `None`.
    ///
    /// # Errors
    ///
    /// - `UnknownConnection` if no connection has that name
    /// - `Connect` if the URL is rejected by the driver
    pub fn connection(&self, name: Option<&str>) -> Result<Arc<Connection>, DatabaseError> {
        let name = name.unwrap_or(&self.config.default);

        if let Some(connection) = self
            .connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
        {
            return Ok(Arc::clone(connection));
        }

        let config = self
            .config
            .connections
            .get(name)
            .ok_or_else(|| DatabaseError::UnknownConnection(name.to_string()))?;

        let mut connections = self
            .connections
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        // another caller may have opened it while we waited for the write lock
        if let Some(connection) = connections.get(name) {
            return Ok(Arc::clone(connection));
        }
        let connection = Arc::new(Connection::open(name, config, self.events.clone())?);
        connections.insert(name.to_string(), Arc::clone(&connection));
        Ok(connection)
    }

    pub fn default_connection(&self) -> Result<Arc<Connection>, DatabaseError> {
        self.connection(None)
    }

    /// Names of connections opened so far
    pub fn open_connections(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Drivers compiled into this build
    pub fn available_drivers(&self) -> Vec<&'static str> {
        Driver::available().iter().map(Driver::as_str).collect()
    }

    /// Close every open pool.
    pub async fn close(&self) {
        let connections: Vec<Arc<Connection>> = self
            .connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        for connection in connections {
            connection.close().await;
        }
    }
}
