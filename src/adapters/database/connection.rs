//! A named, pooled connection with query instrumentation.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use sqlx::any::{AnyPoolOptions, AnyQueryResult, AnyRow};
use sqlx::{Any, AnyPool};

use crate::config::ConnectionConfig;
use crate::domain::Value;
use crate::ports::{OrmEvent, OrmEventPublisher};

use super::dialect::Dialect;
use super::rows::{bind_all, scalar_i64};
use super::DatabaseError;

/// A pooled database connection.
///
/// Every statement is timed and reported to the event publisher as
/// `query.executed` or `query.failed`.
pub struct Connection {
    name: String,
    dialect: Dialect,
    pool: AnyPool,
    events: Option<Arc<dyn OrmEventPublisher>>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("name", &self.name)
            .field("driver", &self.dialect.driver())
            .finish()
    }
}

impl Connection {
    /// Create the pool without connecting; the first query opens a connection.
    pub(super) fn open(
        name: &str,
        config: &ConnectionConfig,
        events: Option<Arc<dyn OrmEventPublisher>>,
    ) -> Result<Self, DatabaseError> {
        let mut options = AnyPoolOptions::new().max_connections(config.pool_size());
        if config.is_memory() {
            // dropping the only connection would drop the database
            options = options.min_connections(0).idle_timeout(None).max_lifetime(None);
        }
        let pool = options
            .connect_lazy(&config.url())
            .map_err(|source| DatabaseError::Connect {
                connection: name.to_string(),
                source,
            })?;

        tracing::debug!(
            connection = %name,
            url = %config.redacted_url(),
            pool_size = config.pool_size(),
            "database pool created"
        );

        Ok(Self {
            name: name.to_string(),
            dialect: Dialect::new(config.driver),
            pool,
            events,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    /// Round-trip a trivial query.
    pub async fn ping(&self) -> Result<(), DatabaseError> {
        self.fetch_all("SELECT 1", &[]).await.map(|_| ())
    }

    /// Execute a statement, returning rows affected.
    pub async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, DatabaseError> {
        let started = Instant::now();
        let result = bind_all(sqlx::query(sql), params)
            .execute(&self.pool)
            .await;
        self.observe(sql, params, started, result)
            .map(|r| r.rows_affected())
    }

    pub async fn fetch_all(&self, sql: &str, params: &[Value]) -> Result<Vec<AnyRow>, DatabaseError> {
        let started = Instant::now();
        let result = bind_all(sqlx::query(sql), params)
            .fetch_all(&self.pool)
            .await;
        self.observe(sql, params, started, result)
    }

    pub async fn fetch_optional(
        &self,
        sql: &str,
        params: &[Value],
    ) -> Result<Option<AnyRow>, DatabaseError> {
        let started = Instant::now();
        let result = bind_all(sqlx::query(sql), params)
            .fetch_optional(&self.pool)
            .await;
        self.observe(sql, params, started, result)
    }

    /// First column of the first row as an integer
    pub async fn fetch_scalar(&self, sql: &str, params: &[Value]) -> Result<i64, DatabaseError> {
        let started = Instant::now();
        let result = bind_all(sqlx::query(sql), params)
            .fetch_one(&self.pool)
            .await;
        let row = self.observe(sql, params, started, result)?;
        scalar_i64(&row).map_err(|source| DatabaseError::Query {
            sql: sql.to_string(),
            source,
        })
    }

    /// Run a multi-statement script, statement by statement.
    pub async fn execute_script(&self, script: &str) -> Result<(), DatabaseError> {
        for statement in split_statements(script) {
            self.execute(statement, &[]).await?;
        }
        Ok(())
    }

    /// Begin a transaction on a pooled connection.
    pub async fn begin(&self) -> Result<ConnectionTransaction<'_>, DatabaseError> {
        let tx = self.pool.begin().await.map_err(|source| DatabaseError::Query {
            sql: "BEGIN".to_string(),
            source,
        })?;
        Ok(ConnectionTransaction { connection: self, tx })
    }

    /// Close every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn observe<T>(
        &self,
        sql: &str,
        params: &[Value],
        started: Instant,
        result: Result<T, sqlx::Error>,
    ) -> Result<T, DatabaseError> {
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        match result {
            Ok(value) => {
                tracing::trace!(connection = %self.name, sql, duration_ms, "query executed");
                self.emit(OrmEvent::QueryExecuted {
                    connection: self.name.clone(),
                    sql: sql.to_string(),
                    bindings: params.iter().map(ToString::to_string).collect(),
                    duration_ms,
                });
                Ok(value)
            }
            Err(source) => {
                tracing::debug!(connection = %self.name, sql, error = %source, "query failed");
                self.emit(OrmEvent::QueryFailed {
                    connection: self.name.clone(),
                    sql: sql.to_string(),
                    error: source.to_string(),
                });
                Err(DatabaseError::Query {
                    sql: sql.to_string(),
                    source,
                })
            }
        }
    }

    fn emit(&self, event: OrmEvent) {
        if let Some(events) = &self.events {
            events.publish(event);
        }
    }
}

/// An open transaction. Dropped without `commit` it rolls back.
pub struct ConnectionTransaction<'c> {
    connection: &'c Connection,
    tx: sqlx::Transaction<'static, Any>,
}

impl ConnectionTransaction<'_> {
    pub fn dialect(&self) -> Dialect {
        self.connection.dialect
    }

    pub async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64, DatabaseError> {
        let started = Instant::now();
        let result: Result<AnyQueryResult, sqlx::Error> = bind_all(sqlx::query(sql), params)
            .execute(&mut *self.tx)
            .await;
        self.connection
            .observe(sql, params, started, result)
            .map(|r| r.rows_affected())
    }

    /// Execute an insert built by [`Dialect::insert`], returning the generated key.
    pub async fn insert(&mut self, sql: &str, params: &[Value]) -> Result<Option<i64>, DatabaseError> {
        let started = Instant::now();
        if self.connection.dialect.returns_generated_key() {
            let result = bind_all(sqlx::query(sql), params)
                .fetch_one(&mut *self.tx)
                .await;
            let row = self.connection.observe(sql, params, started, result)?;
            scalar_i64(&row)
                .map(Some)
                .map_err(|source| DatabaseError::Query {
                    sql: sql.to_string(),
                    source,
                })
        } else {
            let result = bind_all(sqlx::query(sql), params)
                .execute(&mut *self.tx)
                .await;
            self.connection
                .observe(sql, params, started, result)
                .map(|r| r.last_insert_id())
        }
    }

    pub async fn commit(self) -> Result<(), DatabaseError> {
        self.tx.commit().await.map_err(|source| DatabaseError::Query {
            sql: "COMMIT".to_string(),
            source,
        })
    }

    pub async fn rollback(self) -> Result<(), DatabaseError> {
        self.tx.rollback().await.map_err(|source| DatabaseError::Query {
            sql: "ROLLBACK".to_string(),
            source,
        })
    }
}

/// Split a script on `;`, dropping empty statements and comment-only chunks.
pub(crate) fn split_statements(script: &str) -> impl Iterator<Item = &str> {
    script.split(';').map(str::trim).filter(|statement| {
        statement
            .lines()
            .any(|line| !line.trim().is_empty() && !line.trim_start().starts_with("--"))
    })
}
