//! Migrator: applies and reverts SQL migrations, and synchronizes tables
//! with a compiled schema.
//!
//! Applied migrations are recorded in the configured table together with the
//! checksum of their up script. A recorded migration whose file has since
//! changed is reported instead of being silently skipped.

mod file_source;

pub use file_source::{checksum, FileMigrationSource};

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;

use crate::adapters::database::{decode_row, split_statements, Connection, DatabaseError, DatabaseManager};
use crate::config::{Driver, Environment, MigrationsConfig};
use crate::domain::schema::{Schema, TableIndex, TableSchema};
use crate::domain::{field, ColumnDef, ColumnType, EntityError, Value};
use crate::ports::{MigrationScript, MigrationSource, MigrationSourceError};

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error(transparent)]
    Source(#[from] MigrationSourceError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("Migration {version} was modified after it was applied")]
    ChecksumMismatch { version: String },

    #[error("Migration {0} has no down script")]
    Irreversible(String),

    #[error("Rollback is disabled in production while migrations.safe is set")]
    UnsafeInProduction,

    #[error("Corrupt migration record: {0}")]
    Record(#[from] EntityError),
}

/// A row of the migration table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedMigration {
    pub version: String,
    pub name: String,
    pub checksum: String,
    pub applied_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    pub applied: Vec<AppliedMigration>,
    /// `<version>_<name>` of every migration not yet applied, in order
    pub pending: Vec<String>,
}

pub struct Migrator {
    database: Arc<DatabaseManager>,
    config: MigrationsConfig,
    environment: Environment,
    source: Arc<dyn MigrationSource>,
}

impl Migrator {
    /// Migrator reading files from `config.directory`
    pub fn new(database: Arc<DatabaseManager>, config: MigrationsConfig, environment: Environment) -> Self {
        let source = Arc::new(FileMigrationSource::new(config.directory.clone()));
        Self {
            database,
            config,
            environment,
            source,
        }
    }

    pub fn with_source(mut self, source: Arc<dyn MigrationSource>) -> Self {
        self.source = source;
        self
    }

    pub fn config(&self) -> &MigrationsConfig {
        &self.config
    }

    /// Apply every pending migration in version order.
    ///
    /// Each migration runs in its own transaction together with its record.
    /// Returns `<version>_<name>` of each applied migration.
    pub async fn run(&self) -> Result<Vec<String>, MigrationError> {
        let connection = self.database.default_connection()?;
        self.ensure_table(&connection).await?;

        let applied = self.applied(&connection).await?;
        let recorded: BTreeMap<&str, &str> = applied
            .iter()
            .map(|m| (m.version.as_str(), m.checksum.as_str()))
            .collect();

        let mut done = Vec::new();
        for migration in self.source.migrations()? {
            match recorded.get(migration.version.as_str()) {
                Some(checksum) if *checksum != migration.checksum => {
                    return Err(MigrationError::ChecksumMismatch {
                        version: migration.version,
                    })
                }
                Some(_) => continue,
                None => {}
            }
            self.apply(&connection, &migration).await?;
            tracing::info!(version = %migration.version, name = %migration.name, "migration applied");
            done.push(label(&migration));
        }
        Ok(done)
    }

    /// Revert the most recently applied migration.
    ///
    /// Returns `None` when nothing is applied.
    pub async fn rollback(&self) -> Result<Option<String>, MigrationError> {
        if self.config.safe && self.environment == Environment::Production {
            return Err(MigrationError::UnsafeInProduction);
        }

        let connection = self.database.default_connection()?;
        self.ensure_table(&connection).await?;
        let Some(last) = self.applied(&connection).await?.pop() else {
            return Ok(None);
        };

        let migration = self
            .source
            .migrations()?
            .into_iter()
            .find(|m| m.version == last.version);
        let down = migration
            .and_then(|m| m.down)
            .ok_or_else(|| MigrationError::Irreversible(last.version.clone()))?;

        let dialect = connection.dialect();
        let delete = format!(
            "DELETE FROM {} WHERE {} = {}",
            dialect.quote(&self.config.table),
            dialect.quote("version"),
            dialect.placeholder(1)
        );

        let mut tx = connection.begin().await?;
        for statement in split_statements(&down) {
            tx.execute(statement, &[]).await?;
        }
        tx.execute(&delete, &[Value::from(last.version.as_str())]).await?;
        tx.commit().await?;

        tracing::info!(version = %last.version, name = %last.name, "migration rolled back");
        Ok(Some(format!("{}_{}", last.version, last.name)))
    }

    pub async fn status(&self) -> Result<MigrationStatus, MigrationError> {
        let connection = self.database.default_connection()?;
        self.ensure_table(&connection).await?;

        let applied = self.applied(&connection).await?;
        let versions: HashSet<&str> = applied.iter().map(|m| m.version.as_str()).collect();
        let pending = self
            .source
            .migrations()?
            .iter()
            .filter(|m| !versions.contains(m.version.as_str()))
            .map(label)
            .collect();

        Ok(MigrationStatus { applied, pending })
    }

    /// Create every table of the schema that does not exist yet.
    ///
    /// Referenced tables are created before the tables pointing at them.
    /// Returns the names of the tables processed, in creation order.
    pub async fn sync_schema(&self, schema: &Schema) -> Result<Vec<String>, MigrationError> {
        let connection = self.database.default_connection()?;
        let mut synced = Vec::new();

        for table in dependency_order(schema) {
            create_table(&connection, table).await?;
            synced.push(table.name.clone());
        }

        tracing::info!(tables = synced.len(), "schema synchronized");
        Ok(synced)
    }

    fn table(&self) -> TableSchema {
        TableSchema {
            name: self.config.table.clone(),
            primary_key: "id".to_string(),
            columns: vec![
                ColumnDef::primary("id"),
                ColumnDef::new("version", ColumnType::String),
                ColumnDef::new("name", ColumnType::String),
                ColumnDef::new("checksum", ColumnType::String),
                ColumnDef::new("applied_at", ColumnType::String),
            ],
            foreign_keys: Vec::new(),
            indexes: vec![TableIndex {
                name: format!("{}_version_unique", self.config.table),
                columns: vec!["version".to_string()],
                unique: true,
            }],
        }
    }

    async fn ensure_table(&self, connection: &Connection) -> Result<(), MigrationError> {
        create_table(connection, &self.table()).await?;
        Ok(())
    }

    async fn applied(&self, connection: &Connection) -> Result<Vec<AppliedMigration>, MigrationError> {
        let dialect = connection.dialect();
        let sql = format!(
            "SELECT {}, {}, {}, {} FROM {} ORDER BY {}",
            dialect.quote("version"),
            dialect.quote("name"),
            dialect.quote("checksum"),
            dialect.quote("applied_at"),
            dialect.quote(&self.config.table),
            dialect.quote("id"),
        );
        let typecast: BTreeMap<String, ColumnType> = ["version", "name", "checksum", "applied_at"]
            .into_iter()
            .map(|column| (column.to_string(), ColumnType::String))
            .collect();

        let rows = connection.fetch_all(&sql, &[]).await?;
        rows.iter()
            .map(|row| {
                let record = decode_row(row, &typecast).map_err(|source| DatabaseError::Query {
                    sql: sql.clone(),
                    source,
                })?;
                Ok(AppliedMigration {
                    version: field(&record, "version")?,
                    name: field(&record, "name")?,
                    checksum: field(&record, "checksum")?,
                    applied_at: field(&record, "applied_at")?,
                })
            })
            .collect()
    }

    async fn apply(&self, connection: &Connection, migration: &MigrationScript) -> Result<(), MigrationError> {
        let dialect = connection.dialect();
        let insert = dialect.insert(
            &self.config.table,
            &["version", "name", "checksum", "applied_at"],
            "id",
        );
        let params = [
            Value::from(migration.version.as_str()),
            Value::from(migration.name.as_str()),
            Value::from(migration.checksum.as_str()),
            Value::from(Utc::now().to_rfc3339()),
        ];

        let mut tx = connection.begin().await?;
        for statement in split_statements(&migration.up) {
            tx.execute(statement, &[]).await?;
        }
        tx.insert(&insert, &params).await?;
        tx.commit().await?;
        Ok(())
    }
}

async fn create_table(connection: &Connection, table: &TableSchema) -> Result<(), DatabaseError> {
    let dialect = connection.dialect();
    let mut statements = dialect.create_table(table).into_iter();
    if let Some(create) = statements.next() {
        connection.execute(&create, &[]).await?;
    }
    for index in statements {
        match connection.execute(&index, &[]).await {
            Ok(_) => {}
            // MySQL cannot guard index creation; an existing index fails here
            Err(e) if dialect.driver() == Driver::Mysql => {
                tracing::debug!("Skipping existing index: {}", e);
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

fn label(migration: &MigrationScript) -> String {
    format!("{}_{}", migration.version, migration.name)
}

/// Tables ordered so that foreign key targets come first
fn dependency_order(schema: &Schema) -> Vec<&TableSchema> {
    let mut remaining: Vec<&TableSchema> = schema.tables().collect();
    let mut created: HashSet<&str> = HashSet::new();
    let mut ordered = Vec::with_capacity(remaining.len());

    while !remaining.is_empty() {
        let before = remaining.len();
        remaining.retain(|table| {
            let ready = table
                .foreign_keys
                .iter()
                .all(|fk| fk.references_table == table.name || created.contains(fk.references_table.as_str()));
            if ready {
                created.insert(table.name.as_str());
                ordered.push(*table);
            }
            !ready
        });
        // a reference cycle; emit the rest as they are
        if remaining.len() == before {
            ordered.append(&mut remaining);
        }
    }
    ordered
}
