//! Migration source port.
//!
//! Supplies the ordered list of migrations the migrator applies.

use thiserror::Error;

/// A single migration script pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationScript {
    /// Sortable version prefix, e.g. `20240101120000`
    pub version: String,
    pub name: String,
    pub up: String,
    pub down: Option<String>,
    /// Hex SHA-256 of the up script
    pub checksum: String,
}

#[derive(Debug, Error)]
pub enum MigrationSourceError {
    #[error("Failed to read migrations: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid migration file name '{0}', expected <version>_<name>.sql")]
    InvalidName(String),

    #[error("Duplicate migration version '{0}'")]
    DuplicateVersion(String),
}

/// Port for listing migrations.
pub trait MigrationSource: Send + Sync {
    /// Every known migration, ordered by version ascending.
    fn migrations(&self) -> Result<Vec<MigrationScript>, MigrationSourceError>;
}
