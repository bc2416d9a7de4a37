//! Migration configuration

use std::path::PathBuf;

use serde::Deserialize;

use super::entities::is_identifier;
use super::error::ValidationError;

/// Migration configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MigrationsConfig {
    /// Directory holding `<version>_<name>.sql` files
    #[serde(default = "default_directory")]
    pub directory: PathBuf,

    /// Table that records applied migrations
    #[serde(default = "default_table")]
    pub table: String,

    /// Refuse destructive operations (rollback) in production
    #[serde(default = "default_safe")]
    pub safe: bool,
}

impl MigrationsConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.directory.as_os_str().is_empty() {
            return Err(ValidationError::MissingRequired("migrations.directory"));
        }
        if !is_identifier(&self.table) {
            return Err(ValidationError::InvalidIdentifier {
                field: "migrations.table",
                value: self.table.clone(),
            });
        }
        Ok(())
    }
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self {
            directory: default_directory(),
            table: default_table(),
            safe: default_safe(),
        }
    }
}

fn default_directory() -> PathBuf {
    PathBuf::from("migrations")
}

fn default_table() -> String {
    "migrations".to_string()
}

fn default_safe() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_defaults() {
        let config = MigrationsConfig::default();
        assert_eq!(config.table, "migrations");
        assert_eq!(config.directory, PathBuf::from("migrations"));
        assert!(config.safe);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_table_name_must_be_identifier() {
        let config = MigrationsConfig {
            table: "migrations; drop".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidIdentifier { .. })
        ));
    }

    #[test]
    fn test_directory_required() {
        let config = MigrationsConfig {
            directory: PathBuf::new(),
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ValidationError::MissingRequired("migrations.directory"))
        );
    }
}
