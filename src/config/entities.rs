//! Entity discovery and schema compilation configuration

use std::path::PathBuf;

use serde::Deserialize;

use super::error::ValidationError;

/// Where entities live
#[derive(Debug, Clone, Deserialize)]
pub struct EntitiesConfig {
    /// Source directories holding entity modules (also the target of `make:entity`)
    #[serde(default = "default_directories")]
    pub directories: Vec<PathBuf>,

    /// Module path prefix an entity must live under to be discovered.
    /// Empty means every registered entity is discovered.
    #[serde(default)]
    pub namespace: String,
}

impl EntitiesConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.directories.is_empty() {
            return Err(ValidationError::NoEntityDirectories);
        }
        let valid = self.namespace.is_empty()
            || self
                .namespace
                .split("::")
                .all(|segment| is_identifier(segment));
        if !valid {
            return Err(ValidationError::InvalidNamespace(self.namespace.clone()));
        }
        Ok(())
    }

    /// First source directory, where scaffolds are generated
    pub fn primary_directory(&self) -> Option<&PathBuf> {
        self.directories.first()
    }
}

impl Default for EntitiesConfig {
    fn default() -> Self {
        Self {
            directories: default_directories(),
            namespace: String::new(),
        }
    }
}

/// Schema compilation flags
#[derive(Debug, Clone, Deserialize)]
pub struct SchemaConfig {
    /// Cache the compiled schema on disk and reuse it while entities are unchanged
    #[serde(default)]
    pub cache: bool,

    /// Where the cached schema is written
    #[serde(default = "default_cache_path")]
    pub cache_path: PathBuf,

    /// Synchronize tables with the compiled schema at boot (development only)
    #[serde(default)]
    pub auto_sync: bool,

    /// Treat unresolved relations as errors instead of skipping them
    #[serde(default = "default_strict")]
    pub strict: bool,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            cache: false,
            cache_path: default_cache_path(),
            auto_sync: false,
            strict: default_strict(),
        }
    }
}

/// Default repository used when no custom repository is registered
#[derive(Debug, Clone, Deserialize)]
pub struct RepositoriesConfig {
    #[serde(default = "default_repository_class")]
    pub default: String,
}

impl Default for RepositoriesConfig {
    fn default() -> Self {
        Self {
            default: default_repository_class(),
        }
    }
}

pub(crate) fn is_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn default_directories() -> Vec<PathBuf> {
    vec![PathBuf::from("src/entities")]
}

fn default_cache_path() -> PathBuf {
    PathBuf::from("runtime/cache/cycle-schema.json")
}

fn default_strict() -> bool {
    true
}

fn default_repository_class() -> String {
    "select".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entities_defaults() {
        let config = EntitiesConfig::default();
        assert_eq!(config.directories, vec![PathBuf::from("src/entities")]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_directories_rejected() {
        let config = EntitiesConfig {
            directories: vec![],
            namespace: String::new(),
        };
        assert_eq!(config.validate(), Err(ValidationError::NoEntityDirectories));
    }

    #[test]
    fn test_namespace_must_be_module_path() {
        let mut config = EntitiesConfig::default();
        config.namespace = "app::entities".to_string();
        assert!(config.validate().is_ok());

        config.namespace = "app::2bad".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_identifier_check() {
        assert!(is_identifier("migrations"));
        assert!(is_identifier("_schema_v2"));
        assert!(!is_identifier("drop table"));
        assert!(!is_identifier(""));
    }

    #[test]
    fn test_schema_defaults() {
        let config = SchemaConfig::default();
        assert!(!config.cache);
        assert!(!config.auto_sync);
        assert!(config.strict);
    }
}
