//! Schema compiler with an optional on-disk cache.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::{EntitiesConfig, SchemaConfig};
use crate::domain::errors::SchemaError;

use super::description::SchemaDescription;
use super::passes::SchemaPass;
use super::registry::EntityRegistry;
use super::Schema;

#[derive(Serialize, Deserialize)]
struct CachedSchema {
    fingerprint: String,
    schema: Schema,
}

/// Compiles registered entities into a [`Schema`].
#[derive(Debug, Clone)]
pub struct SchemaCompiler {
    namespace: String,
    strict: bool,
    cache_path: Option<PathBuf>,
    passes: Vec<SchemaPass>,
}

impl SchemaCompiler {
    pub fn new(entities: &EntitiesConfig, schema: &SchemaConfig) -> Self {
        Self {
            namespace: entities.namespace.clone(),
            strict: schema.strict,
            cache_path: schema.cache.then(|| schema.cache_path.clone()),
            passes: SchemaPass::pipeline(),
        }
    }

    /// Replace the pass pipeline
    pub fn with_passes(mut self, passes: Vec<SchemaPass>) -> Self {
        self.passes = passes;
        self
    }

    pub fn passes(&self) -> &[SchemaPass] {
        &self.passes
    }

    /// Run the pipeline, or reuse the cached schema when nothing changed.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by a pass. Cache read and write
    /// failures are logged and never fail compilation.
    pub fn compile(&self, registry: &EntityRegistry) -> Result<Schema, SchemaError> {
        let fingerprint = self.fingerprint(registry);

        if let Some(path) = &self.cache_path {
            if let Some(schema) = read_cache(path, &fingerprint) {
                tracing::debug!(path = %path.display(), "using cached schema");
                return Ok(schema);
            }
        }

        let description = SchemaDescription::new(
            registry.descriptors().to_vec(),
            self.namespace.clone(),
            self.strict,
        );
        let schema = self
            .passes
            .iter()
            .try_fold(description, |description, pass| pass.apply(description))?
            .into_schema()?;

        tracing::info!(
            entities = schema.len(),
            tables = schema.tables().count(),
            "schema compiled"
        );

        if let Some(path) = &self.cache_path {
            if let Err(e) = write_cache(path, &fingerprint, &schema) {
                tracing::warn!("Failed to write schema cache: {}", e);
            }
        }

        Ok(schema)
    }

    fn fingerprint(&self, registry: &EntityRegistry) -> String {
        let mut hasher = Sha256::new();
        hasher.update(registry.fingerprint());
        hasher.update(&self.namespace);
        hasher.update([u8::from(self.strict)]);
        for pass in &self.passes {
            hasher.update(pass.name());
        }
        hex::encode(hasher.finalize())
    }
}

fn read_cache(path: &Path, fingerprint: &str) -> Option<Schema> {
    let raw = fs::read(path).ok()?;
    match serde_json::from_slice::<CachedSchema>(&raw) {
        Ok(cached) if cached.fingerprint == fingerprint => Some(cached.schema),
        Ok(_) => {
            tracing::debug!("schema cache is stale");
            None
        }
        Err(e) => {
            tracing::warn!("Ignoring unreadable schema cache: {}", e);
            None
        }
    }
}

fn write_cache(path: &Path, fingerprint: &str, schema: &Schema) -> Result<(), SchemaError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| SchemaError::Cache(e.to_string()))?;
    }
    let cached = CachedSchema {
        fingerprint: fingerprint.to_string(),
        schema: schema.clone(),
    };
    let raw = serde_json::to_vec_pretty(&cached).map_err(|e| SchemaError::Cache(e.to_string()))?;
    fs::write(path, raw).map_err(|e| SchemaError::Cache(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::{ColumnDef, EntityDescriptor};

    fn registry() -> EntityRegistry {
        EntityRegistry::new().register_descriptor(
            EntityDescriptor::new("note", "app")
                .column(ColumnDef::primary("id"))
                .column(ColumnDef::text("body")),
        )
    }

    fn cached_config(path: PathBuf) -> SchemaConfig {
        SchemaConfig {
            cache: true,
            cache_path: path,
            ..SchemaConfig::default()
        }
    }

    #[test]
    fn compiles_without_cache() {
        let compiler = SchemaCompiler::new(&EntitiesConfig::default(), &SchemaConfig::default());
        let schema = compiler.compile(&registry()).unwrap();
        assert!(schema.has_role("note"));
    }

    #[test]
    fn truncated_pipeline_fails() {
        let compiler = SchemaCompiler::new(&EntitiesConfig::default(), &SchemaConfig::default())
            .with_passes(vec![SchemaPass::ResetTables, SchemaPass::RenderTables]);
        assert!(matches!(
            compiler.compile(&registry()),
            Err(SchemaError::PassOrder { .. })
        ));
    }

    #[test]
    fn cache_is_written_and_reused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache/schema.json");
        let compiler = SchemaCompiler::new(&EntitiesConfig::default(), &cached_config(path.clone()));

        let first = compiler.compile(&registry()).unwrap();
        assert!(path.exists());

        let second = compiler.compile(&registry()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn stale_cache_is_recompiled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.json");
        let compiler = SchemaCompiler::new(&EntitiesConfig::default(), &cached_config(path.clone()));
        compiler.compile(&registry()).unwrap();

        let changed = registry().register_descriptor(
            EntityDescriptor::new("tag", "app").column(ColumnDef::primary("id")),
        );
        let schema = compiler.compile(&changed).unwrap();
        assert!(schema.has_role("tag"));
    }

    #[test]
    fn corrupt_cache_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.json");
        fs::write(&path, b"not json").unwrap();
        let compiler = SchemaCompiler::new(&EntitiesConfig::default(), &cached_config(path));
        assert!(compiler.compile(&registry()).unwrap().has_role("note"));
    }
}
