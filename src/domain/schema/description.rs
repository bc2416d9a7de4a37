//! Working state threaded through the schema passes.

use std::collections::BTreeMap;

use crate::domain::entity::{ColumnDef, ColumnType, EntityDescriptor};
use crate::domain::errors::SchemaError;

use super::passes::SchemaPass;
use super::{Discriminator, EntitySchema, ResolvedRelation, Schema, TableSchema};

/// Accumulated schema description.
///
/// Each pass takes the description by value and returns the updated one.
#[derive(Debug, Clone, Default)]
pub struct SchemaDescription {
    /// Module path prefix entities must live under
    pub namespace: String,
    /// Unresolved relation targets are errors rather than warnings
    pub strict: bool,
    /// Every descriptor handed to the compiler
    pub registered: Vec<EntityDescriptor>,
    /// Discovered entities by role
    pub entities: BTreeMap<String, EntityDescriptor>,
    /// Merged column declarations per table
    pub table_columns: BTreeMap<String, Vec<ColumnDef>>,
    pub relations: BTreeMap<String, Vec<ResolvedRelation>>,
    pub discriminators: BTreeMap<String, Discriminator>,
    /// Rendered tables
    pub tables: BTreeMap<String, TableSchema>,
    pub typecast: BTreeMap<String, BTreeMap<String, ColumnType>>,
    pub(super) completed: Vec<SchemaPass>,
}

impl SchemaDescription {
    pub fn new(registered: Vec<EntityDescriptor>, namespace: impl Into<String>, strict: bool) -> Self {
        Self {
            namespace: namespace.into(),
            strict,
            registered,
            ..Default::default()
        }
    }

    /// Passes applied so far, in order
    pub fn completed(&self) -> &[SchemaPass] {
        &self.completed
    }

    pub fn has_run(&self, pass: SchemaPass) -> bool {
        self.completed.contains(&pass)
    }

    pub(super) fn require(&self, pass: &'static str, required: &[SchemaPass]) -> Result<(), SchemaError> {
        match required.iter().find(|r| !self.has_run(**r)) {
            Some(missing) => Err(SchemaError::PassOrder {
                pass,
                requires: missing.name(),
            }),
            None => Ok(()),
        }
    }

    /// Finish compilation.
    ///
    /// # Errors
    ///
    /// `PassOrder` when the rendering and typecast passes have not all run.
    pub fn into_schema(self) -> Result<Schema, SchemaError> {
        self.require(
            "compile",
            &[
                SchemaPass::RenderRelations,
                SchemaPass::MergeIndexes,
                SchemaPass::GenerateTypecast,
            ],
        )?;

        let mut entities = BTreeMap::new();
        for (role, descriptor) in &self.entities {
            let table = descriptor.table_name().to_string();
            let primary_key = self
                .tables
                .get(&table)
                .map(|t| t.primary_key.clone())
                .ok_or_else(|| SchemaError::PrimaryKey(role.clone()))?;
            entities.insert(
                role.clone(),
                EntitySchema {
                    role: role.clone(),
                    table,
                    primary_key,
                    typecast: self.typecast.get(role).cloned().unwrap_or_default(),
                    relations: self.relations.get(role).cloned().unwrap_or_default(),
                    discriminator: self.discriminators.get(role).cloned(),
                },
            );
        }

        Ok(Schema::new(entities, self.tables))
    }
}
