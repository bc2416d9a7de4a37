//! Schema generation passes.
//!
//! The default pipeline runs, in order:
//!
//! ```text
//! reset_tables → merge_embeddings → discover_entities → resolve_inheritance
//!   → merge_columns → generate_relations → validate_entities → render_tables
//!   → render_relations → render_modifiers → merge_indexes → generate_typecast
//! ```
//!
//! Every pass declares the passes it depends on. Applying a pass whose
//! dependencies have not run yet fails with [`SchemaError::PassOrder`].

use std::collections::{BTreeMap, HashSet};

use crate::domain::entity::{ColumnDef, ColumnType, EntityDescriptor, RelationKind};
use crate::domain::errors::SchemaError;

use super::description::SchemaDescription;
use super::{Discriminator, ForeignKey, ResolvedRelation, TableIndex, TableSchema, DISCRIMINATOR_COLUMN};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaPass {
    ResetTables,
    MergeEmbeddings,
    DiscoverEntities,
    ResolveInheritance,
    MergeColumns,
    GenerateRelations,
    ValidateEntities,
    RenderTables,
    RenderRelations,
    RenderModifiers,
    MergeIndexes,
    GenerateTypecast,
}

impl SchemaPass {
    /// The default, ordered pipeline
    pub fn pipeline() -> Vec<SchemaPass> {
        vec![
            SchemaPass::ResetTables,
            SchemaPass::MergeEmbeddings,
            SchemaPass::DiscoverEntities,
            SchemaPass::ResolveInheritance,
            SchemaPass::MergeColumns,
            SchemaPass::GenerateRelations,
            SchemaPass::ValidateEntities,
            SchemaPass::RenderTables,
            SchemaPass::RenderRelations,
            SchemaPass::RenderModifiers,
            SchemaPass::MergeIndexes,
            SchemaPass::GenerateTypecast,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            SchemaPass::ResetTables => "reset_tables",
            SchemaPass::MergeEmbeddings => "merge_embeddings",
            SchemaPass::DiscoverEntities => "discover_entities",
            SchemaPass::ResolveInheritance => "resolve_inheritance",
            SchemaPass::MergeColumns => "merge_columns",
            SchemaPass::GenerateRelations => "generate_relations",
            SchemaPass::ValidateEntities => "validate_entities",
            SchemaPass::RenderTables => "render_tables",
            SchemaPass::RenderRelations => "render_relations",
            SchemaPass::RenderModifiers => "render_modifiers",
            SchemaPass::MergeIndexes => "merge_indexes",
            SchemaPass::GenerateTypecast => "generate_typecast",
        }
    }

    fn requires(&self) -> &'static [SchemaPass] {
        match self {
            SchemaPass::ResetTables => &[],
            SchemaPass::MergeEmbeddings => &[SchemaPass::ResetTables],
            SchemaPass::DiscoverEntities => &[SchemaPass::MergeEmbeddings],
            SchemaPass::ResolveInheritance => &[SchemaPass::DiscoverEntities],
            SchemaPass::MergeColumns => &[SchemaPass::ResolveInheritance],
            SchemaPass::GenerateRelations => &[SchemaPass::DiscoverEntities, SchemaPass::MergeColumns],
            SchemaPass::ValidateEntities => &[SchemaPass::GenerateRelations],
            SchemaPass::RenderTables => &[SchemaPass::ValidateEntities],
            SchemaPass::RenderRelations => &[SchemaPass::RenderTables],
            SchemaPass::RenderModifiers => &[SchemaPass::RenderTables],
            SchemaPass::MergeIndexes => &[SchemaPass::RenderRelations],
            SchemaPass::GenerateTypecast => &[SchemaPass::RenderModifiers],
        }
    }

    /// Apply this pass to the description.
    ///
    /// # Errors
    ///
    /// `PassOrder` if a dependency has not run, or the pass-specific error.
    pub fn apply(self, description: SchemaDescription) -> Result<SchemaDescription, SchemaError> {
        description.require(self.name(), self.requires())?;
        let mut description = match self {
            SchemaPass::ResetTables => reset_tables(description),
            SchemaPass::MergeEmbeddings => merge_embeddings(description),
            SchemaPass::DiscoverEntities => discover_entities(description),
            SchemaPass::ResolveInheritance => resolve_inheritance(description),
            SchemaPass::MergeColumns => merge_columns(description),
            SchemaPass::GenerateRelations => generate_relations(description),
            SchemaPass::ValidateEntities => validate_entities(description),
            SchemaPass::RenderTables => render_tables(description),
            SchemaPass::RenderRelations => render_relations(description),
            SchemaPass::RenderModifiers => render_modifiers(description),
            SchemaPass::MergeIndexes => merge_indexes(description),
            SchemaPass::GenerateTypecast => generate_typecast(description),
        }?;
        tracing::trace!(pass = self.name(), "schema pass applied");
        description.completed.push(self);
        Ok(description)
    }
}

fn reset_tables(mut d: SchemaDescription) -> Result<SchemaDescription, SchemaError> {
    d.entities.clear();
    d.table_columns.clear();
    d.relations.clear();
    d.discriminators.clear();
    d.tables.clear();
    d.typecast.clear();
    d.completed.clear();
    Ok(d)
}

fn merge_embeddings(mut d: SchemaDescription) -> Result<SchemaDescription, SchemaError> {
    for descriptor in &mut d.registered {
        for embedding in std::mem::take(&mut descriptor.embeddings) {
            for column in embedding.columns {
                // an embedded key is just a value on the owner's table
                let kind = if column.is_primary() {
                    ColumnType::Integer
                } else {
                    column.kind
                };
                descriptor.columns.push(ColumnDef {
                    name: format!("{}_{}", embedding.prefix, column.name),
                    kind,
                    ..column
                });
            }
        }
    }
    Ok(d)
}

fn in_namespace(namespace: &str, wanted: &str) -> bool {
    wanted.is_empty()
        || namespace == wanted
        || namespace
            .strip_prefix(wanted)
            .map(|rest| rest.starts_with("::"))
            .unwrap_or(false)
}

fn check_identifier(name: &str) -> Result<(), SchemaError> {
    let mut chars = name.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(SchemaError::InvalidIdentifier(name.to_string()))
    }
}

fn discover_entities(mut d: SchemaDescription) -> Result<SchemaDescription, SchemaError> {
    for descriptor in &d.registered {
        if !in_namespace(&descriptor.namespace, &d.namespace) {
            tracing::debug!(
                role = %descriptor.role,
                namespace = %descriptor.namespace,
                "entity outside configured namespace, skipped"
            );
            continue;
        }
        check_identifier(&descriptor.role)?;
        check_identifier(descriptor.table_name())?;
        for column in &descriptor.columns {
            check_identifier(&column.name)?;
        }
        if d
            .entities
            .insert(descriptor.role.clone(), descriptor.clone())
            .is_some()
        {
            return Err(SchemaError::DuplicateRole(descriptor.role.clone()));
        }
    }
    Ok(d)
}

fn resolve_inheritance(mut d: SchemaDescription) -> Result<SchemaDescription, SchemaError> {
    let roles: Vec<String> = d.entities.keys().cloned().collect();
    for role in roles {
        let Some(parent) = d.entities.get(&role).and_then(|e| e.extends.clone()) else {
            continue;
        };

        // ancestors, nearest first
        let mut chain: Vec<EntityDescriptor> = Vec::new();
        let mut current = parent;
        loop {
            let ancestor = d.entities.get(&current).cloned().ok_or_else(|| {
                SchemaError::UnknownParent {
                    role: role.clone(),
                    parent: current.clone(),
                }
            })?;
            let next = ancestor.extends.clone();
            chain.push(ancestor);
            match next {
                Some(_) if chain.len() > d.entities.len() => {
                    return Err(SchemaError::UnknownParent {
                        role: role.clone(),
                        parent: current,
                    });
                }
                Some(next) => current = next,
                None => break,
            }
        }
        let Some(root) = chain.last().cloned() else {
            continue;
        };

        if let Some(child) = d.entities.get_mut(&role) {
            let mut columns: Vec<ColumnDef> = Vec::new();
            for ancestor in chain.iter().rev() {
                for column in &ancestor.columns {
                    let declared_by_child = child.columns.iter().any(|c| c.name == column.name);
                    let already = columns.iter().any(|c| c.name == column.name);
                    if !declared_by_child && !already {
                        columns.push(column.clone());
                    }
                }
            }
            columns.append(&mut child.columns);
            child.columns = columns;
            child.table = Some(root.table_name().to_string());
        }

        d.discriminators.insert(
            role.clone(),
            Discriminator {
                column: DISCRIMINATOR_COLUMN.to_string(),
                value: role.clone(),
                filter: true,
            },
        );
        d.discriminators
            .entry(root.role.clone())
            .or_insert_with(|| Discriminator {
                column: DISCRIMINATOR_COLUMN.to_string(),
                value: root.role.clone(),
                filter: false,
            });
    }
    Ok(d)
}

fn merge_columns(mut d: SchemaDescription) -> Result<SchemaDescription, SchemaError> {
    for descriptor in d.entities.values() {
        let table = descriptor.table_name().to_string();
        let is_child = descriptor.extends.is_some();
        let root_columns: HashSet<&str> = d
            .entities
            .values()
            .find(|e| e.table_name() == table && e.extends.is_none())
            .map(|root| root.columns.iter().map(|c| c.name.as_str()).collect())
            .unwrap_or_default();

        let merged = d.table_columns.entry(table.clone()).or_default();
        for column in &descriptor.columns {
            let mut column = column.clone();
            if is_child && !root_columns.contains(column.name.as_str()) {
                // parent rows never carry child-only columns
                column.nullable = true;
            }
            match merged.iter_mut().find(|c| c.name == column.name) {
                Some(existing) if existing.kind != column.kind => {
                    return Err(SchemaError::ColumnConflict {
                        table,
                        column: column.name,
                    });
                }
                Some(existing) => existing.nullable |= column.nullable,
                None => merged.push(column),
            }
        }
    }

    for role in d.discriminators.keys() {
        let Some(table) = d.entities.get(role).map(|e| e.table_name().to_string()) else {
            continue;
        };
        let merged = d.table_columns.entry(table).or_default();
        if !merged.iter().any(|c| c.name == DISCRIMINATOR_COLUMN) {
            merged.push(ColumnDef::string(DISCRIMINATOR_COLUMN));
        }
    }
    Ok(d)
}

fn primary_key_name(descriptor: &EntityDescriptor) -> String {
    descriptor
        .primary_column()
        .map(|c| c.name.clone())
        .unwrap_or_else(|| "id".to_string())
}

fn generate_relations(mut d: SchemaDescription) -> Result<SchemaDescription, SchemaError> {
    let mut generated: BTreeMap<String, Vec<ResolvedRelation>> = BTreeMap::new();
    let mut foreign_columns: Vec<(String, String)> = Vec::new();

    for (role, descriptor) in &d.entities {
        let source_key = primary_key_name(descriptor);
        for relation in &descriptor.relations {
            let Some(target) = d.entities.get(&relation.target) else {
                if d.strict {
                    return Err(SchemaError::UnknownRelationTarget {
                        role: role.clone(),
                        relation: relation.name.clone(),
                        target: relation.target.clone(),
                    });
                }
                tracing::warn!(
                    role = %role,
                    relation = %relation.name,
                    target = %relation.target,
                    "relation targets unknown entity, skipped"
                );
                continue;
            };

            let resolved = match relation.kind {
                RelationKind::BelongsTo => {
                    let fk = relation
                        .foreign_key
                        .clone()
                        .unwrap_or_else(|| format!("{}_id", relation.name));
                    foreign_columns.push((descriptor.table_name().to_string(), fk.clone()));
                    ResolvedRelation {
                        name: relation.name.clone(),
                        kind: relation.kind,
                        target: relation.target.clone(),
                        inner_key: fk,
                        outer_key: primary_key_name(target),
                    }
                }
                RelationKind::HasOne | RelationKind::HasMany => {
                    let fk = relation
                        .foreign_key
                        .clone()
                        .unwrap_or_else(|| format!("{}_id", role));
                    foreign_columns.push((target.table_name().to_string(), fk.clone()));
                    ResolvedRelation {
                        name: relation.name.clone(),
                        kind: relation.kind,
                        target: relation.target.clone(),
                        inner_key: source_key.clone(),
                        outer_key: fk,
                    }
                }
            };
            generated.entry(role.clone()).or_default().push(resolved);
        }
    }

    for (table, column) in foreign_columns {
        let merged = d.table_columns.entry(table.clone()).or_default();
        match merged.iter().find(|c| c.name == column) {
            Some(existing) if existing.kind != ColumnType::Integer => {
                return Err(SchemaError::ColumnConflict { table, column });
            }
            Some(_) => {}
            None => merged.push(ColumnDef::integer(column).nullable()),
        }
    }

    d.relations = generated;
    Ok(d)
}

fn validate_entities(d: SchemaDescription) -> Result<SchemaDescription, SchemaError> {
    for (role, descriptor) in &d.entities {
        let primaries = descriptor.columns.iter().filter(|c| c.is_primary()).count();
        if primaries != 1 {
            return Err(SchemaError::PrimaryKey(role.clone()));
        }
        let mut seen = HashSet::new();
        for column in &descriptor.columns {
            if !seen.insert(column.name.as_str()) {
                return Err(SchemaError::DuplicateColumn {
                    role: role.clone(),
                    column: column.name.clone(),
                });
            }
        }
    }
    Ok(d)
}

fn render_tables(mut d: SchemaDescription) -> Result<SchemaDescription, SchemaError> {
    for (name, columns) in &d.table_columns {
        let primary_key = columns
            .iter()
            .find(|c| c.is_primary())
            .map(|c| c.name.clone())
            .ok_or_else(|| SchemaError::PrimaryKey(name.clone()))?;
        // modifiers (nullability, defaults) are applied by render_modifiers
        let columns = columns
            .iter()
            .map(|c| ColumnDef::new(c.name.clone(), c.kind))
            .collect();
        d.tables.insert(
            name.clone(),
            TableSchema {
                name: name.clone(),
                primary_key,
                columns,
                foreign_keys: Vec::new(),
                indexes: Vec::new(),
            },
        );
    }
    Ok(d)
}

fn render_relations(mut d: SchemaDescription) -> Result<SchemaDescription, SchemaError> {
    for (role, relations) in &d.relations {
        let Some(source) = d.entities.get(role) else {
            continue;
        };
        for relation in relations {
            let Some(target) = d.entities.get(&relation.target) else {
                continue;
            };
            let (table, foreign_key) = match relation.kind {
                RelationKind::BelongsTo => (
                    source.table_name(),
                    ForeignKey {
                        column: relation.inner_key.clone(),
                        references_table: target.table_name().to_string(),
                        references_column: relation.outer_key.clone(),
                    },
                ),
                RelationKind::HasOne | RelationKind::HasMany => (
                    target.table_name(),
                    ForeignKey {
                        column: relation.outer_key.clone(),
                        references_table: source.table_name().to_string(),
                        references_column: relation.inner_key.clone(),
                    },
                ),
            };
            if let Some(table) = d.tables.get_mut(table) {
                if !table.foreign_keys.contains(&foreign_key) {
                    table.foreign_keys.push(foreign_key);
                }
            }
        }
    }
    Ok(d)
}

fn render_modifiers(mut d: SchemaDescription) -> Result<SchemaDescription, SchemaError> {
    for (name, table) in d.tables.iter_mut() {
        let Some(declared) = d.table_columns.get(name) else {
            continue;
        };
        for column in table.columns.iter_mut() {
            if let Some(declaration) = declared.iter().find(|c| c.name == column.name) {
                column.nullable = declaration.nullable;
                column.default = declaration.default.clone();
            }
        }
    }
    Ok(d)
}

fn push_index(table: &mut TableSchema, columns: Vec<String>, unique: bool) {
    let name = format!(
        "{}_{}_{}",
        table.name,
        columns.join("_"),
        if unique { "unique" } else { "index" }
    );
    if !table.indexes.iter().any(|i| i.name == name) {
        table.indexes.push(TableIndex {
            name,
            columns,
            unique,
        });
    }
}

fn merge_indexes(mut d: SchemaDescription) -> Result<SchemaDescription, SchemaError> {
    for descriptor in d.entities.values() {
        let Some(table) = d.tables.get_mut(descriptor.table_name()) else {
            continue;
        };
        for index in &descriptor.indexes {
            if let Some(missing) = index.columns.iter().find(|c| table.column(c).is_none()) {
                return Err(SchemaError::UnknownIndexColumn {
                    table: table.name.clone(),
                    column: missing.clone(),
                });
            }
            push_index(table, index.columns.clone(), index.unique);
        }
    }

    for table in d.tables.values_mut() {
        let foreign_columns: Vec<String> =
            table.foreign_keys.iter().map(|fk| fk.column.clone()).collect();
        for column in foreign_columns {
            let covered = table
                .indexes
                .iter()
                .any(|i| i.columns.first() == Some(&column));
            if !covered {
                push_index(table, vec![column], false);
            }
        }
    }
    Ok(d)
}

fn generate_typecast(mut d: SchemaDescription) -> Result<SchemaDescription, SchemaError> {
    for (role, descriptor) in &d.entities {
        let mut typecast: BTreeMap<String, ColumnType> = descriptor
            .columns
            .iter()
            .map(|c| (c.name.clone(), c.kind))
            .collect();
        if let Some(relations) = d.relations.get(role) {
            for relation in relations.iter().filter(|r| r.kind == RelationKind::BelongsTo) {
                typecast
                    .entry(relation.inner_key.clone())
                    .or_insert(ColumnType::Integer);
            }
        }
        d.typecast.insert(role.clone(), typecast);
    }
    Ok(d)
}
