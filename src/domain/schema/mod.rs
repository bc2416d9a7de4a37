//! Compiled schema.
//!
//! Entity descriptors are compiled into a [`Schema`] by running an ordered
//! list of [`SchemaPass`]es over a [`SchemaDescription`]. The schema answers
//! "which table, which columns, which relations" for every entity role.

mod compiler;
mod description;
mod passes;
mod registry;

pub use compiler::SchemaCompiler;
pub use description::SchemaDescription;
pub use passes::SchemaPass;
pub use registry::EntityRegistry;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::entity::{ColumnDef, ColumnType, RelationKind};

/// Column holding the entity role in tables shared through inheritance
pub const DISCRIMINATOR_COLUMN: &str = "_type";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub column: String,
    pub references_table: String,
    pub references_column: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableIndex {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

/// A rendered table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub primary_key: String,
    pub columns: Vec<ColumnDef>,
    pub foreign_keys: Vec<ForeignKey>,
    pub indexes: Vec<TableIndex>,
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// A relation with both key columns resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRelation {
    pub name: String,
    pub kind: RelationKind,
    pub target: String,
    /// Key column on the source side
    pub inner_key: String,
    /// Key column on the target side
    pub outer_key: String,
}

/// Discriminator value written for a role in a shared table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discriminator {
    pub column: String,
    pub value: String,
    /// Children filter on their own value; the root reads every row
    pub filter: bool,
}

/// Everything the runtime needs to know about one role
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySchema {
    pub role: String,
    pub table: String,
    pub primary_key: String,
    /// Column name to type, for every column the entity reads and writes
    pub typecast: BTreeMap<String, ColumnType>,
    pub relations: Vec<ResolvedRelation>,
    pub discriminator: Option<Discriminator>,
}

impl EntitySchema {
    pub fn columns(&self) -> impl Iterator<Item = &String> {
        self.typecast.keys()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.typecast.contains_key(name)
    }
}

/// The compiled schema
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    entities: BTreeMap<String, EntitySchema>,
    tables: BTreeMap<String, TableSchema>,
}

impl Schema {
    pub fn new(
        entities: BTreeMap<String, EntitySchema>,
        tables: BTreeMap<String, TableSchema>,
    ) -> Self {
        Self { entities, tables }
    }

    pub fn entity(&self, role: &str) -> Option<&EntitySchema> {
        self.entities.get(role)
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.entities.contains_key(role)
    }

    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntitySchema> {
        self.entities.values()
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.get(name)
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableSchema> {
        self.tables.values()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
