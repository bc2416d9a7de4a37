//! Entity metadata and the `Entity` trait.
//!
//! An entity declares its mapping through an [`EntityDescriptor`]: table name,
//! columns, relations, indexes, embedded column groups and an optional parent
//! for single-table inheritance. Descriptors are plain data, so the schema
//! compiler can work on them without knowing concrete entity types.
//!
//! # Example
//!
//! ```
//! use cycle_bridge::domain::{
//!     field, ColumnDef, Entity, EntityDescriptor, EntityError, Record, Value,
//! };
//!
//! #[derive(Debug, Clone)]
//! struct Tag {
//!     id: Option<i64>,
//!     label: String,
//! }
//!
//! impl Entity for Tag {
//!     const ROLE: &'static str = "tag";
//!
//!     fn describe() -> EntityDescriptor {
//!         EntityDescriptor::new(Self::ROLE, module_path!())
//!             .table("tags")
//!             .column(ColumnDef::primary("id"))
//!             .column(ColumnDef::string("label"))
//!     }
//!
//!     fn to_record(&self) -> Record {
//!         let mut record = Record::new();
//!         record.insert("id".into(), self.id.into());
//!         record.insert("label".into(), self.label.clone().into());
//!         record
//!     }
//!
//!     fn from_record(record: &Record) -> Result<Self, EntityError> {
//!         Ok(Self { id: field(record, "id")?, label: field(record, "label")? })
//!     }
//!
//!     fn primary_key(&self) -> Option<Value> {
//!         self.id.map(Value::Int)
//!     }
//!
//!     fn set_primary_key(&mut self, value: Value) {
//!         self.id = value.as_i64();
//!     }
//! }
//! ```

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::errors::EntityError;
use super::value::{Record, Value};

/// Logical column types. Each driver renders its own SQL type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    /// Auto-incrementing integer primary key
    Primary,
    Integer,
    Float,
    Boolean,
    String,
    Text,
}

impl ColumnType {
    /// Does a value fit this column type?
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (ColumnType::Primary | ColumnType::Integer, Value::Int(_)) => true,
            (ColumnType::Float, Value::Float(_) | Value::Int(_)) => true,
            (ColumnType::Boolean, Value::Bool(_)) => true,
            (ColumnType::String | ColumnType::Text, Value::Text(_)) => true,
            _ => false,
        }
    }
}

/// A mapped column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub kind: ColumnType,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub default: Option<Value>,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, kind: ColumnType) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: false,
            default: None,
        }
    }

    pub fn primary(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Primary)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Integer)
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Float)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Boolean)
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::String)
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Text)
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn is_primary(&self) -> bool {
        self.kind == ColumnType::Primary
    }

    /// A value must be supplied on insert.
    pub fn is_required(&self) -> bool {
        !self.is_primary() && !self.nullable && self.default.is_none()
    }
}

/// Relation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// The source table carries the foreign key
    BelongsTo,
    /// The target table carries the foreign key, one row
    HasOne,
    /// The target table carries the foreign key, many rows
    HasMany,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationDef {
    pub name: String,
    pub kind: RelationKind,
    pub target: String,
    /// Foreign key column; derived from the relation or role name when absent
    #[serde(default)]
    pub foreign_key: Option<String>,
}

impl RelationDef {
    pub fn belongs_to(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, RelationKind::BelongsTo, target)
    }

    pub fn has_one(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, RelationKind::HasOne, target)
    }

    pub fn has_many(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, RelationKind::HasMany, target)
    }

    fn new(name: impl Into<String>, kind: RelationKind, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            target: target.into(),
            foreign_key: None,
        }
    }

    pub fn foreign_key(mut self, column: impl Into<String>) -> Self {
        self.foreign_key = Some(column.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    pub columns: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

impl IndexDef {
    pub fn on<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            unique: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// A group of columns stored inline on the owning entity's table.
///
/// Columns are flattened as `<prefix>_<column>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingDef {
    pub prefix: String,
    pub columns: Vec<ColumnDef>,
}

/// Declarative mapping of an entity type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    pub role: String,
    /// Module path of the entity type, matched against the configured namespace
    pub namespace: String,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub columns: Vec<ColumnDef>,
    #[serde(default)]
    pub relations: Vec<RelationDef>,
    #[serde(default)]
    pub indexes: Vec<IndexDef>,
    #[serde(default)]
    pub embeddings: Vec<EmbeddingDef>,
    /// Parent role for single-table inheritance
    #[serde(default)]
    pub extends: Option<String>,
}

impl EntityDescriptor {
    pub fn new(role: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            namespace: namespace.into(),
            table: None,
            columns: Vec::new(),
            relations: Vec::new(),
            indexes: Vec::new(),
            embeddings: Vec::new(),
            extends: None,
        }
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    pub fn relation(mut self, relation: RelationDef) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn index(mut self, index: IndexDef) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn embed(mut self, prefix: impl Into<String>, columns: Vec<ColumnDef>) -> Self {
        self.embeddings.push(EmbeddingDef {
            prefix: prefix.into(),
            columns,
        });
        self
    }

    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.extends = Some(parent.into());
        self
    }

    /// Table name, defaulting to the role
    pub fn table_name(&self) -> &str {
        self.table.as_deref().unwrap_or(&self.role)
    }

    pub fn primary_column(&self) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.is_primary())
    }
}

/// A type mapped to a table.
///
/// `ROLE` is the canonical identifier used by repositories, the schema and the
/// repository cache.
pub trait Entity: Send + Sync + Sized + 'static {
    const ROLE: &'static str;

    fn describe() -> EntityDescriptor;

    fn to_record(&self) -> Record;

    fn from_record(record: &Record) -> Result<Self, EntityError>;

    fn primary_key(&self) -> Option<Value>;

    fn set_primary_key(&mut self, value: Value);

    /// Role of this instance; always `Self::ROLE`.
    fn role(&self) -> &'static str {
        Self::ROLE
    }
}

/// Canonical entity identifier.
///
/// Built from a type (`EntityRef::of::<Post>()`), from a live instance
/// (`EntityRef::instance(&post)`) or from a role name. All three resolve to
/// the same role string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityRef(Cow<'static, str>);

impl EntityRef {
    pub fn of<E: Entity>() -> Self {
        Self(Cow::Borrowed(E::ROLE))
    }

    pub fn instance<E: Entity>(entity: &E) -> Self {
        Self(Cow::Borrowed(entity.role()))
    }

    pub fn role(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityRef {
    fn from(role: &str) -> Self {
        Self(Cow::Owned(role.to_string()))
    }
}

impl From<String> for EntityRef {
    fn from(role: String) -> Self {
        Self(Cow::Owned(role))
    }
}

impl From<&String> for EntityRef {
    fn from(role: &String) -> Self {
        Self(Cow::Owned(role.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value::field;

    #[derive(Debug, Clone)]
    struct Widget {
        id: Option<i64>,
        name: String,
    }

    impl Entity for Widget {
        const ROLE: &'static str = "widget";

        fn describe() -> EntityDescriptor {
            EntityDescriptor::new(Self::ROLE, module_path!())
                .column(ColumnDef::primary("id"))
                .column(ColumnDef::string("name"))
        }

        fn to_record(&self) -> Record {
            let mut record = Record::new();
            record.insert("id".into(), self.id.into());
            record.insert("name".into(), self.name.clone().into());
            record
        }

        fn from_record(record: &Record) -> Result<Self, EntityError> {
            Ok(Self {
                id: field(record, "id")?,
                name: field(record, "name")?,
            })
        }

        fn primary_key(&self) -> Option<Value> {
            self.id.map(Value::Int)
        }

        fn set_primary_key(&mut self, value: Value) {
            self.id = value.as_i64();
        }
    }

    #[test]
    fn entity_ref_from_type_instance_and_name_agree() {
        let widget = Widget {
            id: None,
            name: "w".to_string(),
        };
        assert_eq!(EntityRef::of::<Widget>(), EntityRef::instance(&widget));
        assert_eq!(EntityRef::of::<Widget>(), EntityRef::from("widget"));
    }

    #[test]
    fn table_name_defaults_to_role() {
        let descriptor = Widget::describe();
        assert_eq!(descriptor.table_name(), "widget");
        assert_eq!(descriptor.table("widgets").table_name(), "widgets");
    }

    #[test]
    fn required_columns_exclude_primary_nullable_and_defaulted() {
        assert!(!ColumnDef::primary("id").is_required());
        assert!(ColumnDef::string("name").is_required());
        assert!(!ColumnDef::string("bio").nullable().is_required());
        assert!(!ColumnDef::boolean("active").default_value(true).is_required());
    }

    #[test]
    fn column_type_accepts_compatible_values() {
        assert!(ColumnType::Float.accepts(&Value::Int(1)));
        assert!(ColumnType::String.accepts(&Value::Null));
        assert!(!ColumnType::Integer.accepts(&Value::from("1")));
        assert!(!ColumnType::Boolean.accepts(&Value::Int(1)));
    }

    #[test]
    fn descriptor_round_trips_through_json() {
        let descriptor = Widget::describe()
            .relation(RelationDef::belongs_to("owner", "user"))
            .index(IndexDef::on(["name"]).unique());
        let json = serde_json::to_string(&descriptor).unwrap();
        let back: EntityDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, descriptor);
    }
}
