//! Domain layer: entity metadata, values and schema compilation.
//!
//! # Module Organization
//!
//! - `entity` - The `Entity` trait and declarative descriptors
//! - `value` - Column values and records
//! - `schema` - Schema passes and the compiled `Schema`
//! - `errors` - Entity and schema errors

mod entity;
mod errors;
mod value;

pub mod schema;

pub use entity::{
    ColumnDef, ColumnType, EmbeddingDef, Entity, EntityDescriptor, EntityRef, IndexDef,
    RelationDef, RelationKind,
};
pub use errors::{EntityError, SchemaError};
pub use value::{field, FromValue, Record, Value};
