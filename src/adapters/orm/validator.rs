//! Payload validation against the compiled schema.

use std::sync::Arc;

use serde_json::{Map, Value as Json};

use crate::domain::schema::Schema;
use crate::domain::{ColumnType, Value};
use crate::ports::{EntityValidator, FieldError};

/// Checks column types and required columns of an entity payload.
///
/// Required columns are non-nullable, have no default and are not the
/// primary key. Keys that are not columns are left to other validators.
pub struct SchemaValidator {
    schema: Arc<Schema>,
}

impl SchemaValidator {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self { schema }
    }
}

impl EntityValidator for SchemaValidator {
    fn validate(&self, role: &str, payload: &Map<String, Json>) -> Vec<FieldError> {
        let Some(entity) = self.schema.entity(role) else {
            return vec![FieldError::new("_entity", format!("unknown entity '{}'", role))];
        };
        let Some(table) = self.schema.table(&entity.table) else {
            return Vec::new();
        };

        let mut errors = Vec::new();
        for (name, kind) in &entity.typecast {
            if *kind == ColumnType::Primary {
                continue;
            }
            let column = table.column(name);
            match payload.get(name) {
                None | Some(Json::Null) => {
                    if column.map(|c| c.is_required()).unwrap_or(false) {
                        errors.push(FieldError::new(name.as_str(), "is required"));
                    }
                }
                Some(json) => match Value::from_json(json) {
                    Some(value) if kind.accepts(&value) => {}
                    _ => errors.push(FieldError::new(
                        name.as_str(),
                        format!("expected {}", type_label(*kind)),
                    )),
                },
            }
        }
        errors
    }
}

fn type_label(kind: ColumnType) -> &'static str {
    match kind {
        ColumnType::Primary | ColumnType::Integer => "an integer",
        ColumnType::Float => "a number",
        ColumnType::Boolean => "a boolean",
        ColumnType::String | ColumnType::Text => "a string",
    }
}
