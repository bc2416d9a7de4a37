//! Entity Validator Port - request payload validation interface.
//!
//! The validation middleware runs every registered validator for the
//! entity role named by the request before the handler sees the body.

use serde::Serialize;
use serde_json::{Map, Value};

/// A single rejected field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Port for validating an entity payload.
///
/// # Usage
///
/// ```rust,ignore
/// struct TitleLength;
///
/// impl EntityValidator for TitleLength {
///     fn validate(&self, role: &str, payload: &Map<String, Value>) -> Vec<FieldError> {
///         match payload.get("title").and_then(Value::as_str) {
///             Some(title) if title.len() > 200 => vec![FieldError::new("title", "too long")],
///             _ => vec![],
///         }
///     }
/// }
/// ```
pub trait EntityValidator: Send + Sync {
    /// Return every problem found; an empty list means the payload is valid.
    fn validate(&self, role: &str, payload: &Map<String, Value>) -> Vec<FieldError>;
}
