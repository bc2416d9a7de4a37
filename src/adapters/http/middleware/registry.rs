//! Named middleware and per-role payload validators.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::{Map, Value};

use crate::ports::{EntityValidator, FieldError};

/// Injects the per-request `OrmContext`
pub const INJECT: &str = "cycle.inject";
/// Commits or discards the request's entity manager
pub const TRANSACTION: &str = "cycle.transaction";
/// Validates JSON entity payloads
pub const VALIDATE: &str = "cycle.validate";

/// Middleware names known to the application, plus the validators the
/// validation middleware runs for each role.
#[derive(Default)]
pub struct MiddlewareRegistry {
    names: RwLock<Vec<String>>,
    validators: RwLock<HashMap<String, Vec<Arc<dyn EntityValidator>>>>,
}

impl MiddlewareRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the three ORM middlewares
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        for name in [INJECT, TRANSACTION, VALIDATE] {
            registry.register(name);
        }
        registry
    }

    pub fn register(&self, name: &str) {
        let mut names = self.names.write().unwrap_or_else(PoisonError::into_inner);
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }

    pub fn has(&self, name: &str) -> bool {
        self.names
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|n| n == name)
    }

    /// Registered names in registration order
    pub fn names(&self) -> Vec<String> {
        self.names
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn add_validator(&self, role: &str, validator: Arc<dyn EntityValidator>) {
        self.validators
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(role.to_string())
            .or_default()
            .push(validator);
    }

    /// Run every validator registered for `role`.
    pub fn validate(&self, role: &str, payload: &Map<String, Value>) -> Vec<FieldError> {
        let validators: Vec<Arc<dyn EntityValidator>> = self
            .validators
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(role)
            .cloned()
            .unwrap_or_default();
        validators
            .iter()
            .flat_map(|validator| validator.validate(role, payload))
            .collect()
    }
}
