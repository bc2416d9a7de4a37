//! Service registry: named, lazily constructed singletons.
//!
//! A factory runs at most once per registry, on the first `make` of its name.
//! Factories receive the registry, so they resolve their dependencies by
//! name at construction time instead of capturing them at registration.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use cycle_bridge::application::ServiceRegistry;
//!
//! let services = ServiceRegistry::new();
//! services.instance("greeting", Arc::new(String::from("hello")));
//! services.singleton("shout", |c| {
//!     let greeting = c.make::<String>("greeting")?;
//!     Ok(Arc::new(greeting.to_uppercase()))
//! });
//! services.alias("loud", "shout");
//!
//! assert_eq!(*services.make::<String>("loud").unwrap(), "HELLO");
//! ```

use std::any::{type_name, Any};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use once_cell::sync::OnceCell;
use thiserror::Error;

type Instance = Arc<dyn Any + Send + Sync>;
type Factory = Box<dyn Fn(&ServiceRegistry) -> Result<Instance, ContainerError> + Send + Sync>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ContainerError {
    #[error("Service '{0}' is not registered")]
    NotFound(String),

    #[error("Service '{name}' is not of type {expected}")]
    TypeMismatch { name: String, expected: &'static str },

    #[error("Failed to build service '{name}': {message}")]
    Factory { name: String, message: String },

    #[error("Circular dependency while resolving '{0}'")]
    CircularDependency(String),
}

impl ContainerError {
    /// Wrap any error raised inside a factory
    pub fn factory(name: &str, error: impl fmt::Display) -> Self {
        ContainerError::Factory {
            name: name.to_string(),
            message: error.to_string(),
        }
    }
}

struct Binding {
    factory: Option<Factory>,
    instance: OnceCell<Instance>,
}

thread_local! {
    static RESOLVING: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

/// Named singleton registry.
///
/// Registration happens at startup; resolution is safe from any thread.
#[derive(Default)]
pub struct ServiceRegistry {
    bindings: RwLock<HashMap<String, Arc<Binding>>>,
    aliases: RwLock<HashMap<String, String>>,
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("services", &self.names())
            .finish()
    }
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a lazily constructed singleton. Rebinding a name replaces it.
    pub fn singleton<T, F>(&self, name: &str, factory: F)
    where
        T: Any + Send + Sync,
        F: Fn(&ServiceRegistry) -> Result<Arc<T>, ContainerError> + Send + Sync + 'static,
    {
        let factory: Factory = Box::new(move |c| factory(c).map(|service| service as Instance));
        self.bind(
            name,
            Binding {
                factory: Some(factory),
                instance: OnceCell::new(),
            },
        );
    }

    /// Bind an already constructed value.
    pub fn instance<T: Any + Send + Sync>(&self, name: &str, value: Arc<T>) {
        self.bind(
            name,
            Binding {
                factory: None,
                instance: OnceCell::with_value(value as Instance),
            },
        );
    }

    /// Make `alias` resolve to `target`.
    pub fn alias(&self, alias: &str, target: &str) {
        self.aliases
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(alias.to_string(), target.to_string());
    }

    pub fn has(&self, name: &str) -> bool {
        let name = self.resolve_alias(name);
        self.bindings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&name)
    }

    /// Has the service been constructed yet?
    pub fn is_resolved(&self, name: &str) -> bool {
        self.binding(&self.resolve_alias(name))
            .map(|binding| binding.instance.get().is_some())
            .unwrap_or(false)
    }

    /// Resolve a service, constructing it on first use.
    ///
    /// # Errors
    ///
    /// - `NotFound` if nothing is bound under `name` or its alias target
    /// - `TypeMismatch` if the service is not a `T`
    /// - `Factory` / `CircularDependency` if construction fails
    pub fn make<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>, ContainerError> {
        let resolved = self.resolve_alias(name);
        let binding = self
            .binding(&resolved)
            .ok_or_else(|| ContainerError::NotFound(name.to_string()))?;

        let instance = match binding.instance.get() {
            Some(instance) => Arc::clone(instance),
            None => Arc::clone(self.construct(&resolved, &binding)?),
        };

        instance
            .downcast::<T>()
            .map_err(|_| ContainerError::TypeMismatch {
                name: name.to_string(),
                expected: type_name::<T>(),
            })
    }

    /// Bound service names, sorted; aliases excluded
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .bindings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    fn construct<'b>(&self, name: &str, binding: &'b Binding) -> Result<&'b Instance, ContainerError> {
        let circular = RESOLVING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.iter().any(|n| n == name) {
                true
            } else {
                stack.push(name.to_string());
                false
            }
        });
        if circular {
            return Err(ContainerError::CircularDependency(name.to_string()));
        }

        let result = binding.instance.get_or_try_init(|| match &binding.factory {
            Some(factory) => {
                tracing::debug!(service = %name, "constructing service");
                factory(self)
            }
            None => Err(ContainerError::NotFound(name.to_string())),
        });

        RESOLVING.with(|stack| {
            stack.borrow_mut().pop();
        });
        result
    }

    fn bind(&self, name: &str, binding: Binding) {
        let previous = self
            .bindings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), Arc::new(binding));
        if previous.is_some() {
            tracing::debug!(service = %name, "service rebound");
        }
    }

    fn binding(&self, name: &str) -> Option<Arc<Binding>> {
        self.bindings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    fn resolve_alias(&self, name: &str) -> String {
        let aliases = self.aliases.read().unwrap_or_else(PoisonError::into_inner);
        let mut current = name;
        // bounded so an alias cycle cannot loop forever
        for _ in 0..=aliases.len() {
            match aliases.get(current) {
                Some(target) => current = target,
                None => break,
            }
        }
        current.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn factory_runs_once() {
        let services = ServiceRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        services.singleton("counter", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(42u32))
        });

        assert!(!services.is_resolved("counter"));
        let a = services.make::<u32>("counter").unwrap();
        let b = services.make::<u32>("counter").unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(services.is_resolved("counter"));
    }

    #[test]
    fn unknown_service_is_not_found() {
        let services = ServiceRegistry::new();
        assert!(!services.has("missing"));
        assert_eq!(
            services.make::<u32>("missing").unwrap_err(),
            ContainerError::NotFound("missing".to_string())
        );
    }

    #[test]
    fn wrong_type_is_reported() {
        let services = ServiceRegistry::new();
        services.instance("name", Arc::new(String::from("cycle")));
        assert!(matches!(
            services.make::<u32>("name"),
            Err(ContainerError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn alias_resolves_to_target() {
        let services = ServiceRegistry::new();
        services.instance("cycle.database", Arc::new(7i64));
        services.alias("db", "cycle.database");

        assert!(services.has("db"));
        let via_alias = services.make::<i64>("db").unwrap();
        let direct = services.make::<i64>("cycle.database").unwrap();
        assert!(Arc::ptr_eq(&via_alias, &direct));
        assert_eq!(services.names(), vec!["cycle.database".to_string()]);
    }

    #[test]
    fn factories_resolve_dependencies_lazily() {
        let services = ServiceRegistry::new();
        services.singleton("b", |c| {
            let a = c.make::<u32>("a")?;
            Ok(Arc::new(*a + 1))
        });
        // registered after its dependent
        services.instance("a", Arc::new(1u32));
        assert_eq!(*services.make::<u32>("b").unwrap(), 2);
    }

    #[test]
    fn factory_error_is_propagated_and_retried() {
        let services = ServiceRegistry::new();
        services.singleton::<u32, _>("broken", |_| Err(ContainerError::factory("broken", "no config")));
        let err = services.make::<u32>("broken").unwrap_err();
        assert_eq!(err.to_string(), "Failed to build service 'broken': no config");
        assert!(!services.is_resolved("broken"));
    }

    #[test]
    fn circular_dependency_is_detected() {
        let services = ServiceRegistry::new();
        services.singleton("a", |c| c.make::<u32>("b"));
        services.singleton("b", |c| c.make::<u32>("a"));
        assert!(matches!(
            services.make::<u32>("a"),
            Err(ContainerError::CircularDependency(_))
        ));
    }
}
