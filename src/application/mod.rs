//! Application layer - service container, bootstrap and orchestration.
//!
//! - `container` - Named lazy singletons (`ServiceRegistry`)
//! - `provider` - Registers and boots the ORM services
//! - `repository_factory` - Cached per-role repositories with overrides
//! - `health` - Consolidated health report
//! - `listeners` - ORM event listeners wired at boot
//! - `commands` - Console commands

pub mod commands;
mod container;
mod health;
mod listeners;
mod provider;
mod repository_factory;

pub use commands::{CommandRegistry, CommandResult, CycleCommand};
pub use container::{ContainerError, ServiceRegistry};
pub use health::{
    CheckResult, DetailedHealthReport, HealthCheck, HealthReport, HealthStatus, EXPECTED_SERVICES,
    MAX_MEMORY_MB, MAX_RESPONSE_TIME_MS,
};
pub use listeners::{CacheInvalidationListener, MetricsListener, QueryLogListener};
pub use provider::{
    services, CycleServiceProvider, ProviderError, ProviderState, RuntimeContext,
    CONFIG_TEMPLATE_PATH,
};
pub use repository_factory::{
    RepositoryFactory, RepositoryFactoryError, RepositoryStats, DEFAULT_REPOSITORY_CLASS,
};
