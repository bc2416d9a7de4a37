//! Cycle Bridge - ORM integration for axum services
//!
//! Registers a database manager, compiled schema, ORM and entity manager as
//! named services in a [`application::ServiceRegistry`], and builds HTTP
//! middleware, console commands, health checks and metrics around them.
//!
//! ```ignore
//! let entities = EntityRegistry::new().register::<Post>();
//! let mut provider = CycleServiceProvider::new(CycleConfig::load()?, entities, RuntimeContext::Http);
//! provider.register()?;
//! provider.boot().await?;
//!
//! let app = app_router(provider.services().clone(), routes);
//! ```

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod monitoring;
pub mod ports;
