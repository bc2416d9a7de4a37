//! Adapters - Implementations of port interfaces.
//!
//! - `database` - Connection management over the sqlx `Any` driver
//! - `orm` - Schema-driven repositories and the entity manager
//! - `migrations` - File-based migrations and schema synchronization
//! - `events` - In-process ORM event dispatch
//! - `http` - axum middleware, request decorator and health routes

pub mod database;
pub mod events;
pub mod http;
pub mod migrations;
pub mod orm;
