//! ORM event adapters.
//!
//! - `EventDispatcher` - synchronous, in-process publisher with per-type
//!   and wildcard subscriptions

mod dispatcher;

pub use dispatcher::{EventDispatcher, ALL_EVENTS};
