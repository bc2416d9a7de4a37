//! Unit of work port.
//!
//! The transaction middleware depends on this trait rather than on the
//! entity manager directly, so tests can count `run` and `clean` calls.

use async_trait::async_trait;

use super::RepositoryError;

/// A pending change set applied as one unit.
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    /// Are there queued inserts, updates or deletes?
    fn has_changes(&self) -> bool;

    /// Apply every queued change inside a single database transaction.
    ///
    /// # Errors
    ///
    /// - `Database` if any statement fails; nothing is committed
    async fn run(&self) -> Result<(), RepositoryError>;

    /// Discard every queued change.
    fn clean(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(dead_code)]
    fn assert_object_safe(_: &dyn UnitOfWork) {}
}
