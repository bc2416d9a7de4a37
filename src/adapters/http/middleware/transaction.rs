//! Transaction middleware.
//!
//! Handlers queue changes on the request's entity manager; this layer
//! commits them once the handler succeeds and discards them otherwise.
//!
//! | Handler outcome        | Action                              |
//! |------------------------|-------------------------------------|
//! | success, changes queued | `run` once, then return the response |
//! | success, nothing queued | return the response                 |
//! | failure (5xx)           | `clean`, then return the response    |

use std::future::Future;

use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::adapters::http::context::OrmContext;
use crate::ports::{RepositoryError, UnitOfWork};

/// Why a transactional unit did not produce a value.
#[derive(Debug, Error)]
pub enum TransactionError<E> {
    /// The wrapped work failed; queued changes were discarded
    #[error("handler failed: {0}")]
    Handler(E),

    /// The work succeeded but committing its changes failed
    #[error("commit failed: {0}")]
    Commit(#[source] RepositoryError),
}

/// Await `work`, then commit or discard the changes queued on `uow`.
pub async fn with_transaction<U, F, T, E>(uow: &U, work: F) -> Result<T, TransactionError<E>>
where
    U: UnitOfWork + ?Sized,
    F: Future<Output = Result<T, E>>,
{
    match work.await {
        Ok(value) => {
            if uow.has_changes() {
                uow.run().await.map_err(TransactionError::Commit)?;
            }
            Ok(value)
        }
        Err(e) => {
            uow.clean();
            Err(TransactionError::Handler(e))
        }
    }
}

/// Must run inside `inject_middleware`; without an `OrmContext` the
/// request passes through untouched.
pub async fn transaction_middleware(request: Request, next: Next) -> Response {
    let Some(entity_manager) = request
        .extensions()
        .get::<OrmContext>()
        .map(|context| context.entity_manager().clone())
    else {
        return next.run(request).await;
    };

    let work = async move {
        let response = next.run(request).await;
        if response.status().is_server_error() {
            Err(response)
        } else {
            Ok(response)
        }
    };

    match with_transaction(entity_manager.as_ref(), work).await {
        Ok(response) => response,
        Err(TransactionError::Handler(response)) => response,
        Err(TransactionError::Commit(e)) => {
            tracing::error!("Failed to commit request changes: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "error": "Failed to save changes",
                    "code": "TRANSACTION_FAILED"
                })),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingUow {
        pending: AtomicBool,
        fail_commit: bool,
        runs: AtomicUsize,
        cleans: AtomicUsize,
    }

    impl CountingUow {
        fn with_changes() -> Self {
            Self {
                pending: AtomicBool::new(true),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl UnitOfWork for CountingUow {
        fn has_changes(&self) -> bool {
            self.pending.load(Ordering::SeqCst)
        }

        async fn run(&self) -> Result<(), RepositoryError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail_commit {
                return Err(RepositoryError::Database("disk full".to_string()));
            }
            self.pending.store(false, Ordering::SeqCst);
            Ok(())
        }

        fn clean(&self) {
            self.cleans.fetch_add(1, Ordering::SeqCst);
            self.pending.store(false, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn success_with_changes_commits_once() {
        let uow = CountingUow::with_changes();
        let result = with_transaction(&uow, async { Ok::<_, String>(7) }).await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(uow.runs.load(Ordering::SeqCst), 1);
        assert_eq!(uow.cleans.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn success_without_changes_skips_commit() {
        let uow = CountingUow::default();
        let result = with_transaction(&uow, async { Ok::<_, String>(()) }).await;

        assert!(result.is_ok());
        assert_eq!(uow.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failure_cleans_and_returns_handler_error() {
        let uow = CountingUow::with_changes();
        let result = with_transaction(&uow, async { Err::<(), _>("boom") }).await;

        assert!(matches!(result, Err(TransactionError::Handler("boom"))));
        assert_eq!(uow.runs.load(Ordering::SeqCst), 0);
        assert_eq!(uow.cleans.load(Ordering::SeqCst), 1);
        assert!(!uow.has_changes());
    }

    #[tokio::test]
    async fn commit_failure_is_reported() {
        let uow = CountingUow {
            pending: AtomicBool::new(true),
            fail_commit: true,
            ..CountingUow::default()
        };
        let result = with_transaction(&uow, async { Ok::<_, String>(()) }).await;

        assert!(matches!(result, Err(TransactionError::Commit(_))));
    }
}
