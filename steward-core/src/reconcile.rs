//! The reconcile execution contract.

use crate::object::Resource;
use crate::store::StoreError;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// What a successful reconcile pass asks the dispatch loop to do next.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileResult {
    /// Re-run immediately (after resetting backoff state).
    pub requeue: bool,
    /// Re-run after a fixed delay. Takes precedence over `requeue`.
    pub requeue_after: Option<Duration>,
}

impl ReconcileResult {
    /// Nothing more to do until the next observed change.
    pub fn done() -> Self {
        Self::default()
    }

    /// Re-run as soon as a worker is free.
    pub fn requeue() -> Self {
        Self {
            requeue: true,
            requeue_after: None,
        }
    }

    /// Re-run after `delay`.
    pub fn requeue_after(delay: Duration) -> Self {
        Self {
            requeue: false,
            requeue_after: Some(delay),
        }
    }
}

/// Errors surfaced by a reconcile pass.
///
/// An error always implies another pass: retryable errors re-queue with
/// exponential backoff, and there is no retry ceiling; a stuck key backs off
/// to the configured maximum delay and keeps trying. `Fatal` is the one
/// exception: it marks a programmer or spec error that retrying cannot fix,
/// so the key stays idle until its object changes again.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A store call failed. Classified generically; the queue's backoff
    /// handles the retry.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A failure outside the store expected to clear on its own.
    #[error("transient error: {0}")]
    Transient(String),

    /// An error retrying cannot fix; reported, never re-queued.
    #[error("fatal error: {0}")]
    Fatal(String),
}

impl ReconcileError {
    /// True when retrying is pointless.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

/// Type alias for async reconcile futures.
pub type ReconcileFuture<'a> =
    Pin<Box<dyn Future<Output = Result<ReconcileResult, ReconcileError>> + Send + 'a>>;

/// Reconcile logic for one primary kind.
///
/// The dispatch loop resolves each queued key to a live object and hands it
/// here. Implementations read whatever else they need from their own store
/// handle and issue corrective writes, and must be safe to run any number of
/// times for the same object: after the first convergent pass, further passes
/// issue no writes.
pub trait Reconciler: Send + Sync + 'static {
    /// The primary kind this reconciler manages.
    type Object: Resource;

    /// Drive the observed state for one object toward its declared state.
    fn reconcile(&self, object: Arc<Self::Object>) -> ReconcileFuture<'_>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_constructors() {
        assert_eq!(ReconcileResult::done(), ReconcileResult::default());
        assert!(ReconcileResult::requeue().requeue);
        assert_eq!(
            ReconcileResult::requeue_after(Duration::from_secs(5)).requeue_after,
            Some(Duration::from_secs(5))
        );
    }

    #[test]
    fn fatal_classification() {
        assert!(ReconcileError::Fatal("bad spec".into()).is_fatal());
        assert!(!ReconcileError::Transient("blip".into()).is_fatal());
        let store = ReconcileError::from(StoreError::Unavailable("down".into()));
        assert!(!store.is_fatal());
    }
}
