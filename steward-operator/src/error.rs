//! Error types for the workload operator.

use steward_core::reconcile::ReconcileError;
use steward_core::store::StoreError;
use thiserror::Error;

/// Errors that can occur while reconciling a workload.
#[derive(Debug, Error)]
pub enum WorkloadError {
    /// Store error; retried with backoff.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The declared spec cannot be acted on; retrying will not help.
    #[error("invalid workload spec: {0}")]
    InvalidSpec(String),
}

/// Result type for operator operations.
pub type WorkloadResult<T> = Result<T, WorkloadError>;

impl From<WorkloadError> for ReconcileError {
    fn from(err: WorkloadError) -> Self {
        match err {
            WorkloadError::Store(store) => ReconcileError::Store(store),
            WorkloadError::InvalidSpec(message) => ReconcileError::Fatal(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_spec_maps_to_fatal() {
        let err = ReconcileError::from(WorkloadError::InvalidSpec("negative replicas".into()));
        assert!(err.is_fatal());

        let err = ReconcileError::from(WorkloadError::Store(StoreError::Unavailable(
            "down".into(),
        )));
        assert!(!err.is_fatal());
    }
}
