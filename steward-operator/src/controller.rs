//! Workload reconciliation.
//!
//! The reconciler keeps one backend [`Deployment`] converged per
//! [`Workload`] and records the outcome on the workload's status. Deleting a
//! workload needs no code here: the deployment carries an owner reference
//! and is garbage-collected by the store.

use crate::error::{WorkloadError, WorkloadResult};
use crate::resource::{Deployment, DeploymentSpec, Node, Workload, WorkloadPhase, WorkloadStatus};
use chrono::Utc;
use std::sync::Arc;
use steward_core::config::ControllerConfig;
use steward_core::controller::{Controller, ControllerHandle};
use steward_core::convergence::{Convergence, ensure_child};
use steward_core::mapper::IndexMapper;
use steward_core::object::{ObjectMeta, OwnerReference, Resource};
use steward_core::predicate::LabelsChanged;
use steward_core::reconcile::{ReconcileFuture, ReconcileResult, Reconciler};
use steward_core::store::ObjectStore;

/// Reconciler for [`Workload`] resources.
pub struct WorkloadReconciler<S> {
    store: Arc<S>,
}

impl<S: ObjectStore> WorkloadReconciler<S> {
    /// Create a new workload reconciler.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    async fn reconcile_inner(&self, workload: &Workload) -> WorkloadResult<ReconcileResult> {
        validate_spec(workload)?;

        if workload.spec.paused {
            tracing::debug!(workload = %workload.key(), "workload is paused");
            self.update_status(
                workload,
                WorkloadPhase::Paused,
                Some("reconciliation paused by user".to_string()),
            )
            .await?;
            return Ok(ReconcileResult::done());
        }

        let desired = build_deployment(workload);
        let convergence = ensure_child(self.store.as_ref(), &desired).await?;

        let (phase, message) = match convergence {
            Convergence::Unchanged => (WorkloadPhase::Ready, None),
            Convergence::Created => (
                WorkloadPhase::Pending,
                Some("backend deployment created".to_string()),
            ),
            Convergence::Updated => (
                WorkloadPhase::Pending,
                Some("backend deployment updated".to_string()),
            ),
        };
        self.update_status(workload, phase, message).await?;

        // the deployment watch confirms convergence on the next pass
        Ok(ReconcileResult::done())
    }

    /// Write the workload status, skipping the write when nothing but the
    /// timestamp would change. Skipping is what lets a converged workload be
    /// reconciled any number of times without touching the store.
    async fn update_status(
        &self,
        workload: &Workload,
        phase: WorkloadPhase,
        message: Option<String>,
    ) -> WorkloadResult<()> {
        let current = workload.status.clone().unwrap_or_default();
        let mut desired = WorkloadStatus {
            phase,
            message,
            observed_generation: workload.generation(),
            last_updated: current.last_updated.clone(),
        };
        if desired == current {
            return Ok(());
        }
        desired.last_updated = Some(Utc::now().to_rfc3339());

        tracing::debug!(
            workload = %workload.key(),
            phase = ?desired.phase,
            "updating workload status"
        );
        let mut updated = workload.clone();
        updated.status = Some(desired);
        self.store.update_status(&updated).await?;
        Ok(())
    }

    /// Record a failed pass on the workload status.
    async fn record_failure(&self, workload: &Workload, error: &WorkloadError) -> WorkloadResult<()> {
        self.update_status(workload, WorkloadPhase::Degraded, Some(error.to_string()))
            .await
    }
}

impl<S: ObjectStore> Reconciler for WorkloadReconciler<S> {
    type Object = Workload;

    fn reconcile(&self, workload: Arc<Workload>) -> ReconcileFuture<'_> {
        Box::pin(async move {
            let key = workload.key();
            tracing::info!(workload = %key, generation = workload.generation(), "reconciling workload");

            match self.reconcile_inner(&workload).await {
                Ok(result) => Ok(result),
                Err(error) => {
                    if let Err(status_error) = self.record_failure(&workload, &error).await {
                        tracing::warn!(
                            workload = %key,
                            error = %status_error,
                            "failed to record failure on workload status"
                        );
                    }
                    Err(error.into())
                }
            }
        })
    }
}

/// The deployment a workload declares: same namespace and name, owner
/// reference back to the workload, spec derived from the workload spec.
pub fn build_deployment(workload: &Workload) -> Deployment {
    let mut metadata = ObjectMeta::new(workload.namespace(), workload.name());
    metadata.owner_references.push(OwnerReference::of(workload));
    Deployment {
        metadata,
        spec: DeploymentSpec {
            replicas: workload.spec.replicas,
            image: workload.spec.image.clone(),
            node_selector: workload.spec.node_selector.clone(),
        },
        status: None,
    }
}

fn validate_spec(workload: &Workload) -> WorkloadResult<()> {
    if workload.spec.replicas < 0 {
        return Err(WorkloadError::InvalidSpec(format!(
            "replicas must be non-negative, got {}",
            workload.spec.replicas
        )));
    }
    if workload.spec.image.is_empty() {
        return Err(WorkloadError::InvalidSpec("image must not be empty".into()));
    }
    Ok(())
}

/// Build and start the workload controller.
///
/// Registers the primary watch on workloads, an owner-linked watch on the
/// backend deployments, and a node watch that fires on label changes and
/// fans out to every known workload.
pub fn start_workload_controller<S: ObjectStore>(
    store: Arc<S>,
    config: ControllerConfig,
) -> ControllerHandle {
    let reconciler = WorkloadReconciler::new(Arc::clone(&store));
    let controller = Controller::new(store, reconciler, config).owns::<Deployment>();
    let index = controller.primary_index();
    controller
        .watches::<Node>(LabelsChanged, IndexMapper::new(index))
        .start()
}
