//! End-to-end workload operator behavior against the in-memory store.

use futures::executor::block_on;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use steward_core::config::ControllerConfig;
use steward_core::controller::Controller;
use steward_core::mapper::IndexMapper;
use steward_core::object::Resource;
use steward_core::predicate::LabelsChanged;
use steward_core::queue::RateLimiterConfig;
use steward_core::reconcile::{ReconcileFuture, Reconciler};
use steward_core::store::{MemoryStore, ObjectStore};
use steward_core::testing::init_tracing;
use steward_operator::{
    Deployment, Node, Workload, WorkloadPhase, WorkloadReconciler, start_workload_controller,
};

fn test_config() -> ControllerConfig {
    ControllerConfig {
        workers: 2,
        rate_limiter: RateLimiterConfig {
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(200),
            jitter: 0.0,
        },
        relist_backoff: Duration::from_millis(100),
    }
}

async fn wait_for(what: &str, mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

fn deployment_of(store: &MemoryStore, workload: &Workload) -> Option<Deployment> {
    block_on(store.get::<Deployment>(&workload.key())).ok()
}

fn status_phase(store: &MemoryStore, workload: &Workload) -> Option<WorkloadPhase> {
    block_on(store.get::<Workload>(&workload.key()))
        .ok()
        .and_then(|current| current.status.map(|status| status.phase))
}

#[tokio::test]
async fn workload_lifecycle_end_to_end() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let alpha = store
        .create(&Workload::new("default", "alpha", 3, "registry.local/backend:v1"))
        .await
        .unwrap();

    let handle = start_workload_controller(store.clone(), test_config());

    // first pass creates the backend with an owner reference
    wait_for("deployment created", || deployment_of(&store, &alpha).is_some()).await;
    let deployment = deployment_of(&store, &alpha).unwrap();
    assert_eq!(deployment.spec.replicas, 3);
    assert_eq!(deployment.metadata.owner_references[0].name, "alpha");

    // the deployment event confirms convergence and settles the status
    wait_for("workload ready", || {
        status_phase(&store, &alpha) == Some(WorkloadPhase::Ready)
    })
    .await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    // a converged workload can be reconciled forever without a single write
    let writes = store.total_writes();
    handle.trigger(alpha.key());
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(store.total_writes(), writes);

    // scaling up flows through to the deployment
    let mut scaled: Workload = store.get(&alpha.key()).await.unwrap();
    scaled.spec.replicas = 5;
    store.update(&scaled).await.unwrap();

    wait_for("deployment scaled", || {
        deployment_of(&store, &alpha).is_some_and(|deployment| deployment.spec.replicas == 5)
    })
    .await;
    let deployment = deployment_of(&store, &alpha).unwrap();
    assert_eq!(deployment.spec.image, "registry.local/backend:v1");

    wait_for("status observes new generation", || {
        block_on(store.get::<Workload>(&alpha.key()))
            .ok()
            .and_then(|current| current.status)
            .is_some_and(|status| {
                status.phase == WorkloadPhase::Ready && status.observed_generation == 2
            })
    })
    .await;

    handle.shutdown().await;
}

#[tokio::test]
async fn deployment_drift_is_repaired() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let alpha = store
        .create(&Workload::new("default", "alpha", 3, "registry.local/backend:v1"))
        .await
        .unwrap();

    let handle = start_workload_controller(store.clone(), test_config());
    wait_for("deployment created", || deployment_of(&store, &alpha).is_some()).await;

    // another writer scales the backend by hand; the owned watch notices
    let mut tampered = deployment_of(&store, &alpha).unwrap();
    tampered.spec.replicas = 99;
    store.update(&tampered).await.unwrap();

    wait_for("drift repaired", || {
        deployment_of(&store, &alpha).is_some_and(|deployment| deployment.spec.replicas == 3)
    })
    .await;

    handle.shutdown().await;
}

#[tokio::test]
async fn paused_workload_creates_nothing() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let mut paused = Workload::new("default", "alpha", 3, "registry.local/backend:v1");
    paused.spec.paused = true;
    let paused = store.create(&paused).await.unwrap();

    let handle = start_workload_controller(store.clone(), test_config());

    wait_for("workload marked paused", || {
        status_phase(&store, &paused) == Some(WorkloadPhase::Paused)
    })
    .await;
    assert!(deployment_of(&store, &paused).is_none());

    // unpausing resumes convergence
    let mut resumed: Workload = store.get(&paused.key()).await.unwrap();
    resumed.spec.paused = false;
    store.update(&resumed).await.unwrap();

    wait_for("deployment created after unpause", || {
        deployment_of(&store, &paused).is_some()
    })
    .await;

    handle.shutdown().await;
}

#[tokio::test]
async fn invalid_spec_marks_degraded_without_retry_storm() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let broken = store
        .create(&Workload::new("default", "broken", -1, "registry.local/backend:v1"))
        .await
        .unwrap();

    let handle = start_workload_controller(store.clone(), test_config());

    wait_for("workload marked degraded", || {
        status_phase(&store, &broken) == Some(WorkloadPhase::Degraded)
    })
    .await;
    let current: Workload = store.get(&broken.key()).await.unwrap();
    let status = current.status.unwrap();
    assert!(status.message.unwrap().contains("replicas"));
    assert!(status.last_updated.is_some());
    assert!(deployment_of(&store, &broken).is_none());

    // a fatal spec error is not retried, so the store stops moving
    tokio::time::sleep(Duration::from_millis(200)).await;
    let writes = store.total_writes();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(store.total_writes(), writes);

    // unrelated workloads keep being served
    let healthy = store
        .create(&Workload::new("default", "healthy", 1, "registry.local/backend:v1"))
        .await
        .unwrap();
    wait_for("healthy workload converges", || {
        deployment_of(&store, &healthy).is_some()
    })
    .await;

    handle.shutdown().await;
}

#[tokio::test]
async fn deleting_workload_garbage_collects_deployment() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let alpha = store
        .create(&Workload::new("default", "alpha", 3, "registry.local/backend:v1"))
        .await
        .unwrap();

    let handle = start_workload_controller(store.clone(), test_config());
    wait_for("deployment created", || deployment_of(&store, &alpha).is_some()).await;

    store.delete::<Workload>(&alpha.key()).await.unwrap();

    wait_for("deployment garbage-collected", || {
        deployment_of(&store, &alpha).is_none()
    })
    .await;

    handle.shutdown().await;
}

/// Delegating reconciler that counts passes, for tests that need to observe
/// reconciliation with no store side effects.
struct CountingReconciler {
    inner: WorkloadReconciler<MemoryStore>,
    runs: Arc<AtomicUsize>,
}

impl Reconciler for CountingReconciler {
    type Object = Workload;

    fn reconcile(&self, workload: Arc<Workload>) -> ReconcileFuture<'_> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        self.inner.reconcile(workload)
    }
}

#[tokio::test]
async fn node_relabel_reconciles_every_workload() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let alpha = store
        .create(&Workload::new("default", "alpha", 1, "registry.local/backend:v1"))
        .await
        .unwrap();
    let node = store.create(&Node::new("infra", "node-1")).await.unwrap();

    let runs = Arc::new(AtomicUsize::new(0));
    let reconciler = CountingReconciler {
        inner: WorkloadReconciler::new(store.clone()),
        runs: runs.clone(),
    };
    let controller = Controller::new(store.clone(), reconciler, test_config()).owns::<Deployment>();
    let index = controller.primary_index();
    let handle = controller
        .watches::<Node>(LabelsChanged, IndexMapper::new(index))
        .start();

    wait_for("initial convergence", || {
        status_phase(&store, &alpha) == Some(WorkloadPhase::Ready)
    })
    .await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    let settled = runs.load(Ordering::SeqCst);

    let mut relabeled: Node = store.get(&node.key()).await.unwrap();
    relabeled
        .meta_mut()
        .labels
        .insert("zone".to_string(), "east".to_string());
    store.update(&relabeled).await.unwrap();

    wait_for("node relabel triggered a pass", || {
        runs.load(Ordering::SeqCst) > settled
    })
    .await;

    handle.shutdown().await;
}
