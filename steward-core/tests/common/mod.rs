//! Shared fixtures for the engine integration tests.

#![allow(dead_code)]

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use steward_core::prelude::*;
use steward_core::queue::RateLimiterConfig;
use steward_core::testing::{Gadget, Widget};

/// A cluster-node-like secondary input resource. Labels live in metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub metadata: ObjectMeta,
    pub spec: NodeSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSpec {
    #[serde(default)]
    pub schedulable: bool,
}

impl Node {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            spec: NodeSpec { schedulable: true },
        }
    }
}

impl Resource for Node {
    const KIND: &'static str = "Node";

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

/// Observable counters shared between a [`TrackingReconciler`] and the test.
#[derive(Default)]
pub struct TrackingState {
    runs: AtomicUsize,
    running: AtomicUsize,
    max_concurrent: AtomicUsize,
    per_key: Mutex<HashMap<ObjectKey, usize>>,
    failures_remaining: Mutex<HashMap<ObjectKey, u32>>,
    fatal_keys: Mutex<HashSet<ObjectKey>>,
}

impl TrackingState {
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent.load(Ordering::SeqCst)
    }

    pub fn runs_for(&self, key: &ObjectKey) -> usize {
        self.per_key.lock().get(key).copied().unwrap_or(0)
    }

    /// Make the next `failures` passes for `key` fail with a transient error.
    pub fn fail_times(&self, key: ObjectKey, failures: u32) {
        self.failures_remaining.lock().insert(key, failures);
    }

    /// Make every pass for `key` fail with a fatal error.
    pub fn mark_fatal(&self, key: ObjectKey) {
        self.fatal_keys.lock().insert(key);
    }
}

/// Widget reconciler that records its activity and optionally converges a
/// gadget child per widget.
pub struct TrackingReconciler {
    store: Arc<MemoryStore>,
    pub state: Arc<TrackingState>,
    /// Whether to run the gadget convergence step.
    pub ensure_children: bool,
    /// Artificial per-pass work, to widen concurrency windows.
    pub work_delay: Duration,
}

impl TrackingReconciler {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self {
            store,
            state: Arc::new(TrackingState::default()),
            ensure_children: true,
            work_delay: Duration::ZERO,
        }
    }

    pub fn without_children(mut self) -> Self {
        self.ensure_children = false;
        self
    }

    pub fn with_work_delay(mut self, delay: Duration) -> Self {
        self.work_delay = delay;
        self
    }
}

impl Reconciler for TrackingReconciler {
    type Object = Widget;

    fn reconcile(&self, widget: Arc<Widget>) -> ReconcileFuture<'_> {
        Box::pin(async move {
            let key = widget.key();
            let running = self.state.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.state.max_concurrent.fetch_max(running, Ordering::SeqCst);

            if !self.work_delay.is_zero() {
                tokio::time::sleep(self.work_delay).await;
            }
            self.state.runs.fetch_add(1, Ordering::SeqCst);
            *self.state.per_key.lock().entry(key.clone()).or_insert(0) += 1;

            let outcome = self.reconcile_inner(&widget, &key).await;
            self.state.running.fetch_sub(1, Ordering::SeqCst);
            outcome
        })
    }
}

impl TrackingReconciler {
    async fn reconcile_inner(
        &self,
        widget: &Widget,
        key: &ObjectKey,
    ) -> Result<ReconcileResult, ReconcileError> {
        if self.state.fatal_keys.lock().contains(key) {
            return Err(ReconcileError::Fatal("injected fatal error".to_string()));
        }
        {
            let mut failures = self.state.failures_remaining.lock();
            if let Some(remaining) = failures.get_mut(key) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(ReconcileError::Transient("injected failure".to_string()));
                }
            }
        }

        if self.ensure_children {
            let desired = Gadget::owned_by(widget, widget.spec.size);
            ensure_child(self.store.as_ref(), &desired).await?;
        }
        Ok(ReconcileResult::done())
    }
}

/// Controller configuration tuned for fast tests.
pub fn test_config() -> ControllerConfig {
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

/// Poll `condition` until it holds or two seconds pass.
pub async fn wait_for(what: &str, mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}
