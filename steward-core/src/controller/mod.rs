//! Controller registration and lifecycle.
//!
//! A [`Controller`] binds one primary kind to its [`Reconciler`] plus any
//! number of secondary watches, each with a predicate and a mapper. Watch
//! configuration is owned by the controller instance; nothing here is
//! process-wide state.
//!
//! # Example
//!
//! ```ignore
//! let controller = Controller::new(store.clone(), WidgetReconciler::new(store), config)
//!     .owns::<Gadget>();
//! let index = controller.primary_index();
//! let handle = controller
//!     .watches::<Node>(LabelsChanged, IndexMapper::new(index))
//!     .start();
//! // ...
//! handle.shutdown().await;
//! ```

mod worker;

use crate::config::ControllerConfig;
use crate::mapper::{KeyIndex, Mapper, OwnerMapper, SelfMapper};
use crate::object::Resource;
use crate::predicate::{Always, GenerationChanged, Predicate};
use crate::queue::WorkQueue;
use crate::reconcile::Reconciler;
use crate::store::ObjectStore;
use crate::types::ObjectKey;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

type PumpStarter = Box<dyn FnOnce(watch::Receiver<bool>) -> JoinHandle<()> + Send>;

/// Builder binding a primary kind, its reconciler, and its watches.
pub struct Controller<R: Reconciler, S: ObjectStore> {
    store: Arc<S>,
    reconciler: Arc<R>,
    config: ControllerConfig,
    queue: WorkQueue<ObjectKey>,
    primary_predicate: Arc<dyn Predicate<R::Object>>,
    primary_index: KeyIndex,
    pump_starters: Vec<PumpStarter>,
}

impl<R: Reconciler, S: ObjectStore> Controller<R, S> {
    /// Start building a controller for `R::Object`.
    ///
    /// The primary watch is implicit and filtered by [`GenerationChanged`]
    /// unless [`with_predicate`](Self::with_predicate) overrides it, so the
    /// controller's own status writes never re-trigger it.
    pub fn new(store: Arc<S>, reconciler: R, config: ControllerConfig) -> Self {
        let queue = WorkQueue::new(config.rate_limiter.clone());
        Self {
            store,
            reconciler: Arc::new(reconciler),
            config,
            queue,
            primary_predicate: Arc::new(GenerationChanged),
            primary_index: KeyIndex::new(),
            pump_starters: Vec::new(),
        }
    }

    /// Replace the primary-watch predicate.
    pub fn with_predicate(mut self, predicate: impl Predicate<R::Object>) -> Self {
        self.primary_predicate = Arc::new(predicate);
        self
    }

    /// The set of live primary keys, maintained by the primary watch.
    ///
    /// Hand this to an [`IndexMapper`](crate::mapper::IndexMapper) to fan
    /// secondary events out to every primary.
    pub fn primary_index(&self) -> KeyIndex {
        self.primary_index.clone()
    }

    /// Watch a child kind created by this controller.
    ///
    /// Events map back to the owning primary through owner references; all
    /// events pass, since a convergent reconciler makes redundant triggers
    /// harmless.
    pub fn owns<K: Resource>(self) -> Self {
        self.watches::<K>(Always, OwnerMapper::of::<R::Object>())
    }

    /// Watch a secondary kind not owner-linked to the primary.
    ///
    /// `predicate` decides which events matter and `mapper` decides which
    /// primaries they affect.
    pub fn watches<K: Resource>(
        mut self,
        predicate: impl Predicate<K>,
        mapper: impl Mapper<K>,
    ) -> Self {
        let store = Arc::clone(&self.store);
        let queue = self.queue.clone();
        let relist_backoff = self.config.relist_backoff;
        let predicate: Arc<dyn Predicate<K>> = Arc::new(predicate);
        let mapper: Arc<dyn Mapper<K>> = Arc::new(mapper);
        self.pump_starters.push(Box::new(move |shutdown| {
            tokio::spawn(worker::run_pump::<K, S>(
                store,
                predicate,
                mapper,
                None,
                queue,
                shutdown,
                relist_backoff,
            ))
        }));
        self
    }

    /// Spawn the event pumps and worker pool.
    pub fn start(self) -> ControllerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tracing::info!(
            primary = R::Object::KIND,
            workers = self.config.workers,
            watches = self.pump_starters.len() + 1,
            "starting controller"
        );

        let mut pumps = Vec::with_capacity(self.pump_starters.len() + 1);
        pumps.push(tokio::spawn(worker::run_pump::<R::Object, S>(
            Arc::clone(&self.store),
            self.primary_predicate,
            Arc::new(SelfMapper),
            Some(self.primary_index),
            self.queue.clone(),
            shutdown_rx.clone(),
            self.config.relist_backoff,
        )));
        for starter in self.pump_starters {
            pumps.push(starter(shutdown_rx.clone()));
        }

        let workers = (0..self.config.workers.max(1))
            .map(|worker_id| {
                tokio::spawn(worker::run_worker::<R, S>(
                    worker_id,
                    Arc::clone(&self.store),
                    Arc::clone(&self.reconciler),
                    self.queue.clone(),
                ))
            })
            .collect();

        ControllerHandle {
            queue: self.queue,
            shutdown: shutdown_tx,
            pumps,
            workers,
        }
    }
}

/// Handle to a running controller.
pub struct ControllerHandle {
    queue: WorkQueue<ObjectKey>,
    shutdown: watch::Sender<bool>,
    pumps: Vec<JoinHandle<()>>,
    workers: Vec<JoinHandle<()>>,
}

impl ControllerHandle {
    /// Inject a reconcile request from outside the watch pipeline.
    pub fn trigger(&self, key: ObjectKey) {
        self.queue.add(key);
    }

    /// Number of keys waiting for a worker.
    pub fn queue_depth(&self) -> usize {
        self.queue.len()
    }

    /// Number of keys currently being reconciled.
    pub fn in_flight(&self) -> usize {
        self.queue.processing_count()
    }

    /// Stop the controller.
    ///
    /// Event pumps stop first, then the queue drains its blocked getters;
    /// in-flight reconciles finish rather than being aborted, so no partial
    /// writes are left behind.
    pub async fn shutdown(self) {
        tracing::info!("controller shutting down");
        let _ = self.shutdown.send(true);
        for pump in self.pumps {
            let _ = pump.await;
        }
        self.queue.shut_down();
        for worker in self.workers {
            let _ = worker.await;
        }
        tracing::info!("controller stopped");
    }
}
