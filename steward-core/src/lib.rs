//! Steward Core
//!
//! A level-triggered reconciliation engine: given a declared desired-state
//! object and a set of observed resources, it drives the observed state
//! toward the declared state through idempotent corrective writes, and
//! re-evaluates whenever either side changes.
//!
//! # Key Components
//!
//! - **Store**: the [`store::ObjectStore`] boundary (a versioned key-value
//!   store with watch support) and an in-memory backend
//! - **Events**: watch feeds, old/new change events, and the informer-lite
//!   [`event::EventSource`]
//! - **Predicates & Mappers**: per-watch filters and fan-out mapping from
//!   observed events to primary keys
//! - **Queue**: de-duplicating work queue with delayed and rate-limited
//!   enqueue and at-most-one-in-flight per key
//! - **Controller**: registration builder, event pumps, and the worker
//!   dispatch loop
//! - **Convergence**: the create-or-update helper for dependent resources
//!
//! # Example
//!
//! ```ignore
//! use steward_core::prelude::*;
//!
//! let store = Arc::new(MemoryStore::new());
//! let handle = Controller::new(store.clone(), MyReconciler::new(store), ControllerConfig::default())
//!     .owns::<MyChild>()
//!     .start();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod controller;
pub mod convergence;
pub mod event;
pub mod mapper;
pub mod object;
pub mod predicate;
pub mod queue;
pub mod reconcile;
pub mod store;
pub mod testing;
pub mod types;

pub mod prelude;

// Re-export key types at crate root for convenience
pub use config::ControllerConfig;
pub use controller::{Controller, ControllerHandle};
pub use convergence::{Convergence, OwnedFields, ensure_child};
pub use event::{ChangeEvent, EventSource, WatchEvent, WatchStream};
pub use mapper::{FnMapper, IndexMapper, KeyIndex, Mapper, OwnerMapper};
pub use object::{ObjectMeta, OwnerReference, Resource};
pub use predicate::{Always, GenerationChanged, LabelsChanged, Predicate};
pub use queue::{RateLimiter, RateLimiterConfig, WorkQueue};
pub use reconcile::{ReconcileError, ReconcileFuture, ReconcileResult, Reconciler};
pub use store::{MemoryStore, ObjectStore, StoreError, StoreResult};
pub use types::{ObjectKey, ResourceVersion};
