//! Workload operator built on the steward reconciliation engine.
//!
//! A [`Workload`] declares "keep a backend of this shape running"; the
//! operator keeps one backend [`Deployment`] converged per workload and
//! reacts to cluster [`Node`] label changes by re-reconciling every
//! workload.
//!
//! # Example
//!
//! ```ignore
//! use steward_core::{ControllerConfig, MemoryStore};
//! use steward_operator::start_workload_controller;
//!
//! let store = Arc::new(MemoryStore::new());
//! let handle = start_workload_controller(store, ControllerConfig::from_env());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod controller;
pub mod error;
pub mod resource;

pub use controller::{WorkloadReconciler, build_deployment, start_workload_controller};
pub use error::{WorkloadError, WorkloadResult};
pub use resource::{
    Deployment, DeploymentSpec, DeploymentStatus, Node, NodeSpec, Workload, WorkloadPhase,
    WorkloadSpec, WorkloadStatus,
};
