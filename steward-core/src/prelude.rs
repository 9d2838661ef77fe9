//! Convenience re-exports for controller authors.

pub use crate::config::ControllerConfig;
pub use crate::controller::{Controller, ControllerHandle};
pub use crate::convergence::{Convergence, OwnedFields, ensure_child};
pub use crate::event::ChangeEvent;
pub use crate::mapper::{FnMapper, IndexMapper, KeyIndex, Mapper, OwnerMapper};
pub use crate::object::{ObjectMeta, OwnerReference, Resource};
pub use crate::predicate::{Always, GenerationChanged, LabelsChanged, Predicate};
pub use crate::reconcile::{ReconcileError, ReconcileFuture, ReconcileResult, Reconciler};
pub use crate::store::{MemoryStore, ObjectStore, StoreError, StoreResult};
pub use crate::types::{ObjectKey, ResourceVersion};
