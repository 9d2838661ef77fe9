//! Event predicates.
//!
//! A predicate decides, per change event, whether reconciliation is worth
//! queueing. Predicates are pure functions of the event payload and perform
//! no I/O; returning false drops the event before it reaches the work queue,
//! which is the primary guard against reconcile storms.

use crate::event::ChangeEvent;
use crate::object::Resource;

/// Boolean filter applied to change events prior to queueing.
///
/// Every method defaults to **false**: an event category a predicate does not
/// explicitly handle is dropped. Update handlers receive both snapshots and
/// must compare payloads, not mere presence, so resource-version or
/// status-only churn does not re-trigger reconciliation.
pub trait Predicate<K: Resource>: Send + Sync + 'static {
    /// An object appeared.
    fn create(&self, _object: &K) -> bool {
        false
    }

    /// An object changed.
    fn update(&self, _old: &K, _new: &K) -> bool {
        false
    }

    /// An object was removed.
    fn delete(&self, _object: &K) -> bool {
        false
    }

    /// An externally injected event.
    fn generic(&self, _object: &K) -> bool {
        false
    }

    /// Dispatch an event to the matching handler.
    fn evaluate(&self, event: &ChangeEvent<K>) -> bool {
        match event {
            ChangeEvent::Created(object) => self.create(object),
            ChangeEvent::Updated { old, new } => self.update(old, new),
            ChangeEvent::Deleted(object) => self.delete(object),
            ChangeEvent::Generic(object) => self.generic(object),
        }
    }
}

/// Passes every event. Used for owned-child watches, where a convergent
/// reconciler makes redundant triggers harmless.
pub struct Always;

impl<K: Resource> Predicate<K> for Always {
    fn create(&self, _object: &K) -> bool {
        true
    }

    fn update(&self, _old: &K, _new: &K) -> bool {
        true
    }

    fn delete(&self, _object: &K) -> bool {
        true
    }

    fn generic(&self, _object: &K) -> bool {
        true
    }
}

/// Passes updates only when the spec generation changed.
///
/// The store bumps the generation for spec writes and leaves it alone for
/// status writes, so this predicate suppresses the controller's own status
/// churn. Creations and deletions always pass.
pub struct GenerationChanged;

impl<K: Resource> Predicate<K> for GenerationChanged {
    fn create(&self, _object: &K) -> bool {
        true
    }

    fn update(&self, old: &K, new: &K) -> bool {
        old.generation() != new.generation()
    }

    fn delete(&self, _object: &K) -> bool {
        true
    }

    fn generic(&self, _object: &K) -> bool {
        true
    }
}

/// Passes updates only when the label set changed.
///
/// Meant for secondary input resources (nodes and the like) where only
/// labels feed the reconcile decision.
pub struct LabelsChanged;

impl<K: Resource> Predicate<K> for LabelsChanged {
    fn create(&self, _object: &K) -> bool {
        true
    }

    fn update(&self, old: &K, new: &K) -> bool {
        old.meta().labels != new.meta().labels
    }

    fn delete(&self, _object: &K) -> bool {
        true
    }
}
