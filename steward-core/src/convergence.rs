//! Create-or-update convergence for dependent resources.

use crate::object::Resource;
use crate::store::{ObjectStore, StoreError, StoreResult};

/// Outcome of an ensure pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Convergence {
    /// The observed child already matched; no write was issued.
    Unchanged,
    /// The child was missing and has been created.
    Created,
    /// The child diverged and has been updated.
    Updated,
}

impl Convergence {
    /// Whether this pass wrote to the store.
    #[must_use]
    pub fn wrote(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// The controller-owned subset of a child's fields.
///
/// Other writers (admission defaults, sibling controllers) own the rest of
/// the object; comparing or overwriting their fields causes write-fights, so
/// both operations here are restricted to the owned subset.
pub trait OwnedFields: Resource {
    /// Whether the owned fields of `observed` already match this desired
    /// object.
    fn owned_fields_match(&self, observed: &Self) -> bool;

    /// Write this desired object's owned fields onto `observed`, leaving
    /// everything else as read.
    fn apply_owned_fields(&self, observed: &mut Self);
}

/// Ensure a child object exists and its owned fields match `desired`.
///
/// The caller builds `desired` complete with an owner reference back to the
/// primary. When the child exists and matches, nothing is written; that is
/// what makes repeated reconciliation free and keeps the controller's own
/// update events from re-triggering it forever.
///
/// Races surface as store errors and converge on a later pass: a concurrent
/// create shows up as `AlreadyExists`, a concurrent write as `Conflict`;
/// both are retryable.
pub async fn ensure_child<S, K>(store: &S, desired: &K) -> StoreResult<Convergence>
where
    S: ObjectStore,
    K: OwnedFields,
{
    let key = desired.key();
    match store.get::<K>(&key).await {
        Ok(observed) => {
            if desired.owned_fields_match(&observed) {
                tracing::debug!(kind = K::KIND, key = %key, "child already converged");
                return Ok(Convergence::Unchanged);
            }
            // carry the observed resource version so a concurrent writer
            // turns this into a Conflict instead of a lost update
            let mut updated = observed;
            desired.apply_owned_fields(&mut updated);
            store.update(&updated).await?;
            tracing::info!(kind = K::KIND, key = %key, "updated child");
            Ok(Convergence::Updated)
        }
        Err(StoreError::NotFound { .. }) => {
            store.create(desired).await?;
            tracing::info!(kind = K::KIND, key = %key, "created child");
            Ok(Convergence::Created)
        }
        Err(error) => Err(error),
    }
}
