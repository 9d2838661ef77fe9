//! Fan-out mapping from observed-resource events to primary keys.
//!
//! A mapper answers "which primaries must re-reconcile because this object
//! changed?". Mappers are pure and side-effect-free; an empty answer means no
//! reconciliation is needed.

use crate::object::Resource;
use crate::types::ObjectKey;
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Maps one observed object to zero or more primary keys.
pub trait Mapper<K: Resource>: Send + Sync + 'static {
    /// Compute the set of primaries affected by a change to `object`.
    fn map(&self, object: &K) -> Vec<ObjectKey>;
}

/// Closure adapter for one-off mappings.
pub struct FnMapper<F>(F);

impl<F> FnMapper<F> {
    /// Wrap a mapping closure.
    pub fn new(mapper: F) -> Self {
        Self(mapper)
    }
}

impl<K, F> Mapper<K> for FnMapper<F>
where
    K: Resource,
    F: Fn(&K) -> Vec<ObjectKey> + Send + Sync + 'static,
{
    fn map(&self, object: &K) -> Vec<ObjectKey> {
        (self.0)(object)
    }
}

/// Maps a child object to the owners of one kind named in its owner
/// references. Owners live in the child's namespace.
pub struct OwnerMapper {
    owner_kind: &'static str,
}

impl OwnerMapper {
    /// Mapper resolving owners of kind `O`.
    pub fn of<O: Resource>() -> Self {
        Self {
            owner_kind: O::KIND,
        }
    }
}

impl<K: Resource> Mapper<K> for OwnerMapper {
    fn map(&self, object: &K) -> Vec<ObjectKey> {
        let meta = object.meta();
        meta.owner_references
            .iter()
            .filter(|reference| reference.kind == self.owner_kind)
            .map(|reference| ObjectKey::new(meta.namespace.clone(), reference.name.clone()))
            .collect()
    }
}

/// Shared set of live primary keys, maintained by the controller's own
/// primary watch and consulted by mappers that fan out to every primary.
#[derive(Clone, Default)]
pub struct KeyIndex {
    inner: Arc<RwLock<BTreeSet<ObjectKey>>>,
}

impl KeyIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a live key.
    pub fn insert(&self, key: ObjectKey) {
        self.inner.write().insert(key);
    }

    /// Drop a key.
    pub fn remove(&self, key: &ObjectKey) {
        self.inner.write().remove(key);
    }

    /// Whether a key is currently live.
    pub fn contains(&self, key: &ObjectKey) -> bool {
        self.inner.read().contains(key)
    }

    /// Snapshot of all live keys.
    pub fn keys(&self) -> Vec<ObjectKey> {
        self.inner.read().iter().cloned().collect()
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

/// Fans every event out to all primaries in a [`KeyIndex`].
///
/// O(primaries) per event. Correct at any scale, economical only at small
/// ones; swap in a selector-indexed mapper behind the same trait when the
/// fan-out cost bites.
pub struct IndexMapper {
    index: KeyIndex,
}

impl IndexMapper {
    /// Mapper reading from `index`.
    pub fn new(index: KeyIndex) -> Self {
        Self { index }
    }
}

impl<K: Resource> Mapper<K> for IndexMapper {
    fn map(&self, _object: &K) -> Vec<ObjectKey> {
        self.index.keys()
    }
}

/// Identity mapping used for the primary kind itself.
pub struct SelfMapper;

impl<K: Resource> Mapper<K> for SelfMapper {
    fn map(&self, object: &K) -> Vec<ObjectKey> {
        vec![object.key()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Gadget, Widget};

    #[test]
    fn owner_mapper_resolves_back_links() {
        let widget = Widget::new("default", "alpha", 3);
        let gadget = Gadget::owned_by(&widget, 3);

        let mapper = OwnerMapper::of::<Widget>();
        assert_eq!(mapper.map(&gadget), vec![widget.key()]);

        let orphan = Gadget::new("default", "stray", 1);
        assert!(mapper.map(&orphan).is_empty());
    }

    #[test]
    fn index_mapper_fans_out_to_all_keys() {
        let index = KeyIndex::new();
        index.insert(ObjectKey::new("default", "alpha"));
        index.insert(ObjectKey::new("default", "beta"));

        let mapper = IndexMapper::new(index.clone());
        let node = Widget::new("infra", "node-1", 0);
        assert_eq!(mapper.map(&node).len(), 2);

        index.remove(&ObjectKey::new("default", "beta"));
        assert_eq!(mapper.map(&node), vec![ObjectKey::new("default", "alpha")]);
    }

    #[test]
    fn fn_mapper_delegates() {
        let mapper = FnMapper::new(|widget: &Widget| vec![widget.key()]);
        let widget = Widget::new("default", "alpha", 3);
        assert_eq!(mapper.map(&widget), vec![widget.key()]);
    }
}
