//! Watch feeds and change events.
//!
//! The store's watch feed delivers bare [`WatchEvent`]s. An [`EventSource`]
//! turns that feed into [`ChangeEvent`]s carrying old/new snapshots for
//! updates, so predicates can compare payloads instead of mere presence.

use crate::object::Resource;
use crate::types::ObjectKey;
use futures::Stream;
use std::collections::HashMap;
use std::pin::Pin;

/// A single change delivered by a store watch feed.
#[derive(Debug, Clone)]
pub enum WatchEvent<K> {
    /// The object was created.
    Added(K),
    /// The object was written.
    Modified(K),
    /// The object was removed.
    Deleted(K),
}

impl<K> WatchEvent<K> {
    /// The object the event refers to.
    pub fn object(&self) -> &K {
        match self {
            Self::Added(object) | Self::Modified(object) | Self::Deleted(object) => object,
        }
    }
}

/// An infinite stream of watch events for one kind.
///
/// The stream ends only when the feed is lost (disconnect or overflow); the
/// consumer is expected to relist and re-watch.
pub type WatchStream<K> = Pin<Box<dyn Stream<Item = WatchEvent<K>> + Send>>;

/// A change event paired with the snapshots a predicate needs.
#[derive(Debug, Clone)]
pub enum ChangeEvent<K> {
    /// An object appeared.
    Created(K),
    /// An object changed; both snapshots are provided for payload comparison.
    Updated {
        /// The previously observed object.
        old: K,
        /// The object as written.
        new: K,
    },
    /// An object was removed.
    Deleted(K),
    /// An externally injected event, outside the store's watch feed.
    Generic(K),
}

impl<K> ChangeEvent<K> {
    /// The current object the event refers to (the new snapshot for updates).
    pub fn object(&self) -> &K {
        match self {
            Self::Created(object) | Self::Deleted(object) | Self::Generic(object) => object,
            Self::Updated { new, .. } => new,
        }
    }
}

/// Informer-lite cache for one watched kind.
///
/// Keeps the last-seen snapshot per key so `Modified` events can be paired
/// with the previous object, and so a relist can synthesize the deletions
/// that happened while the feed was down. Holds no state that is not
/// reconstructible from the store.
pub struct EventSource<K> {
    cache: HashMap<ObjectKey, K>,
}

impl<K: Resource> EventSource<K> {
    /// Create an empty source.
    pub fn new() -> Self {
        Self {
            cache: HashMap::new(),
        }
    }

    /// Number of objects currently cached.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Reconcile the cache against a full list of the kind.
    ///
    /// Returns one event per difference: `Created` for unseen objects,
    /// `Updated` for cached objects (the payload may or may not have changed;
    /// predicates decide), and `Deleted` for cached objects missing from the
    /// list. Used at startup and after a watch gap.
    pub fn absorb_list(&mut self, objects: Vec<K>) -> Vec<ChangeEvent<K>> {
        let mut events = Vec::with_capacity(objects.len());
        let mut listed = HashMap::with_capacity(objects.len());
        for object in objects {
            listed.insert(object.key(), object);
        }

        let gone: Vec<ObjectKey> = self
            .cache
            .keys()
            .filter(|key| !listed.contains_key(key))
            .cloned()
            .collect();
        for key in gone {
            if let Some(old) = self.cache.remove(&key) {
                events.push(ChangeEvent::Deleted(old));
            }
        }

        for (key, new) in listed {
            match self.cache.insert(key, new.clone()) {
                Some(old) => events.push(ChangeEvent::Updated { old, new }),
                None => events.push(ChangeEvent::Created(new)),
            }
        }
        events
    }

    /// Translate one raw watch event, updating the cache.
    ///
    /// A `Modified` (or duplicate `Added`) for a key never cached is surfaced
    /// as `Created`; level-triggered consumers treat the two identically.
    pub fn translate(&mut self, event: WatchEvent<K>) -> ChangeEvent<K> {
        match event {
            WatchEvent::Added(new) | WatchEvent::Modified(new) => {
                match self.cache.insert(new.key(), new.clone()) {
                    Some(old) => ChangeEvent::Updated { old, new },
                    None => ChangeEvent::Created(new),
                }
            }
            WatchEvent::Deleted(object) => {
                self.cache.remove(&object.key());
                ChangeEvent::Deleted(object)
            }
        }
    }
}

impl<K: Resource> Default for EventSource<K> {
    fn default() -> Self {
        Self::new()
    }
}
