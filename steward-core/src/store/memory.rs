//! In-memory store backend.
//!
//! This backend is useful for:
//! - Development and testing
//! - Single-process deployments
//! - Scenarios where persistence isn't required
//!
//! It implements the full store contract: monotonic resource versions,
//! optimistic-concurrency conflicts, spec-only generation bumps, status
//! sub-object writes, finalizer-aware deletion, and cascading removal of
//! owned objects. All state is lost on restart.

use super::{ObjectStore, StoreError, StoreFuture, StoreResult};
use crate::event::{WatchEvent, WatchStream};
use crate::object::{ObjectMeta, Resource};
use crate::types::{ObjectKey, ResourceVersion};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::broadcast;

/// Kind-erased change record broadcast to watchers of every kind.
#[derive(Debug, Clone)]
struct RawEvent {
    kind: &'static str,
    event_type: RawEventType,
    payload: Value,
}

#[derive(Debug, Clone, Copy)]
enum RawEventType {
    Added,
    Modified,
    Deleted,
}

/// One stored object: its decoded metadata plus the full serialized payload.
/// The metadata copy is kept in sync with the payload's `metadata` field.
struct StoredObject {
    meta: ObjectMeta,
    payload: Value,
}

struct MemoryInner {
    /// kind -> key -> object.
    objects: HashMap<&'static str, HashMap<ObjectKey, StoredObject>>,
    /// Global monotonic version counter, shared across kinds.
    next_version: u64,
}

/// In-memory object store.
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
    events: broadcast::Sender<RawEvent>,
    /// Total create calls that stored an object (for convergence tests).
    creates: AtomicUsize,
    /// Total update and status-update calls that stored an object.
    updates: AtomicUsize,
    /// Total objects actually removed, cascaded removals included.
    deletes: AtomicUsize,
}

impl MemoryStore {
    /// Create a store with the default watch buffer.
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    /// Create a store whose watch feed buffers up to `watch_buffer` events
    /// per subscriber before the subscriber is forced to relist.
    pub fn with_capacity(watch_buffer: usize) -> Self {
        let (events, _) = broadcast::channel(watch_buffer.max(1));
        Self {
            inner: Mutex::new(MemoryInner {
                objects: HashMap::new(),
                next_version: 0,
            }),
            events,
            creates: AtomicUsize::new(0),
            updates: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
        }
    }

    /// Total objects created.
    pub fn total_creates(&self) -> usize {
        self.creates.load(Ordering::Relaxed)
    }

    /// Total spec or status updates written.
    pub fn total_updates(&self) -> usize {
        self.updates.load(Ordering::Relaxed)
    }

    /// Total objects removed, including cascaded removals.
    pub fn total_deletes(&self) -> usize {
        self.deletes.load(Ordering::Relaxed)
    }

    /// Total writes of any sort. Converged systems stop moving this number.
    pub fn total_writes(&self) -> usize {
        self.total_creates() + self.total_updates() + self.total_deletes()
    }

    fn emit(&self, event: RawEvent) {
        // send only fails when nobody is watching
        let _ = self.events.send(event);
    }

    fn get_sync<K: Resource>(&self, key: &ObjectKey) -> StoreResult<K> {
        let inner = self.inner.lock();
        let stored = inner
            .objects
            .get(K::KIND)
            .and_then(|kind_map| kind_map.get(key))
            .ok_or_else(|| StoreError::NotFound {
                kind: K::KIND.to_string(),
                key: key.clone(),
            })?;
        Ok(serde_json::from_value(stored.payload.clone())?)
    }

    fn list_sync<K: Resource>(&self, namespace: Option<&str>) -> StoreResult<Vec<K>> {
        let inner = self.inner.lock();
        let mut objects = Vec::new();
        if let Some(kind_map) = inner.objects.get(K::KIND) {
            for stored in kind_map.values() {
                if namespace.is_some_and(|ns| ns != stored.meta.namespace) {
                    continue;
                }
                objects.push(serde_json::from_value::<K>(stored.payload.clone())?);
            }
        }
        objects.sort_by_key(|object: &K| object.key());
        Ok(objects)
    }

    fn create_sync<K: Resource>(&self, object: &K) -> StoreResult<K> {
        let key = object.key();
        let payload = {
            let mut inner = self.inner.lock();
            let exists = inner
                .objects
                .get(K::KIND)
                .is_some_and(|kind_map| kind_map.contains_key(&key));
            if exists {
                return Err(StoreError::AlreadyExists {
                    kind: K::KIND.to_string(),
                    key,
                });
            }

            inner.next_version += 1;
            let mut meta = object.meta().clone();
            meta.resource_version = ResourceVersion(inner.next_version);
            meta.generation = 1;
            meta.deletion_timestamp = None;

            let mut payload = serde_json::to_value(object)?;
            write_meta(&mut payload, &meta)?;
            inner.objects.entry(K::KIND).or_default().insert(
                key.clone(),
                StoredObject {
                    meta,
                    payload: payload.clone(),
                },
            );
            payload
        };

        self.creates.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(kind = K::KIND, key = %key, "created object");
        self.emit(RawEvent {
            kind: K::KIND,
            event_type: RawEventType::Added,
            payload: payload.clone(),
        });
        Ok(serde_json::from_value(payload)?)
    }

    fn update_sync<K: Resource>(&self, object: &K) -> StoreResult<K> {
        let key = object.key();
        let now = Utc::now();
        let (payload, events, removed) = {
            let mut inner = self.inner.lock();
            let stored = inner
                .objects
                .get(K::KIND)
                .and_then(|kind_map| kind_map.get(&key))
                .ok_or_else(|| StoreError::NotFound {
                    kind: K::KIND.to_string(),
                    key: key.clone(),
                })?;
            check_version(K::KIND, &key, object.meta().resource_version, stored)?;
            let stored_meta = stored.meta.clone();
            let stored_status = stored.payload.get("status").cloned();
            let stored_payload_fields = non_meta_fields(&stored.payload);

            inner.next_version += 1;
            let mut payload = serde_json::to_value(object)?;
            // the status sub-object is owned by update_status
            write_field(&mut payload, "status", stored_status)?;

            let spec_changed = non_meta_fields(&payload) != stored_payload_fields;
            let mut meta = object.meta().clone();
            meta.resource_version = ResourceVersion(inner.next_version);
            meta.generation = stored_meta.generation + u64::from(spec_changed);
            meta.deletion_timestamp = stored_meta.deletion_timestamp;
            write_meta(&mut payload, &meta)?;

            if meta.deletion_timestamp.is_some() && meta.finalizers.is_empty() {
                // the last finalizer was cleared; complete the pending delete
                let (events, removed) = delete_locked(&mut inner, K::KIND, &key, now)?;
                (payload, events, removed)
            } else {
                if let Some(kind_map) = inner.objects.get_mut(K::KIND) {
                    kind_map.insert(
                        key.clone(),
                        StoredObject {
                            meta,
                            payload: payload.clone(),
                        },
                    );
                }
                let events = vec![RawEvent {
                    kind: K::KIND,
                    event_type: RawEventType::Modified,
                    payload: payload.clone(),
                }];
                (payload, events, 0)
            }
        };

        if removed > 0 {
            self.deletes.fetch_add(removed, Ordering::Relaxed);
            tracing::debug!(kind = K::KIND, key = %key, "finalizers cleared, object removed");
        } else {
            self.updates.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(kind = K::KIND, key = %key, "updated object");
        }
        for event in events {
            self.emit(event);
        }
        Ok(serde_json::from_value(payload)?)
    }

    fn update_status_sync<K: Resource>(&self, object: &K) -> StoreResult<K> {
        let key = object.key();
        let payload = {
            let mut inner = self.inner.lock();
            let stored = inner
                .objects
                .get(K::KIND)
                .and_then(|kind_map| kind_map.get(&key))
                .ok_or_else(|| StoreError::NotFound {
                    kind: K::KIND.to_string(),
                    key: key.clone(),
                })?;
            check_version(K::KIND, &key, object.meta().resource_version, stored)?;
            let mut meta = stored.meta.clone();
            let mut payload = stored.payload.clone();

            inner.next_version += 1;
            meta.resource_version = ResourceVersion(inner.next_version);
            let status = serde_json::to_value(object)?.get("status").cloned();
            write_field(&mut payload, "status", status)?;
            write_meta(&mut payload, &meta)?;

            if let Some(kind_map) = inner.objects.get_mut(K::KIND) {
                kind_map.insert(
                    key.clone(),
                    StoredObject {
                        meta,
                        payload: payload.clone(),
                    },
                );
            }
            payload
        };

        self.updates.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(kind = K::KIND, key = %key, "updated object status");
        self.emit(RawEvent {
            kind: K::KIND,
            event_type: RawEventType::Modified,
            payload: payload.clone(),
        });
        Ok(serde_json::from_value(payload)?)
    }

    fn delete_sync<K: Resource>(&self, key: &ObjectKey) -> StoreResult<()> {
        let now = Utc::now();
        let (events, removed) = {
            let mut inner = self.inner.lock();
            let exists = inner
                .objects
                .get(K::KIND)
                .is_some_and(|kind_map| kind_map.contains_key(key));
            if !exists {
                return Err(StoreError::NotFound {
                    kind: K::KIND.to_string(),
                    key: key.clone(),
                });
            }
            delete_locked(&mut inner, K::KIND, key, now)?
        };

        if removed > 0 {
            self.deletes.fetch_add(removed, Ordering::Relaxed);
        }
        tracing::debug!(kind = K::KIND, key = %key, removed, "deleted object");
        for event in events {
            self.emit(event);
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore for MemoryStore {
    fn get<K: Resource>(&self, key: &ObjectKey) -> StoreFuture<'_, K> {
        let key = key.clone();
        Box::pin(async move { self.get_sync(&key) })
    }

    fn list<K: Resource>(&self, namespace: Option<&str>) -> StoreFuture<'_, Vec<K>> {
        let namespace = namespace.map(str::to_string);
        Box::pin(async move { self.list_sync(namespace.as_deref()) })
    }

    fn create<K: Resource>(&self, object: &K) -> StoreFuture<'_, K> {
        let object = object.clone();
        Box::pin(async move { self.create_sync(&object) })
    }

    fn update<K: Resource>(&self, object: &K) -> StoreFuture<'_, K> {
        let object = object.clone();
        Box::pin(async move { self.update_sync(&object) })
    }

    fn update_status<K: Resource>(&self, object: &K) -> StoreFuture<'_, K> {
        let object = object.clone();
        Box::pin(async move { self.update_status_sync(&object) })
    }

    fn delete<K: Resource>(&self, key: &ObjectKey) -> StoreFuture<'_, ()> {
        let key = key.clone();
        Box::pin(async move { self.delete_sync::<K>(&key) })
    }

    fn watch<K: Resource>(&self) -> WatchStream<K> {
        let receiver = self.events.subscribe();
        Box::pin(futures::stream::unfold(receiver, |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(raw) if raw.kind == K::KIND => {
                        match serde_json::from_value::<K>(raw.payload) {
                            Ok(object) => {
                                let event = match raw.event_type {
                                    RawEventType::Added => WatchEvent::Added(object),
                                    RawEventType::Modified => WatchEvent::Modified(object),
                                    RawEventType::Deleted => WatchEvent::Deleted(object),
                                };
                                return Some((event, receiver));
                            }
                            Err(error) => {
                                tracing::error!(
                                    kind = K::KIND,
                                    %error,
                                    "failed to decode watch payload"
                                );
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            kind = K::KIND,
                            skipped,
                            "watch feed overflowed, ending stream for relist"
                        );
                        return None;
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        }))
    }
}

fn check_version(
    kind: &'static str,
    key: &ObjectKey,
    submitted: ResourceVersion,
    stored: &StoredObject,
) -> StoreResult<()> {
    if submitted != stored.meta.resource_version {
        return Err(StoreError::Conflict {
            kind: kind.to_string(),
            key: key.clone(),
            submitted,
            current: stored.meta.resource_version,
        });
    }
    Ok(())
}

fn write_meta(payload: &mut Value, meta: &ObjectMeta) -> StoreResult<()> {
    write_field(payload, "metadata", Some(serde_json::to_value(meta)?))
}

fn write_field(payload: &mut Value, field: &str, value: Option<Value>) -> StoreResult<()> {
    let Value::Object(map) = payload else {
        return Err(StoreError::Serialization(
            "object must serialize as a map".to_string(),
        ));
    };
    match value {
        Some(value) => {
            map.insert(field.to_string(), value);
        }
        None => {
            map.remove(field);
        }
    }
    Ok(())
}

/// The object payload minus the store-owned `metadata` and the
/// separately-written `status`: the part whose change bumps the generation.
fn non_meta_fields(payload: &Value) -> Value {
    match payload {
        Value::Object(map) => {
            let fields: serde_json::Map<String, Value> = map
                .iter()
                .filter(|(field, _)| *field != "metadata" && *field != "status")
                .map(|(field, value)| (field.clone(), value.clone()))
                .collect();
            Value::Object(fields)
        }
        other => other.clone(),
    }
}

/// Remove an object and, transitively, every object holding an owner
/// reference to a removed one. Objects with unresolved finalizers are marked
/// for deletion instead of removed; their removal completes when the last
/// finalizer is cleared.
fn delete_locked(
    inner: &mut MemoryInner,
    kind: &'static str,
    key: &ObjectKey,
    now: DateTime<Utc>,
) -> StoreResult<(Vec<RawEvent>, usize)> {
    let mut events = Vec::new();
    let mut removed = 0usize;
    let mut worklist = vec![(kind, key.clone())];

    while let Some((item_kind, item_key)) = worklist.pop() {
        enum Action {
            Mark,
            Remove,
        }
        let action = match inner
            .objects
            .get(item_kind)
            .and_then(|kind_map| kind_map.get(&item_key))
        {
            None => continue,
            Some(stored)
                if !stored.meta.finalizers.is_empty()
                    && stored.meta.deletion_timestamp.is_none() =>
            {
                Action::Mark
            }
            Some(_) => Action::Remove,
        };

        match action {
            Action::Mark => {
                inner.next_version += 1;
                let version = ResourceVersion(inner.next_version);
                if let Some(stored) = inner
                    .objects
                    .get_mut(item_kind)
                    .and_then(|kind_map| kind_map.get_mut(&item_key))
                {
                    stored.meta.deletion_timestamp = Some(now);
                    stored.meta.resource_version = version;
                    write_meta(&mut stored.payload, &stored.meta)?;
                    events.push(RawEvent {
                        kind: item_kind,
                        event_type: RawEventType::Modified,
                        payload: stored.payload.clone(),
                    });
                }
            }
            Action::Remove => {
                if let Some(stored) = inner
                    .objects
                    .get_mut(item_kind)
                    .and_then(|kind_map| kind_map.remove(&item_key))
                {
                    removed += 1;
                    events.push(RawEvent {
                        kind: item_kind,
                        event_type: RawEventType::Deleted,
                        payload: stored.payload,
                    });
                    for (child_kind, kind_map) in &inner.objects {
                        for (child_key, child) in kind_map {
                            let owned = child.meta.namespace == item_key.namespace
                                && child
                                    .meta
                                    .owner_references
                                    .iter()
                                    .any(|r| r.kind == item_kind && r.name == item_key.name);
                            if owned {
                                worklist.push((*child_kind, child_key.clone()));
                            }
                        }
                    }
                }
            }
        }
    }

    Ok((events, removed))
}
