//! Event pumps and the worker dispatch loop.

use crate::event::{ChangeEvent, EventSource};
use crate::mapper::{KeyIndex, Mapper};
use crate::object::Resource;
use crate::predicate::Predicate;
use crate::queue::WorkQueue;
use crate::reconcile::{ReconcileError, ReconcileResult, Reconciler};
use crate::store::ObjectStore;
use crate::types::ObjectKey;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Pump one kind's watch feed through predicate and mapper into the queue.
///
/// Runs list-then-watch: the watch is subscribed before the list so nothing
/// falls between the two (duplicates are harmless to a level-triggered
/// consumer), and a lost feed falls back to a fresh relist. Only ever calls
/// the queue's add methods, never the reconciler.
pub(crate) async fn run_pump<K, S>(
    store: Arc<S>,
    predicate: Arc<dyn Predicate<K>>,
    mapper: Arc<dyn Mapper<K>>,
    index: Option<KeyIndex>,
    queue: WorkQueue<ObjectKey>,
    mut shutdown: watch::Receiver<bool>,
    relist_backoff: Duration,
) where
    K: Resource,
    S: ObjectStore,
{
    let mut source = EventSource::new();
    tracing::debug!(kind = K::KIND, "event pump started");

    'relist: loop {
        if *shutdown.borrow() {
            break;
        }

        let mut events = store.watch::<K>();
        let listed = match store.list::<K>(None).await {
            Ok(listed) => listed,
            Err(error) => {
                tracing::warn!(kind = K::KIND, %error, "list failed, backing off");
                tokio::select! {
                    _ = shutdown.changed() => break 'relist,
                    () = tokio::time::sleep(relist_backoff) => continue 'relist,
                }
            }
        };
        for change in source.absorb_list(listed) {
            dispatch(&change, &*predicate, &*mapper, index.as_ref(), &queue);
        }

        loop {
            tokio::select! {
                _ = shutdown.changed() => break 'relist,
                event = events.next() => match event {
                    Some(event) => {
                        let change = source.translate(event);
                        dispatch(&change, &*predicate, &*mapper, index.as_ref(), &queue);
                    }
                    None => {
                        tracing::warn!(kind = K::KIND, "watch feed lost, relisting");
                        tokio::select! {
                            _ = shutdown.changed() => break 'relist,
                            () = tokio::time::sleep(relist_backoff) => continue 'relist,
                        }
                    }
                }
            }
        }
    }

    tracing::debug!(kind = K::KIND, "event pump stopped");
}

/// Filter one change event and enqueue the primaries it affects.
fn dispatch<K: Resource>(
    change: &ChangeEvent<K>,
    predicate: &dyn Predicate<K>,
    mapper: &dyn Mapper<K>,
    index: Option<&KeyIndex>,
    queue: &WorkQueue<ObjectKey>,
) {
    // the key index tracks liveness, not relevance: it is maintained for
    // every event, including ones the predicate drops
    if let Some(index) = index {
        match change {
            ChangeEvent::Created(object) | ChangeEvent::Generic(object) => {
                index.insert(object.key());
            }
            ChangeEvent::Updated { new, .. } => index.insert(new.key()),
            ChangeEvent::Deleted(object) => index.remove(&object.key()),
        }
    }

    if !predicate.evaluate(change) {
        tracing::trace!(kind = K::KIND, key = %change.object().key(), "event filtered");
        return;
    }

    for key in mapper.map(change.object()) {
        tracing::debug!(kind = K::KIND, key = %key, "queueing reconcile");
        queue.add(key);
    }
}

/// Pull keys off the queue and reconcile them until shutdown.
///
/// The queue's processing set already guarantees no two workers hold the
/// same key, so this loop is written as if single-threaded per key.
pub(crate) async fn run_worker<R, S>(
    worker_id: usize,
    store: Arc<S>,
    reconciler: Arc<R>,
    queue: WorkQueue<ObjectKey>,
) where
    R: Reconciler,
    S: ObjectStore,
{
    tracing::debug!(worker = worker_id, "worker started");

    while let Some(key) = queue.get().await {
        match reconcile_key(&store, &reconciler, &key).await {
            Ok(result) => {
                queue.forget(&key);
                if let Some(delay) = result.requeue_after {
                    tracing::debug!(key = %key, ?delay, "requeueing after delay");
                    queue.add_after(key.clone(), delay);
                } else if result.requeue {
                    tracing::debug!(key = %key, "requeueing");
                    queue.add(key.clone());
                }
            }
            Err(error) if error.is_fatal() => {
                tracing::error!(
                    key = %key,
                    %error,
                    "reconcile failed permanently, waiting for object changes"
                );
                queue.forget(&key);
            }
            Err(error) => {
                tracing::warn!(
                    key = %key,
                    %error,
                    retries = queue.retries(&key),
                    "reconcile failed, backing off"
                );
                queue.add_rate_limited(key.clone());
            }
        }
        queue.done(&key);
    }

    tracing::debug!(worker = worker_id, "worker stopped");
}

async fn reconcile_key<R, S>(
    store: &Arc<S>,
    reconciler: &Arc<R>,
    key: &ObjectKey,
) -> Result<ReconcileResult, ReconcileError>
where
    R: Reconciler,
    S: ObjectStore,
{
    let object = match store.get::<R::Object>(key).await {
        Ok(object) => object,
        Err(error) if error.is_not_found() => {
            // deleted between enqueue and dequeue; owned children are
            // garbage-collected by the store, nothing to do here
            tracing::debug!(key = %key, "primary gone, nothing to do");
            return Ok(ReconcileResult::done());
        }
        Err(error) => return Err(error.into()),
    };
    reconciler.reconcile(Arc::new(object)).await
}
