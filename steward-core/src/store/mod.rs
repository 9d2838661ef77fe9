//! The object store boundary.
//!
//! The engine treats the cluster's API server as a versioned key-value store
//! with watch support, reachable through the [`ObjectStore`] trait. The
//! in-memory [`MemoryStore`] backend implements the same contract for
//! development and testing.

mod memory;

pub use memory::MemoryStore;

use crate::event::WatchStream;
use crate::object::Resource;
use crate::types::{ObjectKey, ResourceVersion};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors returned by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No object of the kind exists under the key.
    #[error("{kind} {key} not found")]
    NotFound {
        /// Kind that was looked up.
        kind: String,
        /// Key that was looked up.
        key: ObjectKey,
    },

    /// A create collided with an existing object.
    #[error("{kind} {key} already exists")]
    AlreadyExists {
        /// Kind that was written.
        kind: String,
        /// Key that was written.
        key: ObjectKey,
    },

    /// An update presented a stale resource version.
    #[error("conflict writing {kind} {key}: submitted version {submitted}, store has {current}")]
    Conflict {
        /// Kind that was written.
        kind: String,
        /// Key that was written.
        key: ObjectKey,
        /// Version carried by the rejected write.
        submitted: ResourceVersion,
        /// Version currently in the store.
        current: ResourceVersion,
    },

    /// The store could not be reached or answered with a server error.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// An object payload could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// True when the error means the object does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// True when the error is a stale-version write conflict.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// True when a retry with backoff can be expected to succeed.
    ///
    /// Create races and write conflicts converge on a later pass; transport
    /// failures are transient by assumption.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::AlreadyExists { .. } | Self::Conflict { .. } | Self::Unavailable(_)
        )
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Type alias for async store futures.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = StoreResult<T>> + Send + 'a>>;

/// A versioned key-value store with watch support.
///
/// # Implementation notes
///
/// - All methods are async and must be `Send`.
/// - `update` must reject writes whose resource version is not the one
///   currently stored (`Conflict`).
/// - `update_status` writes only the `status` sub-object; it bumps the
///   resource version but never the generation.
/// - `delete` must honor finalizers (mark, don't remove) and cascade to
///   objects holding an owner reference to the deleted one.
/// - `watch` feeds are infinite; when a feed is lost the stream ends and the
///   consumer relists.
pub trait ObjectStore: Send + Sync + 'static {
    /// Fetch one object by key.
    fn get<K: Resource>(&self, key: &ObjectKey) -> StoreFuture<'_, K>;

    /// List objects of a kind, optionally restricted to one namespace.
    fn list<K: Resource>(&self, namespace: Option<&str>) -> StoreFuture<'_, Vec<K>>;

    /// Create a new object. The stored copy (with assigned version) is
    /// returned.
    fn create<K: Resource>(&self, object: &K) -> StoreFuture<'_, K>;

    /// Replace an object's spec and user-editable metadata, carrying the
    /// resource version read earlier.
    fn update<K: Resource>(&self, object: &K) -> StoreFuture<'_, K>;

    /// Replace only the object's status sub-object.
    fn update_status<K: Resource>(&self, object: &K) -> StoreFuture<'_, K>;

    /// Request deletion of an object.
    fn delete<K: Resource>(&self, key: &ObjectKey) -> StoreFuture<'_, ()>;

    /// Subscribe to changes of a kind.
    fn watch<K: Resource>(&self) -> WatchStream<K>;
}
