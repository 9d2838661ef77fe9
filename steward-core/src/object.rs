//! Object metadata and the [`Resource`] trait implemented by every kind the
//! engine can store, watch, or reconcile.

use crate::types::{ObjectKey, ResourceVersion};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A link from a child resource to the object that caused its creation.
///
/// The store garbage-collects children whose owner is deleted, so reconcilers
/// never carry explicit child-deletion code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    /// Kind of the owning object.
    pub kind: String,
    /// Name of the owning object. Owners live in the child's namespace.
    pub name: String,
}

impl OwnerReference {
    /// Build a reference to `owner`.
    pub fn of<K: Resource>(owner: &K) -> Self {
        Self {
            kind: K::KIND.to_string(),
            name: owner.meta().name.clone(),
        }
    }
}

/// Metadata common to every stored object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Namespace the object lives in.
    pub namespace: String,
    /// Object name, unique within kind and namespace.
    pub name: String,
    /// Store-assigned optimistic-concurrency token, bumped on every write.
    #[serde(default)]
    pub resource_version: ResourceVersion,
    /// Store-assigned counter bumped only when the spec payload changes.
    /// Status-only writes leave it untouched.
    #[serde(default)]
    pub generation: u64,
    /// Free-form labels.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Free-form annotations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    /// Owners of this object, used for cascading deletion.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owner_references: Vec<OwnerReference>,
    /// Finalizers that must be cleared before the store removes the object.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub finalizers: Vec<String>,
    /// Set by the store when a delete is requested while finalizers remain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
}

impl ObjectMeta {
    /// Metadata for a new object. Versions and generation are store-assigned.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Key formed from this metadata.
    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.namespace.clone(), self.name.clone())
    }
}

/// A typed object the store can hold and the engine can reconcile.
///
/// Implementations must serialize as a map with their metadata under a
/// top-level `metadata` field, the user-declared payload under `spec`, and
/// the controller-owned sub-object (if any) under `status`. The store relies
/// on this shape to bump generations on spec changes only and to keep status
/// writes from clobbering the spec.
pub trait Resource: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Kind name, unique per object type.
    const KIND: &'static str;

    /// Shared metadata.
    fn meta(&self) -> &ObjectMeta;

    /// Mutable access to shared metadata.
    fn meta_mut(&mut self) -> &mut ObjectMeta;

    /// Namespace+name identity of this object.
    fn key(&self) -> ObjectKey {
        self.meta().key()
    }

    /// Object name.
    fn name(&self) -> &str {
        &self.meta().name
    }

    /// Object namespace.
    fn namespace(&self) -> &str {
        &self.meta().namespace
    }

    /// Version last read from the store.
    fn resource_version(&self) -> ResourceVersion {
        self.meta().resource_version
    }

    /// Spec generation last assigned by the store.
    fn generation(&self) -> u64 {
        self.meta().generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Widget;

    #[test]
    fn owner_reference_of_resource() {
        let widget = Widget::new("default", "alpha", 3);
        let owner = OwnerReference::of(&widget);
        assert_eq!(owner.kind, "Widget");
        assert_eq!(owner.name, "alpha");
    }

    #[test]
    fn meta_key() {
        let meta = ObjectMeta::new("infra", "node-1");
        assert_eq!(meta.key(), ObjectKey::new("infra", "node-1"));
    }

    #[test]
    fn meta_serializes_camel_case() {
        let mut meta = ObjectMeta::new("default", "alpha");
        meta.resource_version = ResourceVersion(4);
        let value = serde_json::to_value(&meta).unwrap();
        assert_eq!(value["resourceVersion"], 4);
        assert!(value.get("ownerReferences").is_none());
    }
}
