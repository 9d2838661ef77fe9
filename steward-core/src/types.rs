//! Strongly-typed identifiers shared across the engine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a namespaced object: namespace plus name.
///
/// Keys are the unit of work for the engine: watches reduce change events to
/// keys, the work queue de-duplicates keys, and workers resolve keys back to
/// objects at reconcile time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    /// Namespace the object lives in.
    pub namespace: String,
    /// Object name, unique within kind and namespace.
    pub name: String,
}

impl ObjectKey {
    /// Create a key from namespace and name.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Opaque optimistic-concurrency token assigned by the store on every write.
///
/// An update must present the version it read; a mismatch is a write conflict.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ResourceVersion(pub u64);

impl ResourceVersion {
    /// The version following this one.
    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for ResourceVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_display() {
        let key = ObjectKey::new("default", "alpha");
        assert_eq!(key.to_string(), "default/alpha");
    }

    #[test]
    fn version_ordering() {
        let v = ResourceVersion(7);
        assert_eq!(v.next(), ResourceVersion(8));
        assert!(v < v.next());
    }
}
