//! Test fixtures: small resource kinds used by the engine's own tests and
//! available to downstream crates for theirs.

use crate::convergence::OwnedFields;
use crate::object::{ObjectMeta, OwnerReference, Resource};
use serde::{Deserialize, Serialize};

/// A minimal primary resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Widget {
    /// Shared metadata.
    pub metadata: ObjectMeta,
    /// Declared state.
    pub spec: WidgetSpec,
    /// Controller-owned status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<WidgetStatus>,
}

/// Declared state of a [`Widget`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetSpec {
    /// Desired size of the widget's gadget.
    pub size: u32,
}

/// Observed state of a [`Widget`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetStatus {
    /// Size last seen converged.
    pub observed_size: u32,
}

impl Widget {
    /// Build a widget with the given size.
    pub fn new(namespace: &str, name: &str, size: u32) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            spec: WidgetSpec { size },
            status: None,
        }
    }
}

impl Resource for Widget {
    const KIND: &'static str = "Widget";

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

/// A minimal dependent resource, created and sized by a widget's reconciler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Gadget {
    /// Shared metadata.
    pub metadata: ObjectMeta,
    /// Declared state.
    pub spec: GadgetSpec,
}

/// Declared state of a [`Gadget`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GadgetSpec {
    /// Size the gadget should have.
    pub size: u32,
}

impl Gadget {
    /// Build a free-standing gadget.
    pub fn new(namespace: &str, name: &str, size: u32) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            spec: GadgetSpec { size },
        }
    }

    /// Build the gadget a widget declares: same namespace and name, owner
    /// reference pointing back at the widget.
    pub fn owned_by(owner: &Widget, size: u32) -> Self {
        let mut gadget = Self::new(owner.namespace(), owner.name(), size);
        gadget.metadata.owner_references.push(OwnerReference::of(owner));
        gadget
    }
}

impl Resource for Gadget {
    const KIND: &'static str = "Gadget";

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

impl OwnedFields for Gadget {
    fn owned_fields_match(&self, observed: &Self) -> bool {
        self.spec == observed.spec
    }

    fn apply_owned_fields(&self, observed: &mut Self) {
        observed.spec = self.spec.clone();
    }
}

/// Install a tracing subscriber honoring `RUST_LOG`, once per process.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
