//! Resource types managed and watched by the workload operator.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use steward_core::convergence::OwnedFields;
use steward_core::object::{ObjectMeta, Resource};

/// A user-declared workload: "keep a backend of this shape running".
///
/// The operator never creates workloads; it only reads them and writes their
/// status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workload {
    /// Shared metadata.
    pub metadata: ObjectMeta,
    /// Declared state.
    pub spec: WorkloadSpec,
    /// Operator-owned status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<WorkloadStatus>,
}

/// Declared state of a [`Workload`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadSpec {
    /// Number of backend replicas to run.
    pub replicas: i32,
    /// Container image for the backend.
    pub image: String,
    /// Pause reconciliation of the backend without deleting it.
    #[serde(default)]
    pub paused: bool,
    /// Labels a node must carry to host this workload's backend.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,
}

/// Lifecycle phase of a workload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkloadPhase {
    /// Backend is being created or brought up to date.
    #[default]
    Pending,
    /// Backend matches the declared state.
    Ready,
    /// Reconciliation is paused by the user.
    Paused,
    /// The last reconcile pass failed; details are in the message.
    Degraded,
}

/// Operator-owned status of a [`Workload`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadStatus {
    /// Current phase.
    #[serde(default)]
    pub phase: WorkloadPhase,
    /// Human-readable detail, set on failures and transitions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Spec generation this status describes.
    #[serde(default)]
    pub observed_generation: u64,
    /// RFC 3339 time of the last status transition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
}

impl Workload {
    /// Build a workload with the given backend shape.
    pub fn new(namespace: &str, name: &str, replicas: i32, image: &str) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            spec: WorkloadSpec {
                replicas,
                image: image.to_string(),
                paused: false,
                node_selector: BTreeMap::new(),
            },
            status: None,
        }
    }
}

impl Resource for Workload {
    const KIND: &'static str = "Workload";

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

/// The backend deployment a workload's reconciler keeps converged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    /// Shared metadata.
    pub metadata: ObjectMeta,
    /// Declared state. The operator owns every field of it.
    pub spec: DeploymentSpec,
    /// Status owned by the deployment's own controller, not by this
    /// operator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<DeploymentStatus>,
}

/// Declared state of a [`Deployment`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentSpec {
    /// Number of replicas.
    pub replicas: i32,
    /// Container image.
    pub image: String,
    /// Node labels the replicas are pinned to.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,
}

/// Observed state of a [`Deployment`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentStatus {
    /// Replicas currently serving.
    #[serde(default)]
    pub ready_replicas: i32,
}

impl Resource for Deployment {
    const KIND: &'static str = "Deployment";

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

impl OwnedFields for Deployment {
    fn owned_fields_match(&self, observed: &Self) -> bool {
        self.spec == observed.spec
    }

    fn apply_owned_fields(&self, observed: &mut Self) {
        observed.spec = self.spec.clone();
    }
}

/// A cluster node, watched as input only. Labels live in metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Shared metadata.
    pub metadata: ObjectMeta,
    /// Declared state.
    #[serde(default)]
    pub spec: NodeSpec,
}

/// Declared state of a [`Node`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSpec {
    /// Whether new work is kept off the node.
    #[serde(default)]
    pub unschedulable: bool,
}

impl Node {
    /// Build a schedulable node.
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            spec: NodeSpec::default(),
        }
    }
}

impl Resource for Node {
    const KIND: &'static str = "Node";

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}
