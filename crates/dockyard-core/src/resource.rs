//! Declarative descriptors of the managed resources a unit asserts.
//!
//! None of these run anything. They describe desired state that an
//! external provisioning engine turns into real resources.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::event::EventRule;

/// What happens to a resource when its unit is torn down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemovalPolicy {
    #[default]
    Retain,
    Destroy,
}

/// Uploaded, content-addressed directory used to seed a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRef {
    /// Directory the snapshot was taken from.
    pub path: String,
    pub bucket: String,
    /// `{sha256}.zip`, so identical content maps to an identical key.
    pub object_key: String,
    pub sha256: String,
    pub file_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStage {
    pub name: String,
    pub actions: Vec<PipelineAction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum PipelineAction {
    /// Fetch a branch of a source repository into an output artifact.
    SourceFetch {
        name: String,
        repository: String,
        branch: String,
        output: String,
    },
    /// Run a build project over an input artifact.
    Build {
        name: String,
        project: String,
        input: String,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComputeResourceType {
    Ec2,
    #[default]
    Spot,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AllocationStrategy {
    BestFitProgressive,
    #[default]
    SpotCapacityOptimized,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeResources {
    pub resource_type: ComputeResourceType,
    pub allocation_strategy: AllocationStrategy,
    pub bid_percentage: u32,
    pub min_vcpus: u32,
    pub max_vcpus: u32,
    pub desired_vcpus: u32,
    /// Network the instances are placed in.
    pub network: String,
    pub tags: BTreeMap<String, String>,
}

/// Compute environment attached to a job queue, with its order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueAttachment {
    pub compute_environment: String,
    pub order: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerProperties {
    pub image: String,
    pub vcpus: u32,
    pub memory_mib: u32,
}

/// One managed resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Resource {
    CodeRepository {
        name: String,
        description: String,
        branch: String,
        seed: Option<SnapshotRef>,
    },
    ImageRegistry {
        name: String,
        uri: String,
        removal_policy: RemovalPolicy,
    },
    ArtifactBucket {
        name: String,
        versioned: bool,
        removal_policy: RemovalPolicy,
    },
    BuildProject {
        name: String,
        description: String,
        privileged: bool,
        environment_variables: BTreeMap<String, String>,
        timeout_minutes: u32,
    },
    ReleasePipeline {
        name: String,
        artifact_bucket: String,
        stages: Vec<PipelineStage>,
    },
    Network {
        name: String,
    },
    ComputeEnvironment {
        name: String,
        managed: bool,
        resources: ComputeResources,
    },
    JobQueue {
        name: String,
        priority: u32,
        enabled: bool,
        compute_environments: Vec<QueueAttachment>,
    },
    JobDefinition {
        name: String,
        container: ContainerProperties,
    },
    EventRule(EventRule),
}

impl Resource {
    pub fn name(&self) -> &str {
        match self {
            Resource::CodeRepository { name, .. }
            | Resource::ImageRegistry { name, .. }
            | Resource::ArtifactBucket { name, .. }
            | Resource::BuildProject { name, .. }
            | Resource::ReleasePipeline { name, .. }
            | Resource::Network { name }
            | Resource::ComputeEnvironment { name, .. }
            | Resource::JobQueue { name, .. }
            | Resource::JobDefinition { name, .. } => name,
            Resource::EventRule(rule) => &rule.name,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            Resource::CodeRepository { .. } => ResourceKind::CodeRepository,
            Resource::ImageRegistry { .. } => ResourceKind::ImageRegistry,
            Resource::ArtifactBucket { .. } => ResourceKind::ArtifactBucket,
            Resource::BuildProject { .. } => ResourceKind::BuildProject,
            Resource::ReleasePipeline { .. } => ResourceKind::ReleasePipeline,
            Resource::Network { .. } => ResourceKind::Network,
            Resource::ComputeEnvironment { .. } => ResourceKind::ComputeEnvironment,
            Resource::JobQueue { .. } => ResourceKind::JobQueue,
            Resource::JobDefinition { .. } => ResourceKind::JobDefinition,
            Resource::EventRule(_) => ResourceKind::EventRule,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    CodeRepository,
    ImageRegistry,
    ArtifactBucket,
    BuildProject,
    ReleasePipeline,
    Network,
    ComputeEnvironment,
    JobQueue,
    JobDefinition,
    EventRule,
}

/// A resource declared inside a unit under a stable logical id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declaration {
    pub logical_id: String,
    pub resource: Resource,
}

/// A reference to a resource owned by another unit, rebuilt from a
/// resolved name rather than held as a live handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub name: String,
}

impl ResourceRef {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

/// Access one principal needs on one resource. Recorded only; the
/// permission wiring itself belongs to the provisioning engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub principal: String,
    pub resource: String,
    pub actions: Vec<String>,
}

/// Human-readable value surfaced to the operator after provisioning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    pub logical_id: String,
    pub description: String,
    pub value: String,
}
