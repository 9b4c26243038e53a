//! Compute-trigger unit: batch compute, job queue, job definition and the
//! rule that submits a job whenever a new `latest` image is pushed.

use async_trait::async_trait;
use dockyard_config::{ComputeSettings, JobSettings, TriggerSettings};
use dockyard_core::event::{BatchJobTarget, EventPattern, EventRule, LATEST_TAG};
use dockyard_core::resource::{
    AllocationStrategy, ComputeResourceType, ComputeResources, ContainerProperties,
    QueueAttachment, Resource, ResourceKind,
};
use dockyard_core::{
    CompositionUnit, LogicalName, Namespace, ParameterStore, ProvisionedUnit, Result,
    TargetEnvironment, UnitKind,
};
use std::collections::BTreeMap;
use tracing::info;

use crate::grants::JOB_SUBMIT;
use crate::stack::{UnitStack, stack_name};

pub struct ComputeTriggerUnit {
    namespace: Namespace,
    stack_name: String,
    environment: TargetEnvironment,
    compute: ComputeSettings,
    job: JobSettings,
    trigger: TriggerSettings,
}

impl ComputeTriggerUnit {
    pub fn new(
        namespace: Namespace,
        environment: TargetEnvironment,
        compute: ComputeSettings,
        job: JobSettings,
        trigger: TriggerSettings,
    ) -> Self {
        Self {
            stack_name: stack_name(&namespace, UnitKind::ComputeTrigger),
            namespace,
            environment,
            compute,
            job,
            trigger,
        }
    }

    pub fn job_queue_name(namespace: &Namespace) -> String {
        format!("{}-job-queue", namespace)
    }

    pub fn job_definition_name(namespace: &Namespace) -> String {
        format!("{}-job-definition", namespace)
    }
}

#[async_trait]
impl CompositionUnit for ComputeTriggerUnit {
    fn kind(&self) -> UnitKind {
        UnitKind::ComputeTrigger
    }

    fn stack_name(&self) -> &str {
        &self.stack_name
    }

    async fn provision(&self, store: &dyn ParameterStore) -> Result<ProvisionedUnit> {
        let ns = &self.namespace;
        let mut stack = UnitStack::new(UnitKind::ComputeTrigger, ns, store);

        // Resolve first so a missing build unit fails before anything is declared.
        let registry_name = stack.resolve(LogicalName::EcrRepository).await?;
        let registry = stack.import(ResourceKind::ImageRegistry, &registry_name);
        let registry_uri = self.environment.registry_uri(&registry.name);

        let network = format!("{}-vpc", ns);
        stack.declare(
            "VPC",
            Resource::Network {
                name: network.clone(),
            },
        )?;

        let allocation_strategy = match self.compute.resource_type {
            ComputeResourceType::Spot => AllocationStrategy::SpotCapacityOptimized,
            ComputeResourceType::Ec2 => AllocationStrategy::BestFitProgressive,
        };
        let mut tags = BTreeMap::new();
        tags.insert("Name".to_string(), "BatchComputeInstance".to_string());
        let compute_environment = format!("{}-compute-environment", ns);
        stack.declare(
            "Batch",
            Resource::ComputeEnvironment {
                name: compute_environment.clone(),
                managed: true,
                resources: ComputeResources {
                    resource_type: self.compute.resource_type,
                    allocation_strategy,
                    bid_percentage: self.compute.bid_percentage,
                    min_vcpus: self.compute.min_vcpus,
                    max_vcpus: self.compute.max_vcpus,
                    desired_vcpus: self.compute.desired_vcpus,
                    network,
                    tags,
                },
            },
        )?;

        let job_queue = Self::job_queue_name(ns);
        stack.declare(
            "JobQueue",
            Resource::JobQueue {
                name: job_queue.clone(),
                priority: self.compute.queue_priority,
                enabled: true,
                compute_environments: vec![QueueAttachment {
                    compute_environment,
                    order: 1,
                }],
            },
        )?;

        let job_definition = Self::job_definition_name(ns);
        stack.declare(
            "JobDefinition",
            Resource::JobDefinition {
                name: job_definition.clone(),
                container: ContainerProperties {
                    image: format!("{}:{}", registry_uri, LATEST_TAG),
                    vcpus: self.job.vcpus,
                    memory_mib: self.job.memory_mib,
                },
            },
        )?;

        // The pattern must carry the name resolved above, or the rule never fires.
        let rule_name = format!("{}-ecr-to-batch", ns);
        stack.declare(
            "ECRToBatchRule",
            Resource::EventRule(EventRule {
                name: rule_name.clone(),
                description: "Trigger a Batch job on push to ECR".to_string(),
                pattern: EventPattern::image_push(&registry.name),
                target: BatchJobTarget {
                    job_queue: job_queue.clone(),
                    job_definition: job_definition.clone(),
                    registry_uri,
                    image_policy: self.trigger.image_policy,
                },
            }),
        )?;
        stack.grant(&rule_name, &job_queue, JOB_SUBMIT);
        info!(
            rule = %rule_name,
            registry = %registry.name,
            image_policy = %self.trigger.image_policy,
            "Declared image push trigger"
        );

        stack.output("JobQueueName", format!("Job Queue name {}", ns), &job_queue);
        stack.output(
            "JobDefinitionName",
            format!("Job definition name {}", ns),
            &job_definition,
        );

        Ok(stack.finish())
    }
}
