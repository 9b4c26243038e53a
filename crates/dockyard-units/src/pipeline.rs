//! Pipeline unit: two-stage release pipeline from source to image build.

use async_trait::async_trait;
use dockyard_core::resource::{PipelineAction, PipelineStage, Resource, ResourceKind};
use dockyard_core::{
    CompositionUnit, LogicalName, Namespace, ParameterStore, ProvisionedUnit, Result, UnitKind,
};

use crate::grants::BUCKET_READ_WRITE;
use crate::stack::{UnitStack, stack_name};

const SOURCE_ARTIFACT: &str = "source";

pub struct PipelineUnit {
    namespace: Namespace,
    stack_name: String,
    branch: String,
}

impl PipelineUnit {
    pub fn new(namespace: Namespace, branch: impl Into<String>) -> Self {
        Self {
            stack_name: stack_name(&namespace, UnitKind::Pipeline),
            namespace,
            branch: branch.into(),
        }
    }
}

#[async_trait]
impl CompositionUnit for PipelineUnit {
    fn kind(&self) -> UnitKind {
        UnitKind::Pipeline
    }

    fn stack_name(&self) -> &str {
        &self.stack_name
    }

    async fn provision(&self, store: &dyn ParameterStore) -> Result<ProvisionedUnit> {
        let ns = &self.namespace;
        let mut stack = UnitStack::new(UnitKind::Pipeline, ns, store);

        let repository_name = stack.resolve(LogicalName::Repository).await?;
        let repository = stack.import(ResourceKind::CodeRepository, &repository_name);

        let project_name = stack.resolve(LogicalName::CodeBuild).await?;
        let project = stack.import(ResourceKind::BuildProject, &project_name);

        let bucket_name = stack.resolve(LogicalName::SourceBucket).await?;
        let bucket = stack.import(ResourceKind::ArtifactBucket, &bucket_name);

        let pipeline_name = ns.to_string();
        stack.declare(
            "CodePipeline",
            Resource::ReleasePipeline {
                name: pipeline_name.clone(),
                artifact_bucket: bucket.name.clone(),
                stages: vec![
                    PipelineStage {
                        name: "Source".to_string(),
                        actions: vec![PipelineAction::SourceFetch {
                            name: "CodeCommitSourceRetrieval".to_string(),
                            repository: repository.name,
                            branch: self.branch.clone(),
                            output: SOURCE_ARTIFACT.to_string(),
                        }],
                    },
                    PipelineStage {
                        name: "Build".to_string(),
                        actions: vec![PipelineAction::Build {
                            name: "DockerBuildImages".to_string(),
                            project: project.name,
                            input: SOURCE_ARTIFACT.to_string(),
                        }],
                    },
                ],
            },
        )?;

        // The staging bucket is shared with the build project; the pipeline
        // engine coordinates access to it.
        stack.grant(
            &format!("{}-pipeline-role", ns),
            &bucket.name,
            BUCKET_READ_WRITE,
        );

        stack
            .publish(
                LogicalName::Pipeline,
                &pipeline_name,
                format!("Release pipeline for {}", ns),
            )
            .await?;

        Ok(stack.finish())
    }
}
