//! Build unit: image registry, artifact staging bucket and build project.

use async_trait::async_trait;
use dockyard_config::BuildSettings;
use dockyard_core::resource::{RemovalPolicy, Resource};
use dockyard_core::{
    CompositionUnit, LogicalName, Namespace, ParameterStore, ProvisionedUnit, Result,
    TargetEnvironment, UnitKind,
};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::grants::{BUCKET_READ_WRITE, REGISTRY_PULL_PUSH};
use crate::stack::{UnitStack, stack_name};

pub struct BuildUnit {
    namespace: Namespace,
    stack_name: String,
    environment: TargetEnvironment,
    settings: BuildSettings,
}

impl BuildUnit {
    pub fn new(namespace: Namespace, environment: TargetEnvironment, settings: BuildSettings) -> Self {
        Self {
            stack_name: stack_name(&namespace, UnitKind::Build),
            namespace,
            environment,
            settings,
        }
    }

    pub fn project_name(namespace: &Namespace) -> String {
        format!("{}-Docker-Build", namespace)
    }
}

/// Bucket name derived from the stack and environment.
///
/// Stable for a given namespace, account and region; lowercase and within
/// the 63 character bucket limit.
pub fn generated_bucket_name(stack_name: &str, env: &TargetEnvironment) -> String {
    let digest = Sha256::digest(format!(
        "{}/{}/{}/ArtifactsBucket",
        env.account, env.region, stack_name
    ));
    let suffix = &hex::encode(digest)[..12];

    let mut prefix: String = format!("{}-artifactsbucket", stack_name)
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect();
    prefix.truncate(63 - 1 - suffix.len());
    format!("{}-{}", prefix.trim_end_matches('-'), suffix)
}

#[async_trait]
impl CompositionUnit for BuildUnit {
    fn kind(&self) -> UnitKind {
        UnitKind::Build
    }

    fn stack_name(&self) -> &str {
        &self.stack_name
    }

    async fn provision(&self, store: &dyn ParameterStore) -> Result<ProvisionedUnit> {
        let ns = &self.namespace;
        let mut stack = UnitStack::new(UnitKind::Build, ns, store);

        let registry_name = ns.lowercase();
        let registry_uri = self.environment.registry_uri(&registry_name);
        stack.declare(
            "ECR",
            Resource::ImageRegistry {
                name: registry_name.clone(),
                uri: registry_uri.clone(),
                removal_policy: RemovalPolicy::Destroy,
            },
        )?;
        stack
            .publish(
                LogicalName::EcrRepository,
                &registry_name,
                format!("ECR Repository for {}", ns),
            )
            .await?;

        let bucket_name = generated_bucket_name(&self.stack_name, &self.environment);
        stack.declare(
            "ArtifactsBucket",
            Resource::ArtifactBucket {
                name: bucket_name.clone(),
                versioned: true,
                removal_policy: RemovalPolicy::Destroy,
            },
        )?;
        stack
            .publish(
                LogicalName::SourceBucket,
                &bucket_name,
                format!("Codebuild source bucket for {}", ns),
            )
            .await?;

        let project_name = Self::project_name(ns);
        let mut environment_variables = BTreeMap::new();
        environment_variables.insert("REPOSITORY_URI".to_string(), registry_uri.clone());
        environment_variables.insert(
            "AWS_DEFAULT_REGION".to_string(),
            self.environment.region.clone(),
        );
        stack.declare(
            "DockerBuild",
            Resource::BuildProject {
                name: project_name.clone(),
                description: format!("Codebuild pipeline for {}", ns),
                privileged: self.settings.privileged,
                environment_variables,
                timeout_minutes: self.settings.timeout_minutes,
            },
        )?;
        stack.grant(&project_name, &bucket_name, BUCKET_READ_WRITE);
        stack.grant(&project_name, &registry_name, REGISTRY_PULL_PUSH);
        stack
            .publish(
                LogicalName::CodeBuild,
                &project_name,
                format!("Codebuild project for {}", ns),
            )
            .await?;

        stack.output(
            "EcrUri",
            format!("URI for the ECR repository {}", ns),
            &registry_uri,
        );

        Ok(stack.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dockyard_core::ParameterKey;
    use dockyard_store::InMemoryParameterStore;

    async fn resolve(store: &InMemoryParameterStore, key: &str) -> String {
        store.resolve(&ParameterKey::from_raw(key)).await.unwrap()
    }

    #[tokio::test]
    async fn test_build_publishes_three_parameters() {
        let store = InMemoryParameterStore::new();
        let env = TargetEnvironment::new("123456789012", "eu-west-1");
        let unit = BuildUnit::new(Namespace::new("demo").unwrap(), env, BuildSettings::default());

        let provisioned = unit.provision(&store).await.unwrap();
        assert_eq!(provisioned.published.len(), 3);

        assert_eq!(resolve(&store, "demo-ecrrepository").await, "demo");
        assert_eq!(resolve(&store, "demo-codebuild").await, "demo-Docker-Build");
        let bucket = resolve(&store, "demo-sourcebucket").await;
        assert!(bucket.starts_with("demo-build-artifactsbucket-"));

        assert_eq!(
            provisioned.output("EcrUri"),
            Some("123456789012.dkr.ecr.eu-west-1.amazonaws.com/demo")
        );
        assert_eq!(provisioned.output("ArtifactsS3Bucket"), Some(bucket.as_str()));
    }

    #[tokio::test]
    async fn test_build_project_settings() {
        let store = InMemoryParameterStore::new();
        let env = TargetEnvironment::new("123456789012", "eu-west-1");
        let unit = BuildUnit::new(Namespace::new("demo").unwrap(), env, BuildSettings::default());
        let provisioned = unit.provision(&store).await.unwrap();

        let project = provisioned
            .resources()
            .find_map(|r| match r {
                Resource::BuildProject {
                    privileged,
                    environment_variables,
                    timeout_minutes,
                    ..
                } => Some((*privileged, environment_variables.clone(), *timeout_minutes)),
                _ => None,
            })
            .unwrap();
        assert!(project.0);
        assert_eq!(project.2, 60);
        assert_eq!(
            project.1.get("REPOSITORY_URI").map(String::as_str),
            Some("123456789012.dkr.ecr.eu-west-1.amazonaws.com/demo")
        );
        assert_eq!(
            project.1.get("AWS_DEFAULT_REGION").map(String::as_str),
            Some("eu-west-1")
        );
        assert_eq!(provisioned.grants.len(), 2);
    }

    #[tokio::test]
    async fn test_registry_name_is_lowercased() {
        let store = InMemoryParameterStore::new();
        let unit = BuildUnit::new(
            Namespace::new("CICDPipeline").unwrap(),
            TargetEnvironment::default(),
            BuildSettings::default(),
        );
        unit.provision(&store).await.unwrap();
        assert_eq!(resolve(&store, "CICDPipeline-ecrrepository").await, "cicdpipeline");
    }

    #[test]
    fn test_generated_bucket_name_is_stable_and_valid() {
        let env = TargetEnvironment::default();
        let first = generated_bucket_name("Team_App.v2-build", &env);
        let second = generated_bucket_name("Team_App.v2-build", &env);
        assert_eq!(first, second);
        assert!(first.len() <= 63);
        assert!(
            first
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        );

        let long = generated_bucket_name(&format!("{}-build", "a".repeat(64)), &env);
        assert!(long.len() <= 63);

        let other_region = generated_bucket_name(
            "Team_App.v2-build",
            &TargetEnvironment::new("000000000000", "eu-west-1"),
        );
        assert_ne!(first, other_region);
    }
}
