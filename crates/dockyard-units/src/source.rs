//! Source unit: the version-controlled repository the pipeline reads.

use async_trait::async_trait;
use dockyard_config::SourceSettings;
use dockyard_core::resource::Resource;
use dockyard_core::{
    CompositionUnit, Error, LogicalName, Namespace, ParameterStore, ProvisionedUnit, Result,
    TargetEnvironment, UnitKind,
};
use tracing::info;

use crate::snapshot;
use crate::stack::{UnitStack, stack_name};

pub struct SourceUnit {
    namespace: Namespace,
    stack_name: String,
    environment: TargetEnvironment,
    settings: SourceSettings,
}

impl SourceUnit {
    pub fn new(namespace: Namespace, environment: TargetEnvironment, settings: SourceSettings) -> Self {
        Self {
            stack_name: stack_name(&namespace, UnitKind::Source),
            namespace,
            environment,
            settings,
        }
    }
}

#[async_trait]
impl CompositionUnit for SourceUnit {
    fn kind(&self) -> UnitKind {
        UnitKind::Source
    }

    fn stack_name(&self) -> &str {
        &self.stack_name
    }

    async fn provision(&self, store: &dyn ParameterStore) -> Result<ProvisionedUnit> {
        let ns = &self.namespace;
        let mut stack = UnitStack::new(UnitKind::Source, ns, store);

        let seed = match &self.settings.assets {
            Some(dir) => {
                let dir = dir.clone();
                let env = self.environment.clone();
                let snapshot = tokio::task::spawn_blocking(move || snapshot::capture(&dir, &env))
                    .await
                    .map_err(|e| Error::Internal(format!("snapshot task failed: {}", e)))??;
                info!(
                    stack = %self.stack_name,
                    object_key = %snapshot.object_key,
                    files = snapshot.file_count,
                    "Captured seed snapshot"
                );
                Some(snapshot)
            }
            None => None,
        };

        let repository_name = ns.to_string();
        stack.declare(
            "CodeCommitRepository",
            Resource::CodeRepository {
                name: repository_name.clone(),
                description: format!("Code repository for {}", ns),
                branch: self.settings.branch.clone(),
                seed,
            },
        )?;

        stack
            .publish(
                LogicalName::Repository,
                &repository_name,
                format!("CodeCommit repository for {}", ns),
            )
            .await?;

        Ok(stack.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dockyard_core::ParameterKey;
    use dockyard_store::InMemoryParameterStore;

    #[tokio::test]
    async fn test_source_without_seed() {
        let store = InMemoryParameterStore::new();
        let unit = SourceUnit::new(
            Namespace::new("demo").unwrap(),
            TargetEnvironment::default(),
            SourceSettings::default(),
        );

        let provisioned = unit.provision(&store).await.unwrap();
        assert_eq!(provisioned.stack_name, "demo-code");
        match &provisioned.declarations[0].resource {
            Resource::CodeRepository {
                name, branch, seed, ..
            } => {
                assert_eq!(name, "demo");
                assert_eq!(branch, "main");
                assert!(seed.is_none());
            }
            other => panic!("unexpected resource {other:?}"),
        }

        let value = store
            .resolve(&ParameterKey::from_raw("demo-repository"))
            .await
            .unwrap();
        assert_eq!(value, "demo");
    }

    #[tokio::test]
    async fn test_source_with_seed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Dockerfile"), "FROM alpine\n").unwrap();

        let store = InMemoryParameterStore::new();
        let unit = SourceUnit::new(
            Namespace::new("demo").unwrap(),
            TargetEnvironment::default(),
            SourceSettings {
                assets: Some(dir.path().to_path_buf()),
                branch: "main".to_string(),
            },
        );

        let provisioned = unit.provision(&store).await.unwrap();
        match &provisioned.declarations[0].resource {
            Resource::CodeRepository { seed: Some(seed), .. } => {
                assert_eq!(seed.file_count, 1);
                assert_eq!(seed.object_key, format!("{}.zip", seed.sha256));
            }
            other => panic!("expected seeded repository, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_source_with_missing_seed_publishes_nothing() {
        let store = InMemoryParameterStore::new();
        let unit = SourceUnit::new(
            Namespace::new("demo").unwrap(),
            TargetEnvironment::default(),
            SourceSettings {
                assets: Some("/definitely/not/here".into()),
                branch: "main".to_string(),
            },
        );

        assert!(unit.provision(&store).await.is_err());
        assert!(store.is_empty().await);
    }
}
