//! Provisioning commands: synth, deploy and destroy.

use anyhow::{Context, Result};
use dockyard_config::AppConfig;
use dockyard_core::{Deployment, ParameterStore, ProvisionedUnit};
use dockyard_scheduler::{CompositionGraph, Orchestrator, ProvisionEvent};
use dockyard_store::InMemoryParameterStore;
use dockyard_units::units_for;
use std::path::Path;
use std::sync::Arc;

use super::{open_store, select_unit};

fn orchestrator(config: &AppConfig, store: Arc<dyn ParameterStore>) -> Result<Orchestrator> {
    Ok(Orchestrator::new(
        config.namespace.clone(),
        store,
        CompositionGraph::standard(),
        units_for(config),
    )?)
}

/// Provision into a scratch store and return the declared state.
pub async fn render(config: &AppConfig) -> Result<Deployment> {
    let store = Arc::new(InMemoryParameterStore::new());
    let deployment = orchestrator(config, store)?.provision_all().await?;
    Ok(deployment)
}

/// Print the declared state of every unit, or of one, as JSON.
pub async fn synth(config: &AppConfig, unit: Option<&str>) -> Result<()> {
    let deployment = render(config).await?;
    let json = match unit {
        Some(name) => {
            let kind = select_unit(config, name)?.kind();
            let unit = deployment
                .unit(kind)
                .with_context(|| format!("Unit '{}' was not rendered", kind))?;
            serde_json::to_string_pretty(unit)?
        }
        None => serde_json::to_string_pretty(&deployment)?,
    };
    println!("{}", json);
    Ok(())
}

/// Provision into the state file.
pub async fn deploy(config: &AppConfig, state: &Path, unit: Option<&str>) -> Result<()> {
    let store = open_store(state);

    let orchestrator = orchestrator(config, store)?;

    if let Some(name) = unit {
        // Predecessors count as provisioned when an earlier run left their
        // parameters in the state file.
        let kind = select_unit(config, name)?.kind();
        let stack = orchestrator.unit(kind)?.stack_name().to_string();
        println!("▶ Provisioning {}", stack);
        let provisioned = orchestrator
            .provision_from_store(kind)
            .await
            .with_context(|| format!("Failed to provision {}", stack))?;
        print_outputs(&provisioned);
        println!("✓ {} provisioned", provisioned.stack_name);
        return Ok(());
    }

    let orchestrator = Arc::new(orchestrator);
    let (mut rx, handle) = orchestrator.deploy();

    while let Some(event) = rx.recv().await {
        match event {
            ProvisionEvent::UnitStarted { stack, .. } => {
                println!("▶ Provisioning {}", stack);
            }
            ProvisionEvent::ParameterPublished { key, value, .. } => {
                println!("  parameter {} = {}", key, value);
            }
            ProvisionEvent::OutputEmitted {
                logical_id, value, ..
            } => {
                println!("  output {} = {}", logical_id, value);
            }
            ProvisionEvent::UnitCompleted { unit } => {
                println!("✓ Unit '{}' provisioned\n", unit);
            }
            ProvisionEvent::UnitFailed { unit, message } => {
                println!("✗ Unit '{}' failed: {}\n", unit, message);
            }
            ProvisionEvent::DeploymentCompleted { success } => {
                if success {
                    println!("--- Deployment completed ---");
                } else {
                    println!("--- Deployment failed ---");
                }
            }
        }
    }

    let deployment = handle.await.context("Deployment task failed")??;
    println!(
        "\nDeployment {} of '{}': {} units",
        deployment.id,
        deployment.namespace,
        deployment.units.len()
    );
    Ok(())
}

fn print_outputs(unit: &ProvisionedUnit) {
    for output in &unit.outputs {
        println!("  output {} = {}", output.logical_id, output.value);
    }
}

/// Retract every parameter the namespace's stacks own, dependents first.
pub async fn destroy(config: &AppConfig, state: &Path) -> Result<()> {
    let store = open_store(state);
    let retracted = orchestrator(config, store)?.teardown_all().await?;
    for key in &retracted {
        println!("  retracted {}", key);
    }
    println!("✓ Destroyed '{}' ({} parameters)", config.namespace, retracted.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dockyard_core::{Error, Namespace, ParameterKey, UnitKind};
    use dockyard_store::FileParameterStore;

    fn config() -> AppConfig {
        AppConfig::new(Namespace::new("demo").unwrap())
    }

    #[tokio::test]
    async fn test_render_declares_every_unit() {
        let deployment = render(&config()).await.unwrap();
        assert_eq!(deployment.units.len(), 4);
        assert_eq!(deployment.rules().count(), 1);
        assert_eq!(
            deployment.unit(UnitKind::Source).unwrap().stack_name,
            "demo-code"
        );
    }

    #[tokio::test]
    async fn test_deploy_then_destroy() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("state.json");

        deploy(&config(), &state, None).await.unwrap();
        let store = FileParameterStore::new(&state);
        let value = store
            .resolve(&ParameterKey::from_raw("demo-pipeline"))
            .await
            .unwrap();
        assert_eq!(value, "demo");

        destroy(&config(), &state).await.unwrap();
        assert!(store.list("demo-").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_single_unit_needs_persisted_predecessors() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("state.json");

        let err = deploy(&config(), &state, Some("pipeline")).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::OrderViolation {
                unit: UnitKind::Pipeline,
                predecessor: UnitKind::Build
            })
        ));

        deploy(&config(), &state, Some("source")).await.unwrap();
        deploy(&config(), &state, Some("build")).await.unwrap();
        deploy(&config(), &state, Some("pipeline")).await.unwrap();

        let store = FileParameterStore::new(&state);
        assert_eq!(store.list("demo-").await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_single_unit_deploy_refuses_to_skip_source() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("state.json");

        let err = deploy(&config(), &state, Some("build")).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::OrderViolation {
                unit: UnitKind::Build,
                predecessor: UnitKind::Source
            })
        ));
        let err = deploy(&config(), &state, Some("compute")).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::OrderViolation {
                unit: UnitKind::ComputeTrigger,
                predecessor: UnitKind::Build
            })
        ));

        let store = FileParameterStore::new(&state);
        assert!(
            store
                .resolve(&ParameterKey::from_raw("demo-repository"))
                .await
                .is_err()
        );
        assert!(store.list("").await.unwrap().is_empty());
    }
}
