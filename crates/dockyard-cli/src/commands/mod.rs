//! CLI command implementations.

pub mod deploy;
pub mod event;
pub mod params;

use anyhow::{Context, Result};
use dockyard_config::{AppConfig, load_app_config};
use dockyard_core::{CompositionUnit, Namespace, UnitKind};
use dockyard_scheduler::CompositionGraph;
use dockyard_store::FileParameterStore;
use dockyard_units::units_for;
use std::path::Path;
use std::sync::Arc;

/// Values given on the command line or through the environment.
#[derive(Debug, Default)]
pub struct Overrides {
    pub namespace: Option<String>,
    pub account: Option<String>,
    pub region: Option<String>,
}

/// Load the configuration file and apply overrides.
///
/// Without a file, a namespace override alone is enough to run with
/// defaults.
pub fn load_config(path: &Path, overrides: &Overrides) -> Result<AppConfig> {
    let mut config = if path.exists() {
        load_app_config(path).with_context(|| format!("Failed to load {}", path.display()))?
    } else {
        let namespace = overrides.namespace.as_deref().with_context(|| {
            format!(
                "{} not found and no --namespace given",
                path.display()
            )
        })?;
        AppConfig::new(Namespace::new(namespace)?)
    };

    if let Some(namespace) = &overrides.namespace {
        config.namespace = Namespace::new(namespace.as_str())?;
    }
    if let Some(account) = &overrides.account {
        config.environment.account = account.clone();
    }
    if let Some(region) = &overrides.region {
        config.environment.region = region.clone();
    }
    Ok(config)
}

pub fn open_store(path: &Path) -> Arc<FileParameterStore> {
    Arc::new(FileParameterStore::new(path))
}

/// Pick one unit by name, e.g. `build` or `compute-trigger`.
pub fn select_unit(config: &AppConfig, name: &str) -> Result<Arc<dyn CompositionUnit>> {
    let kind: UnitKind = name.parse()?;
    units_for(config)
        .into_iter()
        .find(|u| u.kind() == kind)
        .with_context(|| format!("No unit of kind '{}'", kind))
}

pub fn validate(config: &AppConfig) -> Result<()> {
    let graph = CompositionGraph::standard();
    graph.validate()?;
    println!("Configuration is valid");
    println!("  namespace: {}", config.namespace);
    println!(
        "  environment: {}/{}",
        config.environment.account, config.environment.region
    );
    for (i, wave) in graph.waves()?.iter().enumerate() {
        let names: Vec<String> = wave.iter().map(|k| k.to_string()).collect();
        println!("  wave {}: {}", i + 1, names.join(", "));
    }
    Ok(())
}
