//! Parameter inspection commands.

use anyhow::Result;
use dockyard_config::AppConfig;
use dockyard_core::{ParameterKey, ParameterStore};
use std::path::Path;

use super::open_store;

pub async fn list(config: &AppConfig, state: &Path, prefix: Option<String>) -> Result<()> {
    let store = open_store(state);
    let (scope, parameters) = match prefix {
        Some(prefix) => {
            let parameters = store.list(&prefix).await?;
            (prefix, parameters)
        }
        None => (
            config.namespace.to_string(),
            store.list_namespace(&config.namespace).await?,
        ),
    };

    if parameters.is_empty() {
        println!("No parameters under '{}'", scope);
        return Ok(());
    }
    for p in parameters {
        println!("{:<32} {:<40} (owner {}, v{})", p.key, p.value, p.owner, p.version);
    }
    Ok(())
}

pub async fn get(state: &Path, key: &str) -> Result<()> {
    let store = open_store(state);
    let key = ParameterKey::from_raw(key);
    let value = store.resolve(&key).await?;
    println!("{}", value);
    Ok(())
}
