//! Parameter store persisted as a JSON document on disk.

use async_trait::async_trait;
use dockyard_core::parameter::PublishOutcome;
use dockyard_core::{Error, Parameter, ParameterDraft, ParameterKey, ParameterStore, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateDocument {
    parameters: BTreeMap<ParameterKey, Parameter>,
}

/// Parameter store backed by a single JSON file.
///
/// Every operation re-reads the file, so a later CLI invocation sees what
/// an earlier one published. Writes go through a temporary file and a
/// rename.
pub struct FileParameterStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileParameterStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<StateDocument> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                Error::Internal(format!(
                    "corrupt state file {}: {}",
                    self.path.display(),
                    e
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StateDocument::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, doc: &StateDocument) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let bytes = serde_json::to_vec_pretty(doc)
            .map_err(|e| Error::Internal(format!("failed to encode state: {}", e)))?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), "Saved state file");
        Ok(())
    }
}

#[async_trait]
impl ParameterStore for FileParameterStore {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn publish(&self, draft: ParameterDraft) -> Result<PublishOutcome> {
        let _guard = self.lock.lock().await;
        let mut doc = self.load().await?;
        let key = draft.key.clone();
        let (parameter, outcome) = Parameter::reconcile(doc.parameters.get(&key), draft)?;
        info!(key = %key, owner = %parameter.owner, ?outcome, "Published parameter");
        doc.parameters.insert(key, parameter);
        if outcome != PublishOutcome::Unchanged {
            self.save(&doc).await?;
        }
        Ok(outcome)
    }

    async fn resolve(&self, key: &ParameterKey) -> Result<String> {
        let _guard = self.lock.lock().await;
        let doc = self.load().await?;
        doc.parameters
            .get(key)
            .map(|p| p.value.clone())
            .ok_or_else(|| Error::UnresolvedParameter {
                key: key.to_string(),
            })
    }

    async fn get(&self, key: &ParameterKey) -> Result<Option<Parameter>> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.parameters.get(key).cloned())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<Parameter>> {
        let _guard = self.lock.lock().await;
        Ok(self
            .load()
            .await?
            .parameters
            .into_values()
            .filter(|p| p.key.as_str().starts_with(prefix))
            .collect())
    }

    async fn retract_owned_by(&self, owner: &str) -> Result<Vec<ParameterKey>> {
        let _guard = self.lock.lock().await;
        let mut doc = self.load().await?;
        let keys: Vec<ParameterKey> = doc
            .parameters
            .values()
            .filter(|p| p.owner == owner)
            .map(|p| p.key.clone())
            .collect();
        if keys.is_empty() {
            return Ok(keys);
        }
        for key in &keys {
            doc.parameters.remove(key);
        }
        self.save(&doc).await?;
        info!(owner = %owner, count = keys.len(), "Retracted parameters");
        Ok(keys)
    }
}
