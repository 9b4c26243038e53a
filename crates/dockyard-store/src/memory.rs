//! In-memory parameter store.

use async_trait::async_trait;
use dockyard_core::parameter::PublishOutcome;
use dockyard_core::{Error, Parameter, ParameterDraft, ParameterKey, ParameterStore, Result};
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Parameter store held in process memory.
///
/// Each instance is isolated, so concurrent tests and namespaces never
/// see each other's keys.
#[derive(Debug, Default)]
pub struct InMemoryParameterStore {
    parameters: RwLock<BTreeMap<ParameterKey, Parameter>>,
}

impl InMemoryParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.parameters.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.parameters.read().await.is_empty()
    }
}

#[async_trait]
impl ParameterStore for InMemoryParameterStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn publish(&self, draft: ParameterDraft) -> Result<PublishOutcome> {
        let mut parameters = self.parameters.write().await;
        let key = draft.key.clone();
        let (parameter, outcome) = Parameter::reconcile(parameters.get(&key), draft)?;
        info!(key = %key, owner = %parameter.owner, ?outcome, "Published parameter");
        parameters.insert(key, parameter);
        Ok(outcome)
    }

    async fn resolve(&self, key: &ParameterKey) -> Result<String> {
        let parameters = self.parameters.read().await;
        let value = parameters
            .get(key)
            .map(|p| p.value.clone())
            .ok_or_else(|| Error::UnresolvedParameter {
                key: key.to_string(),
            })?;
        debug!(key = %key, "Resolved parameter");
        Ok(value)
    }

    async fn get(&self, key: &ParameterKey) -> Result<Option<Parameter>> {
        Ok(self.parameters.read().await.get(key).cloned())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<Parameter>> {
        Ok(self
            .parameters
            .read()
            .await
            .values()
            .filter(|p| p.key.as_str().starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn retract_owned_by(&self, owner: &str) -> Result<Vec<ParameterKey>> {
        let mut parameters = self.parameters.write().await;
        let keys: Vec<ParameterKey> = parameters
            .values()
            .filter(|p| p.owner == owner)
            .map(|p| p.key.clone())
            .collect();
        for key in &keys {
            parameters.remove(key);
        }
        info!(owner = %owner, count = keys.len(), "Retracted parameters");
        Ok(keys)
    }
}
