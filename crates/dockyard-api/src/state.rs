//! Application state.

use dockyard_config::AppConfig;
use dockyard_core::{Deployment, ParameterStore, Result};
use dockyard_scheduler::{CompositionGraph, EventRouter, LocalJobQueue, Orchestrator};
use dockyard_units::units_for;
use std::sync::Arc;
use tracing::info;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn ParameterStore>,
    pub deployment: Arc<Deployment>,
    pub router: Arc<EventRouter>,
    pub queue: Arc<LocalJobQueue>,
}

impl AppState {
    /// Provision every unit of `config` into `store` and wire the event
    /// router to the rules that came out of it.
    pub async fn provision(config: AppConfig, store: Arc<dyn ParameterStore>) -> Result<Self> {
        let orchestrator = Orchestrator::new(
            config.namespace.clone(),
            store.clone(),
            CompositionGraph::standard(),
            units_for(&config),
        )?;
        let deployment = orchestrator.provision_all().await?;

        let queue = Arc::new(LocalJobQueue::from_deployment(&deployment));
        let router = EventRouter::from_deployment(&deployment, queue.clone())
            .with_dedupe(config.trigger.dedupe);
        info!(
            namespace = %config.namespace,
            deployment = %deployment.id,
            rules = router.rules().len(),
            "Deployment ready"
        );

        Ok(Self {
            config: Arc::new(config),
            store,
            deployment: Arc::new(deployment),
            router: Arc::new(router),
            queue,
        })
    }
}
