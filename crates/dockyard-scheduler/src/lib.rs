//! Provisioning orchestration and event routing for dockyard.
//!
//! Provisions composition units in dependency order over a shared
//! parameter store, then routes registry events to job submissions.

pub mod graph;
pub mod orchestrator;
pub mod queue;
pub mod router;

pub use graph::CompositionGraph;
pub use orchestrator::{Orchestrator, ProvisionEvent};
pub use queue::{LocalJobQueue, QueueSettings};
pub use router::EventRouter;

#[cfg(test)]
mod tests {
    use super::*;
    use dockyard_config::AppConfig;
    use dockyard_core::Namespace;
    use dockyard_core::event::RegistryEvent;
    use dockyard_store::InMemoryParameterStore;
    use dockyard_units::units_for;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_push_after_deploy_submits_to_namespace_queue() {
        let config = AppConfig::new(Namespace::new("demo").unwrap());
        let orchestrator = Orchestrator::new(
            config.namespace.clone(),
            Arc::new(InMemoryParameterStore::new()),
            CompositionGraph::standard(),
            units_for(&config),
        )
        .unwrap();
        let deployment = orchestrator.provision_all().await.unwrap();

        let queue = Arc::new(LocalJobQueue::from_deployment(&deployment));
        let router = EventRouter::from_deployment(&deployment, queue.clone());

        let receipts = router
            .route_event(&RegistryEvent::image_push("evt-1", "demo", "latest"))
            .await
            .unwrap();
        assert_eq!(receipts.len(), 1);
        assert_eq!(receipts[0].job_queue, "demo-job-queue");

        router
            .route_event(&RegistryEvent::image_push("evt-2", "demo", "v1.2"))
            .await
            .unwrap();
        assert_eq!(queue.jobs_in("demo-job-queue").await.len(), 1);
    }
}
