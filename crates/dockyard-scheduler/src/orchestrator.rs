//! Provisioning orchestrator - provisions composition units in dependency order.

use dockyard_core::{
    CompositionUnit, Deployment, Error, Namespace, ParameterKey, ParameterStore,
    ProvisionedUnit, ResourceId, Result, UnitKind,
};
use futures::future::join_all;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info, warn};

use crate::graph::CompositionGraph;

/// Event emitted while a deployment runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionEvent {
    UnitStarted { unit: UnitKind, stack: String },
    ParameterPublished { unit: UnitKind, key: String, value: String },
    OutputEmitted { unit: UnitKind, logical_id: String, value: String },
    UnitCompleted { unit: UnitKind },
    UnitFailed { unit: UnitKind, message: String },
    DeploymentCompleted { success: bool },
}

/// Where a predecessor's provisioning may be taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Evidence {
    /// Provisioned through this orchestrator.
    Session,
    /// Provisioned through this orchestrator, or its parameters are in the
    /// store under its stack's ownership.
    Store,
}

#[derive(Default)]
struct Ledger {
    provisioned: BTreeMap<UnitKind, ProvisionedUnit>,
    /// Units whose provisioning is in flight.
    pending: BTreeSet<UnitKind>,
}

/// Drives the units of one namespace through a shared parameter store.
pub struct Orchestrator {
    namespace: Namespace,
    store: Arc<dyn ParameterStore>,
    graph: CompositionGraph,
    units: HashMap<UnitKind, Arc<dyn CompositionUnit>>,
    ledger: Mutex<Ledger>,
}

impl Orchestrator {
    /// Fails if the graph is invalid or does not cover exactly the given units.
    pub fn new(
        namespace: Namespace,
        store: Arc<dyn ParameterStore>,
        graph: CompositionGraph,
        units: Vec<Arc<dyn CompositionUnit>>,
    ) -> Result<Self> {
        graph.validate()?;

        let mut by_kind = HashMap::new();
        for unit in units {
            let kind = unit.kind();
            if !graph.contains(kind) {
                return Err(Error::InvalidInput(format!(
                    "unit '{}' is not part of the composition graph",
                    kind
                )));
            }
            if by_kind.insert(kind, unit).is_some() {
                return Err(Error::InvalidInput(format!("unit '{}' declared twice", kind)));
            }
        }
        if let Some(missing) = graph.units().find(|k| !by_kind.contains_key(k)) {
            return Err(Error::InvalidInput(format!(
                "composition graph names unit '{}' but none was supplied",
                missing
            )));
        }

        Ok(Self {
            namespace,
            store,
            graph,
            units: by_kind,
            ledger: Mutex::new(Ledger::default()),
        })
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn store(&self) -> &Arc<dyn ParameterStore> {
        &self.store
    }

    pub fn graph(&self) -> &CompositionGraph {
        &self.graph
    }

    /// Units provisioned through this orchestrator and not torn down since.
    pub async fn provisioned(&self) -> Vec<ProvisionedUnit> {
        self.ledger.lock().await.provisioned.values().cloned().collect()
    }

    pub fn unit(&self, kind: UnitKind) -> Result<&Arc<dyn CompositionUnit>> {
        self.units
            .get(&kind)
            .ok_or_else(|| Error::NotFound(format!("unit '{}'", kind)))
    }

    /// Provision a single unit.
    ///
    /// Every direct predecessor must already be provisioned through this
    /// orchestrator, otherwise the call fails with
    /// [`Error::OrderViolation`] before the unit touches the store.
    pub async fn provision_unit(&self, kind: UnitKind) -> Result<ProvisionedUnit> {
        self.provision_inner(kind, None, Evidence::Session).await
    }

    /// Provision a single unit against a store populated by earlier runs.
    ///
    /// A predecessor counts as provisioned when every parameter it publishes
    /// is in the store and owned by its stack. A predecessor that publishes
    /// nothing can only be satisfied through this orchestrator.
    pub async fn provision_from_store(&self, kind: UnitKind) -> Result<ProvisionedUnit> {
        self.provision_inner(kind, None, Evidence::Store).await
    }

    /// Provision every unit, one wave at a time.
    pub async fn provision_all(&self) -> Result<Deployment> {
        self.run(None).await
    }

    /// Run a deployment in the background, returning a channel of events
    /// and a handle to get the final result.
    pub fn deploy(
        self: Arc<Self>,
    ) -> (
        mpsc::Receiver<ProvisionEvent>,
        tokio::task::JoinHandle<Result<Deployment>>,
    ) {
        let (tx, rx) = mpsc::channel(100);
        let handle = tokio::spawn(async move { self.run(Some(&tx)).await });
        (rx, handle)
    }

    async fn run(&self, tx: Option<&mpsc::Sender<ProvisionEvent>>) -> Result<Deployment> {
        let waves = self.graph.waves()?;
        info!(namespace = %self.namespace, waves = waves.len(), "Starting deployment");

        let mut units = Vec::new();
        for wave in waves {
            let results = join_all(
                wave.iter()
                    .map(|kind| self.provision_inner(*kind, tx, Evidence::Session)),
            )
            .await;

            let mut failure = None;
            for result in results {
                match result {
                    Ok(unit) => units.push(unit),
                    Err(e) if failure.is_none() => failure = Some(e),
                    Err(_) => {}
                }
            }
            if let Some(e) = failure {
                error!(namespace = %self.namespace, error = %e, "Deployment failed");
                emit(tx, ProvisionEvent::DeploymentCompleted { success: false }).await;
                return Err(e);
            }
        }

        emit(tx, ProvisionEvent::DeploymentCompleted { success: true }).await;
        info!(namespace = %self.namespace, units = units.len(), "Deployment completed");
        Ok(Deployment {
            id: ResourceId::new(),
            namespace: self.namespace.clone(),
            units,
        })
    }

    /// Check predecessors and mark `kind` pending under one lock.
    async fn reserve(&self, kind: UnitKind, evidence: Evidence) -> Result<()> {
        let mut ledger = self.ledger.lock().await;
        if ledger.pending.contains(&kind) {
            return Err(Error::InvalidInput(format!(
                "unit '{}' is already being provisioned",
                kind
            )));
        }
        for predecessor in self.graph.predecessors(kind) {
            let satisfied = ledger.provisioned.contains_key(predecessor)
                || (evidence == Evidence::Store && self.published_by(*predecessor).await?);
            if !satisfied {
                warn!(unit = %kind, predecessor = %predecessor, "Refusing to provision ahead of predecessor");
                return Err(Error::OrderViolation {
                    unit: kind,
                    predecessor: *predecessor,
                });
            }
        }
        ledger.pending.insert(kind);
        Ok(())
    }

    /// Whether the store holds every parameter `kind` publishes, owned by
    /// its stack.
    async fn published_by(&self, kind: UnitKind) -> Result<bool> {
        let names = kind.publishes();
        if names.is_empty() {
            return Ok(false);
        }
        let owner = self.unit(kind)?.stack_name();
        for name in names {
            let key = ParameterKey::compose(&self.namespace, *name);
            match self.store.get(&key).await? {
                Some(parameter) if parameter.owner == owner => {}
                _ => {
                    debug!(unit = %kind, key = %key, "Predecessor parameter missing from store");
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    async fn provision_inner(
        &self,
        kind: UnitKind,
        tx: Option<&mpsc::Sender<ProvisionEvent>>,
        evidence: Evidence,
    ) -> Result<ProvisionedUnit> {
        let unit = self.unit(kind)?;
        self.reserve(kind, evidence).await?;

        emit(
            tx,
            ProvisionEvent::UnitStarted {
                unit: kind,
                stack: unit.stack_name().to_string(),
            },
        )
        .await;
        info!(unit = %kind, stack = %unit.stack_name(), "Provisioning unit");

        match unit.provision(self.store.as_ref()).await {
            Ok(result) => {
                for parameter in &result.published {
                    emit(
                        tx,
                        ProvisionEvent::ParameterPublished {
                            unit: kind,
                            key: parameter.key.to_string(),
                            value: parameter.value.clone(),
                        },
                    )
                    .await;
                }
                for output in &result.outputs {
                    emit(
                        tx,
                        ProvisionEvent::OutputEmitted {
                            unit: kind,
                            logical_id: output.logical_id.clone(),
                            value: output.value.clone(),
                        },
                    )
                    .await;
                }
                {
                    let mut ledger = self.ledger.lock().await;
                    ledger.pending.remove(&kind);
                    ledger.provisioned.insert(kind, result.clone());
                }
                emit(tx, ProvisionEvent::UnitCompleted { unit: kind }).await;
                info!(unit = %kind, "Unit provisioned");
                Ok(result)
            }
            Err(e) => {
                self.ledger.lock().await.pending.remove(&kind);
                error!(unit = %kind, error = %e, "Unit failed");
                emit(
                    tx,
                    ProvisionEvent::UnitFailed {
                        unit: kind,
                        message: e.to_string(),
                    },
                )
                .await;
                Err(e)
            }
        }
    }

    /// Tear down one unit, retracting the parameters its stack published.
    ///
    /// Refused with [`Error::OrderViolation`] while a dependent is
    /// provisioned or being provisioned.
    pub async fn teardown_unit(&self, kind: UnitKind) -> Result<Vec<ParameterKey>> {
        let unit = self.unit(kind)?;
        let mut ledger = self.ledger.lock().await;
        if ledger.pending.contains(&kind) {
            return Err(Error::InvalidInput(format!(
                "unit '{}' is being provisioned",
                kind
            )));
        }
        if let Some(dependent) = self
            .graph
            .dependents(kind)
            .into_iter()
            .find(|d| ledger.provisioned.contains_key(d) || ledger.pending.contains(d))
        {
            warn!(unit = %kind, dependent = %dependent, "Refusing to tear down under a live dependent");
            return Err(Error::OrderViolation {
                unit: dependent,
                predecessor: kind,
            });
        }

        let retracted = self.store.retract_owned_by(unit.stack_name()).await?;
        ledger.provisioned.remove(&kind);
        info!(unit = %kind, parameters = retracted.len(), "Unit torn down");
        Ok(retracted)
    }

    /// Tear down every unit, dependents first.
    ///
    /// Works from the stack names alone, so a store populated by an earlier
    /// process is cleaned up as well.
    pub async fn teardown_all(&self) -> Result<Vec<ParameterKey>> {
        let mut ledger = self.ledger.lock().await;
        if let Some(kind) = ledger.pending.iter().next() {
            return Err(Error::InvalidInput(format!(
                "unit '{}' is being provisioned",
                kind
            )));
        }
        let mut retracted = Vec::new();
        for kind in self.graph.teardown_order()? {
            let unit = self.unit(kind)?;
            retracted.extend(self.store.retract_owned_by(unit.stack_name()).await?);
            ledger.provisioned.remove(&kind);
            info!(unit = %kind, stack = %unit.stack_name(), "Unit torn down");
        }
        Ok(retracted)
    }
}

async fn emit(tx: Option<&mpsc::Sender<ProvisionEvent>>, event: ProvisionEvent) {
    if let Some(tx) = tx {
        let _ = tx.send(event).await;
    }
}
