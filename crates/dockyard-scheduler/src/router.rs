//! Routes registry events to the rules that match them.

use chrono::Utc;
use dockyard_core::event::{EventRule, RegistryEvent};
use dockyard_core::job::{JobSubmission, JobSubmitter, SubmissionReceipt};
use dockyard_core::{Deployment, Error, ResourceId, Result};
use serde_json::Value;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Number of routed (event id, rule) pairs remembered for de-duplication.
pub const DEFAULT_DEDUPE_WINDOW: usize = 10_000;

type Delivery = (String, String);

/// Recently routed deliveries, oldest evicted first.
struct SeenDeliveries {
    capacity: usize,
    order: VecDeque<Delivery>,
    set: HashSet<Delivery>,
}

impl SeenDeliveries {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::new(),
            set: HashSet::new(),
        }
    }

    /// Returns false if the delivery is already remembered.
    fn insert(&mut self, delivery: Delivery) -> bool {
        if !self.set.insert(delivery.clone()) {
            return false;
        }
        self.order.push_back(delivery);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.set.remove(&oldest);
            }
        }
        true
    }

    fn forget(&mut self, delivery: &Delivery) {
        if self.set.remove(delivery) {
            self.order.retain(|d| d != delivery);
        }
    }
}

/// Matches incoming events against declared rules and submits one job per
/// matching rule.
///
/// Submission failures are returned to the caller untouched; redelivery
/// is the event source's business. With de-duplication on, each rule
/// remembers the event ids it submitted for, so a redelivery after a
/// partial failure only resubmits the rules that failed.
pub struct EventRouter {
    rules: Vec<EventRule>,
    submitter: Arc<dyn JobSubmitter>,
    dedupe: bool,
    seen: Mutex<SeenDeliveries>,
}

impl EventRouter {
    pub fn new(rules: Vec<EventRule>, submitter: Arc<dyn JobSubmitter>) -> Self {
        Self {
            rules,
            submitter,
            dedupe: false,
            seen: Mutex::new(SeenDeliveries::new(DEFAULT_DEDUPE_WINDOW)),
        }
    }

    pub fn from_deployment(deployment: &Deployment, submitter: Arc<dyn JobSubmitter>) -> Self {
        Self::new(deployment.rules().cloned().collect(), submitter)
    }

    /// Skip rules that already submitted a job for the event's id.
    pub fn with_dedupe(mut self, dedupe: bool) -> Self {
        self.dedupe = dedupe;
        self
    }

    /// Bound the de-duplication memory to the `capacity` most recent
    /// deliveries.
    pub fn with_dedupe_window(mut self, capacity: usize) -> Self {
        self.seen = Mutex::new(SeenDeliveries::new(capacity.max(1)));
        self
    }

    pub fn rules(&self) -> &[EventRule] {
        &self.rules
    }

    /// Route one raw event. An event no rule matches yields no receipts.
    pub async fn route(&self, event: &Value) -> Result<Vec<SubmissionReceipt>> {
        let event_id = event
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let matched: Vec<&EventRule> = self
            .rules
            .iter()
            .filter(|rule| rule.pattern.matches(event))
            .collect();
        if matched.is_empty() {
            debug!(event_id = %event_id, "Event matched no rule");
            return Ok(Vec::new());
        }

        let dedupe = self.dedupe && !event_id.is_empty();
        let mut receipts = Vec::with_capacity(matched.len());
        for rule in matched {
            let delivery = (event_id.clone(), rule.name.clone());
            if dedupe && !self.seen.lock().await.insert(delivery.clone()) {
                info!(rule = %rule.name, event_id = %event_id, "Dropping duplicate event");
                continue;
            }
            match self.submit(rule, &event_id, event).await {
                Ok(receipt) => receipts.push(receipt),
                Err(e) => {
                    warn!(rule = %rule.name, event_id = %event_id, error = %e, "Job submission failed");
                    if dedupe {
                        // Let a redelivery through for this rule.
                        self.seen.lock().await.forget(&delivery);
                    }
                    return Err(e);
                }
            }
        }
        Ok(receipts)
    }

    pub async fn route_event(&self, event: &RegistryEvent) -> Result<Vec<SubmissionReceipt>> {
        let value = serde_json::to_value(event)
            .map_err(|e| Error::Internal(format!("failed to encode event: {}", e)))?;
        self.route(&value).await
    }

    async fn submit(
        &self,
        rule: &EventRule,
        event_id: &str,
        event: &Value,
    ) -> Result<SubmissionReceipt> {
        let target = &rule.target;
        let image = target.image_policy.image_for(&target.registry_uri, event)?;
        let id = ResourceId::new();
        let submission = JobSubmission {
            id,
            job_name: format!("{}-{}", rule.name, id.short()),
            job_queue: target.job_queue.clone(),
            job_definition: target.job_definition.clone(),
            image,
            event_id: event_id.to_string(),
            rule: rule.name.clone(),
            submitted_at: Utc::now(),
        };
        debug!(rule = %rule.name, submitter = self.submitter.name(), "Submitting job");
        self.submitter.submit(submission).await
    }
}
