//! In-process job queue standing in for the compute service.

use async_trait::async_trait;
use dockyard_core::job::{JobSubmission, JobSubmitter, SubmissionReceipt};
use dockyard_core::resource::Resource;
use dockyard_core::{Deployment, Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::RwLock;
use tracing::info;

/// Queue settings copied from a declared job queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSettings {
    pub priority: u32,
    pub enabled: bool,
}

/// Accepts submissions for the queues and definitions it knows and keeps
/// them in arrival order. Nothing is executed.
#[derive(Default)]
pub struct LocalJobQueue {
    queues: BTreeMap<String, QueueSettings>,
    definitions: BTreeSet<String>,
    jobs: RwLock<Vec<JobSubmission>>,
}

impl LocalJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every job queue and job definition a deployment declared.
    pub fn from_deployment(deployment: &Deployment) -> Self {
        let mut queue = Self::new();
        for resource in deployment.units.iter().flat_map(|u| u.resources()) {
            match resource {
                Resource::JobQueue {
                    name,
                    priority,
                    enabled,
                    ..
                } => queue.register_queue(name, *priority, *enabled),
                Resource::JobDefinition { name, .. } => queue.register_definition(name),
                _ => {}
            }
        }
        queue
    }

    pub fn register_queue(&mut self, name: &str, priority: u32, enabled: bool) {
        self.queues
            .insert(name.to_string(), QueueSettings { priority, enabled });
    }

    pub fn register_definition(&mut self, name: &str) {
        self.definitions.insert(name.to_string());
    }

    /// Submissions accepted so far, oldest first.
    pub async fn jobs(&self) -> Vec<JobSubmission> {
        self.jobs.read().await.clone()
    }

    pub async fn jobs_in(&self, queue: &str) -> Vec<JobSubmission> {
        self.jobs
            .read()
            .await
            .iter()
            .filter(|j| j.job_queue == queue)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl JobSubmitter for LocalJobQueue {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn submit(&self, submission: JobSubmission) -> Result<SubmissionReceipt> {
        match self.queues.get(&submission.job_queue) {
            None => {
                return Err(Error::SubmissionFailed(format!(
                    "job queue '{}' does not exist",
                    submission.job_queue
                )));
            }
            Some(settings) if !settings.enabled => {
                return Err(Error::SubmissionFailed(format!(
                    "job queue '{}' is disabled",
                    submission.job_queue
                )));
            }
            Some(_) => {}
        }
        if !self.definitions.contains(&submission.job_definition) {
            return Err(Error::SubmissionFailed(format!(
                "job definition '{}' does not exist",
                submission.job_definition
            )));
        }

        let receipt = SubmissionReceipt {
            job_id: submission.id,
            job_name: submission.job_name.clone(),
            job_queue: submission.job_queue.clone(),
        };
        info!(
            job_id = %submission.id,
            job = %submission.job_name,
            queue = %submission.job_queue,
            image = %submission.image,
            "Job submitted"
        );
        self.jobs.write().await.push(submission);
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use dockyard_core::ResourceId;

    fn submission(queue: &str, definition: &str) -> JobSubmission {
        JobSubmission {
            id: ResourceId::new(),
            job_name: "job".to_string(),
            job_queue: queue.to_string(),
            job_definition: definition.to_string(),
            image: "registry/demo:latest".to_string(),
            event_id: "evt-1".to_string(),
            rule: "demo-ecr-to-batch".to_string(),
            submitted_at: Utc::now(),
        }
    }

    fn queue() -> LocalJobQueue {
        let mut queue = LocalJobQueue::new();
        queue.register_queue("demo-job-queue", 1, true);
        queue.register_queue("paused", 1, false);
        queue.register_definition("demo-job-definition");
        queue
    }

    #[tokio::test]
    async fn test_submit_accepted() {
        let queue = queue();
        let sub = submission("demo-job-queue", "demo-job-definition");
        let receipt = queue.submit(sub.clone()).await.unwrap();
        assert_eq!(receipt.job_id, sub.id);
        assert_eq!(queue.jobs().await, vec![sub]);
        assert_eq!(queue.jobs_in("demo-job-queue").await.len(), 1);
        assert!(queue.jobs_in("paused").await.is_empty());
    }

    #[tokio::test]
    async fn test_submit_unknown_queue() {
        let queue = queue();
        let err = queue
            .submit(submission("nope", "demo-job-definition"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SubmissionFailed(_)));
        assert!(queue.jobs().await.is_empty());
    }

    #[tokio::test]
    async fn test_submit_disabled_queue() {
        let err = queue()
            .submit(submission("paused", "demo-job-definition"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SubmissionFailed(msg) if msg.contains("disabled")));
    }

    #[tokio::test]
    async fn test_submit_unknown_definition() {
        let err = queue()
            .submit(submission("demo-job-queue", "other"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SubmissionFailed(msg) if msg.contains("definition")));
    }
}
