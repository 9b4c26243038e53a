//! Job submissions produced by triggered rules.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ResourceId, Result};

/// One unit of containerized work handed to a compute queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSubmission {
    pub id: ResourceId,
    pub job_name: String,
    pub job_queue: String,
    pub job_definition: String,
    /// Image reference the job runs, as chosen by the rule's image policy.
    pub image: String,
    /// Id of the event that caused the submission.
    pub event_id: String,
    pub rule: String,
    pub submitted_at: DateTime<Utc>,
}

/// Acknowledgement from the compute service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    pub job_id: ResourceId,
    pub job_name: String,
    pub job_queue: String,
}

/// Trait for compute services that accept job submissions.
///
/// Retries and ordering between submissions are the service's concern.
#[async_trait]
pub trait JobSubmitter: Send + Sync {
    fn name(&self) -> &'static str;

    async fn submit(&self, submission: JobSubmission) -> Result<SubmissionReceipt>;
}
