//! Registry events and the rules that turn them into job submissions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::{Error, Result};

pub const IMAGE_ACTION_DETAIL_TYPE: &str = "ECR Image Action";
pub const RESULT_SUCCESS: &str = "SUCCESS";
pub const ACTION_PUSH: &str = "PUSH";
pub const LATEST_TAG: &str = "latest";

/// An image action notification as delivered by the event bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryEvent {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "detail-type")]
    pub detail_type: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub account: String,
    #[serde(default)]
    pub region: String,
    #[serde(default = "Utc::now")]
    pub time: DateTime<Utc>,
    pub detail: ImageActionDetail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageActionDetail {
    pub result: String,
    #[serde(rename = "action-type")]
    pub action_type: String,
    #[serde(rename = "repository-name")]
    pub repository_name: String,
    #[serde(rename = "image-tag", default, skip_serializing_if = "Option::is_none")]
    pub image_tag: Option<String>,
    #[serde(rename = "image-digest", default, skip_serializing_if = "Option::is_none")]
    pub image_digest: Option<String>,
}

impl RegistryEvent {
    /// A successful push of `tag` to `repository`.
    pub fn image_push(id: impl Into<String>, repository: impl Into<String>, tag: &str) -> Self {
        Self {
            id: id.into(),
            detail_type: IMAGE_ACTION_DETAIL_TYPE.to_string(),
            source: "aws.ecr".to_string(),
            account: String::new(),
            region: String::new(),
            time: Utc::now(),
            detail: ImageActionDetail {
                result: RESULT_SUCCESS.to_string(),
                action_type: ACTION_PUSH.to_string(),
                repository_name: repository.into(),
                image_tag: Some(tag.to_string()),
                image_digest: None,
            },
        }
    }

    pub fn with_digest(mut self, digest: impl Into<String>) -> Self {
        self.detail.image_digest = Some(digest.into());
        self
    }
}

/// Content filter over raw event JSON.
///
/// Every listed field must be present and equal to one of its allowed
/// values. Fields not listed are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPattern {
    #[serde(rename = "detail-type")]
    pub detail_type: Vec<String>,
    pub detail: BTreeMap<String, Vec<String>>,
}

impl EventPattern {
    /// Successful push of the `latest` tag to one specific registry.
    pub fn image_push(repository_name: &str) -> Self {
        let mut detail = BTreeMap::new();
        detail.insert("result".to_string(), vec![RESULT_SUCCESS.to_string()]);
        detail.insert("action-type".to_string(), vec![ACTION_PUSH.to_string()]);
        detail.insert("image-tag".to_string(), vec![LATEST_TAG.to_string()]);
        detail.insert(
            "repository-name".to_string(),
            vec![repository_name.to_string()],
        );
        Self {
            detail_type: vec![IMAGE_ACTION_DETAIL_TYPE.to_string()],
            detail,
        }
    }

    pub fn matches(&self, event: &Value) -> bool {
        let detail_type_ok = event
            .get("detail-type")
            .and_then(Value::as_str)
            .is_some_and(|dt| self.detail_type.iter().any(|allowed| allowed == dt));
        if !detail_type_ok {
            return false;
        }

        let Some(detail) = event.get("detail") else {
            return false;
        };
        self.detail.iter().all(|(field, allowed)| {
            detail
                .get(field)
                .and_then(Value::as_str)
                .is_some_and(|v| allowed.iter().any(|a| a == v))
        })
    }

    pub fn matches_event(&self, event: &RegistryEvent) -> bool {
        serde_json::to_value(event)
            .map(|v| self.matches(&v))
            .unwrap_or(false)
    }
}

/// Which image a triggered job runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImagePolicy {
    /// Whatever carries the `latest` tag at submission time. A quick
    /// second push can win the race against the job that the first push
    /// triggered.
    #[default]
    Latest,
    /// The digest named in the triggering event.
    Digest,
}

impl ImagePolicy {
    pub fn image_for(&self, registry_uri: &str, event: &Value) -> Result<String> {
        match self {
            ImagePolicy::Latest => Ok(format!("{}:{}", registry_uri, LATEST_TAG)),
            ImagePolicy::Digest => {
                let digest = event
                    .get("detail")
                    .and_then(|d| d.get("image-digest"))
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        Error::InvalidInput(
                            "event has no detail.image-digest to pin the job image to".to_string(),
                        )
                    })?;
                Ok(format!("{}@{}", registry_uri, digest))
            }
        }
    }
}

impl std::fmt::Display for ImagePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImagePolicy::Latest => write!(f, "latest"),
            ImagePolicy::Digest => write!(f, "digest"),
        }
    }
}

impl std::str::FromStr for ImagePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "latest" => Ok(ImagePolicy::Latest),
            "digest" => Ok(ImagePolicy::Digest),
            other => Err(Error::InvalidInput(format!(
                "unknown image policy '{}', expected 'latest' or 'digest'",
                other
            ))),
        }
    }
}

/// Submit-job action bound to a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchJobTarget {
    pub job_queue: String,
    pub job_definition: String,
    pub registry_uri: String,
    pub image_policy: ImagePolicy,
}

/// An event filter bound to a job submission target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRule {
    pub name: String,
    pub description: String,
    pub pattern: EventPattern,
    pub target: BatchJobTarget,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn push_event(result: &str, repo: &str, tag: &str) -> Value {
        json!({
            "version": "0",
            "id": "evt-1",
            "detail-type": "ECR Image Action",
            "source": "aws.ecr",
            "detail": {
                "result": result,
                "action-type": "PUSH",
                "repository-name": repo,
                "image-tag": tag,
                "image-digest": "sha256:abc"
            }
        })
    }

    #[test]
    fn test_pattern_matches_successful_latest_push() {
        let pattern = EventPattern::image_push("demo");
        assert!(pattern.matches(&push_event("SUCCESS", "demo", "latest")));
    }

    #[test]
    fn test_pattern_rejects_failure() {
        let pattern = EventPattern::image_push("demo");
        assert!(!pattern.matches(&push_event("FAILURE", "demo", "latest")));
    }

    #[test]
    fn test_pattern_rejects_other_repository() {
        let pattern = EventPattern::image_push("demo");
        assert!(!pattern.matches(&push_event("SUCCESS", "demo2", "latest")));
    }

    #[test]
    fn test_pattern_rejects_other_tag_and_missing_tag() {
        let pattern = EventPattern::image_push("demo");
        assert!(!pattern.matches(&push_event("SUCCESS", "demo", "v1")));

        let mut untagged = push_event("SUCCESS", "demo", "latest");
        untagged["detail"]
            .as_object_mut()
            .unwrap()
            .remove("image-tag");
        assert!(!pattern.matches(&untagged));
    }

    #[test]
    fn test_pattern_rejects_other_detail_type_and_action() {
        let pattern = EventPattern::image_push("demo");

        let mut scan = push_event("SUCCESS", "demo", "latest");
        scan["detail-type"] = json!("ECR Image Scan");
        assert!(!pattern.matches(&scan));

        let mut delete = push_event("SUCCESS", "demo", "latest");
        delete["detail"]["action-type"] = json!("DELETE");
        assert!(!pattern.matches(&delete));
    }

    #[test]
    fn test_typed_event_round_trips_through_pattern() {
        let pattern = EventPattern::image_push("demo");
        assert!(pattern.matches_event(&RegistryEvent::image_push("e", "demo", "latest")));
        assert!(!pattern.matches_event(&RegistryEvent::image_push("e", "demo", "dev")));
    }

    #[test]
    fn test_pattern_serializes_with_wire_field_names() {
        let value = serde_json::to_value(EventPattern::image_push("demo")).unwrap();
        assert_eq!(value["detail-type"], json!(["ECR Image Action"]));
        assert_eq!(value["detail"]["repository-name"], json!(["demo"]));
        assert_eq!(value["detail"]["action-type"], json!(["PUSH"]));
    }

    #[test]
    fn test_image_policy() {
        let event = push_event("SUCCESS", "demo", "latest");
        let uri = "1.dkr.ecr.r.amazonaws.com/demo";
        assert_eq!(
            ImagePolicy::Latest.image_for(uri, &event).unwrap(),
            "1.dkr.ecr.r.amazonaws.com/demo:latest"
        );
        assert_eq!(
            ImagePolicy::Digest.image_for(uri, &event).unwrap(),
            "1.dkr.ecr.r.amazonaws.com/demo@sha256:abc"
        );

        let no_digest = json!({ "detail": {} });
        assert!(ImagePolicy::Digest.image_for(uri, &no_digest).is_err());
    }

    #[test]
    fn test_image_policy_parse() {
        assert_eq!("latest".parse::<ImagePolicy>().unwrap(), ImagePolicy::Latest);
        assert_eq!("digest".parse::<ImagePolicy>().unwrap(), ImagePolicy::Digest);
        assert!("newest".parse::<ImagePolicy>().is_err());
    }
}
