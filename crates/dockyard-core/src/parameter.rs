//! Namespaced parameter exchange.
//!
//! Units never hold handles to each other's resources. A producing unit
//! publishes a resource identifier under `{namespace}-{logical-name}` and a
//! consuming unit resolves that key when it is itself provisioned.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::namespace::Namespace;
use crate::{Error, Result};

/// The logical half of a parameter key. The composed key strings are a
/// case-sensitive contract with every consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalName {
    /// Container registry name.
    EcrRepository,
    /// Artifact staging bucket name.
    SourceBucket,
    /// Build project name.
    CodeBuild,
    /// Source repository name.
    Repository,
    /// Release pipeline name.
    Pipeline,
}

impl LogicalName {
    pub const ALL: [LogicalName; 5] = [
        LogicalName::EcrRepository,
        LogicalName::SourceBucket,
        LogicalName::CodeBuild,
        LogicalName::Repository,
        LogicalName::Pipeline,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogicalName::EcrRepository => "ecrrepository",
            LogicalName::SourceBucket => "sourcebucket",
            LogicalName::CodeBuild => "codebuild",
            LogicalName::Repository => "repository",
            LogicalName::Pipeline => "pipeline",
        }
    }

    /// Logical id of the deployment output mirroring this parameter.
    pub fn output_id(&self) -> &'static str {
        match self {
            LogicalName::EcrRepository => "EcrRepositoryName",
            LogicalName::SourceBucket => "ArtifactsS3Bucket",
            LogicalName::CodeBuild => "BuildProjectName",
            LogicalName::Repository => "CodeCommitRepositoryName",
            LogicalName::Pipeline => "PipelineName",
        }
    }
}

impl std::fmt::Display for LogicalName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A composed `{namespace}-{logical-name}` key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[serde(transparent)]
#[display("{_0}")]
pub struct ParameterKey(String);

impl ParameterKey {
    pub fn compose(namespace: &Namespace, name: LogicalName) -> Self {
        Self(format!("{}-{}", namespace, name.as_str()))
    }

    /// Wrap an already composed key, e.g. one received over the API.
    pub fn from_raw(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A parameter about to be published.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterDraft {
    pub key: ParameterKey,
    pub value: String,
    pub description: String,
    /// Stack name of the producing unit.
    pub owner: String,
}

impl ParameterDraft {
    pub fn new(
        namespace: &Namespace,
        name: LogicalName,
        value: impl Into<String>,
        description: impl Into<String>,
        owner: impl Into<String>,
    ) -> Self {
        Self {
            key: ParameterKey::compose(namespace, name),
            value: value.into(),
            description: description.into(),
            owner: owner.into(),
        }
    }
}

/// A published parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub key: ParameterKey,
    pub value: String,
    pub description: String,
    pub owner: String,
    /// Bumped each time the owner republishes a different value.
    pub version: u64,
    pub published_at: DateTime<Utc>,
}

/// What a publish did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishOutcome {
    Created,
    /// Same owner, same value: redeclaration is a no-op.
    Unchanged,
    /// Same owner, new value: the producing unit was redeployed.
    Updated,
}

impl Parameter {
    /// Apply a draft on top of whatever the store currently holds for its key.
    ///
    /// Stores call this under their write lock so every backend shares the
    /// same collision rules: one producer per key, and republishing by that
    /// producer is idempotent.
    pub fn reconcile(
        existing: Option<&Parameter>,
        draft: ParameterDraft,
    ) -> Result<(Parameter, PublishOutcome)> {
        match existing {
            None => Ok((
                Parameter {
                    key: draft.key,
                    value: draft.value,
                    description: draft.description,
                    owner: draft.owner,
                    version: 1,
                    published_at: Utc::now(),
                },
                PublishOutcome::Created,
            )),
            Some(current) if current.owner != draft.owner => Err(Error::ParameterCollision {
                key: draft.key.to_string(),
                owner: current.owner.clone(),
                claimant: draft.owner,
            }),
            Some(current) if current.value == draft.value => {
                let mut kept = current.clone();
                kept.description = draft.description;
                Ok((kept, PublishOutcome::Unchanged))
            }
            Some(current) => Ok((
                Parameter {
                    key: draft.key,
                    value: draft.value,
                    description: draft.description,
                    owner: draft.owner,
                    version: current.version + 1,
                    published_at: Utc::now(),
                },
                PublishOutcome::Updated,
            )),
        }
    }
}

/// Trait for parameter store backends.
#[async_trait]
pub trait ParameterStore: Send + Sync {
    /// Name of this backend.
    fn name(&self) -> &'static str;

    /// Publish a parameter, see [`Parameter::reconcile`] for collision rules.
    async fn publish(&self, draft: ParameterDraft) -> Result<PublishOutcome>;

    /// Current value of a key.
    ///
    /// Fails with [`Error::UnresolvedParameter`] when nothing is published
    /// under the key; never returns an empty default.
    async fn resolve(&self, key: &ParameterKey) -> Result<String>;

    /// Full record of a key, if present.
    async fn get(&self, key: &ParameterKey) -> Result<Option<Parameter>>;

    /// All parameters whose key starts with `prefix`, ordered by key.
    ///
    /// A raw prefix does not scope a namespace: `demo-` also matches keys of
    /// `demo-x`. Use [`ParameterStore::list_namespace`] for that.
    async fn list(&self, prefix: &str) -> Result<Vec<Parameter>>;

    /// The parameters composed for `namespace`, ordered by key.
    async fn list_namespace(&self, namespace: &Namespace) -> Result<Vec<Parameter>> {
        let mut parameters = Vec::new();
        for name in LogicalName::ALL {
            if let Some(parameter) = self.get(&ParameterKey::compose(namespace, name)).await? {
                parameters.push(parameter);
            }
        }
        parameters.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(parameters)
    }

    /// Remove every parameter published by `owner`, returning the removed keys.
    async fn retract_owned_by(&self, owner: &str) -> Result<Vec<ParameterKey>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ns(name: &str) -> Namespace {
        Namespace::new(name).unwrap()
    }

    #[test]
    fn test_key_composition() {
        let demo = ns("demo");
        let keys: Vec<String> = LogicalName::ALL
            .iter()
            .map(|n| ParameterKey::compose(&demo, *n).to_string())
            .collect();
        assert_eq!(
            keys,
            vec![
                "demo-ecrrepository",
                "demo-sourcebucket",
                "demo-codebuild",
                "demo-repository",
                "demo-pipeline",
            ]
        );
    }

    #[test]
    fn test_key_keeps_namespace_case() {
        let key = ParameterKey::compose(&ns("MyApp"), LogicalName::Repository);
        assert_eq!(key.as_str(), "MyApp-repository");
    }

    #[test]
    fn test_reconcile_create() {
        let draft = ParameterDraft::new(&ns("demo"), LogicalName::Repository, "demo", "d", "a-code");
        let (param, outcome) = Parameter::reconcile(None, draft).unwrap();
        assert_eq!(outcome, PublishOutcome::Created);
        assert_eq!(param.version, 1);
        assert_eq!(param.value, "demo");
    }

    #[test]
    fn test_reconcile_same_owner_same_value_is_unchanged() {
        let draft = ParameterDraft::new(&ns("demo"), LogicalName::Repository, "demo", "d", "a-code");
        let (first, _) = Parameter::reconcile(None, draft.clone()).unwrap();
        let (second, outcome) = Parameter::reconcile(Some(&first), draft).unwrap();
        assert_eq!(outcome, PublishOutcome::Unchanged);
        assert_eq!(second.version, 1);
        assert_eq!(second.published_at, first.published_at);
    }

    #[test]
    fn test_reconcile_same_owner_new_value_updates() {
        let demo = ns("demo");
        let draft = ParameterDraft::new(&demo, LogicalName::Pipeline, "one", "d", "a-pipeline");
        let (first, _) = Parameter::reconcile(None, draft).unwrap();
        let draft = ParameterDraft::new(&demo, LogicalName::Pipeline, "two", "d", "a-pipeline");
        let (second, outcome) = Parameter::reconcile(Some(&first), draft).unwrap();
        assert_eq!(outcome, PublishOutcome::Updated);
        assert_eq!(second.version, 2);
        assert_eq!(second.value, "two");
    }

    #[test]
    fn test_reconcile_other_owner_collides() {
        let demo = ns("demo");
        let draft = ParameterDraft::new(&demo, LogicalName::Repository, "demo", "d", "a-code");
        let (first, _) = Parameter::reconcile(None, draft).unwrap();
        let draft = ParameterDraft::new(&demo, LogicalName::Repository, "other", "d", "b-code");
        let err = Parameter::reconcile(Some(&first), draft).unwrap_err();
        match err {
            Error::ParameterCollision {
                key,
                owner,
                claimant,
            } => {
                assert_eq!(key, "demo-repository");
                assert_eq!(owner, "a-code");
                assert_eq!(claimant, "b-code");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
