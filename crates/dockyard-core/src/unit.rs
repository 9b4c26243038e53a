//! Composition units: independently deployable groups of declarations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::EventRule;
use crate::namespace::Namespace;
use crate::parameter::{LogicalName, Parameter, ParameterStore};
use crate::resource::{Declaration, Grant, Output, Resource, ResourceRef};
use crate::{ResourceId, Result};

/// The four units of a delivery stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Source,
    Build,
    Pipeline,
    ComputeTrigger,
}

impl UnitKind {
    pub const ALL: [UnitKind; 4] = [
        UnitKind::Source,
        UnitKind::Build,
        UnitKind::Pipeline,
        UnitKind::ComputeTrigger,
    ];

    /// Suffix of the unit's stack name, `{app}-{suffix}`.
    pub fn stack_suffix(&self) -> &'static str {
        match self {
            UnitKind::Source => "code",
            UnitKind::Build => "build",
            UnitKind::Pipeline => "pipeline",
            UnitKind::ComputeTrigger => "batch",
        }
    }

    /// Parameters this unit produces.
    pub fn publishes(&self) -> &'static [LogicalName] {
        match self {
            UnitKind::Source => &[LogicalName::Repository],
            UnitKind::Build => &[
                LogicalName::EcrRepository,
                LogicalName::SourceBucket,
                LogicalName::CodeBuild,
            ],
            UnitKind::Pipeline => &[LogicalName::Pipeline],
            UnitKind::ComputeTrigger => &[],
        }
    }

    /// Parameters this unit reads at provisioning time.
    pub fn resolves(&self) -> &'static [LogicalName] {
        match self {
            UnitKind::Source | UnitKind::Build => &[],
            UnitKind::Pipeline => &[
                LogicalName::Repository,
                LogicalName::CodeBuild,
                LogicalName::SourceBucket,
            ],
            UnitKind::ComputeTrigger => &[LogicalName::EcrRepository],
        }
    }
}

impl std::fmt::Display for UnitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnitKind::Source => write!(f, "source"),
            UnitKind::Build => write!(f, "build"),
            UnitKind::Pipeline => write!(f, "pipeline"),
            UnitKind::ComputeTrigger => write!(f, "compute-trigger"),
        }
    }
}

impl std::str::FromStr for UnitKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "source" | "code" => Ok(UnitKind::Source),
            "build" => Ok(UnitKind::Build),
            "pipeline" => Ok(UnitKind::Pipeline),
            "compute-trigger" | "compute" | "batch" => Ok(UnitKind::ComputeTrigger),
            other => Err(crate::Error::InvalidInput(format!("unknown unit '{}'", other))),
        }
    }
}

/// Everything one unit asserted during provisioning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionedUnit {
    pub kind: UnitKind,
    pub stack_name: String,
    pub namespace: Namespace,
    pub declarations: Vec<Declaration>,
    /// References rebuilt from resolved parameters.
    pub imports: Vec<ResourceRef>,
    pub grants: Vec<Grant>,
    pub published: Vec<Parameter>,
    pub outputs: Vec<Output>,
    pub provisioned_at: DateTime<Utc>,
}

impl ProvisionedUnit {
    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.declarations.iter().map(|d| &d.resource)
    }

    pub fn output(&self, logical_id: &str) -> Option<&str> {
        self.outputs
            .iter()
            .find(|o| o.logical_id == logical_id)
            .map(|o| o.value.as_str())
    }
}

/// The result of provisioning a whole composition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    pub id: ResourceId,
    pub namespace: Namespace,
    /// Units in provisioning order; siblings keep their declaration order.
    pub units: Vec<ProvisionedUnit>,
}

impl Deployment {
    pub fn unit(&self, kind: UnitKind) -> Option<&ProvisionedUnit> {
        self.units.iter().find(|u| u.kind == kind)
    }

    pub fn rules(&self) -> impl Iterator<Item = &EventRule> {
        self.units.iter().flat_map(|u| u.resources()).filter_map(|r| match r {
            Resource::EventRule(rule) => Some(rule),
            _ => None,
        })
    }

    pub fn outputs(&self) -> impl Iterator<Item = (&ProvisionedUnit, &Output)> {
        self.units
            .iter()
            .flat_map(|u| u.outputs.iter().map(move |o| (u, o)))
    }
}

/// Trait for composition units.
#[async_trait]
pub trait CompositionUnit: Send + Sync {
    fn kind(&self) -> UnitKind;

    /// Stack name, also the owner recorded on published parameters.
    fn stack_name(&self) -> &str;

    /// Declare this unit's resources, resolving inputs from and publishing
    /// outputs to `store`.
    async fn provision(&self, store: &dyn ParameterStore) -> Result<ProvisionedUnit>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_sets_come_from_other_units() {
        for kind in UnitKind::ALL {
            for name in kind.resolves() {
                assert!(
                    !kind.publishes().contains(name),
                    "{kind} resolves its own parameter {name}"
                );
                assert!(
                    UnitKind::ALL.iter().any(|k| k.publishes().contains(name)),
                    "nobody publishes {name}"
                );
            }
        }
    }

    #[test]
    fn test_every_logical_name_has_one_producer() {
        for name in LogicalName::ALL {
            let producers = UnitKind::ALL
                .iter()
                .filter(|k| k.publishes().contains(&name))
                .count();
            assert_eq!(producers, 1, "{name}");
        }
    }

    #[test]
    fn test_parse_unit_kind() {
        assert_eq!("build".parse::<UnitKind>().unwrap(), UnitKind::Build);
        assert_eq!("batch".parse::<UnitKind>().unwrap(), UnitKind::ComputeTrigger);
        assert!("deploy".parse::<UnitKind>().is_err());
    }
}
