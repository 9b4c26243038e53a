//! Deployment target (account and region).

use serde::{Deserialize, Serialize};

/// Account and region every unit of a deployment is declared into.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetEnvironment {
    pub account: String,
    pub region: String,
}

impl TargetEnvironment {
    pub fn new(account: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            region: region.into(),
        }
    }

    /// URI of a container registry in this environment.
    pub fn registry_uri(&self, registry_name: &str) -> String {
        format!(
            "{}.dkr.ecr.{}.amazonaws.com/{}",
            self.account, self.region, registry_name
        )
    }

    /// Bucket that receives uploaded directory snapshots.
    pub fn assets_bucket(&self) -> String {
        format!("dockyard-assets-{}-{}", self.account, self.region)
    }
}

impl Default for TargetEnvironment {
    fn default() -> Self {
        Self::new("000000000000", "us-east-1")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_uri() {
        let env = TargetEnvironment::new("123456789012", "eu-west-1");
        assert_eq!(
            env.registry_uri("demo"),
            "123456789012.dkr.ecr.eu-west-1.amazonaws.com/demo"
        );
    }

    #[test]
    fn test_assets_bucket() {
        let env = TargetEnvironment::new("123456789012", "eu-west-1");
        assert_eq!(env.assets_bucket(), "dockyard-assets-123456789012-eu-west-1");
    }
}
