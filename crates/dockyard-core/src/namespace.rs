//! Deployment namespaces.

use derive_more::Display;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::{Error, Result};

// Registry names are derived from the lower-cased namespace, so the
// character set is the intersection of what every derived name accepts.
static NAMESPACE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9._-]{0,63}$").expect("valid regex"));

/// Scopes every resource name and parameter key of one deployed instance.
///
/// Changing the namespace does not rename anything: it yields a disjoint
/// set of resources and keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[serde(try_from = "String", into = "String")]
#[display("{_0}")]
pub struct Namespace(String);

impl Namespace {
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if !NAMESPACE_REGEX.is_match(&value) {
            return Err(Error::InvalidInput(format!(
                "namespace '{}' must start with a letter and contain at most 64 of [A-Za-z0-9._-]",
                value
            )));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lower-cased form, used for registry names.
    pub fn lowercase(&self) -> String {
        self.0.to_lowercase()
    }
}

impl TryFrom<String> for Namespace {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Namespace> for String {
    fn from(ns: Namespace) -> Self {
        ns.0
    }
}

impl std::str::FromStr for Namespace {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_namespaces() {
        for ns in ["demo", "app-package", "Team.Build_01"] {
            assert!(Namespace::new(ns).is_ok(), "{ns} should be valid");
        }
    }

    #[test]
    fn test_invalid_namespaces() {
        for ns in ["", "1demo", "has space", "slash/name", &"a".repeat(65)] {
            assert!(
                matches!(Namespace::new(ns), Err(Error::InvalidInput(_))),
                "{ns} should be rejected"
            );
        }
    }

    #[test]
    fn test_lowercase() {
        let ns = Namespace::new("MyApp").unwrap();
        assert_eq!(ns.lowercase(), "myapp");
        assert_eq!(ns.as_str(), "MyApp");
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: Namespace = serde_json::from_str("\"demo\"").unwrap();
        assert_eq!(ok.as_str(), "demo");
        assert!(serde_json::from_str::<Namespace>("\"9lives\"").is_err());
    }
}
