//! Application configuration parsing (`dockyard.kdl`).

use crate::{ConfigError, ConfigResult};
use dockyard_core::event::ImagePolicy;
use dockyard_core::resource::ComputeResourceType;
use dockyard_core::{Namespace, TargetEnvironment};
use kdl::{KdlDocument, KdlNode};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Configuration of one delivery stack instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Scopes every resource name and parameter key.
    pub namespace: Namespace,
    pub environment: TargetEnvironment,
    pub source: SourceSettings,
    pub build: BuildSettings,
    pub compute: ComputeSettings,
    pub job: JobSettings,
    pub trigger: TriggerSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSettings {
    /// Directory whose snapshot seeds the repository on creation.
    pub assets: Option<PathBuf>,
    pub branch: String,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            assets: None,
            branch: "main".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildSettings {
    /// Upper bound on a single build execution.
    pub timeout_minutes: u32,
    /// Image builds need a privileged build environment.
    pub privileged: bool,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            timeout_minutes: 60,
            privileged: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputeSettings {
    pub resource_type: ComputeResourceType,
    pub bid_percentage: u32,
    pub min_vcpus: u32,
    pub max_vcpus: u32,
    pub desired_vcpus: u32,
    pub queue_priority: u32,
}

impl Default for ComputeSettings {
    fn default() -> Self {
        Self {
            resource_type: ComputeResourceType::Spot,
            bid_percentage: 100,
            min_vcpus: 0,
            max_vcpus: 256,
            desired_vcpus: 0,
            queue_priority: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSettings {
    pub vcpus: u32,
    pub memory_mib: u32,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            vcpus: 4,
            memory_mib: 256,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerSettings {
    pub image_policy: ImagePolicy,
    /// Drop events whose id was already routed.
    pub dedupe: bool,
}

impl AppConfig {
    /// Configuration with every section at its default.
    pub fn new(namespace: Namespace) -> Self {
        Self {
            namespace,
            environment: TargetEnvironment::default(),
            source: SourceSettings::default(),
            build: BuildSettings::default(),
            compute: ComputeSettings::default(),
            job: JobSettings::default(),
            trigger: TriggerSettings::default(),
        }
    }
}

/// Read and parse a configuration file.
///
/// A relative `source.assets` path is taken relative to the file's directory.
pub fn load_app_config(path: impl AsRef<Path>) -> ConfigResult<AppConfig> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    let mut config = parse_app_config(&content)?;

    if let Some(assets) = config.source.assets.take() {
        let resolved = if assets.is_relative() {
            path.parent().unwrap_or(Path::new(".")).join(assets)
        } else {
            assets
        };
        debug!(assets = %resolved.display(), "Resolved seed directory");
        config.source.assets = Some(resolved);
    }

    Ok(config)
}

/// Parse a configuration from KDL text.
pub fn parse_app_config(kdl: &str) -> ConfigResult<AppConfig> {
    let doc: KdlDocument = kdl.parse()?;

    let mut namespace = None;
    let mut environment = TargetEnvironment::default();
    let mut source = SourceSettings::default();
    let mut build = BuildSettings::default();
    let mut compute = ComputeSettings::default();
    let mut job = JobSettings::default();
    let mut trigger = TriggerSettings::default();

    for node in doc.nodes() {
        match node.name().value() {
            "namespace" => {
                if namespace.is_some() {
                    return Err(ConfigError::Duplicate("namespace".to_string()));
                }
                let value = get_first_string_arg(node)
                    .ok_or_else(|| ConfigError::MissingField("namespace value".to_string()))?;
                namespace = Some(
                    Namespace::new(value)
                        .map_err(|e| ConfigError::invalid("namespace", e.to_string()))?,
                );
            }
            "environment" => {
                if let Some(account) = get_string_prop(node, "account") {
                    environment.account = account;
                }
                if let Some(region) = get_string_prop(node, "region") {
                    environment.region = region;
                }
            }
            "source" => parse_source(node, &mut source),
            "build" => parse_build(node, &mut build)?,
            "compute" => parse_compute(node, &mut compute)?,
            "job" => parse_job(node, &mut job)?,
            "trigger" => parse_trigger(node, &mut trigger)?,
            _ => {} // Ignore unknown nodes
        }
    }

    let namespace = namespace.ok_or_else(|| ConfigError::MissingField("namespace".to_string()))?;

    if compute.min_vcpus > compute.max_vcpus {
        return Err(ConfigError::invalid(
            "compute",
            format!(
                "min-vcpus ({}) exceeds max-vcpus ({})",
                compute.min_vcpus, compute.max_vcpus
            ),
        ));
    }
    if compute.desired_vcpus < compute.min_vcpus || compute.desired_vcpus > compute.max_vcpus {
        return Err(ConfigError::invalid(
            "compute",
            "desired-vcpus must lie between min-vcpus and max-vcpus",
        ));
    }

    Ok(AppConfig {
        namespace,
        environment,
        source,
        build,
        compute,
        job,
        trigger,
    })
}

fn parse_source(node: &KdlNode, source: &mut SourceSettings) {
    for child in children(node) {
        match child.name().value() {
            "assets" => source.assets = get_first_string_arg(child).map(PathBuf::from),
            "branch" => {
                if let Some(branch) = get_first_string_arg(child) {
                    source.branch = branch;
                }
            }
            _ => {}
        }
    }
}

fn parse_build(node: &KdlNode, build: &mut BuildSettings) -> ConfigResult<()> {
    for child in children(node) {
        match child.name().value() {
            "timeout-minutes" => {
                let minutes = get_u32_arg(child, "build.timeout-minutes")?;
                // Build projects accept 5 minutes to 36 hours.
                if !(5..=2160).contains(&minutes) {
                    return Err(ConfigError::invalid(
                        "build.timeout-minutes",
                        format!("{} is outside 5..=2160", minutes),
                    ));
                }
                build.timeout_minutes = minutes;
            }
            "privileged" => build.privileged = get_bool_arg(child, "build.privileged")?,
            _ => {}
        }
    }
    Ok(())
}

fn parse_compute(node: &KdlNode, compute: &mut ComputeSettings) -> ConfigResult<()> {
    for child in children(node) {
        match child.name().value() {
            "type" => {
                compute.resource_type = match get_first_string_arg(child).as_deref() {
                    Some("spot") => ComputeResourceType::Spot,
                    Some("ec2") | Some("on-demand") => ComputeResourceType::Ec2,
                    other => {
                        return Err(ConfigError::invalid(
                            "compute.type",
                            format!("expected 'spot' or 'on-demand', got {:?}", other),
                        ));
                    }
                };
            }
            "spot-bid-percentage" => {
                let pct = get_u32_arg(child, "compute.spot-bid-percentage")?;
                if !(1..=100).contains(&pct) {
                    return Err(ConfigError::invalid(
                        "compute.spot-bid-percentage",
                        format!("{} is outside 1..=100", pct),
                    ));
                }
                compute.bid_percentage = pct;
            }
            "min-vcpus" => compute.min_vcpus = get_u32_arg(child, "compute.min-vcpus")?,
            "max-vcpus" => compute.max_vcpus = get_u32_arg(child, "compute.max-vcpus")?,
            "desired-vcpus" => {
                compute.desired_vcpus = get_u32_arg(child, "compute.desired-vcpus")?
            }
            "queue-priority" => {
                compute.queue_priority = get_u32_arg(child, "compute.queue-priority")?
            }
            _ => {}
        }
    }
    Ok(())
}

fn parse_job(node: &KdlNode, job: &mut JobSettings) -> ConfigResult<()> {
    for child in children(node) {
        match child.name().value() {
            "vcpus" => job.vcpus = get_u32_arg(child, "job.vcpus")?,
            "memory-mib" => job.memory_mib = get_u32_arg(child, "job.memory-mib")?,
            _ => {}
        }
    }
    if job.vcpus == 0 || job.memory_mib == 0 {
        return Err(ConfigError::invalid("job", "vcpus and memory-mib must be positive"));
    }
    Ok(())
}

fn parse_trigger(node: &KdlNode, trigger: &mut TriggerSettings) -> ConfigResult<()> {
    for child in children(node) {
        match child.name().value() {
            "image-policy" => {
                let policy = get_first_string_arg(child)
                    .ok_or_else(|| ConfigError::MissingField("trigger.image-policy".to_string()))?;
                trigger.image_policy = policy
                    .parse()
                    .map_err(|e: dockyard_core::Error| {
                        ConfigError::invalid("trigger.image-policy", e.to_string())
                    })?;
            }
            "dedupe" => trigger.dedupe = get_bool_arg(child, "trigger.dedupe")?,
            _ => {}
        }
    }
    Ok(())
}

// Helper functions for extracting values from KDL nodes

fn children(node: &KdlNode) -> impl Iterator<Item = &KdlNode> {
    node.children().into_iter().flat_map(|c| c.nodes().iter())
}

fn get_first_arg(node: &KdlNode) -> Option<&kdl::KdlValue> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .map(|e| e.value())
}

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    get_first_arg(node)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

fn get_string_prop(node: &KdlNode, name: &str) -> Option<String> {
    node.get(name)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

fn get_u32_arg(node: &KdlNode, field: &str) -> ConfigResult<u32> {
    let value = get_first_arg(node)
        .and_then(|v| v.as_integer())
        .ok_or_else(|| ConfigError::invalid(field, "expected an integer"))?;
    u32::try_from(value).map_err(|_| ConfigError::invalid(field, format!("{} is out of range", value)))
}

fn get_bool_arg(node: &KdlNode, field: &str) -> ConfigResult<bool> {
    get_first_arg(node)
        .and_then(|v| v.as_bool())
        .ok_or_else(|| ConfigError::invalid(field, "expected #true or #false"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let config = parse_app_config(r#"namespace "demo""#).unwrap();
        assert_eq!(config.namespace.as_str(), "demo");
        assert!(config.source.assets.is_none());
        assert_eq!(config.source.branch, "main");
        assert_eq!(config.build.timeout_minutes, 60);
        assert!(config.build.privileged);
        assert_eq!(config.compute.max_vcpus, 256);
        assert_eq!(config.compute.bid_percentage, 100);
        assert_eq!(config.job.vcpus, 4);
        assert_eq!(config.job.memory_mib, 256);
        assert_eq!(config.trigger.image_policy, ImagePolicy::Latest);
        assert!(!config.trigger.dedupe);
    }

    #[test]
    fn test_parse_full_config() {
        let kdl = r#"
            namespace "CICDPipelineAWSBatch"
            environment account="123456789012" region="eu-west-1"

            source {
                assets "app-package"
                branch "trunk"
            }

            build {
                timeout-minutes 30
                privileged #true
            }

            compute {
                type "on-demand"
                max-vcpus 64
                min-vcpus 0
                desired-vcpus 2
                queue-priority 10
            }

            job {
                vcpus 2
                memory-mib 1024
            }

            trigger {
                image-policy "digest"
                dedupe #true
            }
        "#;

        let config = parse_app_config(kdl).unwrap();
        assert_eq!(config.namespace.as_str(), "CICDPipelineAWSBatch");
        assert_eq!(config.environment.account, "123456789012");
        assert_eq!(config.environment.region, "eu-west-1");
        assert_eq!(config.source.assets, Some(PathBuf::from("app-package")));
        assert_eq!(config.source.branch, "trunk");
        assert_eq!(config.build.timeout_minutes, 30);
        assert_eq!(config.compute.resource_type, ComputeResourceType::Ec2);
        assert_eq!(config.compute.max_vcpus, 64);
        assert_eq!(config.compute.desired_vcpus, 2);
        assert_eq!(config.compute.queue_priority, 10);
        assert_eq!(config.job.memory_mib, 1024);
        assert_eq!(config.trigger.image_policy, ImagePolicy::Digest);
        assert!(config.trigger.dedupe);
    }

    #[test]
    fn test_missing_namespace() {
        let result = parse_app_config("build {\n timeout-minutes 10\n}");
        assert!(matches!(result, Err(ConfigError::MissingField(_))));
    }

    #[test]
    fn test_duplicate_namespace() {
        let result = parse_app_config("namespace \"a\"\nnamespace \"b\"");
        assert!(matches!(result, Err(ConfigError::Duplicate(_))));
    }

    #[test]
    fn test_invalid_namespace() {
        let result = parse_app_config(r#"namespace "not valid""#);
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_invalid_image_policy() {
        let kdl = r#"
            namespace "demo"
            trigger {
                image-policy "newest"
            }
        "#;
        let result = parse_app_config(kdl);
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_vcpu_bounds() {
        let kdl = r#"
            namespace "demo"
            compute {
                min-vcpus 8
                max-vcpus 4
            }
        "#;
        assert!(parse_app_config(kdl).is_err());
    }

    #[test]
    fn test_build_timeout_bounds() {
        let kdl = r#"
            namespace "demo"
            build {
                timeout-minutes 1
            }
        "#;
        assert!(parse_app_config(kdl).is_err());
    }

    #[test]
    fn test_load_resolves_assets_relative_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dockyard.kdl");
        std::fs::write(
            &path,
            "namespace \"demo\"\nsource {\n    assets \"app\"\n}\n",
        )
        .unwrap();

        let config = load_app_config(&path).unwrap();
        assert_eq!(config.source.assets, Some(dir.path().join("app")));
    }

    #[test]
    fn test_sample_config_parses() {
        let config = parse_app_config(include_str!("../../../dockyard.kdl")).unwrap();
        assert_eq!(config.namespace.as_str(), "CICDPipelineAWSBatch");
        assert_eq!(config.environment.account, "123456789012");
        assert_eq!(config.compute.max_vcpus, 256);
        assert_eq!(config.trigger.image_policy, ImagePolicy::Latest);
        assert!(config.source.assets.is_none());
    }
}
