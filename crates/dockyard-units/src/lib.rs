//! The four composition units of a dockyard delivery stack.
//!
//! Each unit declares its resources into a [`stack::UnitStack`], reading the
//! names its predecessors published and publishing its own. Units never
//! hold references to each other; the parameter store is the only channel.

pub mod build;
pub mod compute;
pub mod grants;
pub mod pipeline;
pub mod snapshot;
pub mod source;
pub mod stack;

use dockyard_config::AppConfig;
use dockyard_core::CompositionUnit;
use std::sync::Arc;

pub use build::BuildUnit;
pub use compute::ComputeTriggerUnit;
pub use pipeline::PipelineUnit;
pub use source::SourceUnit;
pub use stack::{UnitStack, stack_name};

/// Build every unit described by `config`.
pub fn units_for(config: &AppConfig) -> Vec<Arc<dyn CompositionUnit>> {
    let ns = &config.namespace;
    let env = &config.environment;
    vec![
        Arc::new(SourceUnit::new(ns.clone(), env.clone(), config.source.clone())),
        Arc::new(BuildUnit::new(ns.clone(), env.clone(), config.build.clone())),
        Arc::new(PipelineUnit::new(ns.clone(), config.source.branch.clone())),
        Arc::new(ComputeTriggerUnit::new(
            ns.clone(),
            env.clone(),
            config.compute.clone(),
            config.job.clone(),
            config.trigger.clone(),
        )),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use dockyard_core::{Namespace, UnitKind};

    #[test]
    fn test_units_for_covers_every_kind() {
        let config = AppConfig::new(Namespace::new("demo").unwrap());
        let units = units_for(&config);
        let kinds: Vec<UnitKind> = units.iter().map(|u| u.kind()).collect();
        assert_eq!(kinds, UnitKind::ALL.to_vec());
        assert_eq!(units[3].stack_name(), "demo-batch");
    }
}
