//! KDL configuration parsing for dockyard.
//!
//! A `dockyard.kdl` file names the namespace of one deployed instance and
//! tunes the units that make it up. Every section is optional except the
//! namespace.

pub mod app;
pub mod error;

pub use app::{
    AppConfig, BuildSettings, ComputeSettings, JobSettings, SourceSettings, TriggerSettings,
    load_app_config, parse_app_config,
};
pub use error::{ConfigError, ConfigResult};
