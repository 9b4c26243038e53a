//! Core domain types and traits for dockyard.
//!
//! dockyard declares a continuous-delivery stack for containerized batch
//! jobs as four composition units wired together through a namespaced
//! parameter exchange. This crate contains:
//! - Namespaces and parameter keys, plus the `ParameterStore` trait
//! - Resource descriptors
//! - Composition unit kinds and the `CompositionUnit` trait
//! - Registry events, event rules and the `JobSubmitter` trait

pub mod environment;
pub mod error;
pub mod event;
pub mod id;
pub mod job;
pub mod namespace;
pub mod parameter;
pub mod resource;
pub mod unit;

pub use environment::TargetEnvironment;
pub use error::{Error, Result};
pub use id::ResourceId;
pub use namespace::Namespace;
pub use parameter::{LogicalName, Parameter, ParameterDraft, ParameterKey, ParameterStore};
pub use unit::{CompositionUnit, Deployment, ProvisionedUnit, UnitKind};
