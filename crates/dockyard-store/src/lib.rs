//! Parameter store backends for dockyard.
//!
//! Provides `ParameterStore` implementations:
//! - In-memory (tests, API server)
//! - JSON file (CLI, survives between invocations)

pub mod file;
pub mod memory;

pub use file::FileParameterStore;
pub use memory::InMemoryParameterStore;
