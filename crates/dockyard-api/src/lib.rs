//! HTTP API for dockyard.
//!
//! Serves parameter lookups for the provisioned namespace and accepts
//! registry events, turning matches into job submissions.

pub mod error;
pub mod routes;
pub mod state;

pub use state::AppState;
