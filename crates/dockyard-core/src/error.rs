//! Error types for dockyard.

use thiserror::Error;

use crate::unit::UnitKind;

#[derive(Debug, Error)]
pub enum Error {
    /// A consumer asked for a parameter its producer has not published yet.
    #[error("unresolved predecessor: parameter '{key}' has not been published")]
    UnresolvedParameter { key: String },

    #[error("parameter collision: '{key}' is owned by '{owner}', refusing publish from '{claimant}'")]
    ParameterCollision {
        key: String,
        owner: String,
        claimant: String,
    },

    #[error("ordering violation: '{unit}' requires '{predecessor}' to be provisioned")]
    OrderViolation {
        unit: UnitKind,
        predecessor: UnitKind,
    },

    #[error("cycle detected in unit dependencies: {0}")]
    CycleDetected(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("job submission failed: {0}")]
    SubmissionFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
