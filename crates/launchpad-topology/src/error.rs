//! Error types for topology materialization.

use thiserror::Error;

use launchpad_core::CoreError;

pub type TopologyResult<T> = Result<T, TopologyError>;

#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("invalid topology: {0}")]
    Invalid(#[from] CoreError),

    #[error("resource {resource} references missing {reference}")]
    DanglingReference { resource: String, reference: String },

    #[error("resource name {0} emitted twice")]
    DuplicateName(String),
}
