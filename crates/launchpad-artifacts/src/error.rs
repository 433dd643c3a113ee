//! Error types for the artifact store binding.

use launchpad_core::CoreError;
use launchpad_state::StateError;
use thiserror::Error;

pub type ArtifactResult<T> = Result<T, ArtifactError>;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("bucket {bucket} already exists and is owned by {owner}")]
    NameConflict { bucket: String, owner: String },

    #[error("artifact s3://{bucket}/{key} not found: {reason}")]
    ArtifactNotFound {
        bucket: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("ledger error: {0}")]
    State(#[source] StateError),
}

impl From<StateError> for ArtifactError {
    fn from(e: StateError) -> Self {
        match e {
            StateError::NameConflict { name, owner, .. } => ArtifactError::NameConflict {
                bucket: name,
                owner,
            },
            other => ArtifactError::State(other),
        }
    }
}
