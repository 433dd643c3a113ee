//! Provisioning error types.

use thiserror::Error;

use launchpad_artifacts::ArtifactError;
use launchpad_core::CoreError;
use launchpad_iam::IamError;
use launchpad_state::StateError;
use launchpad_topology::TopologyError;

pub type ProvisionResult<T> = Result<T, ProvisionError>;

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("resource {name} already exists and is owned by {owner}")]
    NameConflict { name: String, owner: String },

    #[error("invalid stack configuration: {0}")]
    Invalid(#[from] CoreError),

    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error(transparent)]
    Trust(#[from] IamError),

    #[error("duplicate resource {0} in stack plan")]
    DuplicateResource(String),

    #[error("artifact store error: {0}")]
    Artifacts(#[source] ArtifactError),

    #[error("ledger error: {0}")]
    State(#[source] StateError),
}

impl From<StateError> for ProvisionError {
    fn from(e: StateError) -> Self {
        match e {
            StateError::NameConflict { name, owner, .. } => ProvisionError::NameConflict { name, owner },
            other => ProvisionError::State(other),
        }
    }
}

impl From<ArtifactError> for ProvisionError {
    fn from(e: ArtifactError) -> Self {
        match e {
            ArtifactError::NameConflict { bucket, owner } => {
                ProvisionError::NameConflict { name: bucket, owner }
            }
            ArtifactError::Core(e) => ProvisionError::Invalid(e),
            ArtifactError::State(e) => e.into(),
            other => ProvisionError::Artifacts(other),
        }
    }
}
