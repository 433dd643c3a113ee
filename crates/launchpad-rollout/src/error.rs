//! Error types for rollouts.
//!
//! Every variant raised while a deployment runs names the stack, the
//! artifact and (where one is involved) the target.

use thiserror::Error;

use launchpad_core::CoreError;
use launchpad_iam::IamError;
use launchpad_state::StateError;

use crate::descriptor::LifecycleEvent;

pub type RolloutResult<T> = Result<T, RolloutError>;

#[derive(Debug, Error)]
pub enum RolloutError {
    #[error("artifact {artifact} not found for stack {stack}: {reason}")]
    ArtifactNotFound {
        stack: String,
        artifact: String,
        reason: String,
    },

    #[error("stack {stack}, artifact {artifact}: {source}")]
    TrustDenied {
        stack: String,
        artifact: String,
        #[source]
        source: IamError,
    },

    #[error("{event} on {target} exceeded its {timeout_secs}s timeout (stack {stack}, artifact {artifact})")]
    HookTimeout {
        stack: String,
        artifact: String,
        target: String,
        event: LifecycleEvent,
        timeout_secs: u64,
    },

    #[error("{event} on {target} failed: {reason} (stack {stack}, artifact {artifact})")]
    HookFailed {
        stack: String,
        artifact: String,
        target: String,
        event: LifecycleEvent,
        reason: String,
    },

    #[error("{target} did not become healthy after {probes} probes (stack {stack}, artifact {artifact})")]
    HealthCheckFailed {
        stack: String,
        artifact: String,
        target: String,
        probes: u32,
    },

    #[error("traffic control for {target} failed: {reason} (stack {stack}, artifact {artifact})")]
    TrafficControl {
        stack: String,
        artifact: String,
        target: String,
        reason: String,
    },

    #[error("no compute targets match {target} (stack {stack}, artifact {artifact})")]
    NoTargets {
        stack: String,
        artifact: String,
        target: String,
    },

    #[error("deployment group {application}/{group} is not registered")]
    UnknownDeploymentGroup { application: String, group: String },

    #[error("deployment {0} not found")]
    DeploymentNotFound(String),

    #[error("invalid deployment descriptor: {0}")]
    InvalidDescriptor(String),

    #[error(transparent)]
    Invalid(#[from] CoreError),

    #[error(transparent)]
    State(#[from] StateError),
}
