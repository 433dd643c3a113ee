//! Error types for grants and federation.

use thiserror::Error;

use launchpad_core::CoreError;

pub type IamResult<T> = Result<T, IamError>;

#[derive(Debug, Error)]
pub enum IamError {
    #[error("trust denied: {actor} role {role} lacks `{action}` on {resource} ({reason})")]
    TrustDenied {
        actor: String,
        role: String,
        action: String,
        resource: String,
        reason: String,
    },

    #[error("invalid federation config: {0}")]
    InvalidFederation(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}
