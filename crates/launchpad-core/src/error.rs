//! Error types for core Launchpad values.

use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised while validating identities, keys, and configuration.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid stack identity field `{field}`: {value:?} ({reason})")]
    InvalidIdentity {
        field: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("invalid resource kind {0:?}: segments must start with a lowercase letter")]
    InvalidResourceKind(String),

    #[error("resource name {name:?} exceeds {limit} characters")]
    NameTooLong { name: String, limit: usize },

    #[error("artifact key {key:?} does not match `{{application}}/{{build-id}}/{{archive}}.zip`")]
    InvalidArtifactKey { key: String },

    #[error("invalid duration {0:?}")]
    InvalidDuration(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
