//! launchpad-core — shared types for the Launchpad deployment planner.
//!
//! Holds the values every other crate agrees on: the [`StackIdentity`] that
//! all resource names derive from, artifact references and their key layout,
//! topology and rollout policy shapes, the resource graph, and the
//! `launchpad.toml` configuration.

pub mod artifact;
pub mod config;
pub mod duration;
pub mod error;
pub mod identity;
pub mod model;
pub mod resource;

pub use artifact::{ArtifactKey, ArtifactRef};
pub use config::LaunchpadConfig;
pub use duration::parse_duration;
pub use error::{CoreError, CoreResult};
pub use identity::StackIdentity;
pub use model::*;
pub use resource::*;
