//! launchpad-topology — the topology selector.
//!
//! Turns a [`Topology`](launchpad_core::Topology) and a
//! [`StackIdentity`](launchpad_core::StackIdentity) into a complete resource
//! graph plus the [`DeploymentTarget`](launchpad_core::DeploymentTarget)
//! the rollout coordinator addresses.
//!
//! # Shapes
//!
//! ```text
//! single-instance        web-sg ── web
//!
//! fixed-fleet-behind-lb  lb-sg ── lb ── listener ── tg ── webN-attach ── webN
//!                        web-sg (ingress from lb-sg only)
//!
//! auto-scaled-behind-lb  lb-sg ── lb ── listener ── tg ◄── asg ── lt
//!                        web-sg (ingress from lb-sg only)
//! ```
//!
//! Materialization is a pure function: the same inputs always produce the
//! same graph, so re-applying it is a no-op.

pub mod error;
pub mod select;

pub use error::{TopologyError, TopologyResult};
pub use select::{
    ComputeProfile, GraphExt, Materialized, TARGET_TAG, materialize,
};
