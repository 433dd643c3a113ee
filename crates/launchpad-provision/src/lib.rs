//! launchpad-provision — whole-stack provisioning against the ledger.
//!
//! # Architecture
//!
//! ```text
//! LaunchpadConfig ──► StackInputs ──► plan_stack() ──► StackPlan.graph
//!                                          │
//!     bucket, four actor roles, instance profile, topology,
//!     deploy application + group, build project, pipeline, [CI role]
//!
//! Provisioner::plan()   graph vs. ledger ──► ChangeSet (+ ~ = -)
//! Provisioner::apply()  ChangeSet ──► one ledger write transaction
//! ```
//!
//! Applying the same inputs twice writes nothing the second time. Switching
//! topology deletes the resources of the old shape in the same transaction
//! that creates the new one.

pub mod apply;
pub mod error;
pub mod plan;

pub use apply::{ApplyReport, ChangeAction, ChangeSet, Provisioner, ResourceChange};
pub use error::{ProvisionError, ProvisionResult};
pub use plan::{COMPUTE_PROFILE_KIND, StackInputs, StackPlan, plan_stack};
