//! launchpad-artifacts — the artifact store binding.
//!
//! Resolves (or creates) one bucket per stack, named by
//! `StackIdentity::bucket_name`, and records object versions in the ledger.
//!
//! Every bucket this crate creates is versioned, encrypted at rest, and has
//! all public access blocked. Noncurrent versions expire after a retention
//! window (90 days unless configured otherwise).
//!
//! A bucket name already recorded under another owner is a
//! [`ArtifactError::NameConflict`]; it is never adopted.

pub mod error;
pub mod store;

pub use error::{ArtifactError, ArtifactResult};
pub use store::{ArtifactStore, BucketSettings, bucket_resource};
