//! launchpad-state — the resource ledger for Launchpad.
//!
//! Backed by [redb](https://docs.rs/redb), records which resources each stack
//! owns, the version history of artifact objects, and deployment records.
//!
//! # Architecture
//!
//! All values are JSON-serialized into redb's `&[u8]` value columns.
//! Resources are keyed by their deterministic name, objects by
//! `{bucket}/{key}`, deployments by id.
//!
//! Changesets are committed in a single write transaction after ownership
//! checks, so a name conflict leaves the ledger untouched.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
