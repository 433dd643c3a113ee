//! launchpad-iam — identity and trust fabric.
//!
//! Derives one role per actor for a stack, each holding only the actions
//! its responsibility needs:
//!
//! | actor | may |
//! |---|---|
//! | pipeline | read/write artifacts, start builds, create deployments |
//! | build | read/write its own `{application}/` prefix, write logs |
//! | deploy | create/get/list deployments of this stack's group |
//! | compute | read artifacts, agent check-in, write `instances/{application}/` |
//!
//! CI jobs reach the pipeline permissions through [`FederatedTrust`], which
//! exchanges an OIDC token pinned to one repository and branch (or
//! environment) for a short-lived session.

pub mod actor;
pub mod binding;
pub mod error;
pub mod federation;

pub use actor::{ActorKind, is_store_write, minimal_actions};
pub use binding::{StackArns, Statement, TrustBinding, grant};
pub use error::{IamError, IamResult};
pub use federation::{FederatedSession, FederatedTrust, SubjectScope, WebIdentityClaims};
