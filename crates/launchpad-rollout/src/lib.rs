//! launchpad-rollout — deploys revisions to compute targets.
//!
//! # Architecture
//!
//! ```text
//! RolloutCoordinator::deploy()
//!   ├── preflight: policy, deploy/compute trust, artifact head
//!   ├── FleetInventory::resolve()   target → members, at start time
//!   └── per batch (Rollout state machine)
//!         └── per member, concurrently
//!               BeforeInstall → AfterInstall
//!               → [deregister] → ApplicationStop → ApplicationStart
//!               → ValidateService → [health gate → register]
//! ```
//!
//! Steps in brackets only run for traffic-controlled policies. Hooks run
//! through a [`HookRunner`]; [`ScriptHookRunner`] executes them as local
//! shell scripts. Progress is published through [`DeploymentHandle`], an
//! optional [`DeploymentCallback`], and the state ledger.

pub mod controller;
pub mod coordinator;
pub mod deployment;
pub mod descriptor;
pub mod error;
pub mod hooks;
pub mod script;

pub use controller::{BatchAction, Rollout, RolloutPhase, batch_count};
pub use coordinator::{DEFAULT_MAX_PROBES, DeploymentGroup, DeploymentHandle, RolloutCoordinator};
pub use deployment::{
    DeploymentInfo, DeploymentStatus, Step, StepOutcome, StepRecord, TargetState, TargetStatus,
};
pub use descriptor::{AppSpec, FileMapping, HookSpec, LifecycleEvent, RunAs};
pub use error::{RolloutError, RolloutResult};
pub use hooks::{
    BoxFuture, DeploymentCallback, FleetInventory, HookContext, HookRunner, TrafficControl,
};
pub use script::ScriptHookRunner;
