//! Seams to the outside world: hook execution, load balancer registration,
//! and deploy-time target resolution.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use launchpad_core::{ArtifactRef, DeploymentTarget};
use launchpad_health::ProbeResult;

use crate::deployment::DeploymentInfo;
use crate::descriptor::{HookSpec, LifecycleEvent};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What a hook runner needs to run one script on one target.
#[derive(Debug, Clone)]
pub struct HookContext {
    pub deployment_id: String,
    pub target_id: String,
    pub event: LifecycleEvent,
    pub hook: HookSpec,
    pub artifact: ArtifactRef,
}

/// Runs lifecycle scripts on targets.
pub trait HookRunner: Send + Sync {
    fn run<'a>(&'a self, ctx: &'a HookContext) -> BoxFuture<'a, anyhow::Result<()>>;
}

/// Load balancer registration for traffic-controlled rollouts.
pub trait TrafficControl: Send + Sync {
    fn deregister<'a>(&'a self, target_id: &'a str) -> BoxFuture<'a, anyhow::Result<()>>;

    fn register<'a>(&'a self, target_id: &'a str) -> BoxFuture<'a, anyhow::Result<()>>;

    /// One health probe against the target's health path.
    fn probe<'a>(&'a self, target_id: &'a str) -> BoxFuture<'a, ProbeResult>;
}

/// Resolves a deployment target to concrete members when a deployment starts.
pub trait FleetInventory: Send + Sync {
    fn resolve<'a>(&'a self, target: &'a DeploymentTarget)
    -> BoxFuture<'a, anyhow::Result<Vec<String>>>;
}

/// Invoked synchronously on every deployment state change.
pub type DeploymentCallback = Arc<dyn Fn(&DeploymentInfo) + Send + Sync>;
