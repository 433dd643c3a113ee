//! Rollout coordinator — accepts deployments and drives them to completion.
//!
//! Preflight checks (policy, trust, artifact presence) run before anything is
//! recorded. A deployment that passes is persisted, handed back as a
//! [`DeploymentHandle`], and driven by a background task that resolves the
//! target's members, walks them batch by batch through the
//! [`Rollout`](crate::controller::Rollout) state machine, and runs each
//! member's lifecycle.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::{RwLock, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use launchpad_artifacts::{ArtifactError, ArtifactStore};
use launchpad_core::{
    ArtifactRef, CoreError, DeploymentTarget, HealthCheckSpec, RolloutPolicy, StackIdentity,
};
use launchpad_health::health_gate;
use launchpad_iam::actor::{CODEDEPLOY_CREATE_DEPLOYMENT, S3_GET_OBJECT, S3_GET_OBJECT_VERSION};
use launchpad_iam::{ActorKind, StackArns, TrustBinding, grant};
use launchpad_state::StateStore;

use crate::controller::{Rollout, RolloutPhase};
use crate::deployment::*;
use crate::descriptor::{AppSpec, LifecycleEvent};
use crate::error::{RolloutError, RolloutResult};
use crate::hooks::*;

/// Probes issued before a target's health gate gives up.
pub const DEFAULT_MAX_PROBES: u32 = 10;

/// A deployment group the coordinator can deploy to by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentGroup {
    pub application: String,
    pub name: String,
    pub target: DeploymentTarget,
    pub policy: RolloutPolicy,
}

/// Caller's view of a running deployment.
pub struct DeploymentHandle {
    id: String,
    info: watch::Receiver<DeploymentInfo>,
    cancel: Arc<watch::Sender<bool>>,
}

impl DeploymentHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Latest snapshot.
    pub fn info(&self) -> DeploymentInfo {
        self.info.borrow().clone()
    }

    /// Wait until the deployment reaches a terminal status.
    pub async fn wait(&mut self) -> DeploymentInfo {
        let done = self
            .info
            .wait_for(|i| i.status.is_terminal())
            .await
            .map(|info| info.clone());
        match done {
            Ok(info) => info,
            Err(_) => self.info.borrow().clone(),
        }
    }

    /// Stop scheduling further targets. In-flight targets finish.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }
}

struct Slot {
    info: Arc<watch::Sender<DeploymentInfo>>,
    cancel: Arc<watch::Sender<bool>>,
}

type Registry = Arc<RwLock<HashMap<String, Slot>>>;

pub struct RolloutCoordinator {
    stack: StackIdentity,
    application: String,
    arns: StackArns,
    deploy_binding: TrustBinding,
    compute_binding: TrustBinding,
    appspec: Arc<AppSpec>,
    health_check: HealthCheckSpec,
    max_probes: u32,
    hooks: Arc<dyn HookRunner>,
    inventory: Arc<dyn FleetInventory>,
    traffic: Option<Arc<dyn TrafficControl>>,
    artifacts: Option<ArtifactStore>,
    state: Option<StateStore>,
    on_change: Option<DeploymentCallback>,
    groups: HashMap<(String, String), DeploymentGroup>,
    deployments: Registry,
    sequence: AtomicU64,
}

impl RolloutCoordinator {
    /// Create a coordinator for `application` on `stack`, acting with the
    /// stack's deploy and compute grants.
    pub fn new(
        stack: StackIdentity,
        application: &str,
        hooks: Arc<dyn HookRunner>,
        inventory: Arc<dyn FleetInventory>,
    ) -> RolloutResult<Self> {
        let trust = |source| RolloutError::TrustDenied {
            stack: stack.to_string(),
            artifact: "-".to_string(),
            source,
        };
        let deploy_binding = grant(ActorKind::Deploy, &stack, application).map_err(trust)?;
        let compute_binding = grant(ActorKind::Compute, &stack, application).map_err(trust)?;
        let arns = StackArns::new(&stack).map_err(trust)?;

        Ok(Self {
            arns,
            deploy_binding,
            compute_binding,
            appspec: Arc::new(AppSpec::default_for(application)),
            health_check: HealthCheckSpec {
                path: "/healthz".to_string(),
                port: 8080,
                interval_secs: 30,
                timeout_secs: 5,
                healthy_threshold: 2,
                unhealthy_threshold: 2,
            },
            max_probes: DEFAULT_MAX_PROBES,
            hooks,
            inventory,
            traffic: None,
            artifacts: None,
            state: None,
            on_change: None,
            groups: HashMap::new(),
            deployments: Arc::new(RwLock::new(HashMap::new())),
            sequence: AtomicU64::new(0),
            application: application.to_string(),
            stack,
        })
    }

    pub fn with_descriptor(mut self, appspec: AppSpec) -> Self {
        self.appspec = Arc::new(appspec);
        self
    }

    pub fn with_health_check(mut self, spec: HealthCheckSpec, max_probes: u32) -> Self {
        self.health_check = spec;
        self.max_probes = max_probes.max(1);
        self
    }

    pub fn with_traffic_control(mut self, traffic: Arc<dyn TrafficControl>) -> Self {
        self.traffic = Some(traffic);
        self
    }

    /// Check artifacts against this store before deploying.
    pub fn with_artifacts(mut self, store: ArtifactStore) -> Self {
        self.artifacts = Some(store);
        self
    }

    /// Persist deployment records.
    pub fn with_state(mut self, state: StateStore) -> Self {
        self.state = Some(state);
        self
    }

    /// Replace the derived deploy and compute bindings.
    pub fn with_trust(mut self, deploy: TrustBinding, compute: TrustBinding) -> Self {
        self.deploy_binding = deploy;
        self.compute_binding = compute;
        self
    }

    pub fn with_callback(mut self, callback: DeploymentCallback) -> Self {
        self.on_change = Some(callback);
        self
    }

    pub fn register_group(&mut self, group: DeploymentGroup) {
        self.groups
            .insert((group.application.clone(), group.name.clone()), group);
    }

    /// Trigger a deployment of `artifact` to a registered group.
    ///
    /// Returns the deployment id as soon as the deployment is accepted; poll
    /// [`Self::get_deployment`] or [`Self::wait`] for the outcome.
    pub async fn create_deployment(
        &self,
        application: &str,
        deployment_group: &str,
        artifact: ArtifactRef,
        ignore_stop_failures: bool,
    ) -> RolloutResult<String> {
        let group = self
            .groups
            .get(&(application.to_string(), deployment_group.to_string()))
            .ok_or_else(|| RolloutError::UnknownDeploymentGroup {
                application: application.to_string(),
                group: deployment_group.to_string(),
            })?;
        let group_arn = self.group_arn(group);
        let handle = self
            .start(
                artifact,
                group.target.clone(),
                group.policy,
                ignore_stop_failures,
                &group_arn,
            )
            .await?;
        Ok(handle.id)
    }

    /// Deploy `artifact` to `target` under `policy`.
    pub async fn deploy(
        &self,
        artifact: ArtifactRef,
        target: DeploymentTarget,
        policy: RolloutPolicy,
    ) -> RolloutResult<DeploymentHandle> {
        let group_arn = self.arns.deployment_group.clone();
        self.start(artifact, target, policy, false, &group_arn).await
    }

    /// Latest known state of a deployment, from memory or the ledger.
    pub async fn get_deployment(&self, id: &str) -> RolloutResult<Option<DeploymentInfo>> {
        if let Some(slot) = self.deployments.read().await.get(id) {
            return Ok(Some(slot.info.borrow().clone()));
        }
        match &self.state {
            Some(state) => Ok(state.get_deployment(id)?),
            None => Ok(None),
        }
    }

    /// Wait for a deployment started by this coordinator to finish.
    pub async fn wait(&self, id: &str) -> RolloutResult<DeploymentInfo> {
        let rx = self
            .deployments
            .read()
            .await
            .get(id)
            .map(|slot| slot.info.subscribe());
        match rx {
            Some(mut rx) => {
                let done = rx
                    .wait_for(|i| i.status.is_terminal())
                    .await
                    .map(|info| info.clone());
                match done {
                    Ok(info) => Ok(info),
                    Err(_) => Ok(rx.borrow().clone()),
                }
            }
            None => self
                .get_deployment(id)
                .await?
                .ok_or_else(|| RolloutError::DeploymentNotFound(id.to_string())),
        }
    }

    /// Cancel a deployment between target completions. Cancelling a
    /// finished deployment is a no-op.
    pub async fn cancel(&self, id: &str) -> RolloutResult<()> {
        if let Some(slot) = self.deployments.read().await.get(id) {
            slot.cancel.send_replace(true);
            info!(deployment = %id, "cancel requested");
            return Ok(());
        }
        match self.get_deployment(id).await? {
            Some(_) => Ok(()),
            None => Err(RolloutError::DeploymentNotFound(id.to_string())),
        }
    }

    /// Ids of deployments still held in memory.
    pub async fn active_deployments(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.deployments.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// ARN of a registered group. Groups of this coordinator's application
    /// live in the stack's deploy application; any other application name is
    /// taken as the deploy application itself.
    fn group_arn(&self, group: &DeploymentGroup) -> String {
        let application = if group.application == self.application {
            self.stack.deploy_application_name()
        } else {
            group.application.clone()
        };
        self.arns.deployment_group_in(&application, &group.name)
    }

    async fn start(
        &self,
        artifact: ArtifactRef,
        target: DeploymentTarget,
        policy: RolloutPolicy,
        ignore_stop_failures: bool,
        group_arn: &str,
    ) -> RolloutResult<DeploymentHandle> {
        policy.validate()?;
        let traffic = if policy.traffic_control {
            Some(self.traffic.clone().ok_or_else(|| {
                CoreError::InvalidConfig(
                    "traffic control requested but no load balancer is wired".to_string(),
                )
            })?)
        } else {
            None
        };
        self.preflight(&artifact, group_arn)?;

        let id = self.next_id();
        let info = DeploymentInfo {
            id: id.clone(),
            stack: self.stack.clone(),
            artifact: artifact.clone(),
            target: target.clone(),
            policy,
            ignore_stop_failures,
            status: DeploymentStatus::Created,
            targets: Vec::new(),
            error: None,
            created_at: epoch_secs(),
            completed_at: None,
        };
        if let Some(state) = &self.state {
            state.put_deployment(&id, &info)?;
        }

        let (info_tx, info_rx) = watch::channel(info);
        let info_tx = Arc::new(info_tx);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let cancel_tx = Arc::new(cancel_tx);

        self.deployments.write().await.insert(
            id.clone(),
            Slot {
                info: info_tx.clone(),
                cancel: cancel_tx.clone(),
            },
        );

        let execution = Arc::new(Execution {
            id: id.clone(),
            stack: self.stack.to_string(),
            artifact,
            target,
            policy,
            ignore_stop_failures,
            appspec: self.appspec.clone(),
            health_check: self.health_check.clone(),
            max_probes: self.max_probes,
            hooks: self.hooks.clone(),
            inventory: self.inventory.clone(),
            traffic,
            state: self.state.clone(),
            on_change: self.on_change.clone(),
            info: info_tx,
            registry: self.state.as_ref().map(|_| self.deployments.clone()),
        });

        info!(
            deployment = %id,
            stack = %self.stack,
            artifact = %execution.artifact,
            target = %execution.target,
            "deployment created"
        );
        tokio::spawn(execution.drive(cancel_rx));

        Ok(DeploymentHandle {
            id,
            info: info_rx,
            cancel: cancel_tx,
        })
    }

    /// Trust and artifact checks. Nothing is recorded if these fail.
    fn preflight(&self, artifact: &ArtifactRef, group_arn: &str) -> RolloutResult<()> {
        let stack = self.stack.to_string();
        let artifact_label = artifact.to_string();
        let trust = |source| RolloutError::TrustDenied {
            stack: stack.clone(),
            artifact: artifact_label.clone(),
            source,
        };
        let not_found = |reason: String| RolloutError::ArtifactNotFound {
            stack: stack.clone(),
            artifact: artifact_label.clone(),
            reason,
        };

        self.deploy_binding
            .authorize(CODEDEPLOY_CREATE_DEPLOYMENT, group_arn)
            .map_err(trust)?;

        artifact
            .artifact_key()
            .map_err(|e| not_found(e.to_string()))?;

        match &self.artifacts {
            Some(store) => match store.head(artifact) {
                Ok(version) => {
                    debug!(artifact = %artifact_label, version = %version.version_id, "artifact resolved");
                }
                Err(ArtifactError::ArtifactNotFound { reason, .. }) => return Err(not_found(reason)),
                Err(ArtifactError::State(e)) => return Err(e.into()),
                Err(other) => return Err(not_found(other.to_string())),
            },
            None => {
                let bucket = self.stack.bucket_name()?;
                if artifact.bucket != bucket {
                    return Err(not_found(format!("expected bucket {bucket}")));
                }
            }
        }

        let read = if artifact.version_id.is_some() {
            S3_GET_OBJECT_VERSION
        } else {
            S3_GET_OBJECT
        };
        self.compute_binding
            .authorize(read, &self.arns.object(&artifact.key))
            .map_err(trust)?;
        Ok(())
    }

    fn next_id(&self) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        format!("d-{millis:x}-{seq:04}")
    }
}

/// One deployment being driven.
struct Execution {
    id: String,
    stack: String,
    artifact: ArtifactRef,
    target: DeploymentTarget,
    policy: RolloutPolicy,
    ignore_stop_failures: bool,
    appspec: Arc<AppSpec>,
    health_check: HealthCheckSpec,
    max_probes: u32,
    hooks: Arc<dyn HookRunner>,
    inventory: Arc<dyn FleetInventory>,
    traffic: Option<Arc<dyn TrafficControl>>,
    state: Option<StateStore>,
    on_change: Option<DeploymentCallback>,
    info: Arc<watch::Sender<DeploymentInfo>>,
    /// Set when finished deployments can be read back from the ledger.
    registry: Option<Registry>,
}

impl Execution {
    fn update(&self, f: impl FnOnce(&mut DeploymentInfo)) {
        self.info.send_modify(|info| {
            f(info);
            if let Some(callback) = &self.on_change {
                callback(info);
            }
        });
    }

    fn persist(&self) -> bool {
        let Some(state) = &self.state else {
            return false;
        };
        let snapshot = self.info.borrow().clone();
        match state.put_deployment(&self.id, &snapshot) {
            Ok(()) => true,
            Err(e) => {
                warn!(deployment = %self.id, error = %e, "failed to persist deployment record");
                false
            }
        }
    }

    fn step(&self, target: &str, step: Step, outcome: StepOutcome) {
        self.update(|info| {
            if let Some(t) = info.target_mut(target) {
                t.steps.push(StepRecord { step, outcome });
            }
        });
    }

    async fn drive(self: Arc<Self>, cancel: watch::Receiver<bool>) {
        let members = match self.inventory.resolve(&self.target).await {
            Ok(members) if !members.is_empty() => members,
            Ok(_) => {
                let err = RolloutError::NoTargets {
                    stack: self.stack.clone(),
                    artifact: self.artifact.to_string(),
                    target: self.target.to_string(),
                };
                return self.finish(DeploymentStatus::Failed, Some(err.to_string())).await;
            }
            Err(e) => {
                let reason = format!("resolving {} failed: {e:#}", self.target);
                return self.finish(DeploymentStatus::Failed, Some(reason)).await;
            }
        };

        self.update(|info| {
            info.status = DeploymentStatus::InProgress;
            info.targets = members.iter().map(|m| TargetState::pending(m)).collect();
        });
        self.persist();

        let mut rollout = Rollout::new(&self.id, self.policy, members.len() as u32);
        rollout.start();

        while let Some(batch) = rollout.advance() {
            if *cancel.borrow() {
                rollout.cancel();
                break;
            }

            let start = batch.start_index as usize;
            let slice = &members[start..start + batch.count as usize];
            let mut set = JoinSet::new();
            for member in slice {
                let execution = self.clone();
                let member = member.clone();
                set.spawn(async move { execution.run_target(&member).await });
            }

            let mut failed = 0;
            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok(Ok(())) => {}
                    Ok(Err(_)) => failed += 1,
                    Err(e) => {
                        error!(deployment = %self.id, error = %e, "target task aborted");
                        failed += 1;
                    }
                }
            }

            // A task that died mid-lifecycle leaves its target InProgress.
            self.update(|info| {
                for t in info.targets.iter_mut().skip(start).take(slice.len()) {
                    if t.status == TargetStatus::InProgress {
                        t.status = TargetStatus::Failed;
                        t.error = Some("lifecycle task aborted".to_string());
                    }
                }
            });
            self.persist();
            rollout.record_batch(failed);
        }

        let (status, reason) = match &rollout.phase {
            RolloutPhase::Completed if rollout.failed == 0 => (DeploymentStatus::Succeeded, None),
            RolloutPhase::Completed => (
                DeploymentStatus::Failed,
                Some(format!("{} target(s) failed", rollout.failed)),
            ),
            RolloutPhase::Halted { reason } => (DeploymentStatus::Failed, Some(reason.clone())),
            RolloutPhase::Cancelled => (DeploymentStatus::Stopped, Some("cancelled".to_string())),
            other => (
                DeploymentStatus::Failed,
                Some(format!("rollout ended in phase {other:?}")),
            ),
        };
        self.finish(status, reason).await;
    }

    async fn finish(&self, status: DeploymentStatus, reason: Option<String>) {
        self.update(|info| {
            if status == DeploymentStatus::Stopped {
                for t in info.targets.iter_mut().filter(|t| t.status == TargetStatus::Pending) {
                    t.status = TargetStatus::Stopped;
                }
            }
            info.status = status;
            info.error = reason.clone();
            info.completed_at = Some(epoch_secs());
        });
        let persisted = self.persist();

        match status {
            DeploymentStatus::Succeeded => info!(deployment = %self.id, "deployment succeeded"),
            _ => warn!(
                deployment = %self.id,
                ?status,
                stack = %self.stack,
                artifact = %self.artifact,
                reason = reason.as_deref().unwrap_or(""),
                "deployment finished without success"
            ),
        }

        // The ledger answers for this deployment from here on.
        if persisted && let Some(registry) = &self.registry {
            registry.write().await.remove(&self.id);
            debug!(deployment = %self.id, "released finished deployment");
        }
    }

    async fn run_target(&self, target: &str) -> RolloutResult<()> {
        self.update(|info| {
            if let Some(t) = info.target_mut(target) {
                t.status = TargetStatus::InProgress;
            }
        });
        info!(deployment = %self.id, %target, "target lifecycle started");

        let result = self.lifecycle(target).await;

        self.update(|info| {
            if let Some(t) = info.target_mut(target) {
                match &result {
                    Ok(()) => t.status = TargetStatus::Succeeded,
                    Err(e) => {
                        t.status = TargetStatus::Failed;
                        t.error = Some(e.to_string());
                    }
                }
            }
        });
        match &result {
            Ok(()) => info!(deployment = %self.id, %target, "target succeeded"),
            Err(e) => warn!(deployment = %self.id, %target, error = %e, "target failed"),
        }
        result
    }

    async fn lifecycle(&self, target: &str) -> RolloutResult<()> {
        for event in LifecycleEvent::ORDER {
            if event == LifecycleEvent::ApplicationStop
                && let Some(traffic) = &self.traffic
            {
                if let Err(e) = traffic.deregister(target).await {
                    self.step(target, Step::Deregister, StepOutcome::Failed);
                    return Err(self.traffic_error(target, e));
                }
                self.step(target, Step::Deregister, StepOutcome::Succeeded);
            }

            let Some(hook) = self.appspec.hook(event) else {
                self.step(target, Step::Hook(event), StepOutcome::Skipped);
                continue;
            };

            let ctx = HookContext {
                deployment_id: self.id.clone(),
                target_id: target.to_string(),
                event,
                hook: hook.clone(),
                artifact: self.artifact.clone(),
            };
            let failure = match tokio::time::timeout(hook.timeout, self.hooks.run(&ctx)).await {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(RolloutError::HookFailed {
                    stack: self.stack.clone(),
                    artifact: self.artifact.to_string(),
                    target: target.to_string(),
                    event,
                    reason: format!("{e:#}"),
                }),
                Err(_) => Some(RolloutError::HookTimeout {
                    stack: self.stack.clone(),
                    artifact: self.artifact.to_string(),
                    target: target.to_string(),
                    event,
                    timeout_secs: hook.timeout.as_secs(),
                }),
            };

            match failure {
                None => self.step(target, Step::Hook(event), StepOutcome::Succeeded),
                Some(e) if event == LifecycleEvent::ApplicationStop && self.ignore_stop_failures => {
                    warn!(deployment = %self.id, %target, error = %e, "ignoring stop failure");
                    self.step(target, Step::Hook(event), StepOutcome::Ignored);
                }
                Some(e) => {
                    self.step(target, Step::Hook(event), StepOutcome::Failed);
                    return Err(e);
                }
            }
        }

        if let Some(traffic) = &self.traffic {
            let outcome =
                health_gate(&self.health_check, self.max_probes, || traffic.probe(target)).await;
            if !outcome.passed() {
                self.step(target, Step::HealthCheck, StepOutcome::Failed);
                return Err(RolloutError::HealthCheckFailed {
                    stack: self.stack.clone(),
                    artifact: self.artifact.to_string(),
                    target: target.to_string(),
                    probes: outcome.probes,
                });
            }
            self.step(target, Step::HealthCheck, StepOutcome::Succeeded);

            if let Err(e) = traffic.register(target).await {
                self.step(target, Step::Register, StepOutcome::Failed);
                return Err(self.traffic_error(target, e));
            }
            self.step(target, Step::Register, StepOutcome::Succeeded);
        }

        Ok(())
    }

    fn traffic_error(&self, target: &str, e: anyhow::Error) -> RolloutError {
        RolloutError::TrafficControl {
            stack: self.stack.clone(),
            artifact: self.artifact.to_string(),
            target: target.to_string(),
            reason: format!("{e:#}"),
        }
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
