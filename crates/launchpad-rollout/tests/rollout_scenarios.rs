//! Rollout scenarios.
//!
//! Drives the coordinator end to end with recording doubles for hooks,
//! load balancer registration and fleet resolution. Clocks are paused so
//! hook delays and health check intervals cost nothing.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use launchpad_artifacts::{ArtifactStore, BucketSettings};
use launchpad_core::*;
use launchpad_health::ProbeResult;
use launchpad_iam::{ActorKind, grant};
use launchpad_rollout::*;
use launchpad_state::StateStore;

// ── Doubles ───────────────────────────────────────────────────────

#[derive(Clone, Default)]
struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    fn push(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }

    fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    fn for_target(&self, target: &str) -> Vec<String> {
        let prefix = format!("{target} ");
        self.entries()
            .into_iter()
            .filter_map(|e| e.strip_prefix(&prefix).map(str::to_string))
            .collect()
    }
}

enum Fault {
    Fail,
    Hang,
}

struct RecordingHooks {
    journal: Journal,
    step: Duration,
    faults: HashMap<(String, LifecycleEvent), Fault>,
}

impl HookRunner for RecordingHooks {
    fn run<'a>(&'a self, ctx: &'a HookContext) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            self.journal.push(format!("{} {}", ctx.target_id, ctx.event));
            match self.faults.get(&(ctx.target_id.clone(), ctx.event)) {
                Some(Fault::Fail) => anyhow::bail!("{} exited with status 1", ctx.hook.location),
                Some(Fault::Hang) => {
                    tokio::time::sleep(Duration::from_secs(7200)).await;
                    Ok(())
                }
                None => {
                    tokio::time::sleep(self.step).await;
                    Ok(())
                }
            }
        })
    }
}

struct RecordingTraffic {
    journal: Journal,
    unhealthy: HashSet<String>,
}

impl TrafficControl for RecordingTraffic {
    fn deregister<'a>(&'a self, target_id: &'a str) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            self.journal.push(format!("{target_id} deregister"));
            Ok(())
        })
    }

    fn register<'a>(&'a self, target_id: &'a str) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            self.journal.push(format!("{target_id} register"));
            Ok(())
        })
    }

    fn probe<'a>(&'a self, target_id: &'a str) -> BoxFuture<'a, ProbeResult> {
        Box::pin(async move {
            self.journal.push(format!("{target_id} probe"));
            if self.unhealthy.contains(target_id) {
                ProbeResult::Failed
            } else {
                ProbeResult::Healthy
            }
        })
    }
}

struct FixedFleet(Vec<String>);

impl FleetInventory for FixedFleet {
    fn resolve<'a>(
        &'a self,
        _target: &'a DeploymentTarget,
    ) -> BoxFuture<'a, anyhow::Result<Vec<String>>> {
        Box::pin(async move { Ok(self.0.clone()) })
    }
}

// ── Fixtures ──────────────────────────────────────────────────────

fn stack() -> StackIdentity {
    StackIdentity::new("srv", "staging", "ap-southeast-1", "123").unwrap()
}

fn fleet(n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("web{i}")).collect()
}

fn target() -> DeploymentTarget {
    DeploymentTarget::TagFilter {
        key: "launchpad:deployment-group".to_string(),
        value: "srv-staging-ap-southeast-1-dg-123".to_string(),
    }
}

fn policy(traffic_control: bool, batching: Batching, failure_policy: FailurePolicy) -> RolloutPolicy {
    RolloutPolicy {
        traffic_control,
        batching,
        failure_policy,
    }
}

fn health() -> HealthCheckSpec {
    HealthCheckSpec {
        path: "/healthz".to_string(),
        port: 8080,
        interval_secs: 10,
        timeout_secs: 2,
        healthy_threshold: 2,
        unhealthy_threshold: 2,
    }
}

struct Harness {
    coordinator: RolloutCoordinator,
    journal: Journal,
    state: StateStore,
    artifact: ArtifactRef,
}

#[derive(Default)]
struct Setup {
    members: usize,
    faults: Vec<(&'static str, LifecycleEvent, Fault)>,
    unhealthy: Vec<&'static str>,
    callback: Option<DeploymentCallback>,
}

fn harness(setup: Setup) -> Harness {
    let state = StateStore::open_in_memory().unwrap();
    let store = ArtifactStore::resolve_or_create(&state, &stack(), BucketSettings::default()).unwrap();
    let artifact = store
        .put_object(&ArtifactKey::new("backend", "abc123", "dist").unwrap(), b"revision")
        .unwrap();

    let journal = Journal::default();
    let hooks = RecordingHooks {
        journal: journal.clone(),
        step: Duration::from_secs(1),
        faults: setup
            .faults
            .into_iter()
            .map(|(t, e, f)| ((t.to_string(), e), f))
            .collect(),
    };
    let traffic = RecordingTraffic {
        journal: journal.clone(),
        unhealthy: setup.unhealthy.into_iter().map(str::to_string).collect(),
    };

    let mut coordinator = RolloutCoordinator::new(
        stack(),
        "backend",
        Arc::new(hooks),
        Arc::new(FixedFleet(fleet(setup.members))),
    )
    .unwrap()
    .with_artifacts(store)
    .with_state(state.clone())
    .with_traffic_control(Arc::new(traffic))
    .with_health_check(health(), DEFAULT_MAX_PROBES);
    if let Some(callback) = setup.callback {
        coordinator = coordinator.with_callback(callback);
    }

    Harness {
        coordinator,
        journal,
        state,
        artifact,
    }
}

fn lifecycle_with_traffic() -> Vec<&'static str> {
    vec![
        "BeforeInstall",
        "AfterInstall",
        "deregister",
        "ApplicationStop",
        "ApplicationStart",
        "ValidateService",
        "probe",
        "probe",
        "register",
    ]
}

// ── Scenarios ─────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn one_at_a_time_with_traffic_control_cuts_over_each_instance() {
    let h = harness(Setup {
        members: 2,
        ..Default::default()
    });
    assert_eq!(h.artifact.bucket, "srv-staging-ap-southeast-1-artifacts-123");
    assert_eq!(h.artifact.key, "backend/abc123/dist.zip");

    let mut handle = h
        .coordinator
        .deploy(
            h.artifact.clone(),
            target(),
            policy(true, Batching::OneAtATime, FailurePolicy::Halt),
        )
        .await
        .unwrap();
    let info = handle.wait().await;

    assert_eq!(info.status, DeploymentStatus::Succeeded);
    assert_eq!(info.count(TargetStatus::Succeeded), 2);

    // Sequential: all of web1 happens before any of web2.
    let expected: Vec<String> = ["web1", "web2"]
        .iter()
        .flat_map(|t| lifecycle_with_traffic().into_iter().map(move |s| format!("{t} {s}")))
        .collect();
    assert_eq!(h.journal.entries(), expected);

    let steps: Vec<Step> = info.target("web1").unwrap().steps.iter().map(|s| s.step).collect();
    assert_eq!(
        steps,
        vec![
            Step::Hook(LifecycleEvent::BeforeInstall),
            Step::Hook(LifecycleEvent::AfterInstall),
            Step::Deregister,
            Step::Hook(LifecycleEvent::ApplicationStop),
            Step::Hook(LifecycleEvent::ApplicationStart),
            Step::Hook(LifecycleEvent::ValidateService),
            Step::HealthCheck,
            Step::Register,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn one_at_a_time_never_overlaps_targets() {
    let peak = Arc::new(AtomicUsize::new(0));
    let observed = peak.clone();
    let callback: DeploymentCallback = Arc::new(move |info: &DeploymentInfo| {
        observed.fetch_max(info.count(TargetStatus::InProgress), Ordering::SeqCst);
    });
    let h = harness(Setup {
        members: 3,
        callback: Some(callback),
        ..Default::default()
    });

    let info = h
        .coordinator
        .deploy(
            h.artifact.clone(),
            target(),
            policy(false, Batching::OneAtATime, FailurePolicy::Halt),
        )
        .await
        .unwrap()
        .wait()
        .await;

    assert_eq!(info.status, DeploymentStatus::Succeeded);
    assert_eq!(peak.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn all_at_once_runs_the_fleet_together() {
    let peak = Arc::new(AtomicUsize::new(0));
    let observed = peak.clone();
    let callback: DeploymentCallback = Arc::new(move |info: &DeploymentInfo| {
        observed.fetch_max(info.count(TargetStatus::InProgress), Ordering::SeqCst);
    });
    let h = harness(Setup {
        members: 3,
        callback: Some(callback),
        ..Default::default()
    });

    let info = h
        .coordinator
        .deploy(
            h.artifact.clone(),
            target(),
            policy(false, Batching::AllAtOnce, FailurePolicy::Halt),
        )
        .await
        .unwrap()
        .wait()
        .await;

    assert_eq!(info.status, DeploymentStatus::Succeeded);
    assert_eq!(peak.load(Ordering::SeqCst), 3);
    // No traffic steps without traffic control.
    assert!(!h.journal.entries().iter().any(|e| e.ends_with("deregister")));
}

#[tokio::test(start_paused = true)]
async fn halt_leaves_remaining_targets_pending() {
    let h = harness(Setup {
        members: 3,
        faults: vec![("web1", LifecycleEvent::ValidateService, Fault::Fail)],
        ..Default::default()
    });

    let info = h
        .coordinator
        .deploy(
            h.artifact.clone(),
            target(),
            policy(false, Batching::OneAtATime, FailurePolicy::Halt),
        )
        .await
        .unwrap()
        .wait()
        .await;

    assert_eq!(info.status, DeploymentStatus::Failed);
    let web1 = info.target("web1").unwrap();
    assert_eq!(web1.status, TargetStatus::Failed);
    let error = web1.error.as_deref().unwrap();
    assert!(error.contains("ValidateService"), "{error}");
    assert!(error.contains("srv-staging-ap-southeast-1"), "{error}");
    assert_eq!(info.target("web2").unwrap().status, TargetStatus::Pending);
    assert_eq!(info.target("web3").unwrap().status, TargetStatus::Pending);
    assert!(h.journal.for_target("web2").is_empty());
}

#[tokio::test(start_paused = true)]
async fn continue_reports_every_failure() {
    let h = harness(Setup {
        members: 3,
        faults: vec![("web1", LifecycleEvent::ValidateService, Fault::Fail)],
        ..Default::default()
    });

    let info = h
        .coordinator
        .deploy(
            h.artifact.clone(),
            target(),
            policy(false, Batching::OneAtATime, FailurePolicy::Continue),
        )
        .await
        .unwrap()
        .wait()
        .await;

    assert_eq!(info.status, DeploymentStatus::Failed);
    assert_eq!(info.count(TargetStatus::Failed), 1);
    assert_eq!(info.count(TargetStatus::Succeeded), 2);
    assert_eq!(info.error.as_deref(), Some("1 target(s) failed"));
}

#[tokio::test(start_paused = true)]
async fn hung_hook_times_out() {
    let h = harness(Setup {
        members: 1,
        faults: vec![("web1", LifecycleEvent::ApplicationStart, Fault::Hang)],
        ..Default::default()
    });

    let info = h
        .coordinator
        .deploy(
            h.artifact.clone(),
            target(),
            policy(false, Batching::OneAtATime, FailurePolicy::Halt),
        )
        .await
        .unwrap()
        .wait()
        .await;

    assert_eq!(info.status, DeploymentStatus::Failed);
    let web1 = info.target("web1").unwrap();
    assert!(web1.error.as_deref().unwrap().contains("exceeded its 300s timeout"));
    assert!(!h.journal.for_target("web1").contains(&"ValidateService".to_string()));
}

#[tokio::test(start_paused = true)]
async fn stop_failures_can_be_ignored() {
    let mut h = harness(Setup {
        members: 1,
        faults: vec![("web1", LifecycleEvent::ApplicationStop, Fault::Fail)],
        ..Default::default()
    });
    let group = stack().deployment_group_name();
    h.coordinator.register_group(DeploymentGroup {
        application: "backend".to_string(),
        name: group.clone(),
        target: target(),
        policy: policy(false, Batching::OneAtATime, FailurePolicy::Halt),
    });

    let id = h
        .coordinator
        .create_deployment("backend", &group, h.artifact.clone(), true)
        .await
        .unwrap();
    let info = h.coordinator.wait(&id).await.unwrap();
    assert_eq!(info.status, DeploymentStatus::Succeeded);
    let stop = &info.target("web1").unwrap().steps[2];
    assert_eq!(
        stop,
        &StepRecord {
            step: Step::Hook(LifecycleEvent::ApplicationStop),
            outcome: StepOutcome::Ignored,
        }
    );

    let id = h
        .coordinator
        .create_deployment("backend", &group, h.artifact.clone(), false)
        .await
        .unwrap();
    let info = h.coordinator.wait(&id).await.unwrap();
    assert_eq!(info.status, DeploymentStatus::Failed);
}

#[tokio::test(start_paused = true)]
async fn unhealthy_target_is_not_registered() {
    let h = harness(Setup {
        members: 2,
        unhealthy: vec!["web1"],
        ..Default::default()
    });

    let info = h
        .coordinator
        .deploy(
            h.artifact.clone(),
            target(),
            policy(true, Batching::OneAtATime, FailurePolicy::Halt),
        )
        .await
        .unwrap()
        .wait()
        .await;

    assert_eq!(info.status, DeploymentStatus::Failed);
    let web1 = info.target("web1").unwrap();
    assert!(web1.error.as_deref().unwrap().contains("did not become healthy after 2 probes"));
    assert!(!h.journal.for_target("web1").contains(&"register".to_string()));
    assert_eq!(info.target("web2").unwrap().status, TargetStatus::Pending);
}

#[tokio::test(start_paused = true)]
async fn cancel_stops_before_the_next_target() {
    let h = harness(Setup {
        members: 3,
        ..Default::default()
    });

    let mut handle = h
        .coordinator
        .deploy(
            h.artifact.clone(),
            target(),
            policy(false, Batching::OneAtATime, FailurePolicy::Halt),
        )
        .await
        .unwrap();
    // web1 is mid-lifecycle (each hook takes one second).
    tokio::time::sleep(Duration::from_secs(2)).await;
    h.coordinator.cancel(handle.id()).await.unwrap();
    let info = handle.wait().await;

    assert_eq!(info.status, DeploymentStatus::Stopped);
    assert_eq!(info.target("web1").unwrap().status, TargetStatus::Succeeded);
    assert_eq!(info.target("web2").unwrap().status, TargetStatus::Stopped);
    assert_eq!(info.target("web3").unwrap().status, TargetStatus::Stopped);
}

#[tokio::test(start_paused = true)]
async fn empty_fleet_fails_with_no_targets() {
    let h = harness(Setup::default());

    let info = h
        .coordinator
        .deploy(
            h.artifact.clone(),
            target(),
            policy(false, Batching::OneAtATime, FailurePolicy::Halt),
        )
        .await
        .unwrap()
        .wait()
        .await;

    assert_eq!(info.status, DeploymentStatus::Failed);
    assert!(info.error.as_deref().unwrap().starts_with("no compute targets match"));
}

#[tokio::test(start_paused = true)]
async fn missing_artifact_is_rejected_before_anything_runs() {
    let h = harness(Setup {
        members: 1,
        ..Default::default()
    });
    let missing = ArtifactRef::new(&h.artifact.bucket, "backend/zzz999/dist.zip");

    let err = h
        .coordinator
        .deploy(missing, target(), RolloutPolicy::default())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, RolloutError::ArtifactNotFound { .. }), "{err}");

    let malformed = ArtifactRef::new(&h.artifact.bucket, "backend/dist.zip");
    let err = h
        .coordinator
        .deploy(malformed, target(), RolloutPolicy::default())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, RolloutError::ArtifactNotFound { .. }), "{err}");

    assert!(h.state.list_deployment_ids().unwrap().is_empty());
    assert!(h.journal.entries().is_empty());
}

#[tokio::test(start_paused = true)]
async fn foreign_deploy_role_is_denied() {
    let h = harness(Setup {
        members: 1,
        ..Default::default()
    });
    let other = StackIdentity::new("srv", "prod", "ap-southeast-1", "123").unwrap();
    let coordinator = h.coordinator.with_trust(
        grant(ActorKind::Deploy, &other, "backend").unwrap(),
        grant(ActorKind::Compute, &other, "backend").unwrap(),
    );

    let err = coordinator
        .deploy(h.artifact.clone(), target(), RolloutPolicy::default())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, RolloutError::TrustDenied { .. }), "{err}");
    assert!(h.state.list_deployment_ids().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn groups_outside_the_deploy_grant_are_denied() {
    let mut h = harness(Setup {
        members: 1,
        ..Default::default()
    });
    for (application, name) in [
        ("other-app", "other-stack-prod-dg"),
        ("backend", "srv-prod-ap-southeast-1-dg-123"),
    ] {
        h.coordinator.register_group(DeploymentGroup {
            application: application.to_string(),
            name: name.to_string(),
            target: target(),
            policy: policy(false, Batching::OneAtATime, FailurePolicy::Halt),
        });
        let err = h
            .coordinator
            .create_deployment(application, name, h.artifact.clone(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, RolloutError::TrustDenied { .. }), "{err}");
        assert!(err.to_string().contains("codedeploy:CreateDeployment"), "{err}");
    }
    assert!(h.state.list_deployment_ids().unwrap().is_empty());
    assert!(h.journal.entries().is_empty());
}

#[tokio::test(start_paused = true)]
async fn unknown_group_is_rejected() {
    let h = harness(Setup::default());
    let err = h
        .coordinator
        .create_deployment("backend", "nope", h.artifact.clone(), false)
        .await
        .unwrap_err();
    assert!(matches!(err, RolloutError::UnknownDeploymentGroup { .. }));
}

#[tokio::test(start_paused = true)]
async fn finished_deployments_are_persisted() {
    let h = harness(Setup {
        members: 2,
        ..Default::default()
    });

    let mut handle = h
        .coordinator
        .deploy(
            h.artifact.clone(),
            target(),
            policy(false, Batching::AllAtOnce, FailurePolicy::Halt),
        )
        .await
        .unwrap();
    let id = handle.id().to_string();
    let live = handle.wait().await;

    let stored: DeploymentInfo = h.state.get_deployment(&id).unwrap().unwrap();
    assert_eq!(stored, live);
    assert_eq!(stored.status, DeploymentStatus::Succeeded);
    assert!(stored.completed_at.is_some());
    assert_eq!(h.coordinator.get_deployment(&id).await.unwrap(), Some(live));
}

#[tokio::test(start_paused = true)]
async fn finished_deployments_leave_memory() {
    let h = harness(Setup {
        members: 2,
        ..Default::default()
    });

    let id = h
        .coordinator
        .deploy(
            h.artifact.clone(),
            target(),
            policy(false, Batching::OneAtATime, FailurePolicy::Halt),
        )
        .await
        .unwrap()
        .id()
        .to_string();
    assert_eq!(h.coordinator.active_deployments().await, vec![id.clone()]);

    let info = h.coordinator.wait(&id).await.unwrap();
    assert_eq!(info.status, DeploymentStatus::Succeeded);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(h.coordinator.active_deployments().await.is_empty());

    // Still answered from the ledger.
    assert_eq!(h.coordinator.get_deployment(&id).await.unwrap(), Some(info.clone()));
    assert_eq!(h.coordinator.wait(&id).await.unwrap(), info);
    h.coordinator.cancel(&id).await.unwrap();
}
