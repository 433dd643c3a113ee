use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};

use launchpad_artifacts::ArtifactStore;
use launchpad_core::ArtifactRef;
use launchpad_provision::{Provisioner, StackInputs, plan_stack};
use launchpad_rollout::{
    DEFAULT_MAX_PROBES, DeploymentGroup, DeploymentInfo, RolloutCoordinator, ScriptHookRunner,
};

use super::Workspace;
use super::appspec::descriptor;
use crate::local::{LedgerInventory, LedgerTrafficControl};

pub struct DeployArgs {
    pub key: String,
    pub version: Option<String>,
    /// Unpacked revision holding the hook scripts.
    pub revision_dir: PathBuf,
    pub ignore_stop_failures: bool,
    pub sudo: bool,
    pub probe_host: String,
}

/// Deploy an uploaded artifact to the stack's deployment group and wait for
/// the outcome.
pub async fn deploy(ws: &Workspace, args: DeployArgs) -> anyhow::Result<DeploymentInfo> {
    let state = ws.open_state()?;
    let inputs = StackInputs::from_config(&ws.config)?;
    let plan = plan_stack(&inputs)?;

    let pending = Provisioner::new(state.clone()).plan(&inputs.stack, &plan.graph)?;
    if !pending.is_noop() {
        bail!(
            "stack {} has unapplied changes; run `launchpad apply` first",
            inputs.stack
        );
    }

    let store = ArtifactStore::resolve_or_create(&state, &inputs.stack, inputs.bucket.clone())?;
    let mut artifact = ArtifactRef::new(store.bucket(), &args.key);
    if let Some(version) = &args.version {
        artifact = artifact.with_version(version);
    }

    let health = inputs.compute.health_check.clone();
    let hooks = ScriptHookRunner::new(&args.revision_dir).with_sudo(args.sudo);
    let inventory = LedgerInventory::new(state.clone(), &inputs.stack);
    let mut coordinator = RolloutCoordinator::new(
        inputs.stack.clone(),
        &inputs.application,
        Arc::new(hooks),
        Arc::new(inventory),
    )?
    .with_descriptor(descriptor(ws)?)
    .with_artifacts(store)
    .with_state(state.clone())
    .with_health_check(health.clone(), DEFAULT_MAX_PROBES);

    if let Some(target_group) = &plan.target_group {
        let address = format!("{}:{}", args.probe_host, health.port);
        let traffic =
            LedgerTrafficControl::new(&state, &inputs.stack, target_group, &address, health)?;
        coordinator = coordinator.with_traffic_control(Arc::new(traffic));
    }

    let group = inputs.stack.deployment_group_name();
    coordinator.register_group(DeploymentGroup {
        application: inputs.application.clone(),
        name: group.clone(),
        target: plan.target.clone(),
        policy: inputs.policy,
    });

    let id = coordinator
        .create_deployment(&inputs.application, &group, artifact, args.ignore_stop_failures)
        .await?;
    println!("✓ Created deployment {id}");

    let info = coordinator.wait(&id).await?;
    print!("{}", render(&info));
    Ok(info)
}

/// Show one deployment, or list all recorded deployments.
pub fn status(ws: &Workspace, id: Option<&str>) -> anyhow::Result<()> {
    let state = ws.open_state()?;
    match id {
        Some(id) => {
            let info: DeploymentInfo = state
                .get_deployment(id)?
                .with_context(|| format!("deployment {id} not found"))?;
            print!("{}", render(&info));
        }
        None => {
            let ids = state.list_deployment_ids()?;
            if ids.is_empty() {
                println!("No deployments recorded.");
            }
            for id in ids {
                if let Some(info) = state.get_deployment::<DeploymentInfo>(&id)? {
                    println!("{id}  {:?}  {}", info.status, info.artifact);
                }
            }
        }
    }
    Ok(())
}

pub fn render(info: &DeploymentInfo) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Deployment {}: {:?}", info.id, info.status);
    let _ = writeln!(out, "  Artifact: {}", info.artifact);
    let _ = writeln!(out, "  Target:   {}", info.target);
    if let Some(error) = &info.error {
        let _ = writeln!(out, "  Error:    {error}");
    }
    for target in &info.targets {
        let _ = write!(out, "    {}  {:?}", target.target_id, target.status);
        if let Some(error) = &target.error {
            let _ = write!(out, "  ({error})");
        }
        out.push('\n');
    }
    out
}
