//! Ledger-backed stand-ins for the fleet and the load balancer.
//!
//! Instances are whatever the ledger records for the stack. Scaling group
//! members are synthesized from the group's desired capacity. Health
//! probes go to one configured address, where the workload runs locally.

use std::collections::BTreeSet;
use std::sync::Mutex;

use anyhow::{Context, anyhow};
use tracing::info;

use launchpad_core::{DeploymentTarget, HealthCheckSpec, ResourceSpec, StackIdentity};
use launchpad_health::{ProbeResult, http_probe};
use launchpad_rollout::{BoxFuture, FleetInventory, TrafficControl};
use launchpad_state::{ResourceRecord, StateStore};

fn scaling_group_members(name: &str, desired: u32) -> Vec<String> {
    (1..=desired).map(|i| format!("{name}/i{i}")).collect()
}

pub struct LedgerInventory {
    state: StateStore,
    owner: String,
}

impl LedgerInventory {
    pub fn new(state: StateStore, stack: &StackIdentity) -> Self {
        Self {
            state,
            owner: stack.key(),
        }
    }

    pub fn members(&self, target: &DeploymentTarget) -> anyhow::Result<Vec<String>> {
        let records = self.state.list_resources_owned_by(&self.owner)?;
        match target {
            DeploymentTarget::TagFilter { key, value } => Ok(records
                .iter()
                .filter_map(|r| match &r.resource.spec {
                    ResourceSpec::Instance { tags, .. } if tags.get(key) == Some(value) => {
                        Some(r.name.clone())
                    }
                    _ => None,
                })
                .collect()),
            DeploymentTarget::ScalingGroup { name } => {
                let desired = records
                    .iter()
                    .find_map(|r| match &r.resource.spec {
                        ResourceSpec::AutoScalingGroup { desired, .. } if &r.name == name => {
                            Some(*desired)
                        }
                        _ => None,
                    })
                    .with_context(|| format!("scaling group {name} is not in the ledger"))?;
                Ok(scaling_group_members(name, desired))
            }
        }
    }
}

impl FleetInventory for LedgerInventory {
    fn resolve<'a>(
        &'a self,
        target: &'a DeploymentTarget,
    ) -> BoxFuture<'a, anyhow::Result<Vec<String>>> {
        Box::pin(async move { self.members(target) })
    }
}

pub struct LedgerTrafficControl {
    target_group: String,
    registered: Mutex<BTreeSet<String>>,
    probe_address: String,
    health: HealthCheckSpec,
}

impl LedgerTrafficControl {
    /// Targets attached to `target_group` in the ledger start out registered.
    pub fn new(
        state: &StateStore,
        stack: &StackIdentity,
        target_group: &str,
        probe_address: &str,
        health: HealthCheckSpec,
    ) -> anyhow::Result<Self> {
        let records = state.list_resources_owned_by(&stack.key())?;
        let registered = records
            .iter()
            .flat_map(|r| attached_targets(r, target_group))
            .collect();
        Ok(Self {
            target_group: target_group.to_string(),
            registered: Mutex::new(registered),
            probe_address: probe_address.to_string(),
            health,
        })
    }

    pub fn registered(&self) -> anyhow::Result<BTreeSet<String>> {
        Ok(self.table()?.clone())
    }

    fn table(&self) -> anyhow::Result<std::sync::MutexGuard<'_, BTreeSet<String>>> {
        self.registered
            .lock()
            .map_err(|_| anyhow!("registration table for {} is poisoned", self.target_group))
    }
}

fn attached_targets(record: &ResourceRecord, target_group: &str) -> Vec<String> {
    match &record.resource.spec {
        ResourceSpec::TargetAttachment {
            target_group: tg,
            instance,
            ..
        } if tg == target_group => vec![instance.clone()],
        ResourceSpec::AutoScalingGroup {
            desired,
            target_groups,
            ..
        } if target_groups.iter().any(|tg| tg == target_group) => {
            scaling_group_members(&record.name, *desired)
        }
        _ => Vec::new(),
    }
}

impl TrafficControl for LedgerTrafficControl {
    fn deregister<'a>(&'a self, target_id: &'a str) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            self.table()?.remove(target_id);
            info!(target = %target_id, target_group = %self.target_group, "deregistered");
            Ok(())
        })
    }

    fn register<'a>(&'a self, target_id: &'a str) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            self.table()?.insert(target_id.to_string());
            info!(target = %target_id, target_group = %self.target_group, "registered");
            Ok(())
        })
    }

    fn probe<'a>(&'a self, _target_id: &'a str) -> BoxFuture<'a, ProbeResult> {
        Box::pin(http_probe(
            &self.probe_address,
            &self.health.path,
            self.health.timeout(),
        ))
    }
}
