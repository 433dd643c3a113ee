//! Provisioning-time shapes: topology variants, rollout policy, health checks,
//! and deployment targets.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Fleet size used when a fixed fleet does not specify one.
pub const DEFAULT_FLEET_SIZE: u32 = 2;

// ── Topology ──────────────────────────────────────────────────────

/// Compute and networking shape serving the workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Topology {
    /// One instance with direct ingress, no load balancer.
    SingleInstance,
    /// `instance_count` static instances behind one load balancer.
    FixedFleetBehindLb {
        #[serde(default = "default_fleet_size")]
        instance_count: u32,
    },
    /// A launch template backing an elastic scaling group behind a load balancer.
    AutoScaledBehindLb { min: u32, max: u32, desired: u32 },
}

fn default_fleet_size() -> u32 {
    DEFAULT_FLEET_SIZE
}

impl Topology {
    /// Reject shapes that cannot be materialized.
    pub fn validate(&self) -> CoreResult<()> {
        match *self {
            Topology::SingleInstance => Ok(()),
            Topology::FixedFleetBehindLb { instance_count } => {
                if instance_count == 0 {
                    return Err(CoreError::InvalidConfig(
                        "fixed fleet needs at least one instance".to_string(),
                    ));
                }
                Ok(())
            }
            Topology::AutoScaledBehindLb { min, max, desired } => {
                if max == 0 {
                    return Err(CoreError::InvalidConfig(
                        "scaling group max must be at least 1".to_string(),
                    ));
                }
                if !(min <= desired && desired <= max) {
                    return Err(CoreError::InvalidConfig(format!(
                        "scaling group requires min <= desired <= max, got min={min} desired={desired} max={max}"
                    )));
                }
                Ok(())
            }
        }
    }

    pub fn has_load_balancer(&self) -> bool {
        !matches!(self, Topology::SingleInstance)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Topology::SingleInstance => "single-instance",
            Topology::FixedFleetBehindLb { .. } => "fixed-fleet-behind-lb",
            Topology::AutoScaledBehindLb { .. } => "auto-scaled-behind-lb",
        }
    }
}

// ── Rollout policy ────────────────────────────────────────────────

/// How updates are sequenced across the members of a deployment target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Batching {
    #[default]
    OneAtATime,
    AllAtOnce,
    /// Percentage of the fleet (1–100) updated per batch.
    Percentage(u8),
}

impl Batching {
    /// Number of targets per batch for a fleet of `total`.
    pub fn batch_size(&self, total: usize) -> usize {
        match *self {
            Batching::OneAtATime => 1,
            Batching::AllAtOnce => total.max(1),
            Batching::Percentage(p) => {
                let p = usize::from(p.clamp(1, 100));
                (total * p).div_ceil(100).max(1)
            }
        }
    }
}

/// What happens to the rest of the rollout once a target fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop scheduling new targets; the remainder stay `Pending`.
    #[default]
    Halt,
    /// Keep going and report every failure at the end.
    Continue,
}

/// Rules governing deployment sequencing and traffic safety.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RolloutPolicy {
    /// Deregister from the load balancer during the update.
    pub traffic_control: bool,
    #[serde(default)]
    pub batching: Batching,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

impl RolloutPolicy {
    pub fn validate(&self) -> CoreResult<()> {
        if let Batching::Percentage(p) = self.batching
            && !(1..=100).contains(&p)
        {
            return Err(CoreError::InvalidConfig(format!(
                "batch percentage must be within 1..=100, got {p}"
            )));
        }
        Ok(())
    }

    /// CodeDeploy-style deployment config name for this policy.
    pub fn config_name(&self) -> String {
        match self.batching {
            Batching::OneAtATime => "CodeDeployDefault.OneAtATime".to_string(),
            Batching::AllAtOnce => "CodeDeployDefault.AllAtOnce".to_string(),
            Batching::Percentage(p) => format!("Launchpad.Percentage{p}"),
        }
    }
}

// ── Health checks ─────────────────────────────────────────────────

/// Load balancer health check parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckSpec {
    pub path: String,
    pub port: u16,
    pub interval_secs: u64,
    pub timeout_secs: u64,
    /// Consecutive successes to flip to healthy.
    pub healthy_threshold: u32,
    /// Consecutive failures to flip to unhealthy.
    pub unhealthy_threshold: u32,
}

impl HealthCheckSpec {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> CoreResult<()> {
        if !self.path.starts_with('/') {
            return Err(CoreError::InvalidConfig(format!(
                "health check path must start with '/', got {:?}",
                self.path
            )));
        }
        if self.healthy_threshold == 0 || self.unhealthy_threshold == 0 {
            return Err(CoreError::InvalidConfig(
                "health check thresholds must be at least 1".to_string(),
            ));
        }
        if self.timeout_secs >= self.interval_secs {
            return Err(CoreError::InvalidConfig(
                "health check timeout must be shorter than its interval".to_string(),
            ));
        }
        Ok(())
    }
}

// ── Deployment target ─────────────────────────────────────────────

/// How the deployment service addresses compute targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeploymentTarget {
    /// Static instances matched by tag.
    TagFilter { key: String, value: String },
    /// Members of a scaling group, resolved when the deployment starts.
    ScalingGroup { name: String },
}

impl DeploymentTarget {
    pub fn is_dynamic(&self) -> bool {
        matches!(self, DeploymentTarget::ScalingGroup { .. })
    }
}

impl std::fmt::Display for DeploymentTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeploymentTarget::TagFilter { key, value } => write!(f, "tag {key}={value}"),
            DeploymentTarget::ScalingGroup { name } => write!(f, "scaling group {name}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn autoscaled_capacity_bounds() {
        let ok = Topology::AutoScaledBehindLb { min: 1, max: 3, desired: 2 };
        assert!(ok.validate().is_ok());

        let inverted = Topology::AutoScaledBehindLb { min: 3, max: 1, desired: 2 };
        assert!(inverted.validate().is_err());

        let over = Topology::AutoScaledBehindLb { min: 1, max: 2, desired: 3 };
        assert!(over.validate().is_err());

        let degenerate = Topology::AutoScaledBehindLb { min: 1, max: 1, desired: 1 };
        assert!(degenerate.validate().is_ok());
        assert!(degenerate.has_load_balancer());
    }

    #[test]
    fn empty_fleet_rejected() {
        assert!(Topology::FixedFleetBehindLb { instance_count: 0 }.validate().is_err());
    }

    #[test]
    fn topology_from_toml_uses_default_fleet_size() {
        let t: Topology = toml::from_str("kind = \"fixed_fleet_behind_lb\"").unwrap();
        assert_eq!(t, Topology::FixedFleetBehindLb { instance_count: 2 });
    }

    #[test]
    fn batch_sizes() {
        assert_eq!(Batching::OneAtATime.batch_size(3), 1);
        assert_eq!(Batching::AllAtOnce.batch_size(3), 3);
        assert_eq!(Batching::Percentage(50).batch_size(3), 2);
        assert_eq!(Batching::Percentage(10).batch_size(3), 1);
        assert_eq!(Batching::Percentage(100).batch_size(4), 4);
    }

    #[test]
    fn percentage_out_of_range_rejected() {
        let policy = RolloutPolicy {
            batching: Batching::Percentage(0),
            ..Default::default()
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn health_check_timeout_must_fit_interval() {
        let spec = HealthCheckSpec {
            path: "/healthz".to_string(),
            port: 8080,
            interval_secs: 5,
            timeout_secs: 5,
            healthy_threshold: 2,
            unhealthy_threshold: 2,
        };
        assert!(spec.validate().is_err());
    }
}
