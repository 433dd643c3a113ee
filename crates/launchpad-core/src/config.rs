//! launchpad.toml configuration parser.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::duration::parse_duration;
use crate::error::{CoreError, CoreResult};
use crate::identity::StackIdentity;
use crate::model::{HealthCheckSpec, RolloutPolicy, Topology};
use crate::resource::Encryption;

/// Environment variables that override file values.
pub const ENV_REGION: &str = "LAUNCHPAD_REGION";
pub const ENV_STACK: &str = "LAUNCHPAD_STACK";
pub const ENV_ENVIRONMENT: &str = "LAUNCHPAD_ENVIRONMENT";
pub const ENV_ACCOUNT_ID: &str = "LAUNCHPAD_ACCOUNT_ID";
pub const ENV_APP_PORT: &str = "LAUNCHPAD_APP_PORT";
pub const ENV_REPOSITORY: &str = "LAUNCHPAD_REPOSITORY";

/// Default retention for noncurrent artifact versions.
pub const DEFAULT_RETENTION_DAYS: u32 = 90;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchpadConfig {
    pub stack: StackConfig,
    pub application: ApplicationConfig,
    pub topology: Topology,
    pub compute: ComputeConfig,
    pub artifacts: Option<ArtifactsConfig>,
    pub health_check: Option<HealthCheckConfig>,
    pub rollout: Option<RolloutPolicy>,
    pub federation: Option<FederationConfig>,
    pub descriptor: Option<DescriptorConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackConfig {
    pub name: String,
    pub environment: String,
    pub region: String,
    pub account_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    pub name: String,
    pub port: Option<u16>,
    pub management_port: Option<u16>,
    /// CIDR allowed to reach the management port.
    pub management_cidr: Option<String>,
    /// Source repository identifier, e.g. `org/repo`.
    pub repository: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputeConfig {
    pub image: String,
    pub instance_type: Option<String>,
    pub bootstrap_script: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ArtifactsConfig {
    pub noncurrent_retention_days: Option<u32>,
    pub encryption: Option<Encryption>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HealthCheckConfig {
    pub path: Option<String>,
    pub interval: Option<String>,
    pub timeout: Option<String>,
    pub healthy_threshold: Option<u32>,
    pub unhealthy_threshold: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FederationConfig {
    /// Repository the CI token must come from. Falls back to `application.repository`.
    pub repository: Option<String>,
    pub branch: Option<String>,
    pub environment: Option<String>,
    pub audience: Option<String>,
    pub session_duration: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DescriptorConfig {
    #[serde(default)]
    pub files: Vec<FileMappingConfig>,
    /// Keyed by lifecycle event name (`BeforeInstall`, `ApplicationStart`, ...).
    #[serde(default)]
    pub hooks: BTreeMap<String, HookConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMappingConfig {
    pub source: String,
    pub destination: String,
    pub owner: Option<String>,
    pub group: Option<String>,
    pub mode: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookConfig {
    pub location: String,
    pub timeout: Option<String>,
    pub run_as: Option<String>,
}

impl LaunchpadConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: LaunchpadConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Read the file, then apply `LAUNCHPAD_*` environment overrides.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Apply overrides from a variable lookup.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> CoreResult<()> {
        if let Some(v) = lookup(ENV_REGION) {
            self.stack.region = v;
        }
        if let Some(v) = lookup(ENV_STACK) {
            self.stack.name = v;
        }
        if let Some(v) = lookup(ENV_ENVIRONMENT) {
            self.stack.environment = v;
        }
        if let Some(v) = lookup(ENV_ACCOUNT_ID) {
            self.stack.account_id = v;
        }
        if let Some(v) = lookup(ENV_APP_PORT) {
            let port = v
                .parse::<u16>()
                .map_err(|_| CoreError::InvalidConfig(format!("{ENV_APP_PORT}={v} is not a port")))?;
            self.application.port = Some(port);
        }
        if let Some(v) = lookup(ENV_REPOSITORY) {
            self.application.repository = Some(v);
        }
        Ok(())
    }

    pub fn stack_identity(&self) -> CoreResult<StackIdentity> {
        StackIdentity::new(
            &self.stack.name,
            &self.stack.environment,
            &self.stack.region,
            &self.stack.account_id,
        )
    }

    pub fn app_port(&self) -> u16 {
        self.application.port.unwrap_or(8080)
    }

    pub fn management_port(&self) -> u16 {
        self.application.management_port.unwrap_or(22)
    }

    pub fn retention_days(&self) -> u32 {
        self.artifacts
            .as_ref()
            .and_then(|a| a.noncurrent_retention_days)
            .unwrap_or(DEFAULT_RETENTION_DAYS)
    }

    pub fn rollout_policy(&self) -> RolloutPolicy {
        self.rollout.unwrap_or(RolloutPolicy {
            traffic_control: self.topology.has_load_balancer(),
            ..Default::default()
        })
    }

    /// Resolve the health check with defaults of 30s interval, 5s timeout, 2/2 thresholds.
    pub fn health_check(&self) -> CoreResult<HealthCheckSpec> {
        let cfg = self.health_check.clone().unwrap_or_default();
        let spec = HealthCheckSpec {
            path: cfg.path.unwrap_or_else(|| "/healthz".to_string()),
            port: self.app_port(),
            interval_secs: whole_seconds("interval", cfg.interval.as_deref().unwrap_or("30s"))?,
            timeout_secs: whole_seconds("timeout", cfg.timeout.as_deref().unwrap_or("5s"))?,
            healthy_threshold: cfg.healthy_threshold.unwrap_or(2),
            unhealthy_threshold: cfg.unhealthy_threshold.unwrap_or(2),
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Validate everything that can be checked without touching state.
    pub fn validate(&self) -> CoreResult<()> {
        self.stack_identity()?;
        self.topology.validate()?;
        self.rollout_policy().validate()?;
        self.health_check()?;
        Ok(())
    }

    /// Scaffold a minimal launchpad.toml.
    pub fn scaffold(stack: &str, environment: &str, application: &str) -> Self {
        LaunchpadConfig {
            stack: StackConfig {
                name: stack.to_string(),
                environment: environment.to_string(),
                region: "us-east-1".to_string(),
                account_id: "000000000000".to_string(),
            },
            application: ApplicationConfig {
                name: application.to_string(),
                port: Some(8080),
                management_port: Some(22),
                management_cidr: None,
                repository: None,
            },
            topology: Topology::FixedFleetBehindLb { instance_count: 2 },
            compute: ComputeConfig {
                image: "ami-00000000000000000".to_string(),
                instance_type: Some("t3.micro".to_string()),
                bootstrap_script: Some("scripts/bootstrap.sh".to_string()),
            },
            artifacts: Some(ArtifactsConfig {
                noncurrent_retention_days: Some(DEFAULT_RETENTION_DAYS),
                encryption: Some(Encryption::Aes256),
            }),
            health_check: Some(HealthCheckConfig {
                path: Some("/healthz".to_string()),
                interval: Some("30s".to_string()),
                timeout: Some("5s".to_string()),
                healthy_threshold: Some(2),
                unhealthy_threshold: Some(2),
            }),
            rollout: None,
            federation: None,
            descriptor: None,
        }
    }
}

/// Health-check periods must be a positive whole number of seconds.
fn whole_seconds(field: &str, raw: &str) -> CoreResult<u64> {
    let duration = parse_duration(raw)?;
    if duration.subsec_nanos() != 0 || duration.is_zero() {
        return Err(CoreError::InvalidConfig(format!(
            "health check {field} must be a positive whole number of seconds, got {raw:?}"
        )));
    }
    Ok(duration.as_secs())
}
