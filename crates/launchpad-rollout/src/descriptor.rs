//! Deployment descriptor (`appspec.yml`).
//!
//! Declares where the revision's files land on a target and which script
//! runs at each lifecycle event, with a timeout and an execution identity.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use launchpad_core::config::DescriptorConfig;
use launchpad_core::parse_duration;

use crate::error::{RolloutError, RolloutResult};

/// Default per-hook bound.
pub const DEFAULT_HOOK_TIMEOUT: Duration = Duration::from_secs(300);

/// Longest timeout the deployment service accepts for one hook.
pub const MAX_HOOK_TIMEOUT: Duration = Duration::from_secs(3600);

/// Unprivileged account the service hooks run as unless configured.
pub const DEFAULT_SERVICE_USER: &str = "ec2-user";

/// Fixed points in a target's lifecycle, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LifecycleEvent {
    BeforeInstall,
    AfterInstall,
    ApplicationStop,
    ApplicationStart,
    ValidateService,
}

impl LifecycleEvent {
    pub const ORDER: [LifecycleEvent; 5] = [
        LifecycleEvent::BeforeInstall,
        LifecycleEvent::AfterInstall,
        LifecycleEvent::ApplicationStop,
        LifecycleEvent::ApplicationStart,
        LifecycleEvent::ValidateService,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleEvent::BeforeInstall => "BeforeInstall",
            LifecycleEvent::AfterInstall => "AfterInstall",
            LifecycleEvent::ApplicationStop => "ApplicationStop",
            LifecycleEvent::ApplicationStart => "ApplicationStart",
            LifecycleEvent::ValidateService => "ValidateService",
        }
    }

    fn default_script(&self) -> &'static str {
        match self {
            LifecycleEvent::BeforeInstall => "scripts/before_install.sh",
            LifecycleEvent::AfterInstall => "scripts/after_install.sh",
            LifecycleEvent::ApplicationStop => "scripts/application_stop.sh",
            LifecycleEvent::ApplicationStart => "scripts/application_start.sh",
            LifecycleEvent::ValidateService => "scripts/validate_service.sh",
        }
    }

    fn default_run_as(&self) -> RunAs {
        match self {
            LifecycleEvent::BeforeInstall | LifecycleEvent::AfterInstall => RunAs::Root,
            _ => RunAs::User(DEFAULT_SERVICE_USER.to_string()),
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleEvent {
    type Err = RolloutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LifecycleEvent::ORDER
            .into_iter()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| RolloutError::InvalidDescriptor(format!("unknown lifecycle event {s:?}")))
    }
}

/// Execution identity of a hook script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RunAs {
    Root,
    User(String),
}

impl From<String> for RunAs {
    fn from(s: String) -> Self {
        if s == "root" { RunAs::Root } else { RunAs::User(s) }
    }
}

impl From<RunAs> for String {
    fn from(r: RunAs) -> Self {
        match r {
            RunAs::Root => "root".to_string(),
            RunAs::User(u) => u,
        }
    }
}

impl fmt::Display for RunAs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunAs::Root => f.write_str("root"),
            RunAs::User(u) => f.write_str(u),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookSpec {
    /// Script path relative to the revision root.
    pub location: String,
    pub timeout: Duration,
    pub run_as: RunAs,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMapping {
    pub source: String,
    pub destination: String,
    pub owner: Option<String>,
    pub group: Option<String>,
    /// Octal permission bits, e.g. `755`.
    pub mode: Option<String>,
}

/// The deployment descriptor for one application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSpec {
    pub files: Vec<FileMapping>,
    pub hooks: BTreeMap<LifecycleEvent, HookSpec>,
}

impl AppSpec {
    /// Descriptor with every hook pointing at `scripts/<event>.sh` and the
    /// whole revision copied to `/opt/<application>`.
    pub fn default_for(application: &str) -> Self {
        let hooks = LifecycleEvent::ORDER
            .into_iter()
            .map(|event| {
                (
                    event,
                    HookSpec {
                        location: event.default_script().to_string(),
                        timeout: DEFAULT_HOOK_TIMEOUT,
                        run_as: event.default_run_as(),
                    },
                )
            })
            .collect();

        Self {
            files: vec![FileMapping {
                source: "/".to_string(),
                destination: format!("/opt/{application}"),
                owner: None,
                group: None,
                mode: None,
            }],
            hooks,
        }
    }

    /// Overlay the `[descriptor]` table on the defaults.
    pub fn from_config(application: &str, config: &DescriptorConfig) -> RolloutResult<Self> {
        let mut spec = Self::default_for(application);

        if !config.files.is_empty() {
            spec.files = config
                .files
                .iter()
                .map(|f| FileMapping {
                    source: f.source.clone(),
                    destination: f.destination.clone(),
                    owner: f.owner.clone(),
                    group: f.group.clone(),
                    mode: f.mode.clone(),
                })
                .collect();
        }

        for (name, hook) in &config.hooks {
            let event: LifecycleEvent = name.parse()?;
            let timeout = match &hook.timeout {
                Some(t) => parse_duration(t)?,
                None => DEFAULT_HOOK_TIMEOUT,
            };
            let run_as = hook
                .run_as
                .clone()
                .map(RunAs::from)
                .unwrap_or_else(|| event.default_run_as());
            spec.hooks.insert(
                event,
                HookSpec {
                    location: hook.location.clone(),
                    timeout,
                    run_as,
                },
            );
        }

        spec.validate()?;
        Ok(spec)
    }

    pub fn hook(&self, event: LifecycleEvent) -> Option<&HookSpec> {
        self.hooks.get(&event)
    }

    pub fn validate(&self) -> RolloutResult<()> {
        for (event, hook) in &self.hooks {
            if hook.timeout.is_zero() || hook.timeout > MAX_HOOK_TIMEOUT {
                return Err(RolloutError::InvalidDescriptor(format!(
                    "{event} timeout must be within 1s..={}s",
                    MAX_HOOK_TIMEOUT.as_secs()
                )));
            }
            if !inside_revision(&hook.location) {
                return Err(RolloutError::InvalidDescriptor(format!(
                    "{event} location {:?} must stay inside the revision root",
                    hook.location
                )));
            }
        }
        for file in &self.files {
            if !file.destination.starts_with('/') {
                return Err(RolloutError::InvalidDescriptor(format!(
                    "destination {:?} must be absolute",
                    file.destination
                )));
            }
            if let Some(mode) = &file.mode
                && (mode.len() < 3 || mode.len() > 4 || !mode.chars().all(|c| ('0'..='7').contains(&c)))
            {
                return Err(RolloutError::InvalidDescriptor(format!(
                    "mode {mode:?} is not octal permission bits"
                )));
            }
        }
        Ok(())
    }

    /// Render in the deployment service's `appspec.yml` shape.
    pub fn to_yaml(&self) -> RolloutResult<String> {
        let raw = RawAppSpec {
            version: 0.0,
            os: "linux",
            files: self
                .files
                .iter()
                .map(|f| RawFile {
                    source: &f.source,
                    destination: &f.destination,
                })
                .collect(),
            permissions: self
                .files
                .iter()
                .filter(|f| f.owner.is_some() || f.group.is_some() || f.mode.is_some())
                .map(|f| RawPermission {
                    object: &f.destination,
                    owner: f.owner.as_deref(),
                    group: f.group.as_deref(),
                    mode: f.mode.as_deref(),
                })
                .collect(),
            hooks: self
                .hooks
                .iter()
                .map(|(event, hook)| {
                    (
                        *event,
                        vec![RawHook {
                            location: &hook.location,
                            timeout: hook.timeout.as_secs(),
                            runas: hook.run_as.to_string(),
                        }],
                    )
                })
                .collect(),
        };
        serde_yaml::to_string(&raw)
            .map_err(|e| RolloutError::InvalidDescriptor(format!("render appspec: {e}")))
    }
}

#[derive(Serialize)]
struct RawAppSpec<'a> {
    version: f32,
    os: &'a str,
    files: Vec<RawFile<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    permissions: Vec<RawPermission<'a>>,
    hooks: BTreeMap<LifecycleEvent, Vec<RawHook<'a>>>,
}

#[derive(Serialize)]
struct RawFile<'a> {
    source: &'a str,
    destination: &'a str,
}

#[derive(Serialize)]
struct RawPermission<'a> {
    object: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    owner: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    group: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mode: Option<&'a str>,
}

#[derive(Serialize)]
struct RawHook<'a> {
    location: &'a str,
    timeout: u64,
    runas: String,
}

/// A non-empty relative path with no `..` components.
fn inside_revision(location: &str) -> bool {
    let mut components = Path::new(location).components().peekable();
    components.peek().is_some()
        && components.all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

#[cfg(test)]
mod tests {
    use launchpad_core::config::{FileMappingConfig, HookConfig};

    use super::*;

    #[test]
    fn default_descriptor_covers_every_event() {
        let spec = AppSpec::default_for("backend");
        let events: Vec<_> = spec.hooks.keys().copied().collect();
        assert_eq!(events, LifecycleEvent::ORDER.to_vec());
        assert!(spec.hooks.values().all(|h| h.timeout == DEFAULT_HOOK_TIMEOUT));
        assert_eq!(spec.hook(LifecycleEvent::BeforeInstall).unwrap().run_as, RunAs::Root);
        assert_eq!(spec.files[0].destination, "/opt/backend");
    }

    #[test]
    fn config_overrides_hooks_and_files() {
        let config = DescriptorConfig {
            files: vec![FileMappingConfig {
                source: "dist".into(),
                destination: "/srv/app".into(),
                owner: Some("app".into()),
                group: Some("app".into()),
                mode: Some("755".into()),
            }],
            hooks: BTreeMap::from([(
                "ApplicationStart".to_string(),
                HookConfig {
                    location: "bin/start.sh".into(),
                    timeout: Some("60s".into()),
                    run_as: Some("root".into()),
                },
            )]),
        };
        let spec = AppSpec::from_config("backend", &config).unwrap();
        let start = spec.hook(LifecycleEvent::ApplicationStart).unwrap();
        assert_eq!(start.location, "bin/start.sh");
        assert_eq!(start.timeout, Duration::from_secs(60));
        assert_eq!(start.run_as, RunAs::Root);
        assert_eq!(spec.files.len(), 1);
        assert_eq!(spec.files[0].destination, "/srv/app");
    }

    #[test]
    fn rejects_unknown_events_and_bad_timeouts() {
        let mut config = DescriptorConfig::default();
        config.hooks.insert(
            "AfterEverything".into(),
            HookConfig {
                location: "x.sh".into(),
                timeout: None,
                run_as: None,
            },
        );
        assert!(AppSpec::from_config("backend", &config).is_err());

        let mut config = DescriptorConfig::default();
        config.hooks.insert(
            "ValidateService".into(),
            HookConfig {
                location: "v.sh".into(),
                timeout: Some("2h".into()),
                run_as: None,
            },
        );
        assert!(AppSpec::from_config("backend", &config).is_err());
    }

    #[test]
    fn hook_locations_cannot_leave_the_revision() {
        for location in ["../outside.sh", "scripts/../../etc/run.sh", "/usr/bin/start.sh", ""] {
            let mut config = DescriptorConfig::default();
            config.hooks.insert(
                "ApplicationStart".into(),
                HookConfig {
                    location: location.into(),
                    timeout: None,
                    run_as: None,
                },
            );
            let err = AppSpec::from_config("backend", &config).unwrap_err();
            assert!(matches!(err, RolloutError::InvalidDescriptor(_)), "{location}: {err}");
        }

        let mut spec = AppSpec::default_for("backend");
        spec.hooks.get_mut(&LifecycleEvent::ValidateService).unwrap().location =
            "./scripts/validate.sh".into();
        spec.validate().unwrap();
    }

    #[test]
    fn yaml_lists_hooks_in_lifecycle_order() {
        let mut spec = AppSpec::default_for("backend");
        spec.files[0].mode = Some("644".into());
        let yaml = spec.to_yaml().unwrap();

        let positions: Vec<usize> = LifecycleEvent::ORDER
            .iter()
            .map(|e| yaml.find(&format!("{e}:")).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{yaml}");
        assert!(yaml.contains("timeout: 300"));
        assert!(yaml.contains("runas: root"));
        assert!(yaml.contains("runas: ec2-user"));
        assert!(yaml.contains("object: /opt/backend"));
    }
}
