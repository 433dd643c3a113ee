//! Deployment and per-target records.

use serde::{Deserialize, Serialize};

use launchpad_core::{ArtifactRef, DeploymentTarget, RolloutPolicy, StackIdentity};

use crate::descriptor::LifecycleEvent;

/// Per-target state: `Pending → InProgress → {Succeeded | Failed | Stopped}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
    Pending,
    InProgress,
    Succeeded,
    Failed,
    Stopped,
}

impl TargetStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TargetStatus::Succeeded | TargetStatus::Failed | TargetStatus::Stopped
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    /// Accepted; targets not resolved yet.
    Created,
    InProgress,
    Succeeded,
    Failed,
    Stopped,
}

impl DeploymentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeploymentStatus::Succeeded | DeploymentStatus::Failed | DeploymentStatus::Stopped
        )
    }
}

/// One step a target went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Deregister,
    Hook(LifecycleEvent),
    HealthCheck,
    Register,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Succeeded,
    Failed,
    /// Failed, but tolerated (`ignore_stop_failures`).
    Ignored,
    /// No hook configured for the event.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: Step,
    pub outcome: StepOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetState {
    pub target_id: String,
    pub status: TargetStatus,
    pub steps: Vec<StepRecord>,
    pub error: Option<String>,
}

impl TargetState {
    pub fn pending(target_id: &str) -> Self {
        Self {
            target_id: target_id.to_string(),
            status: TargetStatus::Pending,
            steps: Vec::new(),
            error: None,
        }
    }
}

/// Everything known about one deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentInfo {
    pub id: String,
    pub stack: StackIdentity,
    pub artifact: ArtifactRef,
    pub target: DeploymentTarget,
    pub policy: RolloutPolicy,
    pub ignore_stop_failures: bool,
    pub status: DeploymentStatus,
    pub targets: Vec<TargetState>,
    /// Why the deployment as a whole failed, if it did.
    pub error: Option<String>,
    pub created_at: u64,
    pub completed_at: Option<u64>,
}

impl DeploymentInfo {
    pub fn target(&self, target_id: &str) -> Option<&TargetState> {
        self.targets.iter().find(|t| t.target_id == target_id)
    }

    pub(crate) fn target_mut(&mut self, target_id: &str) -> Option<&mut TargetState> {
        self.targets.iter_mut().find(|t| t.target_id == target_id)
    }

    pub fn count(&self, status: TargetStatus) -> usize {
        self.targets.iter().filter(|t| t.status == status).count()
    }
}
