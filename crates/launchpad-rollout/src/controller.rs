//! Rollout controller — the batch state machine.
//!
//! The controller decides which slice of the resolved targets runs next and
//! whether the rollout may continue after a batch. It runs nothing itself;
//! the coordinator executes each batch and reports back how many targets
//! failed.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use launchpad_core::{FailurePolicy, RolloutPolicy};

/// Current phase of a rollout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RolloutPhase {
    /// Rollout not started.
    Pending,
    /// Processing batch `current` of `total`.
    RollingBatch { current: u32, total: u32 },
    /// Every batch ran. Individual targets may still have failed under
    /// [`FailurePolicy::Continue`].
    Completed,
    /// A batch had failures under [`FailurePolicy::Halt`].
    Halted { reason: String },
    /// Cancelled between batches.
    Cancelled,
}

impl RolloutPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RolloutPhase::Completed | RolloutPhase::Halted { .. } | RolloutPhase::Cancelled
        )
    }
}

/// The next slice of targets to update: `[start_index, start_index + count)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchAction {
    pub start_index: u32,
    pub count: u32,
}

/// A rollout in progress.
#[derive(Debug, Clone)]
pub struct Rollout {
    pub deployment_id: String,
    pub policy: RolloutPolicy,
    pub phase: RolloutPhase,
    pub target_count: u32,
    pub batch_size: u32,
    pub failed: u32,
}

impl Rollout {
    pub fn new(deployment_id: &str, policy: RolloutPolicy, target_count: u32) -> Self {
        let batch_size = policy.batching.batch_size(target_count as usize) as u32;
        Self {
            deployment_id: deployment_id.to_string(),
            policy,
            phase: RolloutPhase::Pending,
            target_count,
            batch_size,
            failed: 0,
        }
    }

    pub fn start(&mut self) {
        let total = batch_count(self.target_count, self.batch_size);
        if total == 0 {
            self.phase = RolloutPhase::Completed;
            return;
        }
        self.phase = RolloutPhase::RollingBatch { current: 1, total };
        info!(
            deployment = %self.deployment_id,
            batches = total,
            batch_size = self.batch_size,
            "started rollout"
        );
    }

    /// The batch to run now, or `None` once the rollout is over.
    pub fn advance(&self) -> Option<BatchAction> {
        match self.phase {
            RolloutPhase::RollingBatch { current, .. } => {
                let start = (current - 1) * self.batch_size;
                let count = self.batch_size.min(self.target_count - start);
                Some(BatchAction {
                    start_index: start,
                    count,
                })
            }
            _ => None,
        }
    }

    /// Report the outcome of the batch returned by [`Self::advance`].
    pub fn record_batch(&mut self, failed: u32) {
        let RolloutPhase::RollingBatch { current, total } = self.phase else {
            return;
        };
        self.failed += failed;

        if failed > 0 && self.policy.failure_policy == FailurePolicy::Halt {
            self.phase = RolloutPhase::Halted {
                reason: format!("{failed} target(s) failed in batch {current}/{total}"),
            };
            warn!(
                deployment = %self.deployment_id,
                batch = current,
                failed,
                "halting rollout"
            );
            return;
        }

        if current >= total {
            self.phase = RolloutPhase::Completed;
            info!(deployment = %self.deployment_id, failed = self.failed, "rollout completed");
        } else {
            self.phase = RolloutPhase::RollingBatch {
                current: current + 1,
                total,
            };
            debug!(
                deployment = %self.deployment_id,
                batch = current + 1,
                total,
                "advancing to next batch"
            );
        }
    }

    /// Stop before the next batch. No effect once terminal.
    pub fn cancel(&mut self) {
        if !self.phase.is_terminal() {
            info!(deployment = %self.deployment_id, "cancelling rollout");
            self.phase = RolloutPhase::Cancelled;
        }
    }
}

/// Number of batches needed for `total` targets.
pub fn batch_count(total: u32, batch_size: u32) -> u32 {
    if batch_size == 0 {
        return 1;
    }
    total.div_ceil(batch_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use launchpad_core::Batching;

    fn policy(batching: Batching, failure_policy: FailurePolicy) -> RolloutPolicy {
        RolloutPolicy {
            traffic_control: true,
            batching,
            failure_policy,
        }
    }

    #[test]
    fn one_at_a_time_walks_each_target() {
        let mut rollout = Rollout::new("d-1", policy(Batching::OneAtATime, FailurePolicy::Halt), 3);
        rollout.start();
        assert_eq!(rollout.phase, RolloutPhase::RollingBatch { current: 1, total: 3 });

        let mut seen = Vec::new();
        while let Some(action) = rollout.advance() {
            assert_eq!(action.count, 1);
            seen.push(action.start_index);
            rollout.record_batch(0);
        }
        assert_eq!(seen, vec![0, 1, 2]);
        assert_eq!(rollout.phase, RolloutPhase::Completed);
    }

    #[test]
    fn percentage_batches_cover_the_fleet() {
        let mut rollout =
            Rollout::new("d-1", policy(Batching::Percentage(40), FailurePolicy::Halt), 5);
        rollout.start();

        let mut actions = Vec::new();
        while let Some(action) = rollout.advance() {
            actions.push(action);
            rollout.record_batch(0);
        }
        // ceil(5 * 40%) = 2 per batch.
        assert_eq!(
            actions,
            vec![
                BatchAction { start_index: 0, count: 2 },
                BatchAction { start_index: 2, count: 2 },
                BatchAction { start_index: 4, count: 1 },
            ]
        );
    }

    #[test]
    fn halt_stops_after_failed_batch() {
        let mut rollout = Rollout::new("d-1", policy(Batching::OneAtATime, FailurePolicy::Halt), 3);
        rollout.start();
        rollout.advance().unwrap();
        rollout.record_batch(1);
        assert!(matches!(rollout.phase, RolloutPhase::Halted { .. }));
        assert!(rollout.advance().is_none());
    }

    #[test]
    fn continue_runs_every_batch() {
        let mut rollout =
            Rollout::new("d-1", policy(Batching::OneAtATime, FailurePolicy::Continue), 3);
        rollout.start();
        let mut batches = 0;
        while rollout.advance().is_some() {
            batches += 1;
            rollout.record_batch(1);
        }
        assert_eq!(batches, 3);
        assert_eq!(rollout.failed, 3);
        assert_eq!(rollout.phase, RolloutPhase::Completed);
    }

    #[test]
    fn cancel_is_ignored_once_terminal() {
        let mut rollout = Rollout::new("d-1", policy(Batching::AllAtOnce, FailurePolicy::Halt), 2);
        rollout.start();
        rollout.record_batch(0);
        rollout.cancel();
        assert_eq!(rollout.phase, RolloutPhase::Completed);
    }

    #[test]
    fn empty_fleet_completes_immediately() {
        let mut rollout = Rollout::new("d-1", RolloutPolicy::default(), 0);
        rollout.start();
        assert_eq!(rollout.phase, RolloutPhase::Completed);
    }

    #[test]
    fn batch_count_calculation() {
        assert_eq!(batch_count(4, 2), 2);
        assert_eq!(batch_count(5, 2), 3);
        assert_eq!(batch_count(1, 1), 1);
        assert_eq!(batch_count(0, 5), 0);
    }
}
