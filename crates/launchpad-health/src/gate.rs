//! Post-registration health gate.

use std::future::Future;

use tracing::{debug, info};

use launchpad_core::HealthCheckSpec;

use crate::checker::{HealthStatus, HealthTracker, ProbeResult};

/// How a gate ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateOutcome {
    /// `Unknown` when the probe budget ran out before either threshold was met.
    pub status: HealthStatus,
    pub probes: u32,
}

impl GateOutcome {
    pub fn passed(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

/// Probe a target until it crosses the healthy or the unhealthy threshold,
/// waiting one check interval between probes.
///
/// At most `max_probes` probes are issued.
pub async fn health_gate<F, Fut>(spec: &HealthCheckSpec, max_probes: u32, mut probe: F) -> GateOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ProbeResult>,
{
    let mut tracker = HealthTracker::new(spec);
    let mut probes = 0;

    while probes < max_probes {
        if probes > 0 {
            tokio::time::sleep(tracker.interval()).await;
        }
        probes += 1;

        let result = probe().await;
        let status = tracker.record(result);
        debug!(?result, ?status, probes, "health gate probe");

        if status != HealthStatus::Unknown {
            info!(?status, probes, path = %spec.path, "health gate settled");
            return GateOutcome { status, probes };
        }
    }

    info!(probes, path = %spec.path, "health gate exhausted its probes");
    GateOutcome {
        status: tracker.status(),
        probes,
    }
}
