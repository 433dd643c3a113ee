//! launchpad-health — health checks for compute targets.
//!
//! # Architecture
//!
//! ```text
//! health_gate()
//!   ├── HealthTracker (consecutive successes / failures)
//!   ├── probe closure → ProbeResult   (http_probe() in production)
//!   └── sleeps one interval between probes
//! ```
//!
//! A target flips to `Healthy` after `healthy_threshold` consecutive
//! successes and to `Unhealthy` after `unhealthy_threshold` consecutive
//! failures, mirroring a load balancer target group. The rollout
//! coordinator counts a target as succeeded only once its gate reports
//! `Healthy`.

pub mod checker;
pub mod gate;

pub use checker::{HealthStatus, HealthTracker, ProbeResult, http_probe};
pub use gate::{GateOutcome, health_gate};
