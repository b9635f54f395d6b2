//! Parameter sweeps across fault probabilities.
//!
//! Each probability gets a fully isolated run (own registry, supervisor and
//! telemetry) on tokio's blocking pool. Runs share nothing but the stop flag.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use serde::Serialize;

use crate::config::RunConfig;
use crate::controller::{RunController, RunError, RunReport};
use crate::game::ArenaSim;

/// One finished run of a sweep.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepPoint {
    pub flip_probability: f64,
    pub report: RunReport,
}

/// Error returned when a sweep cannot complete.
#[derive(Debug)]
pub enum SweepError {
    /// The run at this probability failed.
    Run { flip_probability: f64, source: RunError },
    /// A run's task panicked or was cancelled.
    Join(tokio::task::JoinError),
}

impl std::fmt::Display for SweepError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Run {
                flip_probability,
                source,
            } => write!(f, "run at flip probability {flip_probability} failed: {source}"),
            Self::Join(e) => write!(f, "sweep task failed: {e}"),
        }
    }
}

impl std::error::Error for SweepError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Run { source, .. } => Some(source),
            Self::Join(e) => Some(e),
        }
    }
}

impl From<tokio::task::JoinError> for SweepError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Join(e)
    }
}

/// Config for the run at one sweep probability.
#[must_use]
pub fn point_config(base: &RunConfig, flip_probability: f64) -> RunConfig {
    base.clone()
        .with_run_id(format!("{}-p{flip_probability}", base.run_id))
        .with_flip_probability(flip_probability)
}

/// Run the arena once per entry of `base.sweep_probabilities`, in parallel.
///
/// Output paths in `base` are not used: sweep runs report only through
/// their [`RunReport`]s. Points come back in the order the probabilities were
/// given.
pub async fn run_sweep(
    base: &RunConfig,
    stop: &Arc<AtomicBool>,
) -> Result<Vec<SweepPoint>, SweepError> {
    tracing::info!(
        "sweeping {} flip probabilities from seed {}",
        base.sweep_probabilities.len(),
        base.seed
    );

    let tasks = base.sweep_probabilities.iter().map(|&flip_probability| {
        let config = point_config(base, flip_probability);
        #[allow(clippy::disallowed_methods)] // Arc::clone shares the flag
        let stop = Arc::clone(stop);
        tokio::task::spawn_blocking(move || {
            let sim = ArenaSim::new(config.arena);
            let result = RunController::new(config, sim)
                .with_stop_signal(stop)
                .run();
            (flip_probability, result)
        })
    });

    let mut points = Vec::with_capacity(base.sweep_probabilities.len());
    for joined in futures::future::join_all(tasks).await {
        let (flip_probability, result) = joined?;
        let report = result.map_err(|source| SweepError::Run {
            flip_probability,
            source,
        })?;
        tracing::info!(
            "p={flip_probability}: {} after {} steps, {} repairs, {} restarts",
            report.termination,
            report.steps,
            report.counters.repairs,
            report.counters.restarts
        );
        points.push(SweepPoint {
            flip_probability,
            report,
        });
    }
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_config_overrides_probability_only() {
        let base = RunConfig::new(9).with_steps(40);
        let config = point_config(&base, 0.25);
        assert_eq!(config.run_id, "run-9-p0.25");
        assert_eq!(config.seed, 9);
        assert_eq!(config.steps, 40);
        assert_eq!(
            config.fault.schedule,
            crate::fault::FaultSchedule::PerStep {
                flip_probability: 0.25
            }
        );
        assert!(
            (config.fault.multi_bit_probability - base.fault.multi_bit_probability).abs()
                < f64::EPSILON
        );
    }
}
