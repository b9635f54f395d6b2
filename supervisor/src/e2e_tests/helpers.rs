//! Common helpers for end-to-end tests.

use std::fs::File;
use std::path::Path;

use crate::agent::AgentKind;
use crate::config::RunConfig;
use crate::controller::{RunController, RunReport};
use crate::fault::FaultModelConfig;
use crate::game::Simulation;
use crate::recovery::{RecoveryConfig, RunState, Transition};
use crate::runlog::{self, LogEntry};
use crate::time::SimulatedTimeSource;

/// Config firing a fault every step with the given recovery thresholds.
#[must_use]
pub fn always_faulting(seed: u64, steps: u64, recovery: RecoveryConfig) -> RunConfig {
    RunConfig::new(seed)
        .with_steps(steps)
        .with_fault(FaultModelConfig::per_step(seed, 1.0))
        .with_recovery(recovery)
        .with_agent(AgentKind::Idle)
}

/// Run `sim` on a simulated clock and return the report.
pub fn run<S: Simulation>(config: RunConfig, sim: S) -> RunReport {
    RunController::new(config, sim)
        .with_clock(SimulatedTimeSource::default())
        .run()
        .unwrap()
}

/// Run `sim` with its run log written to `path`, then read the log back.
pub fn run_logged<S: Simulation>(config: RunConfig, sim: S, path: &Path) -> (RunReport, Vec<LogEntry>) {
    let file = File::create(path).unwrap();
    let report = RunController::new(config, sim)
        .with_clock(SimulatedTimeSource::default())
        .with_run_log(file)
        .run()
        .unwrap();
    let entries = runlog::read_from(File::open(path).unwrap()).unwrap();
    (report, entries)
}

/// `(from, to)` pairs of a transition list.
#[must_use]
pub fn path(transitions: &[Transition]) -> Vec<(RunState, RunState)> {
    transitions.iter().map(|t| (t.from, t.to)).collect()
}
