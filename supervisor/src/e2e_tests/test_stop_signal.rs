//! The cooperative stop signal ends a run at the next step boundary.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::agent::{Agent, AgentKind};
use crate::config::RunConfig;
use crate::controller::RunController;
use crate::fault::FaultModelConfig;
use crate::game::{Action, Observation};
use crate::recovery::{RunState, Termination};
use crate::testing::single_critical_region;

/// Raises the stop flag while choosing its `n`th action.
struct StopAfter {
    remaining: u32,
    stop: Arc<AtomicBool>,
}

impl Agent for StopAfter {
    fn act(&mut self, _observation: &Observation) -> Action {
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.stop.store(true, Ordering::Relaxed);
        }
        Action::none()
    }

    fn reset(&mut self) {}

    fn algo_id(&self) -> &'static str {
        "stop-after"
    }
}

fn unbounded() -> RunConfig {
    RunConfig::new(1)
        .with_steps(0)
        .with_fault(FaultModelConfig::no_faults(1))
        .with_agent(AgentKind::Idle)
}

#[test]
fn test_stop_raised_mid_step_finishes_that_step() {
    let controller = RunController::new(unbounded(), single_critical_region());
    let stop = controller.stop_handle();
    let mut controller = controller.with_agent(Box::new(StopAfter { remaining: 5, stop }));

    let report = controller.run().unwrap();
    assert_eq!(report.termination, Termination::Stopped);
    assert_eq!(report.steps, 5);
    assert_eq!(report.summary.steps, 5);
    assert_eq!(report.final_state, RunState::Running);
}

#[test]
fn test_shared_stop_signal() {
    let stop = Arc::new(AtomicBool::new(true));
    let mut controller =
        RunController::new(unbounded(), single_critical_region()).with_stop_signal(stop);

    let report = controller.run().unwrap();
    assert_eq!(report.termination, Termination::Stopped);
    assert_eq!(report.steps, 0);
}
