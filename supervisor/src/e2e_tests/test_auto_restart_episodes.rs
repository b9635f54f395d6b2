//! With auto-restart, a finished episode starts the next one instead of
//! ending the run.

use crate::agent::AgentKind;
use crate::config::RunConfig;
use crate::controller::RunController;
use crate::fault::FaultModelConfig;
use crate::game::{ArenaConfig, ArenaSim};
use crate::recovery::Termination;
use crate::testing::single_critical_region;

fn config(steps: u64, auto_restart: bool) -> RunConfig {
    RunConfig::new(1)
        .with_steps(steps)
        .with_fault(FaultModelConfig::no_faults(1))
        .with_agent(AgentKind::Idle)
        .with_auto_restart_episodes(auto_restart)
}

#[test]
fn test_done_without_auto_restart_ends_run() {
    let mut controller =
        RunController::new(config(100, false), single_critical_region().with_done_after(10));

    let report = controller.run().unwrap();
    assert_eq!(report.termination, Termination::Done);
    assert_eq!(report.steps, 10);
    assert_eq!(report.episodes, 1);
}

#[test]
fn test_auto_restart_runs_until_budget() {
    let mut controller =
        RunController::new(config(35, true), single_critical_region().with_done_after(10));

    let report = controller.run().unwrap();
    assert_eq!(report.termination, Termination::BudgetExhausted);
    assert_eq!(report.steps, 35);
    // Episodes end at steps 10, 20 and 30.
    assert_eq!(report.episodes, 4);
    assert_eq!(controller.sim().resets(), 4);
    assert_eq!(controller.observation().tick, 5);
}

#[test]
fn test_arena_episodes_follow_sim() {
    let arena = ArenaConfig::new(3).with_episode_ticks(40);
    let mut controller = RunController::new(config(150, true).with_arena(arena), ArenaSim::new(arena));

    let report = controller.run().unwrap();
    assert_eq!(report.termination, Termination::BudgetExhausted);
    assert!(report.episodes >= 4);
    assert_eq!(controller.sim().episode(), report.episodes);
}
