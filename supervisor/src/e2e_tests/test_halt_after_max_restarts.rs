//! Restarts beyond the budget halt the run, always by way of `Restarting`.

use crate::e2e_tests::helpers::*;
use crate::recovery::{RecoveryConfig, RunState, Termination, TransitionReason};
use crate::testing::single_critical_region;

#[test]
fn test_halts_once_restarts_exceed_maximum() {
    let report = run(
        always_faulting(1, 100, RecoveryConfig::new(1, 2, 2)),
        single_critical_region(),
    );

    assert_eq!(report.termination, Termination::Halted);
    assert_eq!(report.final_state, RunState::Halted);
    assert_eq!(report.steps, 3);
    assert_eq!(report.counters.restarts, 3);

    let last = report.transitions.last().unwrap();
    assert_eq!(last.from, RunState::Restarting);
    assert_eq!(last.to, RunState::Halted);
    assert_eq!(last.reason, TransitionReason::RestartBudgetExceeded);
    assert_eq!(
        report
            .transitions
            .iter()
            .filter(|t| t.to == RunState::Halted)
            .count(),
        1
    );
}

#[test]
fn test_threshold_reached_goes_straight_to_restarting() {
    let report = run(
        always_faulting(2, 100, RecoveryConfig::new(0, 1, 2)),
        single_critical_region(),
    );

    assert_eq!(
        path(&report.transitions),
        [
            (RunState::Running, RunState::Restarting),
            (RunState::Restarting, RunState::Running),
            (RunState::Running, RunState::Restarting),
            (RunState::Restarting, RunState::Halted),
        ]
    );
    assert!(
        report
            .transitions
            .iter()
            .filter(|t| t.from == RunState::Running)
            .all(|t| t.reason == TransitionReason::RestartThresholdReached)
    );
    assert_eq!(report.steps, 2);
    assert_eq!(report.termination, Termination::Halted);
}

#[test]
fn test_halted_run_reports_telemetry() {
    let report = run(
        always_faulting(3, 100, RecoveryConfig::new(1, 0, 2)),
        single_critical_region(),
    );

    assert_eq!(report.final_state, RunState::Halted);
    assert_eq!(report.steps, 1);
    assert_eq!(report.summary.steps, 1);
    assert_eq!(report.summary.total_restarts, 1);
    assert_eq!(report.summary.total_corruptions, 1);
}
