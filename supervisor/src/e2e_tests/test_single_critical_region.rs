//! seed=1, one 64-byte `Critical` region without a redundant copy, a fault
//! every step and a restart threshold of 1.

use crate::e2e_tests::helpers::*;
use crate::integrity::VerdictStatus;
use crate::memory::{Criticality, RepairResult};
use crate::recovery::{RecoveryConfig, RunState, Termination, TransitionReason};
use crate::runlog::LogEntry;
use crate::testing::single_critical_region;

fn scenario_config() -> crate::config::RunConfig {
    always_faulting(1, 1, RecoveryConfig::new(1, 5, 2))
}

#[test]
fn test_step_one_repairs_then_restarts() {
    let report = run(scenario_config(), single_critical_region());

    assert_eq!(report.faults_injected, 1);
    assert_eq!(
        path(&report.transitions),
        [
            (RunState::Running, RunState::Repairing),
            (RunState::Repairing, RunState::Restarting),
            (RunState::Restarting, RunState::Running),
        ]
    );
    assert!(report.transitions.iter().all(|t| t.step == 1));
    assert!(matches!(
        report.transitions[0].reason,
        TransitionReason::SevereCorruption(_)
    ));
    assert!(matches!(
        report.transitions[1].reason,
        TransitionReason::RepairUnavailable(_)
    ));
    assert_eq!(
        report.transitions[2].reason,
        TransitionReason::CheckpointRestored
    );

    assert_eq!(report.counters.restarts, 1);
    assert_eq!(report.counters.repairs, 0);
    assert_eq!(report.counters.corruptions_detected, 1);
    assert_eq!(report.summary.total_restarts, 1);
    assert_eq!(report.final_state, RunState::Running);
    assert_eq!(report.termination, Termination::BudgetExhausted);
}

#[test]
fn test_step_one_log_shows_critical_corruption() {
    let dir = tempfile::tempdir().unwrap();
    let (_, entries) = run_logged(
        scenario_config(),
        single_critical_region(),
        &dir.path().join("run.log"),
    );

    let mut verdicts = entries.iter().filter_map(|e| match e {
        LogEntry::Verdict(v) => Some(*v),
        _ => None,
    });
    let verdict = verdicts.next().unwrap();
    assert!(verdicts.next().is_none());
    assert_eq!(verdict.step, 1);
    assert_eq!(verdict.status, VerdictStatus::Corrupted);
    assert_eq!(verdict.severity, Criticality::Critical);
    assert!(verdict.diff.is_some());

    let repairs: Vec<RepairResult> = entries
        .iter()
        .filter_map(|e| match e {
            LogEntry::Repair { result, .. } => Some(*result),
            _ => None,
        })
        .collect();
    assert_eq!(repairs, [RepairResult::Unavailable]);

    assert!(matches!(
        entries.first(),
        Some(LogEntry::FaultInjected { event, bits_changed }) if event.step == 1 && *bits_changed >= 1
    ));
    assert!(matches!(
        entries.last(),
        Some(LogEntry::RunEnd {
            step: 1,
            state: RunState::Running,
            termination: Termination::BudgetExhausted,
        })
    ));
}
