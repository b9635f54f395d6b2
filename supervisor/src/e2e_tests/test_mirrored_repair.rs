//! Mirrored regions are repaired in place until corruption persists past the
//! restart threshold.

use crate::e2e_tests::helpers::*;
use crate::memory::{Criticality, RepairResult};
use crate::recovery::{RecoveryConfig, RunState, Termination, TransitionReason};
use crate::runlog::{LogEntry, Timeline};
use crate::testing::FixedRegionSim;

fn mirrored_sim() -> FixedRegionSim {
    FixedRegionSim::new().with_mirrored_region("state", 64, Criticality::Critical)
}

#[test]
fn test_repairs_until_threshold_then_restart() {
    let report = run(
        always_faulting(1, 100, RecoveryConfig::new(3, 0, 2)),
        mirrored_sim(),
    );

    // Steps 1-3 are repaired; step 4 reaches the threshold and the single
    // restart exceeds a budget of zero.
    assert_eq!(report.counters.repairs, 3);
    assert_eq!(report.steps, 4);
    assert_eq!(report.termination, Termination::Halted);
    assert_eq!(
        path(&report.transitions),
        [
            (RunState::Running, RunState::Repairing),
            (RunState::Repairing, RunState::Running),
            (RunState::Running, RunState::Repairing),
            (RunState::Repairing, RunState::Running),
            (RunState::Running, RunState::Repairing),
            (RunState::Repairing, RunState::Running),
            (RunState::Running, RunState::Restarting),
            (RunState::Restarting, RunState::Halted),
        ]
    );
}

#[test]
fn test_repairs_restore_full_region_and_detect_immediately() {
    let dir = tempfile::tempdir().unwrap();
    let (report, entries) = run_logged(
        always_faulting(6, 10, RecoveryConfig::new(100, 0, 2)),
        mirrored_sim(),
        &dir.path().join("run.log"),
    );

    assert_eq!(report.counters.repairs, 10);
    assert_eq!(report.final_state, RunState::Running);
    assert!(
        report
            .transitions
            .iter()
            .all(|t| t.reason != TransitionReason::CheckpointRestored)
    );

    let repairs: Vec<RepairResult> = entries
        .iter()
        .filter_map(|e| match e {
            LogEntry::Repair { result, .. } => Some(*result),
            _ => None,
        })
        .collect();
    assert_eq!(repairs.len(), 10);
    assert!(
        repairs
            .iter()
            .all(|r| *r == RepairResult::Restored { bytes_restored: 64 })
    );

    let timeline = Timeline::replay(&entries);
    assert_eq!(timeline.detections.len(), 10);
    assert_eq!(timeline.mean_detection_latency(), Some(0.0));
    assert_eq!(timeline.undetected, 0);
}
