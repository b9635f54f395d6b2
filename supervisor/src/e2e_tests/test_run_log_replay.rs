//! The run log alone reconstructs the run's recovery history.

use crate::agent::AgentKind;
use crate::config::RunConfig;
use crate::e2e_tests::helpers::*;
use crate::fault::FaultModelConfig;
use crate::game::{ArenaConfig, ArenaSim};
use crate::integrity::CheckCadence;
use crate::memory::Criticality;
use crate::recovery::RecoveryConfig;
use crate::runlog::{self, LogEntry, Timeline};
use crate::testing::FixedRegionSim;

#[test]
fn test_replay_matches_report() {
    let dir = tempfile::tempdir().unwrap();
    let config = RunConfig::new(11)
        .with_steps(400)
        .with_flip_probability(0.05)
        .with_cadence(CheckCadence::EveryNSteps(3))
        .with_arena(ArenaConfig::new(11));
    let (report, entries) = run_logged(
        config,
        ArenaSim::new(ArenaConfig::new(11)),
        &dir.path().join("run.log"),
    );
    let timeline = Timeline::replay(&entries);

    assert_eq!(timeline.final_state, Some(report.final_state));
    assert_eq!(timeline.termination, Some(report.termination));
    assert_eq!(timeline.last_step, report.steps);
    assert_eq!(timeline.faults_injected, report.faults_injected);
    assert_eq!(timeline.faults_skipped, report.faults_skipped);
    assert_eq!(
        timeline.corruptions_detected,
        report.counters.corruptions_detected
    );
    assert_eq!(timeline.repairs, report.counters.repairs);
    assert_eq!(timeline.restarts, u64::from(report.counters.restarts));
    assert_eq!(timeline.transitions, report.transitions);
    assert!(timeline.detections.len() as u64 + timeline.undetected <= timeline.faults_injected);

    let metrics = entries
        .iter()
        .filter(|e| matches!(e, LogEntry::Metrics(_)))
        .count() as u64;
    assert_eq!(metrics, report.steps);
}

#[test]
fn test_detection_latency_bounded_by_cadence() {
    let dir = tempfile::tempdir().unwrap();
    let sim = FixedRegionSim::new().with_mirrored_region("state", 256, Criticality::Critical);
    let config = RunConfig::new(21)
        .with_steps(200)
        .with_fault(FaultModelConfig::mean_time_between_faults(21, 7.0))
        .with_cadence(CheckCadence::EveryNSteps(4))
        .with_recovery(RecoveryConfig::new(1_000, 0, 2))
        .with_agent(AgentKind::Idle);
    let (report, entries) = run_logged(config, sim, &dir.path().join("run.log"));
    let timeline = Timeline::replay(&entries);

    assert!(report.faults_injected > 0);
    assert!(!timeline.detections.is_empty());
    assert!(timeline.detections.iter().all(|d| d.steps() <= 3));
    assert!(timeline.mean_detection_latency().unwrap() <= 3.0);
}

#[test]
fn test_tampered_log_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.log");
    run_logged(
        always_faulting(1, 5, RecoveryConfig::default()),
        FixedRegionSim::new().with_mirrored_region("state", 64, Criticality::Critical),
        &path,
    );

    let mut bytes = std::fs::read(&path).unwrap();
    assert!(runlog::read_all(&bytes).is_ok());
    bytes[20] ^= 0x01;
    assert!(runlog::read_all(&bytes).is_err());
}
