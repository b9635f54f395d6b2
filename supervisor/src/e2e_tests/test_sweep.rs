//! Probability sweeps run isolated arena runs in parallel.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use crate::config::RunConfig;
use crate::controller::RunController;
use crate::game::{ArenaConfig, ArenaSim};
use crate::recovery::Termination;
use crate::sweep::{point_config, run_sweep};

fn base() -> RunConfig {
    let mut config = RunConfig::new(13)
        .with_steps(150)
        .with_arena(ArenaConfig::new(13));
    config.sweep_probabilities = vec![0.0, 0.05, 0.5];
    config
}

#[tokio::test]
async fn test_sweep_reports_every_probability_in_order() {
    let points = run_sweep(&base(), &Arc::new(AtomicBool::new(false)))
        .await
        .unwrap();

    let probabilities: Vec<f64> = points.iter().map(|p| p.flip_probability).collect();
    assert_eq!(probabilities, vec![0.0, 0.05, 0.5]);
    assert_eq!(points[0].report.faults_injected, 0);
    assert_eq!(points[0].report.run_id, "run-13-p0");
    assert!(points[2].report.faults_injected > points[0].report.faults_injected);
}

#[tokio::test]
async fn test_sweep_point_matches_standalone_run() {
    let base = base();
    let points = run_sweep(&base, &Arc::new(AtomicBool::new(false)))
        .await
        .unwrap();

    let config = point_config(&base, 0.05);
    let standalone = RunController::new(config, ArenaSim::new(base.arena))
        .run()
        .unwrap();
    let swept = &points[1].report;

    assert_eq!(swept.steps, standalone.steps);
    assert_eq!(swept.faults_injected, standalone.faults_injected);
    assert_eq!(swept.counters, standalone.counters);
    assert_eq!(swept.transitions, standalone.transitions);
}

#[tokio::test]
async fn test_raised_stop_stops_every_run() {
    let points = run_sweep(&base(), &Arc::new(AtomicBool::new(true)))
        .await
        .unwrap();

    assert_eq!(points.len(), 3);
    assert!(points.iter().all(|p| p.report.termination == Termination::Stopped));
    assert!(points.iter().all(|p| p.report.steps == 0));
}
