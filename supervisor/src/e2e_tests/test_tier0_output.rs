//! Tier-0 JSON lines and F′ frames written during a run.

use std::fs::File;

use serde_json::Value;

use crate::config::RunConfig;
use crate::controller::{RunController, Sink};
use crate::fault::FaultModelConfig;
use crate::game::{ArenaConfig, ArenaSim};
use crate::telemetry::FprimeFrame;
use crate::telemetry::tier0::{FPRIME_FRAME_LEN, verify};
use crate::time::SimulatedTimeSource;

#[test]
fn test_tier0_records_and_frames() {
    let dir = tempfile::tempdir().unwrap();
    let jsonl_path = dir.path().join("tier0.jsonl");
    let frames_path = dir.path().join("frames.bin");

    let arena = ArenaConfig::new(2);
    let config = RunConfig::new(2)
        .with_run_id("tier0-e2e")
        .with_steps(100)
        .with_fault(FaultModelConfig::per_step(2, 0.1))
        .with_tier0_every(10)
        .with_arena(arena);
    let jsonl: Sink = Box::new(File::create(&jsonl_path).unwrap());
    let frames: Sink = Box::new(File::create(&frames_path).unwrap());
    let report = RunController::new(config, ArenaSim::new(arena))
        .with_clock(SimulatedTimeSource::default())
        .with_tier0(Some(jsonl), Some(frames))
        .run()
        .unwrap();

    let text = std::fs::read_to_string(&jsonl_path).unwrap();
    let records: Vec<Value> = text
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert!(records.iter().all(verify));

    let (summary, telemetry) = records.split_last().unwrap();
    assert_eq!(telemetry.len() as u64, report.steps / 10);
    for (i, record) in telemetry.iter().enumerate() {
        assert_eq!(record["type"], "tier0_telemetry");
        assert_eq!(record["step"], (i as u64 + 1) * 10);
        assert_eq!(record["run_id"], "tier0-e2e");
        assert_eq!(record["algo_id"], "linear-policy");
        assert_eq!(record["level"], "ARENA01");
        assert_eq!(record["episode_id"], 1);
    }

    assert_eq!(summary["type"], "episode_summary");
    assert_eq!(summary["steps"], report.steps);
    assert_eq!(summary["result"], report.termination.as_str());
    assert_eq!(summary["faults"]["bitflips_injected"], report.faults_injected);
    assert_eq!(summary["faults"]["ecc_corrected"], report.counters.repairs);
    assert_eq!(summary["faults"]["watchdog_resets"], report.counters.restarts);

    // The sweep agent fires every step, whatever weapon it holds.
    let shots: u64 = summary["resources"]["ammo_used"]
        .as_object()
        .unwrap()
        .values()
        .map(|count| count.as_u64().unwrap())
        .sum();
    assert_eq!(shots, report.steps);
    assert!(summary["nav"]["path_len_m"].as_f64().unwrap() >= 0.0);
    assert!(telemetry.iter().all(|record| record["resources"]["ammo_used"].is_object()));

    let frames = std::fs::read(&frames_path).unwrap();
    assert_eq!(frames.len(), telemetry.len() * FPRIME_FRAME_LEN);
    for (chunk, record) in frames.chunks_exact(FPRIME_FRAME_LEN).zip(telemetry) {
        let frame = FprimeFrame::from_bytes(chunk).unwrap();
        let health = record["health"].as_i64().unwrap();
        assert_eq!(i64::from(frame.health), health.clamp(0, 65_535));
        assert_eq!(u64::from(frame.unix_secs), 1_700_000_000);
    }
}

#[test]
fn test_tier0_off_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let jsonl_path = dir.path().join("tier0.jsonl");

    let arena = ArenaConfig::new(2);
    let config = RunConfig::new(2)
        .with_steps(20)
        .with_tier0_every(0)
        .with_arena(arena);
    let jsonl: Sink = Box::new(File::create(&jsonl_path).unwrap());
    RunController::new(config, ArenaSim::new(arena))
        .with_tier0(Some(jsonl), None)
        .run()
        .unwrap();

    assert!(std::fs::read_to_string(&jsonl_path).unwrap().is_empty());
}
