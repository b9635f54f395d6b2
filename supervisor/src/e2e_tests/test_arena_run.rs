//! Full runs of the built-in arena.

use crate::agent::AgentKind;
use crate::config::RunConfig;
use crate::e2e_tests::helpers::*;
use crate::game::{ArenaConfig, ArenaSim, PLAYER_BLOCK_LEN};
use crate::recovery::{RecoveryConfig, RunState, Termination};

#[test]
fn test_mirrored_arena_survives_moderate_faults() {
    let arena = ArenaConfig::new(5);
    let config = RunConfig::new(5)
        .with_steps(500)
        .with_flip_probability(0.05)
        .with_arena(arena);
    let report = run(config, ArenaSim::new(arena));

    assert!(report.steps <= 500);
    assert_eq!(report.faults_skipped, 0);
    assert_eq!(report.summary.peak_region_count, 3);
    assert_eq!(
        report.summary.peak_region_bytes,
        PLAYER_BLOCK_LEN + arena.enemy_count * 12 + arena.framebuffer_len
    );
    if report.termination == Termination::Halted {
        assert_eq!(report.final_state, RunState::Halted);
    } else {
        assert_eq!(report.final_state, RunState::Running);
    }
}

#[test]
fn test_unmirrored_arena_halts_under_constant_faults() {
    let arena = ArenaConfig::new(6).with_mirrored(false);
    let config = RunConfig::new(6)
        .with_steps(500)
        .with_flip_probability(1.0)
        .with_recovery(RecoveryConfig::new(1, 3, 2))
        .with_arena(arena);
    let report = run(config, ArenaSim::new(arena));

    assert_eq!(report.termination, Termination::Halted);
    assert_eq!(report.counters.restarts, 4);
    assert_eq!(report.counters.repairs, 0);
    assert!(report.counters.cosmetic_tolerated <= report.counters.corruptions_detected);
}

#[test]
fn test_idle_agent_without_faults_never_corrupts() {
    let arena = ArenaConfig::new(8).with_episode_ticks(200);
    let config = RunConfig::new(8)
        .with_steps(0)
        .with_fault(crate::fault::FaultModelConfig::no_faults(8))
        .with_agent(AgentKind::Idle)
        .with_arena(arena);
    let report = run(config, ArenaSim::new(arena));

    assert_eq!(report.termination, Termination::Done);
    assert!(report.steps <= 200);
    assert_eq!(report.counters.corruptions_detected, 0);
    assert!(report.transitions.is_empty());
}
