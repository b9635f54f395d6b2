//! Identical configurations produce identical runs.

use crate::agent::AgentKind;
use crate::config::RunConfig;
use crate::e2e_tests::helpers::*;
use crate::fault::FaultEvent;
use crate::game::{ArenaConfig, ArenaSim};
use crate::runlog::LogEntry;

fn arena_config(seed: u64) -> RunConfig {
    RunConfig::new(seed)
        .with_steps(300)
        .with_flip_probability(0.2)
        .with_agent(AgentKind::Random)
        .with_arena(ArenaConfig::new(seed))
}

fn fault_events(entries: &[LogEntry]) -> Vec<FaultEvent> {
    entries
        .iter()
        .filter_map(|e| match e {
            LogEntry::FaultInjected { event, .. } | LogEntry::FaultSkipped { event, .. } => {
                Some(*event)
            }
            _ => None,
        })
        .collect()
}

#[test]
fn test_same_seed_same_run() {
    let dir = tempfile::tempdir().unwrap();
    let (report1, entries1) = run_logged(
        arena_config(7),
        ArenaSim::new(ArenaConfig::new(7)),
        &dir.path().join("a.log"),
    );
    let (report2, entries2) = run_logged(
        arena_config(7),
        ArenaSim::new(ArenaConfig::new(7)),
        &dir.path().join("b.log"),
    );

    assert!(!fault_events(&entries1).is_empty());
    assert_eq!(fault_events(&entries1), fault_events(&entries2));
    assert_eq!(entries1, entries2);
    assert_eq!(report1, report2);
}

#[test]
fn test_different_seed_different_faults() {
    let dir = tempfile::tempdir().unwrap();
    let (_, entries1) = run_logged(
        arena_config(7),
        ArenaSim::new(ArenaConfig::new(7)),
        &dir.path().join("a.log"),
    );
    let (_, entries2) = run_logged(
        arena_config(8),
        ArenaSim::new(ArenaConfig::new(8)),
        &dir.path().join("b.log"),
    );

    assert_ne!(fault_events(&entries1), fault_events(&entries2));
}
