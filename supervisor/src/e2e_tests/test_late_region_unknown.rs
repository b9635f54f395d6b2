//! A region registered mid-run without a snapshot is reported `Unknown`,
//! never `Clean` or `Corrupted`, and never moves the supervisor.

use crate::agent::AgentKind;
use crate::config::RunConfig;
use crate::e2e_tests::helpers::*;
use crate::fault::{FaultModelConfig, RegionWeights};
use crate::game::{Action, Observation, Simulation, StepOutcome};
use crate::integrity::VerdictStatus;
use crate::memory::{Criticality, RegionRegistry, RegistryError};
use crate::recovery::RunState;
use crate::runlog::LogEntry;
use crate::testing::{FixedRegionSim, single_critical_region};

struct LateRegionSim {
    inner: FixedRegionSim,
    register_at: u64,
}

impl Simulation for LateRegionSim {
    fn init(&mut self, registry: &mut RegionRegistry) -> Result<(), RegistryError> {
        self.inner.init(registry)
    }

    fn reset(&mut self, registry: &mut RegionRegistry) -> Result<Observation, RegistryError> {
        self.inner.reset(registry)
    }

    fn step(
        &mut self,
        action: Action,
        registry: &mut RegionRegistry,
    ) -> Result<StepOutcome, RegistryError> {
        let outcome = self.inner.step(action, registry)?;
        if outcome.observation.tick == self.register_at {
            registry.register("late", vec![0; 32], Criticality::Critical)?;
        }
        Ok(outcome)
    }

    fn observe(&self, registry: &RegionRegistry) -> Result<Observation, RegistryError> {
        self.inner.observe(registry)
    }
}

fn late_sim() -> LateRegionSim {
    LateRegionSim {
        inner: single_critical_region(),
        register_at: 3,
    }
}

fn verdicts(entries: &[LogEntry]) -> Vec<(u64, VerdictStatus)> {
    entries
        .iter()
        .filter_map(|e| match e {
            LogEntry::Verdict(v) => Some((v.step, v.status)),
            _ => None,
        })
        .collect()
}

#[test]
fn test_unsnapshotted_region_is_unknown() {
    let dir = tempfile::tempdir().unwrap();
    let config = RunConfig::new(1)
        .with_steps(10)
        .with_fault(FaultModelConfig::no_faults(1))
        .with_agent(AgentKind::Idle);
    let (report, entries) = run_logged(config, late_sim(), &dir.path().join("run.log"));

    let expected: Vec<(u64, VerdictStatus)> =
        (3..=10).map(|step| (step, VerdictStatus::Unknown)).collect();
    assert_eq!(verdicts(&entries), expected);
    assert!(report.transitions.is_empty());
    assert_eq!(report.final_state, RunState::Running);
    assert_eq!(report.counters.corruptions_detected, 0);
}

#[test]
fn test_faults_in_unsnapshotted_region_stay_unknown() {
    let dir = tempfile::tempdir().unwrap();
    let config = RunConfig::new(1)
        .with_steps(10)
        .with_fault(FaultModelConfig::per_step(1, 1.0).with_weights(RegionWeights::ByName(vec![
            ("state".to_string(), 0.0),
        ])))
        .with_agent(AgentKind::Idle);
    let (report, entries) = run_logged(config, late_sim(), &dir.path().join("run.log"));

    // Nothing is targetable until the late region appears at step 3.
    assert_eq!(report.faults_injected, 8);
    assert!(
        verdicts(&entries)
            .iter()
            .all(|(_, status)| *status == VerdictStatus::Unknown)
    );
    assert!(report.transitions.is_empty());
}
