//! A damaged redundant copy fails repair until the failure budget runs out,
//! then the run restarts from its checkpoint.

use crate::e2e_tests::helpers::*;
use crate::game::{Action, Observation, Simulation, StepOutcome};
use crate::memory::{Criticality, RegionRegistry, RegistryError, RepairResult};
use crate::recovery::{RecoveryConfig, RunState, Termination, TransitionReason};
use crate::runlog::LogEntry;
use crate::testing::FixedRegionSim;

/// One mirrored `Critical` region whose copy is damaged at `damage_at`,
/// after that tick's trusted write.
struct DamagedCopySim {
    inner: FixedRegionSim,
    damage_at: u64,
}

impl Simulation for DamagedCopySim {
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
        if outcome.observation.tick == self.damage_at {
            let id = registry.lookup("state")?;
            registry.corrupt_copy(id, 40)?;
        }
        Ok(outcome)
    }

    fn observe(&self, registry: &RegionRegistry) -> Result<Observation, RegistryError> {
        self.inner.observe(registry)
    }
}

fn damaged_copy_sim() -> DamagedCopySim {
    DamagedCopySim {
        inner: FixedRegionSim::new().with_mirrored_region("state", 64, Criticality::Critical),
        damage_at: 3,
    }
}

#[test]
fn test_failed_repairs_escalate_to_restart() {
    let dir = tempfile::tempdir().unwrap();
    let (report, entries) = run_logged(
        always_faulting(2, 6, RecoveryConfig::new(100, 5, 2)),
        damaged_copy_sim(),
        &dir.path().join("run.log"),
    );

    assert_eq!(report.termination, Termination::BudgetExhausted);
    assert_eq!(report.final_state, RunState::Running);
    assert_eq!(report.counters.restarts, 1);
    // Steps 1, 2, 4, 5 and 6 repair from an intact copy.
    assert_eq!(report.counters.repairs, 5);

    let at_step_3: Vec<(RunState, RunState, TransitionReason)> = report
        .transitions
        .iter()
        .filter(|t| t.step == 3)
        .map(|t| (t.from, t.to, t.reason))
        .collect();
    assert_eq!(at_step_3.len(), 3);
    assert_eq!(at_step_3[0].0, RunState::Running);
    assert_eq!(at_step_3[0].1, RunState::Repairing);
    assert_eq!(
        at_step_3[1],
        (
            RunState::Repairing,
            RunState::Restarting,
            TransitionReason::RepairFailuresExceeded
        )
    );
    assert_eq!(
        at_step_3[2],
        (
            RunState::Restarting,
            RunState::Running,
            TransitionReason::CheckpointRestored
        )
    );

    // max_repair_failures + 1 attempts, all against the damaged copy.
    let failed: Vec<u64> = entries
        .iter()
        .filter_map(|e| match e {
            LogEntry::Repair {
                step,
                result: RepairResult::CopyCorrupted { .. },
                ..
            } => Some(*step),
            _ => None,
        })
        .collect();
    assert_eq!(failed, [3, 3, 3]);
}
