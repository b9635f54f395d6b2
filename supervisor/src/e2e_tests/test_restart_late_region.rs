//! Restarts only vouch for regions the checkpoint holds an image of.

use crate::agent::AgentKind;
use crate::config::RunConfig;
use crate::controller::RunController;
use crate::e2e_tests::helpers::*;
use crate::fault::{FaultModelConfig, RegionWeights};
use crate::game::{Action, Observation, Simulation, StepOutcome};
use crate::memory::{Criticality, RegionRegistry, RegistryError};
use crate::recovery::{RecoveryConfig, RunState, Termination};
use crate::testing::{FixedRegionSim, single_critical_region};
use crate::time::SimulatedTimeSource;

/// Registers and snapshots a `Critical` "late" region partway through the
/// run, optionally flipping one of its bits behind the registry's back.
struct LateSnapshotSim {
    inner: FixedRegionSim,
    register_at: u64,
    upset_at: Option<u64>,
}

impl LateSnapshotSim {
    fn new(register_at: u64) -> Self {
        Self {
            inner: single_critical_region(),
            register_at,
            upset_at: None,
        }
    }
}

impl Simulation for LateSnapshotSim {
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
        let tick = outcome.observation.tick;
        if tick == self.register_at {
            let id = registry.register("late", vec![7; 32], Criticality::Critical)?;
            registry.snapshot(id)?;
        }
        if self.upset_at == Some(tick) {
            let id = registry.lookup("late")?;
            registry.region_mut(id)?.bytes_mut()[3] ^= 0x10;
        }
        Ok(outcome)
    }

    fn observe(&self, registry: &RegionRegistry) -> Result<Observation, RegistryError> {
        self.inner.observe(registry)
    }
}

#[test]
fn test_restart_does_not_launder_region_missing_from_checkpoint() {
    // Faults hit only "late", starting the step it appears, so no pass is
    // ever clean enough to capture it.
    let config = RunConfig::new(1)
        .with_steps(20)
        .with_fault(
            FaultModelConfig::per_step(1, 1.0)
                .with_weights(RegionWeights::ByName(vec![("state".to_string(), 0.0)])),
        )
        .with_recovery(RecoveryConfig::new(1, 2, 0))
        .with_checkpoint_interval(0)
        .with_agent(AgentKind::Idle);
    let mut controller = RunController::new(config, LateSnapshotSim::new(2))
        .with_clock(SimulatedTimeSource::default());

    let report = controller.run().unwrap();
    assert_eq!(report.termination, Termination::Halted);
    assert_eq!(report.counters.restarts, 3);
    assert_eq!(report.steps, 4);

    let registry = controller.registry();
    let late = registry.lookup("late").unwrap();
    assert!(!controller.checkpoint().unwrap().contains(late));
    assert_ne!(registry.bytes(late).unwrap(), &[7; 32]);
    assert_eq!(registry.get(late).unwrap().matches_witness(), Some(false));

    let state = registry.lookup("state").unwrap();
    assert_eq!(registry.get(state).unwrap().matches_witness(), Some(true));
}

#[test]
fn test_checkpoint_recaptured_once_new_region_is_clean() {
    let mut sim = LateSnapshotSim::new(2);
    sim.upset_at = Some(5);
    let config = RunConfig::new(1)
        .with_steps(8)
        .with_fault(FaultModelConfig::no_faults(1))
        .with_recovery(RecoveryConfig::new(1, 3, 0))
        .with_checkpoint_interval(0)
        .with_agent(AgentKind::Idle);
    let mut controller =
        RunController::new(config, sim).with_clock(SimulatedTimeSource::default());

    let report = controller.run().unwrap();
    assert_eq!(report.termination, Termination::BudgetExhausted);
    assert_eq!(report.final_state, RunState::Running);
    assert_eq!(report.counters.restarts, 1);
    assert_eq!(
        path(&report.transitions),
        [
            (RunState::Running, RunState::Repairing),
            (RunState::Repairing, RunState::Restarting),
            (RunState::Restarting, RunState::Running),
        ]
    );

    let checkpoint = controller.checkpoint().unwrap();
    assert_eq!(checkpoint.step, 2);
    assert!(checkpoint.covers(controller.registry()));

    let registry = controller.registry();
    let late = registry.lookup("late").unwrap();
    assert_eq!(registry.bytes(late).unwrap(), &[7; 32]);
    assert_eq!(registry.get(late).unwrap().matches_witness(), Some(true));
}
