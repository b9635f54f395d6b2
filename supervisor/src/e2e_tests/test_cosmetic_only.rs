//! Cosmetic corruption is tolerated and never leaves `Running`.

use crate::e2e_tests::helpers::*;
use crate::fault::{FaultModelConfig, RegionWeights};
use crate::memory::Criticality;
use crate::recovery::{RecoveryConfig, RunState};
use crate::testing::FixedRegionSim;

#[test]
fn test_cosmetic_region_corrupted_every_step() {
    let sim = FixedRegionSim::new().with_region("frame", 128, Criticality::Cosmetic);
    let report = run(always_faulting(4, 100, RecoveryConfig::new(1, 0, 0)), sim);

    assert!(report.transitions.is_empty());
    assert_eq!(report.final_state, RunState::Running);
    assert_eq!(report.faults_injected, 100);
    assert_eq!(report.counters.corruptions_detected, 100);
    assert_eq!(report.counters.cosmetic_tolerated, 100);
    assert_eq!(report.counters.restarts, 0);
}

#[test]
fn test_cosmetic_faults_alongside_untouched_critical_state() {
    let sim = FixedRegionSim::new()
        .with_region("state", 64, Criticality::Critical)
        .with_region("frame", 256, Criticality::Cosmetic);
    let config = always_faulting(5, 50, RecoveryConfig::new(1, 0, 0)).with_fault(
        FaultModelConfig::per_step(5, 1.0)
            .with_multi_bit_probability(0.5)
            .with_weights(RegionWeights::ByCriticality {
                critical: 0.0,
                important: 0.0,
                cosmetic: 1.0,
            }),
    );
    let report = run(config, sim);

    assert!(report.transitions.is_empty());
    assert_eq!(report.final_state, RunState::Running);
    assert_eq!(report.counters.corruptions_detected, 50);
    assert_eq!(report.counters.cosmetic_tolerated, 50);
}
