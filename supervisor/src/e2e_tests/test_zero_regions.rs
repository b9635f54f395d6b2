//! A simulation with no registered regions never sees a fault.

use crate::e2e_tests::helpers::*;
use crate::fault::{FaultModel, FaultModelConfig};
use crate::memory::RegionRegistry;
use crate::recovery::{RecoveryConfig, RunState};
use crate::testing::FixedRegionSim;

#[test]
fn test_fault_model_never_fires_without_regions() {
    let registry = RegionRegistry::new();
    let configs = [
        FaultModelConfig::per_step(1, 1.0).with_multi_bit_probability(0.5),
        FaultModelConfig::mean_time_between_faults(2, 1.0),
    ];
    for config in configs {
        let mut model = FaultModel::new(config);
        assert!((1..=1_000).all(|step| model.next_fault(step, &registry).is_none()));
    }
}

#[test]
fn test_run_stays_running_with_no_corruption() {
    let report = run(
        always_faulting(1, 200, RecoveryConfig::new(1, 0, 0)),
        FixedRegionSim::new(),
    );

    assert_eq!(report.final_state, RunState::Running);
    assert!(report.transitions.is_empty());
    assert_eq!(report.faults_injected, 0);
    assert_eq!(report.faults_skipped, 0);
    assert_eq!(report.steps, 200);
    assert_eq!(report.summary.total_corruptions, 0);
    assert_eq!(report.summary.peak_region_count, 0);
    assert_eq!(report.summary.peak_region_bytes, 0);
}
