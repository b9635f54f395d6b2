//! End-to-end tests at the run level.
//!
//! Each test file covers a specific scenario, driving a complete run with
//! deterministic seeds and checking the report, the run log or the
//! telemetry output it leaves behind.

#![cfg(test)]

mod helpers;

mod test_arena_run;
mod test_auto_restart_episodes;
mod test_cosmetic_only;
mod test_determinism;
mod test_halt_after_max_restarts;
mod test_late_region_unknown;
mod test_mirrored_repair;
mod test_repair_copy_corrupted;
mod test_restart_late_region;
mod test_run_log_replay;
mod test_single_critical_region;
mod test_stop_signal;
mod test_sweep;
mod test_tier0_output;
mod test_zero_regions;
