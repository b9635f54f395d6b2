#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods))]
// Life of a step:
// 1. Agent picks an action from the last observation
// 2. Simulation applies it through trusted registry writes
// 3. Fault model may fire; the injector flips bits in a region
// 4. Integrity monitor compares regions against their witnesses
// 5. Recovery supervisor decides: keep running, repair, restart or halt
//    - Repair restores a region from its redundant copy
//    - Restart rewinds every region to the last clean checkpoint
// 6. Telemetry records latency and memory use; the run log records all of it
//
// System components:
//  - Region registry (owned state + witnesses)
//  - Fault model / injector
//  - Integrity monitor
//  - Recovery state machine
//  - Telemetry (summary, Tier-0 JSON lines, F′ frames)

pub mod agent;
pub mod config;
pub mod controller;
pub mod fault;
pub mod game;
pub mod integrity;
pub mod memory;
pub mod recovery;
pub mod runlog;
pub mod sweep;
pub mod telemetry;
pub mod time;

mod e2e_tests;
#[cfg(test)]
mod testing;

pub use config::{ConfigError, RunConfig, RunMode};
pub use controller::{RunController, RunError, RunReport};
pub use memory::{Criticality, RegionId, RegionRegistry, RegistryError};
pub use recovery::{RunState, Termination};
