//! Addressable simulation state eligible for corruption.
//!
//! Every byte of state the run cares about lives in a [`MemoryRegion`] owned
//! by a per-run [`RegionRegistry`]. Regions carry a criticality tier and,
//! once snapshotted, a CRC32 witness (plus a redundant copy for mirrored
//! regions) used by the integrity monitor and the repair path.

mod region;
mod registry;

pub use region::{Criticality, MemoryRegion, RegionId, Witness};
pub use registry::{RegionCheckpoint, RegionRegistry, RegistryError, RepairResult};
