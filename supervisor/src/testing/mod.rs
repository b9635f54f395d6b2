//! Test fixtures shared by unit and end-to-end tests.

use std::cell::Cell;

use crate::game::{Action, Observation, Simulation, StepOutcome};
use crate::memory::{Criticality, RegionId, RegionRegistry, RegistryError};
use crate::time::TimeSource;

/// One region a [`FixedRegionSim`] registers.
#[derive(Debug, Clone)]
pub struct RegionSpec {
    pub name: String,
    pub len: usize,
    pub criticality: Criticality,
    pub mirrored: bool,
}

/// A simulation made of fixed-size regions with a predictable fill.
///
/// Every step writes the tick counter into the first eight bytes of each
/// region long enough to hold it, so trusted writes are exercised alongside
/// injected faults.
#[derive(Debug, Default)]
pub struct FixedRegionSim {
    specs: Vec<RegionSpec>,
    ids: Vec<RegionId>,
    done_after: Option<u64>,
    tick: u64,
    resets: u64,
}

impl FixedRegionSim {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_region(mut self, name: &str, len: usize, criticality: Criticality) -> Self {
        self.specs.push(RegionSpec {
            name: name.to_string(),
            len,
            criticality,
            mirrored: false,
        });
        self
    }

    #[must_use]
    pub fn with_mirrored_region(mut self, name: &str, len: usize, criticality: Criticality) -> Self {
        self.specs.push(RegionSpec {
            name: name.to_string(),
            len,
            criticality,
            mirrored: true,
        });
        self
    }

    /// Report `done` once the tick counter reaches `ticks`.
    #[must_use]
    pub const fn with_done_after(mut self, ticks: u64) -> Self {
        self.done_after = Some(ticks);
        self
    }

    /// Number of times [`Simulation::reset`] was called.
    #[must_use]
    pub const fn resets(&self) -> u64 {
        self.resets
    }

    fn fill(index: usize, len: usize) -> Vec<u8> {
        (0..len)
            .map(|i| u8::try_from((i + index * 31) % 251).unwrap_or(0))
            .collect()
    }
}

impl Simulation for FixedRegionSim {
    fn init(&mut self, registry: &mut RegionRegistry) -> Result<(), RegistryError> {
        for (index, spec) in self.specs.iter().enumerate() {
            let bytes = Self::fill(index, spec.len);
            let id = if spec.mirrored {
                registry.register_mirrored(&spec.name, bytes, spec.criticality)?
            } else {
                registry.register(&spec.name, bytes, spec.criticality)?
            };
            self.ids.push(id);
        }
        Ok(())
    }

    fn reset(&mut self, registry: &mut RegionRegistry) -> Result<Observation, RegistryError> {
        self.tick = 0;
        self.resets += 1;
        for (index, (spec, id)) in self.specs.iter().zip(&self.ids).enumerate() {
            registry.write(*id, 0, &Self::fill(index, spec.len))?;
        }
        self.observe(registry)
    }

    fn step(
        &mut self,
        _action: Action,
        registry: &mut RegionRegistry,
    ) -> Result<StepOutcome, RegistryError> {
        self.tick += 1;
        for (spec, id) in self.specs.iter().zip(&self.ids) {
            if spec.len >= 8 {
                registry.write(*id, 0, &self.tick.to_le_bytes())?;
            }
        }
        Ok(StepOutcome {
            observation: self.observe(registry)?,
            reward: 0.0,
            done: self.done_after.is_some_and(|n| self.tick >= n),
        })
    }

    fn observe(&self, _registry: &RegionRegistry) -> Result<Observation, RegistryError> {
        Ok(Observation {
            tick: self.tick,
            health: 100,
            ..Observation::default()
        })
    }

    fn level(&self) -> &str {
        "FIXED"
    }
}

/// A clock that moves forward by a fixed amount every time it is read.
#[derive(Debug)]
pub struct SteppingClock {
    now_us: Cell<u64>,
    step_us: u64,
}

impl SteppingClock {
    #[must_use]
    pub const fn new(start_us: u64, step_us: u64) -> Self {
        Self {
            now_us: Cell::new(start_us),
            step_us,
        }
    }
}

impl TimeSource for SteppingClock {
    fn now_us(&self) -> u64 {
        let now = self.now_us.get();
        self.now_us.set(now.saturating_add(self.step_us));
        now
    }
}

/// The scenario region used throughout the tests: 64 bytes, `Critical`, no
/// redundant copy.
#[must_use]
pub fn single_critical_region() -> FixedRegionSim {
    FixedRegionSim::new().with_region("state", 64, Criticality::Critical)
}
