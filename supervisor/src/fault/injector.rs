//! Fault injector: applies fault events to region memory.
//!
//! The injector is the only code path allowed to change region bytes outside
//! the simulation's trusted writes. It goes through the registry handle and
//! deliberately bypasses witness maintenance, so the corruption stays
//! visible to the integrity monitor.

use super::event::{CorruptionKind, FaultEvent};
use crate::memory::{RegionId, RegionRegistry};

/// Reasons an event could not be applied.
///
/// Both are expected under dynamic regions: the event is logged as skipped
/// and the run continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectionError {
    /// A targeted bit lies beyond the region's current size.
    OutOfRange {
        region: RegionId,
        bit_offset: u64,
        region_bits: u64,
    },
    /// The target region has been unregistered.
    UnknownRegion(RegionId),
}

impl InjectionError {
    /// Stable code used in the run log.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::OutOfRange { .. } => 0x01,
            Self::UnknownRegion(_) => 0x02,
        }
    }
}

impl std::fmt::Display for InjectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OutOfRange {
                region,
                bit_offset,
                region_bits,
            } => write!(
                f,
                "bit offset {bit_offset} out of range for {region} ({region_bits} bits)"
            ),
            Self::UnknownRegion(region) => write!(f, "{region} is no longer registered"),
        }
    }
}

impl std::error::Error for InjectionError {}

/// Outcome of a successfully applied event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectionReport {
    /// Bit offsets the event touched.
    pub bits: Vec<u64>,
    /// How many of those bits actually changed value.
    ///
    /// Always equal to `bits.len()` for flips; a stuck fault on a bit that
    /// already holds the stuck level changes nothing.
    pub bits_changed: usize,
}

/// Statistics about injector activity.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct InjectorStats {
    /// Events applied to memory.
    pub applied: u64,
    /// Events skipped because of an [`InjectionError`].
    pub skipped: u64,
    /// Bits that changed value across all applied events.
    pub bits_changed: u64,
}

/// Applies [`FaultEvent`]s to region memory.
#[derive(Debug, Default)]
pub struct FaultInjector {
    stats: InjectorStats,
}

impl FaultInjector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn stats(&self) -> InjectorStats {
        self.stats
    }

    /// Apply an event to the target region's buffer.
    ///
    /// Nothing is mutated unless every affected bit is in range.
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` if a bit lies beyond the region's current size and
    /// `UnknownRegion` if the region was unregistered since the event was
    /// scheduled.
    pub fn apply(
        &mut self,
        event: &FaultEvent,
        registry: &mut RegionRegistry,
    ) -> Result<InjectionReport, InjectionError> {
        let result = Self::apply_inner(event, registry);
        match &result {
            Ok(report) => {
                self.stats.applied += 1;
                self.stats.bits_changed += report.bits_changed as u64;
            }
            Err(_) => self.stats.skipped += 1,
        }
        result
    }

    fn apply_inner(
        event: &FaultEvent,
        registry: &mut RegionRegistry,
    ) -> Result<InjectionReport, InjectionError> {
        let region = registry
            .region_mut(event.region)
            .map_err(|_| InjectionError::UnknownRegion(event.region))?;

        let region_bits = (region.len() as u64) * 8;
        let bits = event.affected_bits();
        if let Some(&bad) = bits.iter().find(|&&b| b >= region_bits) {
            return Err(InjectionError::OutOfRange {
                region: event.region,
                bit_offset: bad,
                region_bits,
            });
        }

        let bytes = region.bytes_mut();
        let mut bits_changed = 0;
        for &bit in &bits {
            #[allow(clippy::cast_possible_truncation)] // bit < region_bits, which came from a usize
            let byte_index = (bit / 8) as usize;
            let mask = 1u8 << (bit % 8);
            let before = bytes[byte_index];

            bytes[byte_index] = match event.kind {
                CorruptionKind::SingleBitFlip | CorruptionKind::MultiBitFlip => before ^ mask,
                CorruptionKind::Stuck if event.stuck_level() => before | mask,
                CorruptionKind::Stuck => before & !mask,
            };

            if bytes[byte_index] != before {
                bits_changed += 1;
            }
        }

        Ok(InjectionReport { bits, bits_changed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Criticality;

    fn setup(len: usize) -> (RegionRegistry, RegionId) {
        let mut registry = RegionRegistry::new();
        let id = registry
            .register("target", vec![0; len], Criticality::Critical)
            .unwrap();
        registry.snapshot(id).unwrap();
        (registry, id)
    }

    fn event(region: RegionId, bit_offset: u64, kind: CorruptionKind, seed: u64) -> FaultEvent {
        FaultEvent {
            step: 1,
            region,
            bit_offset,
            kind,
            seed,
        }
    }

    #[test]
    fn test_single_flip() {
        let (mut registry, id) = setup(4);
        let mut injector = FaultInjector::new();

        let report = injector
            .apply(&event(id, 10, CorruptionKind::SingleBitFlip, 0), &mut registry)
            .unwrap();

        assert_eq!(report.bits, vec![10]);
        assert_eq!(report.bits_changed, 1);
        assert_eq!(registry.bytes(id).unwrap(), &[0, 0b0000_0100, 0, 0]);
        assert_eq!(registry.get(id).unwrap().matches_witness(), Some(false));
    }

    #[test]
    fn test_flipping_twice_restores() {
        let (mut registry, id) = setup(4);
        let mut injector = FaultInjector::new();
        let e = event(id, 31, CorruptionKind::SingleBitFlip, 0);

        injector.apply(&e, &mut registry).unwrap();
        injector.apply(&e, &mut registry).unwrap();

        assert_eq!(registry.bytes(id).unwrap(), &[0; 4]);
        assert_eq!(injector.stats().applied, 2);
        assert_eq!(injector.stats().bits_changed, 2);
    }

    #[test]
    fn test_multi_bit_flip_changes_cluster() {
        let (mut registry, id) = setup(8);
        let mut injector = FaultInjector::new();
        let e = event(id, 20, CorruptionKind::MultiBitFlip, 77);

        let report = injector.apply(&e, &mut registry).unwrap();
        assert_eq!(report.bits, e.affected_bits());
        assert_eq!(report.bits_changed, report.bits.len());

        let flipped: u32 = registry.bytes(id).unwrap().iter().map(|b| b.count_ones()).sum();
        assert_eq!(flipped as usize, report.bits.len());
    }

    #[test]
    fn test_stuck_bit_may_be_noop() {
        let (mut registry, id) = setup(2);
        let mut injector = FaultInjector::new();

        // Even seed: stuck at 0 on a zero bit changes nothing.
        let report = injector
            .apply(&event(id, 3, CorruptionKind::Stuck, 2), &mut registry)
            .unwrap();
        assert_eq!(report.bits_changed, 0);
        assert_eq!(registry.get(id).unwrap().matches_witness(), Some(true));

        // Odd seed: stuck at 1 sets it.
        let report = injector
            .apply(&event(id, 3, CorruptionKind::Stuck, 3), &mut registry)
            .unwrap();
        assert_eq!(report.bits_changed, 1);
        assert_eq!(registry.bytes(id).unwrap(), &[0b0000_1000, 0]);
    }

    #[test]
    fn test_out_of_range_is_reported_and_nothing_changes() {
        let (mut registry, id) = setup(2);
        let mut injector = FaultInjector::new();

        let result = injector.apply(&event(id, 16, CorruptionKind::SingleBitFlip, 0), &mut registry);
        assert_eq!(
            result,
            Err(InjectionError::OutOfRange {
                region: id,
                bit_offset: 16,
                region_bits: 16,
            })
        );
        assert_eq!(registry.bytes(id).unwrap(), &[0, 0]);
        assert_eq!(injector.stats().skipped, 1);
    }

    #[test]
    fn test_out_of_range_after_shrink() {
        let (mut registry, id) = setup(8);
        let mut injector = FaultInjector::new();
        let scheduled = event(id, 40, CorruptionKind::SingleBitFlip, 0);

        registry.resize(id, 4).unwrap();
        let result = injector.apply(&scheduled, &mut registry);
        assert!(matches!(result, Err(InjectionError::OutOfRange { .. })));
    }

    #[test]
    fn test_unregistered_region_is_skipped() {
        let (mut registry, id) = setup(8);
        let mut injector = FaultInjector::new();
        registry.unregister(id).unwrap();

        let result = injector.apply(&event(id, 0, CorruptionKind::SingleBitFlip, 0), &mut registry);
        assert_eq!(result, Err(InjectionError::UnknownRegion(id)));
    }
}
