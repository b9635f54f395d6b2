//! Fault events: the immutable record of one corruption.

use std::fmt;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::memory::RegionId;

/// What a fault does to the bits it hits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CorruptionKind {
    /// One bit is toggled.
    SingleBitFlip = 0x01,
    /// A cluster of bits in the same byte is toggled.
    MultiBitFlip = 0x02,
    /// One bit is forced to a fixed level.
    Stuck = 0x03,
}

impl CorruptionKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SingleBitFlip => "single_bit_flip",
            Self::MultiBitFlip => "multi_bit_flip",
            Self::Stuck => "stuck",
        }
    }
}

impl fmt::Display for CorruptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<u8> for CorruptionKind {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Self::SingleBitFlip),
            0x02 => Ok(Self::MultiBitFlip),
            0x03 => Ok(Self::Stuck),
            _ => Err(value),
        }
    }
}

/// A single corruption event.
///
/// Events are created by the fault model (or decoded from a run log for
/// replay) and never modified afterwards. Everything the injector needs to
/// reproduce the corruption is derived from the fields below.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultEvent {
    /// Step at which the fault fires.
    pub step: u64,
    /// Region the fault targets.
    pub region: RegionId,
    /// Bit offset from the start of the region.
    pub bit_offset: u64,
    /// What happens to the targeted bits.
    pub kind: CorruptionKind,
    /// Per-event seed; multi-bit clusters and stuck levels derive from it.
    pub seed: u64,
}

impl FaultEvent {
    /// Bit offsets touched by this event, ascending.
    ///
    /// Multi-bit flips hit 2 to 4 distinct bits within the byte containing
    /// `bit_offset` (always including `bit_offset` itself), modelling the
    /// adjacent-cell upsets a single particle strike causes.
    #[must_use]
    pub fn affected_bits(&self) -> Vec<u64> {
        match self.kind {
            CorruptionKind::SingleBitFlip | CorruptionKind::Stuck => vec![self.bit_offset],
            CorruptionKind::MultiBitFlip => {
                let mut rng = StdRng::seed_from_u64(self.seed);
                let count = rng.random_range(2..=4usize);
                let byte_base = self.bit_offset & !7;

                let mut bits = vec![self.bit_offset];
                while bits.len() < count {
                    let candidate = byte_base + rng.random_range(0..8u64);
                    if !bits.contains(&candidate) {
                        bits.push(candidate);
                    }
                }
                bits.sort_unstable();
                bits
            }
        }
    }

    /// Level a stuck bit is forced to.
    #[must_use]
    pub const fn stuck_level(&self) -> bool {
        self.seed & 1 == 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: CorruptionKind, bit_offset: u64, seed: u64) -> FaultEvent {
        FaultEvent {
            step: 1,
            region: RegionId(0),
            bit_offset,
            kind,
            seed,
        }
    }

    #[test]
    fn test_single_flip_touches_one_bit() {
        let e = event(CorruptionKind::SingleBitFlip, 77, 5);
        assert_eq!(e.affected_bits(), vec![77]);
    }

    #[test]
    fn test_multi_bit_cluster_stays_in_byte() {
        for seed in 0..200 {
            let e = event(CorruptionKind::MultiBitFlip, 42, seed);
            let bits = e.affected_bits();

            assert!((2..=4).contains(&bits.len()), "seed {seed}: {bits:?}");
            assert!(bits.contains(&42));
            assert!(bits.iter().all(|b| (40..48).contains(b)));

            let mut deduped = bits.clone();
            deduped.dedup();
            assert_eq!(deduped, bits, "bits must be distinct");
        }
    }

    #[test]
    fn test_multi_bit_cluster_is_deterministic() {
        let a = event(CorruptionKind::MultiBitFlip, 9, 1234);
        let b = event(CorruptionKind::MultiBitFlip, 9, 1234);
        assert_eq!(a.affected_bits(), b.affected_bits());
    }

    #[test]
    fn test_stuck_level_from_seed() {
        assert!(event(CorruptionKind::Stuck, 0, 3).stuck_level());
        assert!(!event(CorruptionKind::Stuck, 0, 4).stuck_level());
    }

    #[test]
    fn test_kind_conversion() {
        for kind in [
            CorruptionKind::SingleBitFlip,
            CorruptionKind::MultiBitFlip,
            CorruptionKind::Stuck,
        ] {
            assert_eq!(CorruptionKind::try_from(kind as u8), Ok(kind));
        }
        assert!(CorruptionKind::try_from(0).is_err());
    }
}
