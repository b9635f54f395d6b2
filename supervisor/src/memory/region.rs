//! Memory regions and their integrity witnesses.
//!
//! A region is a named byte buffer holding simulation state. Its witness is
//! the CRC32 of the content at the moment it was last declared known-good,
//! optionally accompanied by a redundant copy of that content.

use std::fmt;

use serde::Serialize;

/// Identifier of a registered memory region.
///
/// Ids are assigned sequentially by the registry and never reused within a
/// run, so a stale id held by a scheduled fault can never alias a newer
/// region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize)]
pub struct RegionId(pub u32);

impl RegionId {
    /// Get the raw id value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "region#{}", self.0)
    }
}

impl From<u32> for RegionId {
    fn from(n: u32) -> Self {
        Self(n)
    }
}

/// How much a region's corruption matters to correct execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Criticality {
    /// Corruption invalidates the run state (player block, control data).
    Critical = 0x01,
    /// Corruption degrades behavior but the run can continue after repair.
    Important = 0x02,
    /// Corruption is tolerated and only logged (frame buffers, caches).
    Cosmetic = 0x03,
}

impl Criticality {
    /// All tiers, most severe first.
    pub const ALL: [Self; 3] = [Self::Critical, Self::Important, Self::Cosmetic];

    /// Whether corruption of this tier must be acted upon.
    #[must_use]
    pub const fn is_severe(self) -> bool {
        matches!(self, Self::Critical | Self::Important)
    }

    /// Stable lowercase name used in logs and JSON output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Important => "important",
            Self::Cosmetic => "cosmetic",
        }
    }
}

impl fmt::Display for Criticality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<u8> for Criticality {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Self::Critical),
            0x02 => Ok(Self::Important),
            0x03 => Ok(Self::Cosmetic),
            _ => Err(value),
        }
    }
}

/// Known-good fingerprint of a region's content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Witness {
    /// CRC32 of the content when the witness was taken.
    pub checksum: u32,
    /// Length of the content when the witness was taken.
    pub len: usize,
    /// Redundant copy of the content, present for mirrored regions.
    pub copy: Option<Vec<u8>>,
    /// Step at which the witness was taken.
    pub taken_at: u64,
}

impl Witness {
    fn capture(bytes: &[u8], mirrored: bool, step: u64) -> Self {
        Self {
            checksum: crc32fast::hash(bytes),
            len: bytes.len(),
            copy: mirrored.then(|| bytes.to_vec()),
            taken_at: step,
        }
    }
}

/// A registered buffer of simulation state.
///
/// # Invariants
///
/// - `witness`, when present, was computed from `bytes` at the step it was
///   taken. Trusted writes re-witness consistent regions, so any later
///   difference is corruption.
/// - `witness.copy` is `Some` if and only if `mirrored` is true.
#[derive(Debug)]
pub struct MemoryRegion {
    id: RegionId,
    name: String,
    bytes: Vec<u8>,
    criticality: Criticality,
    mirrored: bool,
    witness: Option<Witness>,
    last_verified: Option<u64>,
}

impl MemoryRegion {
    pub(crate) const fn new(
        id: RegionId,
        name: String,
        bytes: Vec<u8>,
        criticality: Criticality,
        mirrored: bool,
    ) -> Self {
        Self {
            id,
            name,
            bytes,
            criticality,
            mirrored,
            witness: None,
            last_verified: None,
        }
    }

    #[must_use]
    pub const fn id(&self) -> RegionId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub(crate) fn bytes_mut(&mut self) -> &mut Vec<u8> {
        &mut self.bytes
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[must_use]
    pub const fn criticality(&self) -> Criticality {
        self.criticality
    }

    /// Whether the region keeps a redundant copy in its witness.
    #[must_use]
    pub const fn is_mirrored(&self) -> bool {
        self.mirrored
    }

    #[must_use]
    pub const fn witness(&self) -> Option<&Witness> {
        self.witness.as_ref()
    }

    /// Step of the last snapshot or clean verification.
    #[must_use]
    pub const fn last_verified(&self) -> Option<u64> {
        self.last_verified
    }

    /// CRC32 of the current content.
    #[must_use]
    pub fn checksum(&self) -> u32 {
        crc32fast::hash(&self.bytes)
    }

    /// Compare the current content against the witness.
    ///
    /// Returns `None` when the region has never been snapshotted.
    #[must_use]
    pub fn matches_witness(&self) -> Option<bool> {
        self.witness
            .as_ref()
            .map(|w| w.len == self.bytes.len() && w.checksum == self.checksum())
    }

    /// Declare the current content known-good.
    pub(crate) fn refresh_witness(&mut self, step: u64) {
        self.witness = Some(Witness::capture(&self.bytes, self.mirrored, step));
        self.last_verified = Some(step);
    }

    /// Re-witness after a trusted write without counting it as a verification.
    pub(crate) fn rewitness_after_write(&mut self, step: u64) {
        self.witness = Some(Witness::capture(&self.bytes, self.mirrored, step));
    }

    pub(crate) const fn mark_verified(&mut self, step: u64) {
        self.last_verified = Some(step);
    }

    /// Replace the content wholesale (checkpoint restore, repair).
    pub(crate) fn replace_content(&mut self, bytes: &[u8]) {
        self.bytes.clear();
        self.bytes.extend_from_slice(bytes);
    }

    /// Invert one byte of the redundant copy. Returns `false` when there is
    /// no copy or `byte` is past its end.
    #[cfg(test)]
    pub(crate) fn corrupt_copy(&mut self, byte: usize) -> bool {
        match self
            .witness
            .as_mut()
            .and_then(|w| w.copy.as_mut())
            .and_then(|copy| copy.get_mut(byte))
        {
            Some(b) => {
                *b ^= 0xFF;
                true
            }
            None => false,
        }
    }
}
