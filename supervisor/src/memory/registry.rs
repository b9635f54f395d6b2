//! Registry of memory regions eligible for corruption.
//!
//! The registry exclusively owns every region buffer of a run. The simulation
//! mutates state through trusted writes, the fault injector through
//! [`RegionRegistry::region_mut`], and the integrity monitor reads through
//! [`RegionRegistry::get`]; nothing else holds a reference to the bytes.
//!
//! # Invariants
//!
//! - Each region name maps to exactly one live region id.
//! - Region ids are never reused within a registry.
//! - Iteration order is ascending id order, which keeps fault target
//!   selection deterministic.

use std::collections::{BTreeMap, HashMap};

use super::region::{Criticality, MemoryRegion, RegionId};

/// Errors caused by misuse of the registry API.
///
/// These are caller bugs and are always surfaced, never converted into run
/// state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A region with this name is already registered.
    DuplicateRegion(String),
    /// The id does not refer to a registered region.
    UnknownRegion(RegionId),
    /// No region is registered under this name.
    UnknownName(String),
    /// A trusted write reached past the end of the region.
    WriteOutOfBounds {
        region: RegionId,
        offset: usize,
        len: usize,
        region_len: usize,
    },
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateRegion(name) => write!(f, "region '{name}' is already registered"),
            Self::UnknownRegion(id) => write!(f, "{id} is not registered"),
            Self::UnknownName(name) => write!(f, "no region named '{name}'"),
            Self::WriteOutOfBounds {
                region,
                offset,
                len,
                region_len,
            } => write!(
                f,
                "write of {len} bytes at offset {offset} exceeds {region} (length {region_len})"
            ),
        }
    }
}

impl std::error::Error for RegistryError {}

/// Result of attempting to repair a region from its redundant copy.
///
/// Repair failures are expected runtime conditions and are reported as values
/// so the recovery supervisor can turn them into transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairResult {
    /// The region was restored from its redundant copy.
    Restored { bytes_restored: usize },
    /// The region has no redundant copy (or was never snapshotted).
    Unavailable,
    /// The redundant copy no longer matches its checksum.
    CopyCorrupted { expected: u32, actual: u32 },
}

impl RepairResult {
    #[must_use]
    pub const fn is_restored(self) -> bool {
        matches!(self, Self::Restored { .. })
    }
}

/// A known-good image of every region, used for restarts.
#[derive(Debug, Clone, Default)]
pub struct RegionCheckpoint {
    /// Step at which the checkpoint was captured.
    pub step: u64,
    images: Vec<(RegionId, Vec<u8>)>,
}

impl RegionCheckpoint {
    /// Number of region images held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.images.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Total bytes held across all images.
    #[must_use]
    pub fn total_bytes(&self) -> usize {
        self.images.iter().map(|(_, b)| b.len()).sum()
    }

    /// Whether the checkpoint holds an image of `id`.
    #[must_use]
    pub fn contains(&self, id: RegionId) -> bool {
        self.images.binary_search_by_key(&id, |(image_id, _)| *image_id).is_ok()
    }

    /// Whether every region currently in `registry` has an image here.
    #[must_use]
    pub fn covers(&self, registry: &RegionRegistry) -> bool {
        registry.iter().all(|region| self.contains(region.id()))
    }
}

/// Per-run registry of memory regions.
#[derive(Debug, Default)]
pub struct RegionRegistry {
    regions: BTreeMap<RegionId, MemoryRegion>,
    names: HashMap<String, RegionId>,
    next_id: u32,
    current_step: u64,
}

impl RegionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a buffer with a checksum-only witness.
    ///
    /// The region starts without a witness; call [`Self::snapshot`] once its
    /// content is known-good.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateRegion` if a region with this name is already tracked.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        bytes: Vec<u8>,
        criticality: Criticality,
    ) -> Result<RegionId, RegistryError> {
        self.insert(name.into(), bytes, criticality, false)
    }

    /// Register a buffer whose witness also keeps a redundant copy, making it
    /// repairable in place.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateRegion` if a region with this name is already tracked.
    pub fn register_mirrored(
        &mut self,
        name: impl Into<String>,
        bytes: Vec<u8>,
        criticality: Criticality,
    ) -> Result<RegionId, RegistryError> {
        self.insert(name.into(), bytes, criticality, true)
    }

    fn insert(
        &mut self,
        name: String,
        bytes: Vec<u8>,
        criticality: Criticality,
        mirrored: bool,
    ) -> Result<RegionId, RegistryError> {
        if self.names.contains_key(&name) {
            return Err(RegistryError::DuplicateRegion(name));
        }

        let id = RegionId(self.next_id);
        self.next_id += 1;

        tracing::debug!(
            "registered {id} '{name}' ({} bytes, {criticality}, mirrored={mirrored})",
            bytes.len()
        );
        self.names.insert(name.clone(), id);
        self.regions
            .insert(id, MemoryRegion::new(id, name, bytes, criticality, mirrored));
        Ok(id)
    }

    /// Remove a region and drop its buffer.
    ///
    /// # Errors
    ///
    /// Returns `UnknownRegion` if the id is not registered.
    pub fn unregister(&mut self, id: RegionId) -> Result<Vec<u8>, RegistryError> {
        let mut region = self
            .regions
            .remove(&id)
            .ok_or(RegistryError::UnknownRegion(id))?;
        self.names.remove(region.name());
        Ok(std::mem::take(region.bytes_mut()))
    }

    /// Ids of all registered regions in ascending order.
    #[must_use]
    pub fn regions(&self) -> Vec<RegionId> {
        self.regions.keys().copied().collect()
    }

    /// Iterate over all registered regions in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &MemoryRegion> {
        self.regions.values()
    }

    /// Iterate mutably in id order, bypassing witness maintenance.
    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut MemoryRegion> {
        self.regions.values_mut()
    }

    /// Look up a region id by name.
    #[must_use]
    pub fn id_of(&self, name: &str) -> Option<RegionId> {
        self.names.get(name).copied()
    }

    /// Look up a region id by name, failing if it is not registered.
    ///
    /// # Errors
    ///
    /// Returns `UnknownName` if no region has this name.
    pub fn lookup(&self, name: &str) -> Result<RegionId, RegistryError> {
        self.id_of(name)
            .ok_or_else(|| RegistryError::UnknownName(name.to_string()))
    }

    /// Number of registered regions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Sum of all region lengths in bytes.
    #[must_use]
    pub fn total_bytes(&self) -> usize {
        self.regions.values().map(MemoryRegion::len).sum()
    }

    /// Set the step used to stamp snapshots and trusted writes.
    pub const fn set_step(&mut self, step: u64) {
        self.current_step = step;
    }

    #[must_use]
    pub const fn current_step(&self) -> u64 {
        self.current_step
    }

    /// Borrow a region.
    ///
    /// # Errors
    ///
    /// Returns `UnknownRegion` if the id is not registered.
    pub fn get(&self, id: RegionId) -> Result<&MemoryRegion, RegistryError> {
        self.regions
            .get(&id)
            .ok_or(RegistryError::UnknownRegion(id))
    }

    /// Mutably borrow a region, bypassing witness maintenance.
    ///
    /// This is the handle the fault injector corrupts memory through.
    pub(crate) fn region_mut(&mut self, id: RegionId) -> Result<&mut MemoryRegion, RegistryError> {
        self.regions
            .get_mut(&id)
            .ok_or(RegistryError::UnknownRegion(id))
    }

    /// Borrow the live bytes of a region.
    ///
    /// # Errors
    ///
    /// Returns `UnknownRegion` if the id is not registered.
    pub fn bytes(&self, id: RegionId) -> Result<&[u8], RegistryError> {
        self.get(id).map(MemoryRegion::bytes)
    }

    /// Criticality tier of a region.
    ///
    /// # Errors
    ///
    /// Returns `UnknownRegion` if the id is not registered.
    pub fn criticality(&self, id: RegionId) -> Result<Criticality, RegistryError> {
        self.get(id).map(MemoryRegion::criticality)
    }

    /// Current length of a region in bytes.
    ///
    /// # Errors
    ///
    /// Returns `UnknownRegion` if the id is not registered.
    pub fn region_len(&self, id: RegionId) -> Result<usize, RegistryError> {
        self.get(id).map(MemoryRegion::len)
    }

    /// Declare a region's current content known-good.
    ///
    /// # Errors
    ///
    /// Returns `UnknownRegion` if the id is not registered.
    pub fn snapshot(&mut self, id: RegionId) -> Result<(), RegistryError> {
        let step = self.current_step;
        self.region_mut(id)?.refresh_witness(step);
        Ok(())
    }

    /// Snapshot every registered region.
    pub fn snapshot_all(&mut self) {
        let step = self.current_step;
        for region in self.regions.values_mut() {
            region.refresh_witness(step);
        }
    }

    /// Apply a legitimate write from the simulation.
    ///
    /// If the region matched its witness before the write, the witness is
    /// refreshed afterwards. If it did not, the witness is left untouched so
    /// the pending corruption is still reported at the next check.
    ///
    /// # Errors
    ///
    /// Returns `UnknownRegion` or `WriteOutOfBounds`.
    pub fn write(&mut self, id: RegionId, offset: usize, data: &[u8]) -> Result<(), RegistryError> {
        let step = self.current_step;
        let region = self.region_mut(id)?;
        let region_len = region.len();
        let end = offset
            .checked_add(data.len())
            .filter(|&end| end <= region_len)
            .ok_or(RegistryError::WriteOutOfBounds {
                region: id,
                offset,
                len: data.len(),
                region_len,
            })?;

        let consistent = region.matches_witness() == Some(true);
        region.bytes_mut()[offset..end].copy_from_slice(data);
        if consistent {
            region.rewitness_after_write(step);
        }
        Ok(())
    }

    /// Grow or shrink a region, zero-filling new bytes.
    ///
    /// Witness maintenance follows the same rule as [`Self::write`].
    ///
    /// # Errors
    ///
    /// Returns `UnknownRegion` if the id is not registered.
    pub fn resize(&mut self, id: RegionId, new_len: usize) -> Result<(), RegistryError> {
        let step = self.current_step;
        let region = self.region_mut(id)?;
        let consistent = region.matches_witness() == Some(true);
        region.bytes_mut().resize(new_len, 0);
        if consistent {
            region.rewitness_after_write(step);
        }
        Ok(())
    }

    /// Restore a region from its redundant copy.
    ///
    /// # Errors
    ///
    /// Returns `UnknownRegion` if the id is not registered. Missing or
    /// corrupted copies are reported through [`RepairResult`].
    pub fn repair(&mut self, id: RegionId) -> Result<RepairResult, RegistryError> {
        let step = self.current_step;
        let region = self.region_mut(id)?;

        let Some(witness) = region.witness() else {
            return Ok(RepairResult::Unavailable);
        };
        let Some(copy) = witness.copy.as_ref() else {
            return Ok(RepairResult::Unavailable);
        };

        let actual = crc32fast::hash(copy);
        if actual != witness.checksum {
            return Ok(RepairResult::CopyCorrupted {
                expected: witness.checksum,
                actual,
            });
        }

        let copy = copy.clone();
        region.replace_content(&copy);
        region.refresh_witness(step);
        Ok(RepairResult::Restored {
            bytes_restored: copy.len(),
        })
    }

    /// Capture the current content of every region as a checkpoint.
    #[must_use]
    pub fn capture_checkpoint(&self) -> RegionCheckpoint {
        RegionCheckpoint {
            step: self.current_step,
            images: self
                .regions
                .values()
                .map(|r| (r.id(), r.bytes().to_vec()))
                .collect(),
        }
    }

    /// Restore and re-witness every region present in the checkpoint.
    ///
    /// Regions unregistered since the capture are skipped. Regions registered
    /// after it keep their current witness: there is no known-good image to
    /// vouch for them, so pending corruption in them stays detectable.
    /// Returns the number of regions restored.
    pub fn restore_checkpoint(&mut self, checkpoint: &RegionCheckpoint) -> usize {
        let step = self.current_step;
        let mut restored = 0;
        for (id, image) in &checkpoint.images {
            if let Some(region) = self.regions.get_mut(id) {
                region.replace_content(image);
                region.refresh_witness(step);
                restored += 1;
            }
        }
        restored
    }

    /// Damage the redundant copy of a mirrored region.
    #[cfg(test)]
    pub(crate) fn corrupt_copy(&mut self, id: RegionId, byte: usize) -> Result<bool, RegistryError> {
        Ok(self.region_mut(id)?.corrupt_copy(byte))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_assigns_sequential_ids() {
        let mut registry = RegionRegistry::new();
        let a = registry.register("a", vec![0; 4], Criticality::Critical).unwrap();
        let b = registry.register("b", vec![0; 8], Criticality::Cosmetic).unwrap();

        assert_eq!(a, RegionId(0));
        assert_eq!(b, RegionId(1));
        assert_eq!(registry.regions(), vec![a, b]);
        assert_eq!(registry.total_bytes(), 12);
        assert_eq!(registry.id_of("b"), Some(b));
        assert_eq!(registry.lookup("a"), Ok(a));
        assert_eq!(
            registry.lookup("c"),
            Err(RegistryError::UnknownName("c".to_string()))
        );
    }

    #[test]
    fn test_register_duplicate_name_fails() {
        let mut registry = RegionRegistry::new();
        registry.register("player", vec![0; 4], Criticality::Critical).unwrap();

        let result = registry.register_mirrored("player", vec![1; 4], Criticality::Important);
        assert_eq!(
            result,
            Err(RegistryError::DuplicateRegion("player".to_string()))
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unknown_region_operations_fail() {
        let mut registry = RegionRegistry::new();
        let ghost = RegionId(42);

        assert_eq!(registry.snapshot(ghost), Err(RegistryError::UnknownRegion(ghost)));
        assert!(matches!(registry.unregister(ghost), Err(RegistryError::UnknownRegion(_))));
        assert!(matches!(registry.repair(ghost), Err(RegistryError::UnknownRegion(_))));
        assert!(registry.bytes(ghost).is_err());
        assert!(registry.write(ghost, 0, &[1]).is_err());
    }

    #[test]
    fn test_unregister_frees_name_but_not_id() {
        let mut registry = RegionRegistry::new();
        let a = registry.register("a", vec![1, 2, 3], Criticality::Critical).unwrap();

        assert_eq!(registry.unregister(a).unwrap(), vec![1, 2, 3]);
        assert!(registry.is_empty());

        let again = registry.register("a", vec![0], Criticality::Critical).unwrap();
        assert_ne!(again, a);
    }

    #[test]
    fn test_trusted_write_keeps_clean_region_consistent() {
        let mut registry = RegionRegistry::new();
        let id = registry.register("a", vec![0; 16], Criticality::Critical).unwrap();
        registry.snapshot(id).unwrap();

        registry.set_step(5);
        registry.write(id, 4, &[9, 9, 9]).unwrap();

        let region = registry.get(id).unwrap();
        assert_eq!(region.matches_witness(), Some(true));
        assert_eq!(region.witness().unwrap().taken_at, 5);
        assert_eq!(&region.bytes()[4..7], &[9, 9, 9]);
    }

    #[test]
    fn test_trusted_write_does_not_launder_corruption() {
        let mut registry = RegionRegistry::new();
        let id = registry.register("a", vec![0; 16], Criticality::Critical).unwrap();
        registry.snapshot(id).unwrap();

        registry.region_mut(id).unwrap().bytes_mut()[0] ^= 1;
        registry.write(id, 8, &[7]).unwrap();

        assert_eq!(registry.get(id).unwrap().matches_witness(), Some(false));
    }

    #[test]
    fn test_write_out_of_bounds() {
        let mut registry = RegionRegistry::new();
        let id = registry.register("a", vec![0; 4], Criticality::Critical).unwrap();

        let result = registry.write(id, 3, &[1, 2]);
        assert!(matches!(result, Err(RegistryError::WriteOutOfBounds { region_len: 4, .. })));
    }

    #[test]
    fn test_resize_rewitnesses_consistent_region() {
        let mut registry = RegionRegistry::new();
        let id = registry.register("a", vec![5; 4], Criticality::Important).unwrap();
        registry.snapshot(id).unwrap();

        registry.resize(id, 2).unwrap();
        assert_eq!(registry.region_len(id).unwrap(), 2);
        assert_eq!(registry.get(id).unwrap().matches_witness(), Some(true));
    }

    #[test]
    fn test_repair_restores_mirrored_region() {
        let mut registry = RegionRegistry::new();
        let id = registry
            .register_mirrored("a", vec![3; 8], Criticality::Critical)
            .unwrap();
        registry.snapshot(id).unwrap();
        registry.region_mut(id).unwrap().bytes_mut()[2] = 0;

        let result = registry.repair(id).unwrap();
        assert_eq!(result, RepairResult::Restored { bytes_restored: 8 });
        assert_eq!(registry.bytes(id).unwrap(), &[3; 8]);
        assert_eq!(registry.get(id).unwrap().matches_witness(), Some(true));
    }

    #[test]
    fn test_repair_unavailable_without_copy() {
        let mut registry = RegionRegistry::new();
        let id = registry.register("a", vec![3; 8], Criticality::Critical).unwrap();

        // Never snapshotted
        assert_eq!(registry.repair(id).unwrap(), RepairResult::Unavailable);

        registry.snapshot(id).unwrap();
        assert_eq!(registry.repair(id).unwrap(), RepairResult::Unavailable);
    }

    #[test]
    fn test_checkpoint_restore() {
        let mut registry = RegionRegistry::new();
        let a = registry.register("a", vec![1; 4], Criticality::Critical).unwrap();
        let b = registry.register("b", vec![2; 4], Criticality::Cosmetic).unwrap();
        registry.snapshot_all();

        let checkpoint = registry.capture_checkpoint();
        assert_eq!(checkpoint.len(), 2);
        assert_eq!(checkpoint.total_bytes(), 8);

        registry.write(a, 0, &[9, 9]).unwrap();
        registry.region_mut(b).unwrap().bytes_mut()[0] ^= 0xFF;
        registry.unregister(b).unwrap();

        assert_eq!(registry.restore_checkpoint(&checkpoint), 1);
        assert_eq!(registry.bytes(a).unwrap(), &[1; 4]);
        assert_eq!(registry.get(a).unwrap().matches_witness(), Some(true));
    }

    #[test]
    fn test_restore_leaves_regions_outside_checkpoint_stale() {
        let mut registry = RegionRegistry::new();
        let a = registry.register("a", vec![1; 4], Criticality::Critical).unwrap();
        registry.snapshot_all();
        let checkpoint = registry.capture_checkpoint();
        assert!(checkpoint.covers(&registry));

        let late = registry.register("late", vec![0; 4], Criticality::Critical).unwrap();
        registry.snapshot(late).unwrap();
        assert!(checkpoint.contains(a));
        assert!(!checkpoint.contains(late));
        assert!(!checkpoint.covers(&registry));

        registry.region_mut(late).unwrap().bytes_mut()[1] = 0x40;
        assert_eq!(registry.restore_checkpoint(&checkpoint), 1);

        // Nothing known-good exists for the late region; it must stay corrupted.
        assert_eq!(registry.bytes(late).unwrap(), &[0, 0x40, 0, 0]);
        assert_eq!(registry.get(late).unwrap().matches_witness(), Some(false));
        assert_eq!(registry.get(a).unwrap().matches_witness(), Some(true));
    }

    #[test]
    fn test_repair_reports_corrupted_copy() {
        let mut registry = RegionRegistry::new();
        let id = registry
            .register_mirrored("a", vec![3; 8], Criticality::Critical)
            .unwrap();
        registry.snapshot(id).unwrap();
        let checksum = registry.get(id).unwrap().witness().unwrap().checksum;

        assert!(registry.corrupt_copy(id, 5).unwrap());
        registry.region_mut(id).unwrap().bytes_mut()[0] = 0;

        let mut damaged = vec![3u8; 8];
        damaged[5] ^= 0xFF;
        assert_eq!(
            registry.repair(id).unwrap(),
            RepairResult::CopyCorrupted {
                expected: checksum,
                actual: crc32fast::hash(&damaged),
            }
        );
        // The live content is left as it was.
        assert_eq!(registry.bytes(id).unwrap()[0], 0);
        assert_eq!(registry.get(id).unwrap().matches_witness(), Some(false));
    }

    #[test]
    fn test_corrupt_copy_needs_a_copy() {
        let mut registry = RegionRegistry::new();
        let id = registry.register("a", vec![3; 8], Criticality::Critical).unwrap();
        registry.snapshot(id).unwrap();
        assert!(!registry.corrupt_copy(id, 0).unwrap());
    }
}
