//! Integrity monitor: detects corruption by re-checking region witnesses.
//!
//! The monitor never repairs anything. It recomputes each region's CRC32,
//! compares it against the stored witness and reports a verdict whose
//! severity is the region's criticality tier.
//!
//! A region that has never been snapshotted has nothing to compare against,
//! so its verdict is `Unknown` rather than `Clean`. Keeping the two apart is
//! what makes detection-efficacy numbers meaningful.

use crate::memory::{Criticality, MemoryRegion, RegionId, RegionRegistry, RegistryError};

/// How often the monitor runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CheckCadence {
    /// Check every step.
    #[default]
    EveryStep,
    /// Check on steps divisible by `n`.
    EveryNSteps(u64),
}

impl CheckCadence {
    /// Whether a check pass is due at `step`.
    #[must_use]
    pub const fn is_due(self, step: u64) -> bool {
        match self {
            Self::EveryStep => true,
            Self::EveryNSteps(n) => n <= 1 || step.is_multiple_of(n),
        }
    }
}

/// Outcome of checking one region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum VerdictStatus {
    /// Content matches the witness.
    Clean = 0x01,
    /// Content differs from the witness.
    Corrupted = 0x02,
    /// No witness exists; the region cannot be judged.
    Unknown = 0x03,
}

impl TryFrom<u8> for VerdictStatus {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Self::Clean),
            0x02 => Ok(Self::Corrupted),
            0x03 => Ok(Self::Unknown),
            _ => Err(value),
        }
    }
}

/// What changed in a corrupted region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffSummary {
    /// Bytes that differ from the redundant copy, counting any length change.
    /// `None` for checksum-only regions, where the count cannot be known.
    pub bytes_changed: Option<usize>,
    pub expected_len: usize,
    pub actual_len: usize,
    pub expected_checksum: u32,
    pub actual_checksum: u32,
}

/// Verdict for one region at one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntegrityVerdict {
    pub region: RegionId,
    pub step: u64,
    pub status: VerdictStatus,
    /// The region's criticality tier.
    pub severity: Criticality,
    /// Present only for `Corrupted` verdicts.
    pub diff: Option<DiffSummary>,
}

impl IntegrityVerdict {
    #[must_use]
    pub fn is_corrupted(&self) -> bool {
        self.status == VerdictStatus::Corrupted
    }

    /// Corrupted with a severity that demands recovery.
    #[must_use]
    pub fn is_severe(&self) -> bool {
        self.is_corrupted() && self.severity.is_severe()
    }
}

/// Counters for monitor activity.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MonitorStats {
    /// Check passes run.
    pub passes: u64,
    /// Individual region checks.
    pub checks: u64,
    pub clean: u64,
    pub corrupted: u64,
    pub unknown: u64,
}

/// Detects corruption on a configurable cadence.
#[derive(Debug, Default)]
pub struct IntegrityMonitor {
    cadence: CheckCadence,
    stats: MonitorStats,
}

impl IntegrityMonitor {
    #[must_use]
    pub fn new(cadence: CheckCadence) -> Self {
        Self {
            cadence,
            stats: MonitorStats::default(),
        }
    }

    #[must_use]
    pub const fn cadence(&self) -> CheckCadence {
        self.cadence
    }

    #[must_use]
    pub const fn stats(&self) -> MonitorStats {
        self.stats
    }

    /// Whether a check pass is due at `step`.
    #[must_use]
    pub const fn is_due(&self, step: u64) -> bool {
        self.cadence.is_due(step)
    }

    /// Check a single region.
    ///
    /// A clean verdict stamps the region's last-verified step.
    ///
    /// # Errors
    ///
    /// Returns `UnknownRegion` if the id is not registered.
    pub fn check(
        &mut self,
        registry: &mut RegionRegistry,
        id: RegionId,
        step: u64,
    ) -> Result<IntegrityVerdict, RegistryError> {
        Ok(self.check_region(registry.region_mut(id)?, step))
    }

    /// Check every registered region, in ascending id order.
    pub fn check_all(&mut self, registry: &mut RegionRegistry, step: u64) -> Vec<IntegrityVerdict> {
        self.stats.passes += 1;
        registry
            .iter_mut()
            .map(|region| self.check_region(region, step))
            .collect()
    }

    fn check_region(&mut self, region: &mut MemoryRegion, step: u64) -> IntegrityVerdict {
        let verdict = judge(region, step);
        self.record(&verdict);
        if verdict.status == VerdictStatus::Clean {
            region.mark_verified(step);
        }
        verdict
    }

    fn record(&mut self, verdict: &IntegrityVerdict) {
        self.stats.checks += 1;
        match verdict.status {
            VerdictStatus::Clean => self.stats.clean += 1,
            VerdictStatus::Corrupted => {
                self.stats.corrupted += 1;
                tracing::warn!(
                    "step {}: corruption detected in {} ({}), {:?}",
                    verdict.step,
                    verdict.region,
                    verdict.severity,
                    verdict.diff
                );
            }
            VerdictStatus::Unknown => self.stats.unknown += 1,
        }
    }
}

fn judge(region: &MemoryRegion, step: u64) -> IntegrityVerdict {
    let mut verdict = IntegrityVerdict {
        region: region.id(),
        step,
        status: VerdictStatus::Unknown,
        severity: region.criticality(),
        diff: None,
    };

    let Some(witness) = region.witness() else {
        return verdict;
    };

    let actual_checksum = region.checksum();
    if witness.len == region.len() && witness.checksum == actual_checksum {
        verdict.status = VerdictStatus::Clean;
        return verdict;
    }

    let bytes_changed = witness.copy.as_deref().map(|copy| {
        let current = region.bytes();
        let common = copy.len().min(current.len());
        let differing = copy[..common]
            .iter()
            .zip(&current[..common])
            .filter(|(a, b)| a != b)
            .count();
        differing + copy.len().abs_diff(current.len())
    });

    verdict.status = VerdictStatus::Corrupted;
    verdict.diff = Some(DiffSummary {
        bytes_changed,
        expected_len: witness.len,
        actual_len: region.len(),
        expected_checksum: witness.checksum,
        actual_checksum,
    });
    verdict
}
