//! Append-only run log.
//!
//! Every fault, non-clean verdict, repair, transition and metrics sample of a
//! run is appended as a checksummed binary record. The log alone is enough
//! to replay the run's recovery history with [`Timeline::replay`].
//!
//! # Record Format
//!
//! ```text
//! +----------+--------------------------------------------------+
//! | 0-3      | record_length (4 bytes, header+payload+checksum) |
//! | 4        | record_type (1 byte)                             |
//! | 5-12     | step (8 bytes)                                   |
//! | 13-N     | payload (variable, depends on type)              |
//! | N-N+3    | CRC32 checksum (4 bytes)                         |
//! +----------+--------------------------------------------------+
//! ```
//!
//! All integers are little endian. Clean verdicts are not logged.

// record_length fits in u32, region sizes are stored as u64
#![allow(clippy::cast_possible_truncation)]

use std::collections::BTreeMap;
use std::io::{Read, Write};

use crate::fault::{CorruptionKind, FaultEvent, InjectionError};
use crate::integrity::{DiffSummary, IntegrityVerdict, VerdictStatus};
use crate::memory::{Criticality, RegionId, RepairResult};
use crate::recovery::{RunState, Termination, Transition, TransitionReason};
use crate::telemetry::MetricsSample;

/// `record_length` (4) + `record_type` (1) + step (8) = 13 bytes
const RECORD_HEADER_SIZE: usize = 13;

/// CRC32 checksum size at end of record.
const CHECKSUM_SIZE: usize = 4;

/// Sentinel for absent optional u32/u64 fields.
const NONE_U32: u32 = u32::MAX;
const NONE_U64: u64 = u64::MAX;

/// Run log record types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    FaultInjected = 0x01,
    FaultSkipped = 0x02,
    Verdict = 0x03,
    Repair = 0x04,
    Transition = 0x05,
    Metrics = 0x06,
    RunEnd = 0x07,
}

impl TryFrom<u8> for RecordType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Self::FaultInjected),
            0x02 => Ok(Self::FaultSkipped),
            0x03 => Ok(Self::Verdict),
            0x04 => Ok(Self::Repair),
            0x05 => Ok(Self::Transition),
            0x06 => Ok(Self::Metrics),
            0x07 => Ok(Self::RunEnd),
            _ => Err(value),
        }
    }
}

/// Why an injection was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SkipReason {
    OutOfRange = 0x01,
    UnknownRegion = 0x02,
}

impl From<&InjectionError> for SkipReason {
    fn from(e: &InjectionError) -> Self {
        match e {
            InjectionError::OutOfRange { .. } => Self::OutOfRange,
            InjectionError::UnknownRegion(_) => Self::UnknownRegion,
        }
    }
}

impl TryFrom<u8> for SkipReason {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Self::OutOfRange),
            0x02 => Ok(Self::UnknownRegion),
            _ => Err(value),
        }
    }
}

/// One run log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEntry {
    /// A fault was applied to memory.
    FaultInjected { event: FaultEvent, bits_changed: u32 },
    /// A fault could not be applied.
    FaultSkipped { event: FaultEvent, reason: SkipReason },
    /// A `Corrupted` or `Unknown` verdict.
    Verdict(IntegrityVerdict),
    /// A repair attempt and its result.
    Repair {
        step: u64,
        region: RegionId,
        result: RepairResult,
    },
    /// A supervisor state change.
    Transition(Transition),
    /// Per-step metrics.
    Metrics(MetricsSample),
    /// The run loop ended.
    RunEnd {
        step: u64,
        state: RunState,
        termination: Termination,
    },
}

impl LogEntry {
    #[must_use]
    pub const fn record_type(&self) -> RecordType {
        match self {
            Self::FaultInjected { .. } => RecordType::FaultInjected,
            Self::FaultSkipped { .. } => RecordType::FaultSkipped,
            Self::Verdict(_) => RecordType::Verdict,
            Self::Repair { .. } => RecordType::Repair,
            Self::Transition(_) => RecordType::Transition,
            Self::Metrics(_) => RecordType::Metrics,
            Self::RunEnd { .. } => RecordType::RunEnd,
        }
    }

    /// Step the entry belongs to.
    #[must_use]
    pub const fn step(&self) -> u64 {
        match self {
            Self::FaultInjected { event, .. } | Self::FaultSkipped { event, .. } => event.step,
            Self::Verdict(v) => v.step,
            Self::Transition(t) => t.step,
            Self::Metrics(m) => m.step,
            Self::Repair { step, .. } | Self::RunEnd { step, .. } => *step,
        }
    }

    fn payload(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            Self::FaultInjected {
                event,
                bits_changed,
            } => {
                put_event(&mut out, event);
                out.extend_from_slice(&bits_changed.to_le_bytes());
            }
            Self::FaultSkipped { event, reason } => {
                put_event(&mut out, event);
                out.push(*reason as u8);
            }
            Self::Verdict(v) => {
                out.extend_from_slice(&v.region.get().to_le_bytes());
                out.push(v.status as u8);
                out.push(v.severity as u8);
                match &v.diff {
                    None => out.push(0),
                    Some(diff) => {
                        out.push(1);
                        let changed = diff.bytes_changed.map_or(NONE_U64, |n| n as u64);
                        out.extend_from_slice(&changed.to_le_bytes());
                        out.extend_from_slice(&(diff.expected_len as u64).to_le_bytes());
                        out.extend_from_slice(&(diff.actual_len as u64).to_le_bytes());
                        out.extend_from_slice(&diff.expected_checksum.to_le_bytes());
                        out.extend_from_slice(&diff.actual_checksum.to_le_bytes());
                    }
                }
            }
            Self::Repair { region, result, .. } => {
                out.extend_from_slice(&region.get().to_le_bytes());
                match result {
                    RepairResult::Restored { bytes_restored } => {
                        out.push(0x01);
                        out.extend_from_slice(&(*bytes_restored as u64).to_le_bytes());
                    }
                    RepairResult::Unavailable => out.push(0x02),
                    RepairResult::CopyCorrupted { expected, actual } => {
                        out.push(0x03);
                        out.extend_from_slice(&expected.to_le_bytes());
                        out.extend_from_slice(&actual.to_le_bytes());
                    }
                }
            }
            Self::Transition(t) => {
                out.push(t.from as u8);
                out.push(t.to as u8);
                out.push(t.reason.code());
                let region = t.reason.region().map_or(NONE_U32, RegionId::get);
                out.extend_from_slice(&region.to_le_bytes());
            }
            Self::Metrics(m) => {
                out.extend_from_slice(&m.wall_time_delta_us.to_le_bytes());
                out.extend_from_slice(&m.action_latency_us.to_le_bytes());
                out.extend_from_slice(&(m.region_count as u64).to_le_bytes());
                out.extend_from_slice(&(m.region_bytes as u64).to_le_bytes());
                out.extend_from_slice(&m.corruption_count.to_le_bytes());
                out.extend_from_slice(&m.restarts.to_le_bytes());
            }
            Self::RunEnd {
                state, termination, ..
            } => {
                out.push(*state as u8);
                out.push(*termination as u8);
            }
        }
        out
    }

    /// Serialize this entry to a complete record.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let payload = self.payload();
        let total_len = RECORD_HEADER_SIZE + payload.len() + CHECKSUM_SIZE;

        let mut bytes = Vec::with_capacity(total_len);
        bytes.extend_from_slice(&(total_len as u32).to_le_bytes());
        bytes.push(self.record_type() as u8);
        bytes.extend_from_slice(&self.step().to_le_bytes());
        bytes.extend_from_slice(&payload);

        // Computed over everything before it
        let checksum = crc32fast::hash(&bytes);
        bytes.extend_from_slice(&checksum.to_le_bytes());
        bytes
    }

    /// Deserialize one record.
    ///
    /// Returns the entry and the number of bytes consumed.
    pub fn from_bytes(bytes: &[u8]) -> Result<(Self, usize), RunLogError> {
        if bytes.len() < RECORD_HEADER_SIZE + CHECKSUM_SIZE {
            return Err(RunLogError::CorruptRecord);
        }

        let record_len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        if record_len < RECORD_HEADER_SIZE + CHECKSUM_SIZE || record_len > bytes.len() {
            return Err(RunLogError::CorruptRecord);
        }

        let stored_checksum = u32::from_le_bytes([
            bytes[record_len - 4],
            bytes[record_len - 3],
            bytes[record_len - 2],
            bytes[record_len - 1],
        ]);
        let computed_checksum = crc32fast::hash(&bytes[..record_len - CHECKSUM_SIZE]);
        if stored_checksum != computed_checksum {
            return Err(RunLogError::ChecksumMismatch {
                expected: stored_checksum,
                actual: computed_checksum,
            });
        }

        let record_type = RecordType::try_from(bytes[4]).map_err(RunLogError::InvalidRecordType)?;
        let mut header = Cursor::new(&bytes[5..RECORD_HEADER_SIZE]);
        let step = header.u64()?;

        let mut p = Cursor::new(&bytes[RECORD_HEADER_SIZE..record_len - CHECKSUM_SIZE]);
        let entry = match record_type {
            RecordType::FaultInjected => Self::FaultInjected {
                event: p.event(step)?,
                bits_changed: p.u32()?,
            },
            RecordType::FaultSkipped => Self::FaultSkipped {
                event: p.event(step)?,
                reason: p.field("skip_reason", SkipReason::try_from)?,
            },
            RecordType::Verdict => {
                let region = RegionId(p.u32()?);
                let status = p.field("verdict_status", VerdictStatus::try_from)?;
                let severity = p.field("criticality", Criticality::try_from)?;
                let diff = match p.u8()? {
                    0 => None,
                    _ => Some(DiffSummary {
                        bytes_changed: match p.u64()? {
                            NONE_U64 => None,
                            n => Some(n as usize),
                        },
                        expected_len: p.u64()? as usize,
                        actual_len: p.u64()? as usize,
                        expected_checksum: p.u32()?,
                        actual_checksum: p.u32()?,
                    }),
                };
                Self::Verdict(IntegrityVerdict {
                    region,
                    step,
                    status,
                    severity,
                    diff,
                })
            }
            RecordType::Repair => {
                let region = RegionId(p.u32()?);
                let result = match p.u8()? {
                    0x01 => RepairResult::Restored {
                        bytes_restored: p.u64()? as usize,
                    },
                    0x02 => RepairResult::Unavailable,
                    0x03 => RepairResult::CopyCorrupted {
                        expected: p.u32()?,
                        actual: p.u32()?,
                    },
                    value => {
                        return Err(RunLogError::InvalidField {
                            field: "repair_result",
                            value,
                        });
                    }
                };
                Self::Repair {
                    step,
                    region,
                    result,
                }
            }
            RecordType::Transition => {
                let from = p.field("run_state", RunState::try_from)?;
                let to = p.field("run_state", RunState::try_from)?;
                let code = p.u8()?;
                let region = match p.u32()? {
                    NONE_U32 => None,
                    id => Some(RegionId(id)),
                };
                let reason = TransitionReason::from_code(code, region).ok_or(
                    RunLogError::InvalidField {
                        field: "transition_reason",
                        value: code,
                    },
                )?;
                Self::Transition(Transition {
                    step,
                    from,
                    to,
                    reason,
                })
            }
            RecordType::Metrics => Self::Metrics(MetricsSample {
                step,
                wall_time_delta_us: p.u64()?,
                action_latency_us: p.u64()?,
                region_count: p.u64()? as usize,
                region_bytes: p.u64()? as usize,
                corruption_count: p.u64()?,
                restarts: p.u32()?,
            }),
            RecordType::RunEnd => Self::RunEnd {
                step,
                state: p.field("run_state", RunState::try_from)?,
                termination: p.field("termination", Termination::try_from)?,
            },
        };

        Ok((entry, record_len))
    }
}

fn put_event(out: &mut Vec<u8>, event: &FaultEvent) {
    out.extend_from_slice(&event.region.get().to_le_bytes());
    out.extend_from_slice(&event.bit_offset.to_le_bytes());
    out.push(event.kind as u8);
    out.extend_from_slice(&event.seed.to_le_bytes());
}

/// Bounds-checked little-endian reader over a payload.
struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    const fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], RunLogError> {
        let end = self.pos + N;
        let chunk = self
            .bytes
            .get(self.pos..end)
            .and_then(|s| <[u8; N]>::try_from(s).ok())
            .ok_or(RunLogError::CorruptRecord)?;
        self.pos = end;
        Ok(chunk)
    }

    fn u8(&mut self) -> Result<u8, RunLogError> {
        Ok(self.take::<1>()?[0])
    }

    fn u32(&mut self) -> Result<u32, RunLogError> {
        self.take().map(u32::from_le_bytes)
    }

    fn u64(&mut self) -> Result<u64, RunLogError> {
        self.take().map(u64::from_le_bytes)
    }

    fn field<T>(
        &mut self,
        field: &'static str,
        parse: impl FnOnce(u8) -> Result<T, u8>,
    ) -> Result<T, RunLogError> {
        parse(self.u8()?).map_err(|value| RunLogError::InvalidField { field, value })
    }

    fn event(&mut self, step: u64) -> Result<FaultEvent, RunLogError> {
        Ok(FaultEvent {
            step,
            region: RegionId(self.u32()?),
            bit_offset: self.u64()?,
            kind: self.field("corruption_kind", CorruptionKind::try_from)?,
            seed: self.u64()?,
        })
    }
}

/// Appends entries to any writer.
#[derive(Debug)]
pub struct RunLogWriter<W: Write> {
    out: W,
    entries: u64,
    bytes_written: u64,
}

impl<W: Write> RunLogWriter<W> {
    #[must_use]
    pub const fn new(out: W) -> Self {
        Self {
            out,
            entries: 0,
            bytes_written: 0,
        }
    }

    /// Append one entry.
    pub fn append(&mut self, entry: &LogEntry) -> Result<(), RunLogError> {
        let bytes = entry.to_bytes();
        self.out.write_all(&bytes)?;
        self.entries += 1;
        self.bytes_written += bytes.len() as u64;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), RunLogError> {
        self.out.flush()?;
        Ok(())
    }

    #[must_use]
    pub const fn entries(&self) -> u64 {
        self.entries
    }

    #[must_use]
    pub const fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Decode every record in a byte stream.
///
/// # Errors
///
/// Fails on the first truncated, corrupt or checksum-mismatched record.
pub fn read_all(mut bytes: &[u8]) -> Result<Vec<LogEntry>, RunLogError> {
    let mut entries = Vec::new();
    while !bytes.is_empty() {
        let (entry, consumed) = LogEntry::from_bytes(bytes)?;
        entries.push(entry);
        bytes = &bytes[consumed..];
    }
    Ok(entries)
}

/// Read a reader to the end and decode every record.
pub fn read_from<R: Read>(mut reader: R) -> Result<Vec<LogEntry>, RunLogError> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    read_all(&buf)
}

/// How long a fault stayed latent before a check caught it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionLatency {
    pub region: RegionId,
    pub injected_at: u64,
    pub detected_at: u64,
}

impl DetectionLatency {
    #[must_use]
    pub const fn steps(&self) -> u64 {
        self.detected_at.saturating_sub(self.injected_at)
    }
}

/// A run's recovery history rebuilt from its log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Timeline {
    /// State after the last transition or run end; `Running` if neither was logged.
    pub final_state: Option<RunState>,
    pub last_step: u64,
    pub faults_injected: u64,
    pub faults_skipped: u64,
    pub corruptions_detected: u64,
    pub repairs: u64,
    pub restarts: u64,
    pub transitions: Vec<Transition>,
    pub detections: Vec<DetectionLatency>,
    /// Faults that changed memory but were never caught.
    pub undetected: u64,
    pub termination: Option<Termination>,
}

impl Timeline {
    /// Rebuild the timeline from log entries in append order.
    #[must_use]
    pub fn replay(entries: &[LogEntry]) -> Self {
        let mut timeline = Self::default();
        let mut latent: BTreeMap<RegionId, Vec<u64>> = BTreeMap::new();
        let mut state = RunState::Running;

        for entry in entries {
            timeline.last_step = timeline.last_step.max(entry.step());
            match entry {
                LogEntry::FaultInjected {
                    event,
                    bits_changed,
                } => {
                    timeline.faults_injected += 1;
                    if *bits_changed > 0 {
                        latent.entry(event.region).or_default().push(event.step);
                    }
                }
                LogEntry::FaultSkipped { .. } => timeline.faults_skipped += 1,
                LogEntry::Verdict(v) if v.is_corrupted() => {
                    timeline.corruptions_detected += 1;
                    for injected_at in latent.remove(&v.region).unwrap_or_default() {
                        timeline.detections.push(DetectionLatency {
                            region: v.region,
                            injected_at,
                            detected_at: v.step,
                        });
                    }
                }
                LogEntry::Verdict(_) | LogEntry::Repair { .. } | LogEntry::Metrics(_) => {}
                LogEntry::Transition(t) => {
                    if t.reason == TransitionReason::RepairSucceeded {
                        timeline.repairs += 1;
                    }
                    if t.from == RunState::Restarting {
                        timeline.restarts += 1;
                        // Restoring the checkpoint erased whatever was still latent.
                        timeline.undetected += latent.values().map(|v| v.len() as u64).sum::<u64>();
                        latent.clear();
                    }
                    state = t.to;
                    timeline.transitions.push(*t);
                }
                LogEntry::RunEnd {
                    state: end_state,
                    termination,
                    ..
                } => {
                    state = *end_state;
                    timeline.termination = Some(*termination);
                }
            }
        }

        timeline.undetected += latent.values().map(|v| v.len() as u64).sum::<u64>();
        timeline.final_state = Some(state);
        timeline
    }

    /// Mean detection latency in steps, if anything was detected.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean_detection_latency(&self) -> Option<f64> {
        if self.detections.is_empty() {
            return None;
        }
        let total: u64 = self.detections.iter().map(DetectionLatency::steps).sum();
        Some(total as f64 / self.detections.len() as f64)
    }
}

/// Errors reading or writing the run log.
#[derive(Debug)]
pub enum RunLogError {
    /// I/O error.
    Io(std::io::Error),
    /// Truncated or malformed record.
    CorruptRecord,
    /// Invalid record type byte.
    InvalidRecordType(u8),
    /// Checksum mismatch.
    ChecksumMismatch { expected: u32, actual: u32 },
    /// An enum field holds an unknown code.
    InvalidField { field: &'static str, value: u8 },
}

impl std::fmt::Display for RunLogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "run log I/O error: {e}"),
            Self::CorruptRecord => write!(f, "corrupt run log record"),
            Self::InvalidRecordType(t) => write!(f, "invalid run log record type: 0x{t:02x}"),
            Self::ChecksumMismatch { expected, actual } => write!(
                f,
                "run log checksum mismatch: expected 0x{expected:08x}, got 0x{actual:08x}"
            ),
            Self::InvalidField { field, value } => {
                write!(f, "invalid {field} code in run log: 0x{value:02x}")
            }
        }
    }
}

impl std::error::Error for RunLogError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for RunLogError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}
