//! Recovery supervisor: the run state machine.
//!
//! ```text
//!            severe corruption,                 repair unavailable or
//!            counter < threshold                failures > max_repair_failures
//!   Running ─────────────────────► Repairing ───────────────────────────┐
//!     ▲  │                             │                                 │
//!     │  │ severe corruption,          │ repaired                        ▼
//!     │  │ counter >= threshold        ▼                             Restarting
//!     │  └───────────────────────► Running ◄──── checkpoint restored ────┘
//!     │                                                                  │
//!     └──────────────────────────────────────── restarts > max_restarts ─┴──► Halted
//! ```
//!
//! `Cosmetic` corruption never leaves `Running`. `Halted` is terminal: every
//! input is ignored once it is reached.
//!
//! The supervisor only decides. The run controller performs repairs and
//! restarts and feeds the outcomes back in.

use std::fmt;

use serde::Serialize;

use crate::integrity::IntegrityVerdict;
use crate::memory::RegionId;

/// Default number of consecutive severe check passes tolerated with repairs.
pub const DEFAULT_RESTART_THRESHOLD: u32 = 3;

/// Default number of restarts before the run is aborted.
pub const DEFAULT_MAX_RESTARTS: u32 = 5;

/// Default number of failed repair attempts before restarting.
pub const DEFAULT_MAX_REPAIR_FAILURES: u32 = 2;

/// Phase of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum RunState {
    Running = 0x01,
    Repairing = 0x02,
    Restarting = 0x03,
    /// Terminal.
    Halted = 0x04,
}

impl RunState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Repairing => "repairing",
            Self::Restarting => "restarting",
            Self::Halted => "halted",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<u8> for RunState {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Self::Running),
            0x02 => Ok(Self::Repairing),
            0x03 => Ok(Self::Restarting),
            0x04 => Ok(Self::Halted),
            _ => Err(value),
        }
    }
}

/// Why a transition happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransitionReason {
    /// A `Critical` or `Important` region failed its check.
    SevereCorruption(RegionId),
    /// Severe corruption persisted for `restart_threshold` check passes.
    RestartThresholdReached,
    /// All pending regions were restored from their redundant copies.
    RepairSucceeded,
    /// A pending region has no redundant copy.
    RepairUnavailable(RegionId),
    /// Repair attempts failed more than `max_repair_failures` times.
    RepairFailuresExceeded,
    /// Simulation and agent were reset to the known-good checkpoint.
    CheckpointRestored,
    /// Cumulative restarts exceeded `max_restarts`.
    RestartBudgetExceeded,
    /// The run hit an unrecoverable error.
    Aborted,
}

impl TransitionReason {
    /// Stable code used in the run log.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::SevereCorruption(_) => 0x01,
            Self::RestartThresholdReached => 0x02,
            Self::RepairSucceeded => 0x03,
            Self::RepairUnavailable(_) => 0x04,
            Self::RepairFailuresExceeded => 0x05,
            Self::CheckpointRestored => 0x06,
            Self::RestartBudgetExceeded => 0x07,
            Self::Aborted => 0x08,
        }
    }

    /// Region the reason refers to, if any.
    #[must_use]
    pub const fn region(self) -> Option<RegionId> {
        match self {
            Self::SevereCorruption(id) | Self::RepairUnavailable(id) => Some(id),
            _ => None,
        }
    }

    /// Rebuild a reason from its log code and optional region.
    #[must_use]
    pub fn from_code(code: u8, region: Option<RegionId>) -> Option<Self> {
        match code {
            0x01 => region.map(Self::SevereCorruption),
            0x02 => Some(Self::RestartThresholdReached),
            0x03 => Some(Self::RepairSucceeded),
            0x04 => region.map(Self::RepairUnavailable),
            0x05 => Some(Self::RepairFailuresExceeded),
            0x06 => Some(Self::CheckpointRestored),
            0x07 => Some(Self::RestartBudgetExceeded),
            0x08 => Some(Self::Aborted),
            _ => None,
        }
    }
}

/// A single state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub step: u64,
    pub from: RunState,
    pub to: RunState,
    pub reason: TransitionReason,
}

/// Why a run loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Termination {
    /// The supervisor reached `Halted`.
    Halted = 0x01,
    /// The simulation reported the episode finished.
    Done = 0x02,
    /// The step budget ran out.
    BudgetExhausted = 0x03,
    /// The cooperative stop signal was raised.
    Stopped = 0x04,
}

impl Termination {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Halted => "halted",
            Self::Done => "done",
            Self::BudgetExhausted => "budget_exhausted",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<u8> for Termination {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Self::Halted),
            0x02 => Ok(Self::Done),
            0x03 => Ok(Self::BudgetExhausted),
            0x04 => Ok(Self::Stopped),
            _ => Err(value),
        }
    }
}

/// Outcome of one repair attempt, reported by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairOutcome {
    /// Every pending region was restored and re-witnessed.
    Repaired,
    /// A pending region has no redundant copy.
    Unavailable(RegionId),
    /// The attempt failed (for example the redundant copy was itself corrupt).
    Failed(RegionId),
}

/// Thresholds for the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryConfig {
    /// Consecutive severe check passes repaired in place before restarting.
    pub restart_threshold: u32,
    /// Restarts allowed before the run halts.
    pub max_restarts: u32,
    /// Failed repair attempts tolerated before restarting.
    pub max_repair_failures: u32,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            restart_threshold: DEFAULT_RESTART_THRESHOLD,
            max_restarts: DEFAULT_MAX_RESTARTS,
            max_repair_failures: DEFAULT_MAX_REPAIR_FAILURES,
        }
    }
}

impl RecoveryConfig {
    #[must_use]
    pub const fn new(restart_threshold: u32, max_restarts: u32, max_repair_failures: u32) -> Self {
        Self {
            restart_threshold,
            max_restarts,
            max_repair_failures,
        }
    }
}

/// Counters maintained alongside the state.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecoveryCounters {
    /// Last step the supervisor observed.
    pub step: u64,
    /// Consecutive check passes with severe corruption.
    pub consecutive_corruptions: u32,
    /// Successful in-place repairs.
    pub repairs: u64,
    /// Failed repair attempts since the last success or restart.
    pub repair_failures: u32,
    /// Cumulative restarts.
    pub restarts: u32,
    /// Corrupted verdicts seen, any tier.
    pub corruptions_detected: u64,
    /// Cosmetic corrupted verdicts tolerated.
    pub cosmetic_tolerated: u64,
}

/// Owns the run state and its only transition functions.
#[derive(Debug)]
pub struct RecoverySupervisor {
    config: RecoveryConfig,
    state: RunState,
    counters: RecoveryCounters,
    pending_repairs: Vec<RegionId>,
    transitions: Vec<Transition>,
}

impl RecoverySupervisor {
    #[must_use]
    pub const fn new(config: RecoveryConfig) -> Self {
        Self {
            config,
            state: RunState::Running,
            counters: RecoveryCounters {
                step: 0,
                consecutive_corruptions: 0,
                repairs: 0,
                repair_failures: 0,
                restarts: 0,
                corruptions_detected: 0,
                cosmetic_tolerated: 0,
            },
            pending_repairs: Vec::new(),
            transitions: Vec::new(),
        }
    }

    #[must_use]
    pub const fn state(&self) -> RunState {
        self.state
    }

    #[must_use]
    pub const fn counters(&self) -> RecoveryCounters {
        self.counters
    }

    #[must_use]
    pub const fn config(&self) -> RecoveryConfig {
        self.config
    }

    /// Regions awaiting repair while in `Repairing`.
    #[must_use]
    pub fn pending_repairs(&self) -> &[RegionId] {
        &self.pending_repairs
    }

    /// Every transition taken so far, in order.
    #[must_use]
    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.state == RunState::Halted
    }

    /// Consume the verdicts of one check pass.
    ///
    /// Only acts while `Running`. Cosmetic corruption is counted and
    /// tolerated; a pass without severe corruption resets the consecutive
    /// counter.
    pub fn observe(&mut self, step: u64, verdicts: &[IntegrityVerdict]) -> Option<Transition> {
        if self.state != RunState::Running {
            return None;
        }
        self.counters.step = step;

        for verdict in verdicts.iter().filter(|v| v.is_corrupted()) {
            self.counters.corruptions_detected += 1;
            if !verdict.severity.is_severe() {
                self.counters.cosmetic_tolerated += 1;
            }
        }

        let severe: Vec<RegionId> = verdicts
            .iter()
            .filter(|v| v.is_severe())
            .map(|v| v.region)
            .collect();

        let Some(&first) = severe.first() else {
            self.counters.consecutive_corruptions = 0;
            return None;
        };

        if self.counters.consecutive_corruptions < self.config.restart_threshold {
            self.counters.consecutive_corruptions += 1;
            self.pending_repairs = severe;
            Some(self.transition(step, RunState::Repairing, TransitionReason::SevereCorruption(first)))
        } else {
            self.pending_repairs.clear();
            Some(self.transition(step, RunState::Restarting, TransitionReason::RestartThresholdReached))
        }
    }

    /// Consume the outcome of a repair attempt.
    ///
    /// Only acts while `Repairing`. A failed attempt that stays within
    /// `max_repair_failures` returns `None` and leaves the run in `Repairing`
    /// for another attempt.
    pub fn repair_outcome(&mut self, step: u64, outcome: RepairOutcome) -> Option<Transition> {
        if self.state != RunState::Repairing {
            return None;
        }
        self.counters.step = step;

        match outcome {
            RepairOutcome::Repaired => {
                self.counters.repairs += 1;
                self.counters.repair_failures = 0;
                self.pending_repairs.clear();
                Some(self.transition(step, RunState::Running, TransitionReason::RepairSucceeded))
            }
            RepairOutcome::Unavailable(region) => {
                self.pending_repairs.clear();
                Some(self.transition(
                    step,
                    RunState::Restarting,
                    TransitionReason::RepairUnavailable(region),
                ))
            }
            RepairOutcome::Failed(region) => {
                self.counters.repair_failures += 1;
                tracing::warn!(
                    "step {step}: repair of {region} failed ({} of {} tolerated)",
                    self.counters.repair_failures,
                    self.config.max_repair_failures
                );
                if self.counters.repair_failures > self.config.max_repair_failures {
                    self.pending_repairs.clear();
                    Some(self.transition(
                        step,
                        RunState::Restarting,
                        TransitionReason::RepairFailuresExceeded,
                    ))
                } else {
                    None
                }
            }
        }
    }

    /// Report that the simulation and agent were reset to the checkpoint.
    ///
    /// Only acts while `Restarting`. Counts the restart and either resumes
    /// `Running` or, once restarts exceed `max_restarts`, halts.
    pub fn restart_complete(&mut self, step: u64) -> Option<Transition> {
        if self.state != RunState::Restarting {
            return None;
        }
        self.counters.step = step;
        self.counters.restarts += 1;
        self.counters.consecutive_corruptions = 0;
        self.counters.repair_failures = 0;

        if self.counters.restarts > self.config.max_restarts {
            Some(self.transition(step, RunState::Halted, TransitionReason::RestartBudgetExceeded))
        } else {
            Some(self.transition(step, RunState::Running, TransitionReason::CheckpointRestored))
        }
    }

    /// Abort the run from any non-terminal state.
    pub fn halt(&mut self, step: u64) -> Option<Transition> {
        if self.state == RunState::Halted {
            return None;
        }
        self.counters.step = step;
        self.pending_repairs.clear();
        Some(self.transition(step, RunState::Halted, TransitionReason::Aborted))
    }

    fn transition(&mut self, step: u64, to: RunState, reason: TransitionReason) -> Transition {
        let transition = Transition {
            step,
            from: self.state,
            to,
            reason,
        };
        tracing::info!("step {step}: {} -> {to} ({reason:?})", self.state);
        self.state = to;
        self.transitions.push(transition);
        transition
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrity::{DiffSummary, VerdictStatus};
    use crate::memory::Criticality;

    fn corrupted(region: u32, severity: Criticality) -> IntegrityVerdict {
        IntegrityVerdict {
            region: RegionId(region),
            step: 0,
            status: VerdictStatus::Corrupted,
            severity,
            diff: Some(DiffSummary {
                bytes_changed: None,
                expected_len: 8,
                actual_len: 8,
                expected_checksum: 1,
                actual_checksum: 2,
            }),
        }
    }

    fn clean(region: u32, severity: Criticality) -> IntegrityVerdict {
        IntegrityVerdict {
            region: RegionId(region),
            step: 0,
            status: VerdictStatus::Clean,
            severity,
            diff: None,
        }
    }

    #[test]
    fn test_starts_running() {
        let sup = RecoverySupervisor::new(RecoveryConfig::default());
        assert_eq!(sup.state(), RunState::Running);
        assert_eq!(sup.counters(), RecoveryCounters::default());
    }

    #[test]
    fn test_cosmetic_never_leaves_running() {
        let mut sup = RecoverySupervisor::new(RecoveryConfig::new(0, 0, 0));
        for step in 1..=100 {
            let t = sup.observe(step, &[corrupted(2, Criticality::Cosmetic), clean(0, Criticality::Critical)]);
            assert!(t.is_none());
            assert_eq!(sup.state(), RunState::Running);
        }
        assert_eq!(sup.counters().cosmetic_tolerated, 100);
        assert_eq!(sup.counters().corruptions_detected, 100);
    }

    #[test]
    fn test_severe_corruption_enters_repairing() {
        for tier in [Criticality::Critical, Criticality::Important] {
            let mut sup = RecoverySupervisor::new(RecoveryConfig::default());
            let t = sup.observe(3, &[corrupted(1, tier)]).unwrap();
            assert_eq!(t.from, RunState::Running);
            assert_eq!(t.to, RunState::Repairing);
            assert_eq!(t.reason, TransitionReason::SevereCorruption(RegionId(1)));
            assert_eq!(sup.pending_repairs(), &[RegionId(1)]);
        }
    }

    #[test]
    fn test_successful_repair_returns_to_running() {
        let mut sup = RecoverySupervisor::new(RecoveryConfig::default());
        sup.observe(1, &[corrupted(0, Criticality::Critical)]);

        let t = sup.repair_outcome(1, RepairOutcome::Repaired).unwrap();
        assert_eq!(t.to, RunState::Running);
        assert_eq!(sup.counters().repairs, 1);
        assert!(sup.pending_repairs().is_empty());
    }

    #[test]
    fn test_unavailable_repair_restarts() {
        let mut sup = RecoverySupervisor::new(RecoveryConfig::default());
        sup.observe(1, &[corrupted(0, Criticality::Critical)]);

        let t = sup
            .repair_outcome(1, RepairOutcome::Unavailable(RegionId(0)))
            .unwrap();
        assert_eq!(t.to, RunState::Restarting);
        assert_eq!(t.reason, TransitionReason::RepairUnavailable(RegionId(0)));

        let t = sup.restart_complete(1).unwrap();
        assert_eq!(t.to, RunState::Running);
        assert_eq!(sup.counters().restarts, 1);
        assert_eq!(sup.counters().consecutive_corruptions, 0);
    }

    #[test]
    fn test_repeated_repair_failures_restart() {
        let mut sup = RecoverySupervisor::new(RecoveryConfig::new(3, 5, 2));
        sup.observe(1, &[corrupted(0, Criticality::Important)]);

        assert!(sup.repair_outcome(1, RepairOutcome::Failed(RegionId(0))).is_none());
        assert!(sup.repair_outcome(1, RepairOutcome::Failed(RegionId(0))).is_none());
        assert_eq!(sup.state(), RunState::Repairing);

        let t = sup.repair_outcome(1, RepairOutcome::Failed(RegionId(0))).unwrap();
        assert_eq!(t.to, RunState::Restarting);
        assert_eq!(t.reason, TransitionReason::RepairFailuresExceeded);
    }

    #[test]
    fn test_consecutive_corruption_reaches_restarting_before_halted() {
        let mut sup = RecoverySupervisor::new(RecoveryConfig::new(2, 0, 2));

        for step in 1..=2 {
            let t = sup.observe(step, &[corrupted(0, Criticality::Critical)]).unwrap();
            assert_eq!(t.to, RunState::Repairing);
            sup.repair_outcome(step, RepairOutcome::Repaired).unwrap();
        }

        let t = sup.observe(3, &[corrupted(0, Criticality::Critical)]).unwrap();
        assert_eq!(t.to, RunState::Restarting);
        assert_eq!(t.reason, TransitionReason::RestartThresholdReached);

        let t = sup.restart_complete(3).unwrap();
        assert_eq!(t.from, RunState::Restarting);
        assert_eq!(t.to, RunState::Halted);

        // Every path into Halted passed through Restarting.
        let states: Vec<RunState> = sup.transitions().iter().map(|t| t.to).collect();
        let halted_at = states.iter().position(|s| *s == RunState::Halted).unwrap();
        assert_eq!(states[halted_at - 1], RunState::Restarting);
    }

    #[test]
    fn test_clean_pass_resets_consecutive_counter() {
        let mut sup = RecoverySupervisor::new(RecoveryConfig::new(1, 5, 0));

        sup.observe(1, &[corrupted(0, Criticality::Critical)]);
        sup.repair_outcome(1, RepairOutcome::Repaired);
        assert_eq!(sup.counters().consecutive_corruptions, 1);

        sup.observe(2, &[clean(0, Criticality::Critical)]);
        assert_eq!(sup.counters().consecutive_corruptions, 0);

        let t = sup.observe(3, &[corrupted(0, Criticality::Critical)]).unwrap();
        assert_eq!(t.to, RunState::Repairing);
    }

    #[test]
    fn test_restarts_beyond_max_halt() {
        let max = 3;
        let mut sup = RecoverySupervisor::new(RecoveryConfig::new(0, max, 0));

        for restart in 1..=max + 1 {
            let step = u64::from(restart);
            let t = sup.observe(step, &[corrupted(0, Criticality::Critical)]).unwrap();
            assert_eq!(t.to, RunState::Restarting);
            let t = sup.restart_complete(step).unwrap();
            if restart <= max {
                assert_eq!(t.to, RunState::Running);
            } else {
                assert_eq!(t.to, RunState::Halted);
                assert_eq!(t.reason, TransitionReason::RestartBudgetExceeded);
            }
        }
        assert_eq!(sup.counters().restarts, max + 1);
    }

    #[test]
    fn test_halted_has_no_outgoing_transitions() {
        let mut sup = RecoverySupervisor::new(RecoveryConfig::new(0, 0, 0));
        sup.observe(1, &[corrupted(0, Criticality::Critical)]);
        sup.restart_complete(1);
        assert!(sup.is_halted());
        let before = sup.transitions().len();

        assert!(sup.observe(2, &[corrupted(0, Criticality::Critical)]).is_none());
        assert!(sup.repair_outcome(2, RepairOutcome::Repaired).is_none());
        assert!(sup.restart_complete(2).is_none());
        assert!(sup.halt(2).is_none());

        assert_eq!(sup.state(), RunState::Halted);
        assert_eq!(sup.transitions().len(), before);
    }

    #[test]
    fn test_inputs_ignored_in_wrong_state() {
        let mut sup = RecoverySupervisor::new(RecoveryConfig::default());
        assert!(sup.repair_outcome(1, RepairOutcome::Repaired).is_none());
        assert!(sup.restart_complete(1).is_none());

        sup.observe(1, &[corrupted(0, Criticality::Critical)]);
        assert!(sup.observe(1, &[corrupted(0, Criticality::Critical)]).is_none());
        assert_eq!(sup.state(), RunState::Repairing);
    }

    #[test]
    fn test_halt_aborts_from_any_state() {
        let mut sup = RecoverySupervisor::new(RecoveryConfig::default());
        sup.observe(1, &[corrupted(0, Criticality::Critical)]);
        let t = sup.halt(1).unwrap();
        assert_eq!(t.from, RunState::Repairing);
        assert_eq!(t.reason, TransitionReason::Aborted);
    }

    #[test]
    fn test_reason_codes_roundtrip() {
        let reasons = [
            TransitionReason::SevereCorruption(RegionId(4)),
            TransitionReason::RestartThresholdReached,
            TransitionReason::RepairSucceeded,
            TransitionReason::RepairUnavailable(RegionId(9)),
            TransitionReason::RepairFailuresExceeded,
            TransitionReason::CheckpointRestored,
            TransitionReason::RestartBudgetExceeded,
            TransitionReason::Aborted,
        ];
        for reason in reasons {
            assert_eq!(
                TransitionReason::from_code(reason.code(), reason.region()),
                Some(reason)
            );
        }
        assert_eq!(TransitionReason::from_code(0x01, None), None);
    }
}
