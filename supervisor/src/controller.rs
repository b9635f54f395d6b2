//! Run controller: drives one supervised run.
//!
//! Each step runs strictly in this order:
//!
//! 1. the agent chooses an action from the last observation,
//! 2. the simulation applies it,
//! 3. the fault model decides whether a fault fires and the injector applies it,
//! 4. the integrity monitor checks every region (on cadence),
//! 5. the recovery supervisor consumes the verdicts and the controller carries
//!    out any repair or restart it asks for,
//! 6. telemetry records the step.
//!
//! The loop ends when the supervisor halts, the simulation reports done, the
//! step budget runs out, or the stop signal is raised. The stop signal is only
//! looked at between steps.

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;

use crate::agent::Agent;
use crate::config::RunConfig;
use crate::fault::{FaultInjector, FaultModel};
use crate::game::{Observation, Simulation};
use crate::integrity::{IntegrityMonitor, VerdictStatus};
use crate::memory::{RegionCheckpoint, RegionRegistry, RegistryError, RepairResult};
use crate::recovery::{
    RecoveryCounters, RecoverySupervisor, RepairOutcome, RunState, Termination, Transition,
};
use crate::runlog::{LogEntry, RunLogError, RunLogWriter, SkipReason};
use crate::telemetry::{
    EpisodeTotals, FaultCounters, MetricsSample, Outcome, ResourceTracker, RunMetadata,
    TelemetryCollector, TelemetrySummary, Tier0Error, Tier0Snapshot, Tier0Writer,
};
use crate::time::{SystemTimeSource, TimeSource};

/// Output sink for run artifacts.
pub type Sink = Box<dyn Write>;

/// Error that ends a run early.
///
/// Expected runtime conditions (skipped faults, unavailable repairs,
/// exhausted restart budgets) never surface here; they become log entries
/// and state transitions.
#[derive(Debug)]
pub enum RunError {
    /// The simulation misused the registry.
    Registry(RegistryError),
    /// Writing the run log failed.
    RunLog(RunLogError),
    /// Writing Tier-0 telemetry failed.
    Tier0(Tier0Error),
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Registry(e) => write!(f, "registry error: {e}"),
            Self::RunLog(e) => write!(f, "run log error: {e}"),
            Self::Tier0(e) => write!(f, "tier-0 telemetry error: {e}"),
        }
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Registry(e) => Some(e),
            Self::RunLog(e) => Some(e),
            Self::Tier0(e) => Some(e),
        }
    }
}

impl From<RegistryError> for RunError {
    fn from(e: RegistryError) -> Self {
        Self::Registry(e)
    }
}

impl From<RunLogError> for RunError {
    fn from(e: RunLogError) -> Self {
        Self::RunLog(e)
    }
}

impl From<Tier0Error> for RunError {
    fn from(e: Tier0Error) -> Self {
        Self::Tier0(e)
    }
}

/// What a finished run reports, halted or not.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub seed: u64,
    pub final_state: RunState,
    pub termination: Termination,
    /// Steps executed.
    pub steps: u64,
    /// Episodes started, including the first.
    pub episodes: u64,
    pub faults_injected: u64,
    pub faults_skipped: u64,
    pub counters: RecoveryCounters,
    pub transitions: Vec<Transition>,
    pub summary: TelemetrySummary,
}

/// Owns every component of one run plus the simulation and agent.
pub struct RunController<S: Simulation> {
    config: RunConfig,
    registry: RegionRegistry,
    faults: FaultModel,
    injector: FaultInjector,
    monitor: IntegrityMonitor,
    supervisor: RecoverySupervisor,
    telemetry: TelemetryCollector,
    resources: ResourceTracker,
    run_log: Option<RunLogWriter<Sink>>,
    tier0_sinks: (Option<Sink>, Option<Sink>),
    tier0: Option<Tier0Writer<Sink>>,
    clock: Box<dyn TimeSource>,
    stop: Arc<AtomicBool>,
    sim: S,
    agent: Box<dyn Agent>,
    checkpoint: Option<RegionCheckpoint>,
    observation: Observation,
    step: u64,
    steps_since_checkpoint: u64,
    episodes: u64,
    deaths: u64,
    faults_injected: u64,
    faults_skipped: u64,
}

impl<S: Simulation> RunController<S> {
    /// Build a controller for `sim` with the agent named in `config` and the
    /// system clock.
    #[must_use]
    pub fn new(config: RunConfig, sim: S) -> Self {
        let agent = config.agent.build(config.seed);
        Self {
            registry: RegionRegistry::new(),
            faults: FaultModel::new(config.fault.clone()),
            injector: FaultInjector::new(),
            monitor: IntegrityMonitor::new(config.cadence),
            supervisor: RecoverySupervisor::new(config.recovery),
            telemetry: TelemetryCollector::new(),
            resources: ResourceTracker::new(),
            run_log: None,
            tier0_sinks: (None, None),
            tier0: None,
            clock: Box::new(SystemTimeSource),
            stop: Arc::new(AtomicBool::new(false)),
            sim,
            agent,
            checkpoint: None,
            observation: Observation::default(),
            step: 0,
            steps_since_checkpoint: 0,
            episodes: 0,
            deaths: 0,
            faults_injected: 0,
            faults_skipped: 0,
            config,
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: impl TimeSource + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    #[must_use]
    pub fn with_agent(mut self, agent: Box<dyn Agent>) -> Self {
        self.agent = agent;
        self
    }

    /// Append run log entries to `out`.
    #[must_use]
    pub fn with_run_log(mut self, out: impl Write + 'static) -> Self {
        self.run_log = Some(RunLogWriter::new(Box::new(out)));
        self
    }

    /// Write Tier-0 JSON lines and F′ frames every `tier0_every` steps.
    ///
    /// Ignored when the config's `tier0_every` is `0`.
    #[must_use]
    pub fn with_tier0(mut self, jsonl: Option<Sink>, fprime: Option<Sink>) -> Self {
        self.tier0_sinks = (jsonl, fprime);
        self
    }

    /// Use a shared stop flag instead of the controller's own.
    #[must_use]
    pub fn with_stop_signal(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    /// Handle that stops the run at the next step boundary when set.
    #[must_use]
    #[allow(clippy::disallowed_methods)] // Arc::clone shares the flag
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    #[must_use]
    pub const fn config(&self) -> &RunConfig {
        &self.config
    }

    #[must_use]
    pub const fn registry(&self) -> &RegionRegistry {
        &self.registry
    }

    #[must_use]
    pub const fn supervisor(&self) -> &RecoverySupervisor {
        &self.supervisor
    }

    #[must_use]
    pub const fn telemetry(&self) -> &TelemetryCollector {
        &self.telemetry
    }

    #[must_use]
    pub const fn sim(&self) -> &S {
        &self.sim
    }

    /// Last observation handed to the agent.
    #[must_use]
    pub const fn observation(&self) -> &Observation {
        &self.observation
    }

    /// Steps executed so far.
    #[must_use]
    pub const fn step(&self) -> u64 {
        self.step
    }

    /// Checkpoint a restart would rewind to.
    #[must_use]
    pub const fn checkpoint(&self) -> Option<&RegionCheckpoint> {
        self.checkpoint.as_ref()
    }

    /// Run until a termination condition is met.
    ///
    /// A halted run is a complete result and returns `Ok`. An `Err` means
    /// the simulation misused the registry or an output sink failed; the
    /// supervisor is halted before the error is returned.
    pub fn run(&mut self) -> Result<RunReport, RunError> {
        if let Err(e) = self.start() {
            self.abort(&e);
            return Err(e);
        }

        let termination = loop {
            if self.stop.load(Ordering::Relaxed) {
                break Termination::Stopped;
            }
            if self.config.steps > 0 && self.step >= self.config.steps {
                break Termination::BudgetExhausted;
            }
            match self.advance() {
                Ok(Some(termination)) => break termination,
                Ok(None) => {}
                Err(e) => {
                    self.abort(&e);
                    return Err(e);
                }
            }
        };

        self.finish(termination)
    }

    fn start(&mut self) -> Result<(), RunError> {
        self.sim.init(&mut self.registry)?;
        self.observation = self.sim.reset(&mut self.registry)?;
        self.registry.snapshot_all();
        self.checkpoint = Some(self.registry.capture_checkpoint());
        self.episodes = 1;

        let (jsonl, fprime) = std::mem::take(&mut self.tier0_sinks);
        if self.config.tier0_every > 0 && (jsonl.is_some() || fprime.is_some()) {
            let meta = RunMetadata {
                run_id: self.config.run_id.clone(),
                episode_id: self.episodes,
                algo_id: self.agent.algo_id().to_string(),
                rng_seed: self.config.seed,
                level: self.sim.level().to_string(),
            };
            self.tier0 = Some(Tier0Writer::new(meta, jsonl, fprime));
        }

        tracing::info!(
            "run {} started: seed {}, {} regions ({} bytes), agent {}",
            self.config.run_id,
            self.config.seed,
            self.registry.len(),
            self.registry.total_bytes(),
            self.agent.algo_id()
        );
        Ok(())
    }

    /// Execute one step. Returns the termination reason if the run ends here.
    fn advance(&mut self) -> Result<Option<Termination>, RunError> {
        self.step += 1;
        self.steps_since_checkpoint += 1;
        let step = self.step;
        self.registry.set_step(step);
        let step_started = self.clock.now_us();

        let action_started = self.clock.now_us();
        let action = self.agent.act(&self.observation);
        let action_latency_us = self.clock.now_us().saturating_sub(action_started);

        let outcome = self.sim.step(action, &mut self.registry)?;
        let died = outcome.observation.is_dead();
        self.resources.record(action, &outcome.observation);
        self.observation = outcome.observation;
        let restarts_before = self.supervisor.counters().restarts;

        self.inject(step)?;
        if self.monitor.is_due(step) {
            self.check(step)?;
        }
        self.recover(step)?;
        if self.supervisor.counters().restarts != restarts_before {
            self.resources.forget_position();
        }
        // Faults and restarts may have changed what the agent will see next.
        self.observation = self.sim.observe(&self.registry)?;

        let counters = self.supervisor.counters();
        let sample = MetricsSample {
            step,
            wall_time_delta_us: self.clock.now_us().saturating_sub(step_started),
            action_latency_us,
            region_count: self.registry.len(),
            region_bytes: self.registry.total_bytes(),
            corruption_count: counters.corruptions_detected,
            restarts: counters.restarts,
        };
        self.telemetry.record(sample);
        self.log(&LogEntry::Metrics(sample))?;
        self.write_tier0(step)?;

        if self.supervisor.is_halted() {
            return Ok(Some(Termination::Halted));
        }
        // A restart rewinds the simulation, so a done flag from before it is stale.
        if outcome.done && counters.restarts == restarts_before {
            if died {
                self.deaths += 1;
            }
            if !self.config.auto_restart_episodes {
                return Ok(Some(Termination::Done));
            }
            self.begin_episode(step)?;
        }
        Ok(None)
    }

    fn inject(&mut self, step: u64) -> Result<(), RunError> {
        let Some(event) = self.faults.next_fault(step, &self.registry) else {
            return Ok(());
        };

        match self.injector.apply(&event, &mut self.registry) {
            Ok(report) => {
                self.faults_injected += 1;
                tracing::debug!(
                    "step {step}: {} on {} at bit {} changed {} bits",
                    event.kind,
                    event.region,
                    event.bit_offset,
                    report.bits_changed
                );
                self.log(&LogEntry::FaultInjected {
                    event,
                    bits_changed: u32::try_from(report.bits_changed).unwrap_or(u32::MAX),
                })
            }
            Err(e) => {
                self.faults_skipped += 1;
                tracing::warn!("step {step}: fault skipped: {e}");
                self.log(&LogEntry::FaultSkipped {
                    event,
                    reason: SkipReason::from(&e),
                })
            }
        }
    }

    fn check(&mut self, step: u64) -> Result<(), RunError> {
        let verdicts = self.monitor.check_all(&mut self.registry, step);

        for verdict in verdicts.iter().filter(|v| v.status != VerdictStatus::Clean) {
            if verdict.is_corrupted() {
                let changed = verdict
                    .diff
                    .and_then(|d| d.bytes_changed)
                    .map_or_else(|| "unknown".to_string(), |n| n.to_string());
                tracing::warn!(
                    "step {step}: {} ({}) corrupted, {changed} bytes changed",
                    verdict.region,
                    verdict.severity
                );
                if !verdict.severity.is_severe() {
                    self.registry.snapshot(verdict.region)?;
                }
            }
            self.log(&LogEntry::Verdict(*verdict))?;
        }

        if let Some(transition) = self.supervisor.observe(step, &verdicts) {
            self.log(&LogEntry::Transition(transition))?;
        }

        let all_clean = verdicts.iter().all(|v| v.status == VerdictStatus::Clean);
        let interval = self.config.checkpoint_interval;
        let due = interval > 0 && self.steps_since_checkpoint >= interval;
        // Regions registered since the capture have no image to restart from.
        let uncovered = self
            .checkpoint
            .as_ref()
            .is_none_or(|checkpoint| !checkpoint.covers(&self.registry));
        if all_clean && (due || uncovered) {
            self.checkpoint = Some(self.registry.capture_checkpoint());
            self.steps_since_checkpoint = 0;
            tracing::debug!("step {step}: checkpoint refreshed");
        }
        Ok(())
    }

    fn recover(&mut self, step: u64) -> Result<(), RunError> {
        // Bounded: every failed attempt counts towards max_repair_failures.
        while self.supervisor.state() == RunState::Repairing {
            let outcome = self.repair_pending(step)?;
            if let Some(transition) = self.supervisor.repair_outcome(step, outcome) {
                self.log(&LogEntry::Transition(transition))?;
            }
        }

        if self.supervisor.state() == RunState::Restarting {
            let restored = self
                .checkpoint
                .as_ref()
                .map_or(0, |checkpoint| self.registry.restore_checkpoint(checkpoint));
            self.agent.reset();
            self.steps_since_checkpoint = 0;
            tracing::info!("step {step}: restored {restored} regions from checkpoint");
            if let Some(transition) = self.supervisor.restart_complete(step) {
                self.log(&LogEntry::Transition(transition))?;
            }
        }
        Ok(())
    }

    fn repair_pending(&mut self, step: u64) -> Result<RepairOutcome, RunError> {
        let pending = self.supervisor.pending_repairs().to_vec();
        for region in pending {
            let result = self.registry.repair(region)?;
            self.log(&LogEntry::Repair {
                step,
                region,
                result,
            })?;
            match result {
                RepairResult::Restored { .. } => {}
                RepairResult::Unavailable => return Ok(RepairOutcome::Unavailable(region)),
                RepairResult::CopyCorrupted { .. } => return Ok(RepairOutcome::Failed(region)),
            }
        }
        Ok(RepairOutcome::Repaired)
    }

    fn begin_episode(&mut self, step: u64) -> Result<(), RunError> {
        self.episodes += 1;
        self.observation = self.sim.reset(&mut self.registry)?;
        self.agent.reset();
        self.resources.forget_position();
        self.registry.snapshot_all();
        self.checkpoint = Some(self.registry.capture_checkpoint());
        self.steps_since_checkpoint = 0;
        if let Some(writer) = self.tier0.as_mut() {
            writer.begin_episode(self.episodes);
        }
        tracing::info!("step {step}: episode {} started", self.episodes);
        Ok(())
    }

    fn write_tier0(&mut self, step: u64) -> Result<(), RunError> {
        let every = self.config.tier0_every;
        if self.tier0.is_none() || every == 0 || !step.is_multiple_of(every) {
            return Ok(());
        }

        let window = usize::try_from(every).unwrap_or(usize::MAX);
        let (avg_fps, avg_frame_ms) = self.telemetry.recent_performance(window);
        let snapshot = Tier0Snapshot {
            step,
            unix_time_us: self.clock.now_us(),
            observation: &self.observation,
            avg_fps,
            avg_frame_ms,
            faults: self.fault_counters(),
            outcome: self.outcome(),
            resources: &self.resources,
        };
        if let Some(writer) = self.tier0.as_mut() {
            writer.write(&snapshot)?;
        }
        Ok(())
    }

    fn fault_counters(&self) -> FaultCounters {
        let counters = self.supervisor.counters();
        FaultCounters {
            bitflips_injected: self.faults_injected,
            ecc_corrected: counters.repairs,
            watchdog_resets: counters.restarts,
        }
    }

    fn outcome(&self) -> Outcome {
        if self.supervisor.is_halted() {
            Outcome::Halted
        } else if self.observation.is_dead() {
            Outcome::Dead
        } else {
            Outcome::Alive
        }
    }

    fn log(&mut self, entry: &LogEntry) -> Result<(), RunError> {
        if let Some(log) = self.run_log.as_mut() {
            log.append(entry)?;
        }
        Ok(())
    }

    fn finish(&mut self, termination: Termination) -> Result<RunReport, RunError> {
        let state = self.supervisor.state();
        self.log(&LogEntry::RunEnd {
            step: self.step,
            state,
            termination,
        })?;
        if let Some(log) = self.run_log.as_mut() {
            log.flush()?;
        }

        let summary = self.telemetry.summary();
        if self.tier0.is_some() {
            let totals = EpisodeTotals {
                steps: self.step,
                unix_time_us: self.clock.now_us(),
                observation: &self.observation,
                episodes: self.episodes,
                deaths: self.deaths,
                avg_fps: summary.avg_fps,
                avg_frame_ms: summary.mean_frame_time_us / 1000.0,
                faults: self.fault_counters(),
                result: termination.as_str(),
                resources: &self.resources,
            };
            if let Some(writer) = self.tier0.as_mut() {
                writer.write_episode_summary(&totals)?;
            }
        }

        let counters = self.supervisor.counters();
        tracing::info!(
            "run {} ended at step {}: {termination}, state {state}, {} faults injected, {} repairs, {} restarts",
            self.config.run_id,
            self.step,
            self.faults_injected,
            counters.repairs,
            counters.restarts
        );

        Ok(RunReport {
            run_id: self.config.run_id.clone(),
            seed: self.config.seed,
            final_state: state,
            termination,
            steps: self.step,
            episodes: self.episodes,
            faults_injected: self.faults_injected,
            faults_skipped: self.faults_skipped,
            counters,
            transitions: self.supervisor.transitions().to_vec(),
            summary,
        })
    }

    /// Halt after an unrecoverable error. Log writes are best effort since
    /// the log may be what failed.
    fn abort(&mut self, error: &RunError) {
        tracing::error!(
            "run {} aborted at step {}: {error}",
            self.config.run_id,
            self.step
        );
        if let Some(transition) = self.supervisor.halt(self.step) {
            let _ = self.log(&LogEntry::Transition(transition));
        }
        let _ = self.log(&LogEntry::RunEnd {
            step: self.step,
            state: RunState::Halted,
            termination: Termination::Halted,
        });
        if let Some(log) = self.run_log.as_mut() {
            let _ = log.flush();
        }
    }
}
