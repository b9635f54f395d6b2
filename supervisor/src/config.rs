//! Run configuration.
//!
//! Library callers build a [`RunConfig`] directly with the `with_*` methods.
//! The binary loads one from environment variables.
//!
//! # Environment Variables
//!
//! - `SEU_SEED`: seed for faults, arena spawns and the random agent (default: `1`)
//! - `SEU_STEPS`: step budget, `0` for unbounded (default: `10000`)
//! - `SEU_FLIP_PROBABILITY`: per-step fault probability (default: `0.01`)
//! - `SEU_MTBF_STEPS`: mean steps between faults; overrides the per-step probability
//! - `SEU_MULTI_BIT_PROBABILITY`: share of faults that are multi-bit flips (default: `0.1`)
//! - `SEU_STUCK_BIT_PROBABILITY`: share of faults that are stuck bits (default: `0.05`)
//! - `SEU_CHECK_INTERVAL`: integrity check every N steps (default: `1`)
//! - `SEU_RESTART_THRESHOLD`: consecutive severe passes before restarting (default: `3`)
//! - `SEU_MAX_RESTARTS`: restarts before halting (default: `5`)
//! - `SEU_MAX_REPAIR_FAILURES`: failed repairs before restarting (default: `2`)
//! - `SEU_CHECKPOINT_INTERVAL`: refresh the checkpoint every N clean steps, `0` for initial only (default: `100`)
//! - `SEU_AUTO_RESTART`: start a new episode when one ends (default: `false`)
//! - `SEU_AGENT`: `linear`, `random` or `idle` (default: `linear`)
//! - `SEU_SWEEP_PERIOD`: period of the linear agent's sweep in steps (default: `6`)
//! - `SEU_ENEMIES`: arena enemy count (default: `8`)
//! - `SEU_EPISODE_TICKS`: arena episode length (default: `2100`)
//! - `SEU_MIRRORED`: give player and enemy regions redundant copies (default: `true`)
//! - `SEU_WEAPON`: starting weapon, one of `pistol`, `shotgun`, `chaingun`,
//!   `rocketlauncher`, `plasma` or `bfg` (default: `pistol`)
//! - `SEU_TIER0_EVERY`: Tier-0 record every N steps, `0` for off (default: `0`)
//! - `SEU_RUN_ID`: run identifier in telemetry (default: `run-<seed>`)
//! - `SEU_RUN_LOG`, `SEU_TIER0_JSONL`, `SEU_FPRIME_FRAMES`: output paths (default: none)
//! - `SEU_MODE`: `single` or `sweep` (default: `single`)
//! - `SEU_SWEEP_PROBABILITIES`: comma-separated flip probabilities, required in sweep mode
//!
//! # Invariants
//!
//! A validated config has every probability in `0.0..=1.0`, multi-bit plus
//! stuck-bit shares of at most `1.0`, a positive MTBF and a check interval of
//! at least one step.

use std::path::PathBuf;
use std::str::FromStr;

use crate::agent::{AgentKind, DEFAULT_SWEEP_PERIOD};
use crate::fault::{FaultModelConfig, FaultSchedule};
use crate::game::{ArenaConfig, weapon_slot};
use crate::integrity::CheckCadence;
use crate::recovery::RecoveryConfig;

/// Whether the binary performs one run or a probability sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    #[default]
    Single,
    Sweep,
}

/// Where run artifacts are written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputPaths {
    pub run_log: Option<PathBuf>,
    pub tier0_jsonl: Option<PathBuf>,
    pub fprime_frames: Option<PathBuf>,
}

/// Configuration for one supervised run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub run_id: String,
    pub seed: u64,
    /// Step budget; `0` runs until halted, done or stopped.
    pub steps: u64,
    pub fault: FaultModelConfig,
    pub cadence: CheckCadence,
    pub recovery: RecoveryConfig,
    /// Refresh the restart checkpoint every this many steps after an
    /// all-clean check pass; `0` keeps the initial checkpoint.
    pub checkpoint_interval: u64,
    /// Start a new episode instead of ending the run when the simulation
    /// reports done.
    pub auto_restart_episodes: bool,
    /// Emit a Tier-0 record every this many steps; `0` disables Tier-0.
    pub tier0_every: u64,
    pub agent: AgentKind,
    pub arena: ArenaConfig,
    pub output: OutputPaths,
    pub mode: RunMode,
    pub sweep_probabilities: Vec<f64>,
}

/// Error returned when loading configuration fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable is missing.
    MissingEnvVar(String),
    /// An environment variable has an invalid value.
    InvalidValue { name: String, message: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingEnvVar(name) => {
                write!(f, "missing required environment variable: {name}")
            }
            Self::InvalidValue { name, message } => {
                write!(f, "invalid value for {name}: {message}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl Default for RunConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SEED)
    }
}

impl RunConfig {
    pub const DEFAULT_SEED: u64 = 1;
    pub const DEFAULT_STEPS: u64 = 10_000;
    pub const DEFAULT_FLIP_PROBABILITY: f64 = 0.01;
    pub const DEFAULT_MULTI_BIT_PROBABILITY: f64 = 0.1;
    pub const DEFAULT_STUCK_BIT_PROBABILITY: f64 = 0.05;
    pub const DEFAULT_CHECKPOINT_INTERVAL: u64 = 100;

    /// Defaults for the given seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            run_id: format!("run-{seed}"),
            seed,
            steps: Self::DEFAULT_STEPS,
            fault: FaultModelConfig::per_step(seed, Self::DEFAULT_FLIP_PROBABILITY)
                .with_multi_bit_probability(Self::DEFAULT_MULTI_BIT_PROBABILITY)
                .with_stuck_bit_probability(Self::DEFAULT_STUCK_BIT_PROBABILITY),
            cadence: CheckCadence::EveryStep,
            recovery: RecoveryConfig::default(),
            checkpoint_interval: Self::DEFAULT_CHECKPOINT_INTERVAL,
            auto_restart_episodes: false,
            tier0_every: 0,
            agent: AgentKind::LinearSweep {
                sweep_period: DEFAULT_SWEEP_PERIOD,
            },
            arena: ArenaConfig::new(seed),
            output: OutputPaths::default(),
            mode: RunMode::Single,
            sweep_probabilities: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    #[must_use]
    pub const fn with_steps(mut self, steps: u64) -> Self {
        self.steps = steps;
        self
    }

    #[must_use]
    pub fn with_fault(mut self, fault: FaultModelConfig) -> Self {
        self.fault = fault;
        self
    }

    /// Switch to a per-step schedule with the given probability, keeping the
    /// other fault settings.
    #[must_use]
    pub const fn with_flip_probability(mut self, flip_probability: f64) -> Self {
        self.fault.schedule = FaultSchedule::PerStep { flip_probability };
        self
    }

    #[must_use]
    pub const fn with_cadence(mut self, cadence: CheckCadence) -> Self {
        self.cadence = cadence;
        self
    }

    #[must_use]
    pub const fn with_recovery(mut self, recovery: RecoveryConfig) -> Self {
        self.recovery = recovery;
        self
    }

    #[must_use]
    pub const fn with_checkpoint_interval(mut self, interval: u64) -> Self {
        self.checkpoint_interval = interval;
        self
    }

    #[must_use]
    pub const fn with_auto_restart_episodes(mut self, enabled: bool) -> Self {
        self.auto_restart_episodes = enabled;
        self
    }

    #[must_use]
    pub const fn with_tier0_every(mut self, every: u64) -> Self {
        self.tier0_every = every;
        self
    }

    #[must_use]
    pub const fn with_agent(mut self, agent: AgentKind) -> Self {
        self.agent = agent;
        self
    }

    #[must_use]
    pub const fn with_arena(mut self, arena: ArenaConfig) -> Self {
        self.arena = arena;
        self
    }

    #[must_use]
    pub fn with_output(mut self, output: OutputPaths) -> Self {
        self.output = output;
        self
    }

    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but unparsable, if sweep mode is
    /// selected without `SEU_SWEEP_PROBABILITIES`, or if the result fails
    /// [`Self::validate`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let vars = Vars(&lookup);
        let seed = vars.parse("SEU_SEED", Self::DEFAULT_SEED)?;
        let mut config = Self::new(seed);

        config.run_id = lookup("SEU_RUN_ID").unwrap_or(config.run_id);
        config.steps = vars.parse("SEU_STEPS", config.steps)?;

        let flip_probability = vars.parse("SEU_FLIP_PROBABILITY", Self::DEFAULT_FLIP_PROBABILITY)?;
        config.fault.schedule = match vars.optional::<f64>("SEU_MTBF_STEPS")? {
            Some(mean_steps) => FaultSchedule::MeanTimeBetweenFaults { mean_steps },
            None => FaultSchedule::PerStep { flip_probability },
        };
        config.fault.multi_bit_probability =
            vars.parse("SEU_MULTI_BIT_PROBABILITY", config.fault.multi_bit_probability)?;
        config.fault.stuck_bit_probability =
            vars.parse("SEU_STUCK_BIT_PROBABILITY", config.fault.stuck_bit_probability)?;

        config.cadence = match vars.parse("SEU_CHECK_INTERVAL", 1u64)? {
            1 => CheckCadence::EveryStep,
            n => CheckCadence::EveryNSteps(n),
        };

        config.recovery = RecoveryConfig::new(
            vars.parse("SEU_RESTART_THRESHOLD", config.recovery.restart_threshold)?,
            vars.parse("SEU_MAX_RESTARTS", config.recovery.max_restarts)?,
            vars.parse("SEU_MAX_REPAIR_FAILURES", config.recovery.max_repair_failures)?,
        );
        config.checkpoint_interval =
            vars.parse("SEU_CHECKPOINT_INTERVAL", config.checkpoint_interval)?;
        config.auto_restart_episodes = vars.parse("SEU_AUTO_RESTART", false)?;
        config.tier0_every = vars.parse("SEU_TIER0_EVERY", 0)?;

        config.agent = vars.parse("SEU_AGENT", config.agent)?;
        if let AgentKind::LinearSweep { sweep_period } = &mut config.agent {
            *sweep_period = vars.parse("SEU_SWEEP_PERIOD", DEFAULT_SWEEP_PERIOD)?;
        }

        config.arena = config
            .arena
            .with_enemy_count(vars.parse("SEU_ENEMIES", config.arena.enemy_count)?)
            .with_episode_ticks(vars.parse("SEU_EPISODE_TICKS", config.arena.episode_ticks)?)
            .with_mirrored(vars.parse("SEU_MIRRORED", config.arena.mirrored)?);
        if let Some(name) = lookup("SEU_WEAPON") {
            let slot = weapon_slot(&name)
                .ok_or_else(|| invalid("SEU_WEAPON", format!("'{name}' is not a weapon name")))?;
            config.arena = config.arena.with_start_weapon(slot);
        }

        config.output = OutputPaths {
            run_log: lookup("SEU_RUN_LOG").map(PathBuf::from),
            tier0_jsonl: lookup("SEU_TIER0_JSONL").map(PathBuf::from),
            fprime_frames: lookup("SEU_FPRIME_FRAMES").map(PathBuf::from),
        };

        config.mode = match lookup("SEU_MODE").as_deref() {
            None | Some("single") => RunMode::Single,
            Some("sweep") => RunMode::Sweep,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    name: "SEU_MODE".to_string(),
                    message: format!("'{other}' is not 'single' or 'sweep'"),
                });
            }
        };
        config.sweep_probabilities = match lookup("SEU_SWEEP_PROBABILITIES") {
            Some(list) => parse_list("SEU_SWEEP_PROBABILITIES", &list)?,
            None if config.mode == RunMode::Sweep => {
                return Err(ConfigError::MissingEnvVar(
                    "SEU_SWEEP_PROBABILITIES".to_string(),
                ));
            }
            None => Vec::new(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns `InvalidValue` naming the offending setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.fault.schedule {
            FaultSchedule::PerStep { flip_probability } => {
                check_probability("SEU_FLIP_PROBABILITY", flip_probability)?;
            }
            FaultSchedule::MeanTimeBetweenFaults { mean_steps } => {
                check_positive("SEU_MTBF_STEPS", mean_steps)?;
            }
        }
        check_probability("SEU_MULTI_BIT_PROBABILITY", self.fault.multi_bit_probability)?;
        check_probability("SEU_STUCK_BIT_PROBABILITY", self.fault.stuck_bit_probability)?;
        if self.fault.multi_bit_probability + self.fault.stuck_bit_probability > 1.0 {
            return Err(invalid(
                "SEU_STUCK_BIT_PROBABILITY",
                "multi-bit and stuck-bit shares must sum to at most 1".to_string(),
            ));
        }
        if let CheckCadence::EveryNSteps(0) = self.cadence {
            return Err(invalid("SEU_CHECK_INTERVAL", "must be at least 1".to_string()));
        }
        if let AgentKind::LinearSweep { sweep_period } = self.agent {
            check_positive("SEU_SWEEP_PERIOD", sweep_period)?;
        }
        for &p in &self.sweep_probabilities {
            check_probability("SEU_SWEEP_PROBABILITIES", p)?;
        }
        Ok(())
    }
}

struct Vars<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Vars<'_, F> {
    fn optional<T: FromStr>(&self, name: &str) -> Result<Option<T>, ConfigError> {
        (self.0)(name)
            .map(|value| {
                value.trim().parse::<T>().map_err(|_| {
                    invalid(name, format!("'{value}' is not a valid {}", short_type_name::<T>()))
                })
            })
            .transpose()
    }

    fn parse<T: FromStr>(&self, name: &str, default: T) -> Result<T, ConfigError> {
        Ok(self.optional(name)?.unwrap_or(default))
    }
}

fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}

fn parse_list(name: &str, list: &str) -> Result<Vec<f64>, ConfigError> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<f64>()
                .map_err(|_| invalid(name, format!("'{s}' is not a number")))
        })
        .collect()
}

fn check_probability(name: &str, p: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&p) {
        Ok(())
    } else {
        Err(invalid(name, format!("{p} is not a probability in 0..=1")))
    }
}

fn check_positive(name: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(name, format!("{value} must be a positive number")))
    }
}

fn invalid(name: &str, message: String) -> ConfigError {
    ConfigError::InvalidValue {
        name: name.to_string(),
        message,
    }
}
