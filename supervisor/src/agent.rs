//! Agents that play the simulation.

use std::f64::consts::TAU;
use std::str::FromStr;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::game::{Action, Button, Observation};

/// Default period of the sweep policy, in steps.
pub const DEFAULT_SWEEP_PERIOD: f64 = 6.0;

/// A policy mapping observations to actions.
pub trait Agent {
    fn act(&mut self, observation: &Observation) -> Action;

    /// Forget any per-episode state.
    fn reset(&mut self);

    /// Identifier reported in telemetry.
    fn algo_id(&self) -> &'static str;
}

/// Scripted policy: always walks forward and fires while sweeping its aim
/// left and right on a sine schedule.
#[derive(Debug, Clone)]
pub struct LinearSweepAgent {
    sweep_period: f64,
    step: u64,
}

impl LinearSweepAgent {
    /// Create an agent that completes one left/right sweep every
    /// `sweep_period` steps (periods below 1 are treated as 1).
    #[must_use]
    pub const fn new(sweep_period: f64) -> Self {
        Self {
            sweep_period,
            step: 0,
        }
    }
}

impl Default for LinearSweepAgent {
    fn default() -> Self {
        Self::new(DEFAULT_SWEEP_PERIOD)
    }
}

impl Agent for LinearSweepAgent {
    #[allow(clippy::cast_precision_loss)]
    fn act(&mut self, _observation: &Observation) -> Action {
        self.step += 1;
        let phase = (self.step as f64 / self.sweep_period.max(1.0) * TAU).sin();
        let turn = if phase < 0.0 {
            Button::TurnLeft
        } else {
            Button::TurnRight
        };
        Action::none()
            .with(turn)
            .with(Button::MoveForward)
            .with(Button::Attack)
    }

    fn reset(&mut self) {
        self.step = 0;
    }

    fn algo_id(&self) -> &'static str {
        "linear-policy"
    }
}

/// Presses a random subset of buttons each step.
#[derive(Debug)]
pub struct RandomAgent {
    seed: u64,
    rng: StdRng,
}

impl RandomAgent {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Agent for RandomAgent {
    fn act(&mut self, _observation: &Observation) -> Action {
        Button::ALL
            .iter()
            .filter(|_| self.rng.random::<bool>())
            .fold(Action::none(), |action, &b| action.with(b))
    }

    /// Restart the button sequence from the seed.
    fn reset(&mut self) {
        self.rng = StdRng::seed_from_u64(self.seed);
    }

    fn algo_id(&self) -> &'static str {
        "random-policy"
    }
}

/// Never presses anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdleAgent;

impl Agent for IdleAgent {
    fn act(&mut self, _observation: &Observation) -> Action {
        Action::none()
    }

    fn reset(&mut self) {}

    fn algo_id(&self) -> &'static str {
        "idle"
    }
}

/// Agent selection for configured runs.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum AgentKind {
    LinearSweep {
        sweep_period: f64,
    },
    Random,
    #[default]
    Idle,
}

impl AgentKind {
    /// Build the agent; `seed` feeds the random agent.
    #[must_use]
    pub fn build(self, seed: u64) -> Box<dyn Agent> {
        match self {
            Self::LinearSweep { sweep_period } => Box::new(LinearSweepAgent::new(sweep_period)),
            Self::Random => Box::new(RandomAgent::new(seed)),
            Self::Idle => Box::new(IdleAgent),
        }
    }
}

impl FromStr for AgentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linear" | "linear-policy" => Ok(Self::LinearSweep {
                sweep_period: DEFAULT_SWEEP_PERIOD,
            }),
            "random" => Ok(Self::Random),
            "idle" => Ok(Self::Idle),
            other => Err(format!("unknown agent '{other}' (expected linear, random or idle)")),
        }
    }
}
