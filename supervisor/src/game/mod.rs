//! Interfaces to the simulation under test.
//!
//! A [`Simulation`] keeps its state in registry regions so injected faults
//! change what the game does. The supervisor drives it through the registry
//! handle and never looks inside.

mod arena;

pub use arena::{
    ArenaConfig, ArenaSim, PLAYER_BLOCK_LEN, nominal_damage, weapon_name, weapon_slot,
};

use serde::Serialize;

use crate::memory::{RegionRegistry, RegistryError};

/// Controller buttons an agent can press.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Button {
    TurnLeft = 0x01,
    TurnRight = 0x02,
    MoveForward = 0x04,
    MoveBackward = 0x08,
    Attack = 0x10,
    NextWeapon = 0x20,
}

impl Button {
    pub const ALL: [Self; 6] = [
        Self::TurnLeft,
        Self::TurnRight,
        Self::MoveForward,
        Self::MoveBackward,
        Self::Attack,
        Self::NextWeapon,
    ];
}

/// Set of pressed buttons for one step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Action(u8);

impl Action {
    /// No buttons pressed.
    #[must_use]
    pub const fn none() -> Self {
        Self(0)
    }

    #[must_use]
    pub const fn with(self, button: Button) -> Self {
        Self(self.0 | button as u8)
    }

    #[must_use]
    pub const fn is_pressed(self, button: Button) -> bool {
        self.0 & button as u8 != 0
    }

    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }
}

/// Player position and heading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub yaw_deg: f64,
}

/// Game variables visible to the agent and to Tier-0 telemetry.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Observation {
    pub tick: u64,
    pub health: i32,
    pub armor: i32,
    pub kills: u32,
    pub pose: Pose,
    /// Weapon slot, 2 (pistol) through 7 (BFG).
    pub selected_weapon: u8,
    pub ammo: u32,
    /// Cumulative damage dealt this episode.
    pub damage_dealt: u64,
    /// Cumulative damage taken this episode.
    pub damage_taken: u64,
    pub enemies_alive: u32,
}

impl Observation {
    #[must_use]
    pub const fn is_dead(&self) -> bool {
        self.health <= 0
    }
}

/// Result of advancing the simulation by one step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepOutcome {
    pub observation: Observation,
    pub reward: f64,
    /// The episode ended (player died, arena cleared or tick limit hit).
    pub done: bool,
}

/// A simulation whose state lives in registry regions.
pub trait Simulation {
    /// Register the regions holding the simulation's state.
    fn init(&mut self, registry: &mut RegionRegistry) -> Result<(), RegistryError>;

    /// Start a new episode and return the first observation.
    fn reset(&mut self, registry: &mut RegionRegistry) -> Result<Observation, RegistryError>;

    /// Apply one action.
    fn step(
        &mut self,
        action: Action,
        registry: &mut RegionRegistry,
    ) -> Result<StepOutcome, RegistryError>;

    /// Read the current observation without advancing.
    fn observe(&self, registry: &RegionRegistry) -> Result<Observation, RegistryError>;

    /// Level identifier reported in telemetry.
    fn level(&self) -> &str {
        "ARENA"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_buttons() {
        let action = Action::none()
            .with(Button::MoveForward)
            .with(Button::Attack);

        assert!(action.is_pressed(Button::MoveForward));
        assert!(action.is_pressed(Button::Attack));
        assert!(!action.is_pressed(Button::TurnLeft));
        assert_eq!(action.bits(), 0x14);
    }

    #[test]
    fn test_button_bits_are_distinct() {
        let all = Button::ALL
            .iter()
            .fold(Action::none(), |action, &b| action.with(b));
        assert_eq!(all.bits().count_ones(), 6);
    }
}
