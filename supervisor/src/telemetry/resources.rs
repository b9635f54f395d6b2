//! Per-weapon shot accounting and distance travelled.

use serde_json::{Map, Value};

use crate::game::{Action, Button, Observation};

/// Weapon names in slot order, pistol (slot 2) through BFG (slot 7).
pub const WEAPON_NAMES: [&str; 6] = ["PISTOL", "SHOTGUN", "CHAINGUN", "ROCKET", "PLASMA", "BFG"];

/// Counts shots per weapon and sums the player's path length.
///
/// A shot is counted whenever the attack button is pressed, keyed by the
/// weapon held after the action, whether or not ammo was left. Unknown slots
/// count as pistol shots, matching how they fire.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceTracker {
    shots: [u64; WEAPON_NAMES.len()],
    path_len: f64,
    last_position: Option<(f64, f64)>,
}

impl ResourceTracker {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            shots: [0; WEAPON_NAMES.len()],
            path_len: 0.0,
            last_position: None,
        }
    }

    /// Account for one step's action and the observation it produced.
    pub fn record(&mut self, action: Action, observation: &Observation) {
        let (x, y) = (observation.pose.x, observation.pose.y);
        if let Some((last_x, last_y)) = self.last_position {
            self.path_len += (x - last_x).hypot(y - last_y);
        }
        self.last_position = Some((x, y));

        if action.is_pressed(Button::Attack) {
            self.shots[weapon_index(observation.selected_weapon)] += 1;
        }
    }

    /// Drop the last known position so a teleport (restart, new episode) is
    /// not counted as travel.
    pub const fn forget_position(&mut self) {
        self.last_position = None;
    }

    /// Shots fired with the named weapon.
    #[must_use]
    pub fn shots(&self, weapon: &str) -> u64 {
        WEAPON_NAMES
            .iter()
            .position(|name| *name == weapon)
            .map_or(0, |i| self.shots[i])
    }

    #[must_use]
    pub fn total_shots(&self) -> u64 {
        self.shots.iter().sum()
    }

    /// Distance travelled, in arena units.
    #[must_use]
    pub const fn path_len(&self) -> f64 {
        self.path_len
    }

    /// Shots per weapon name, every weapon present.
    #[must_use]
    pub fn ammo_used(&self) -> Value {
        let map: Map<String, Value> = WEAPON_NAMES
            .iter()
            .zip(self.shots)
            .map(|(name, shots)| ((*name).to_string(), Value::from(shots)))
            .collect();
        Value::Object(map)
    }
}

fn weapon_index(slot: u8) -> usize {
    match slot {
        3..=7 => usize::from(slot - 2),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::Pose;

    fn at(x: f64, y: f64, weapon: u8) -> Observation {
        Observation {
            pose: Pose { x, y, yaw_deg: 0.0 },
            selected_weapon: weapon,
            ..Observation::default()
        }
    }

    #[test]
    fn test_shots_keyed_by_selected_weapon() {
        let fire = Action::none().with(Button::Attack);
        let mut tracker = ResourceTracker::new();
        tracker.record(fire, &at(0.0, 0.0, 2));
        tracker.record(fire, &at(0.0, 0.0, 7));
        tracker.record(fire, &at(0.0, 0.0, 7));
        tracker.record(Action::none(), &at(0.0, 0.0, 3));
        // A corrupted slot fires like a pistol.
        tracker.record(fire, &at(0.0, 0.0, 200));

        assert_eq!(tracker.shots("PISTOL"), 2);
        assert_eq!(tracker.shots("BFG"), 2);
        assert_eq!(tracker.shots("SHOTGUN"), 0);
        assert_eq!(tracker.total_shots(), 4);

        let ammo = tracker.ammo_used();
        assert_eq!(ammo.as_object().unwrap().len(), 6);
        assert_eq!(ammo["BFG"], 2);
        assert_eq!(ammo["ROCKET"], 0);
    }

    #[test]
    fn test_path_length_skips_teleports() {
        let mut tracker = ResourceTracker::new();
        tracker.record(Action::none(), &at(0.0, 0.0, 2));
        tracker.record(Action::none(), &at(3.0, 4.0, 2));
        tracker.record(Action::none(), &at(3.0, 10.0, 2));
        assert!((tracker.path_len() - 11.0).abs() < 1e-9);

        tracker.forget_position();
        tracker.record(Action::none(), &at(500.0, 500.0, 2));
        tracker.record(Action::none(), &at(500.0, 501.0, 2));
        assert!((tracker.path_len() - 12.0).abs() < 1e-9);
    }
}
