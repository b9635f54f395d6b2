//! Built-in arena game.
//!
//! A deterministic top-down deathmatch: the player turns, walks and shoots
//! while enemies close in and deal melee damage. Every piece of game state
//! lives in registry regions:
//!
//! | region              | tier        | content                          |
//! |---------------------|-------------|----------------------------------|
//! | `arena.player`      | `Critical`  | player block (see layout below)  |
//! | `arena.enemies`     | `Important` | one 12-byte record per enemy     |
//! | `arena.framebuffer` | `Cosmetic`  | scratch frame rewritten per step |
//!
//! # Player block layout (little endian)
//!
//! ```text
//! | 0-3   | health (i32)        |
//! | 4-7   | armor (i32)         |
//! | 8-11  | kills (u32)         |
//! | 12-15 | x (f32)             |
//! | 16-19 | y (f32)             |
//! | 20-23 | yaw in degrees (f32)|
//! | 24    | weapon slot (u8)    |
//! | 25-28 | ammo (u32)          |
//! | 29-36 | tick (u64)          |
//! | 37-44 | damage dealt (u64)  |
//! | 45-52 | damage taken (u64)  |
//! | 53-55 | reserved            |
//! ```
//!
//! Enemy records are `health (i32) | x (f32) | y (f32)`.

// Pixels and packed counters are truncated to their field widths.
#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{Action, Button, Observation, Pose, Simulation, StepOutcome};
use crate::memory::{Criticality, RegionId, RegionRegistry, RegistryError};

/// Size of the player block in bytes.
pub const PLAYER_BLOCK_LEN: usize = 56;

const ENEMY_RECORD_LEN: usize = 12;

const PLAYER_REGION: &str = "arena.player";
const ENEMIES_REGION: &str = "arena.enemies";
const FRAMEBUFFER_REGION: &str = "arena.framebuffer";

const ARENA_SIZE: f32 = 1024.0;
const PLAYER_SPEED: f32 = 8.0;
const TURN_DEGREES: f32 = 5.0;
const ATTACK_RANGE: f32 = 512.0;
const AIM_CONE_DEGREES: f32 = 30.0;
const ENEMY_SPEED: f32 = 2.0;
const MELEE_RANGE: f32 = 32.0;
const ENEMY_DAMAGE: i32 = 3;
const ENEMY_HEALTH: i32 = 60;
const START_HEALTH: i32 = 100;
const START_ARMOR: i32 = 50;
const START_AMMO: u32 = 200;
const FIRST_WEAPON: u8 = 2;
const LAST_WEAPON: u8 = 7;
const KILL_REWARD: f64 = 100.0;

/// Nominal damage per shot for a weapon slot.
///
/// Unknown slots (including corrupted ones) fire like a pistol.
#[must_use]
pub const fn nominal_damage(slot: u8) -> u32 {
    match slot {
        3 => 35,
        4 => 12,
        5 => 100,
        6 => 20,
        7 => 250,
        _ => 10,
    }
}

/// Display name for a weapon slot.
#[must_use]
pub const fn weapon_name(slot: u8) -> &'static str {
    match slot {
        3 => "SHOTGUN",
        4 => "CHAINGUN",
        5 => "ROCKET",
        6 => "PLASMA",
        7 => "BFG",
        _ => "PISTOL",
    }
}

/// Weapon slot for a weapon name as accepted on the command line
/// (`pistol`, `shotgun`, `chaingun`, `rocketlauncher`, `plasma`, `bfg`).
#[must_use]
pub fn weapon_slot(name: &str) -> Option<u8> {
    match name.to_ascii_lowercase().as_str() {
        "pistol" => Some(2),
        "shotgun" => Some(3),
        "chaingun" => Some(4),
        "rocketlauncher" => Some(5),
        "plasma" => Some(6),
        "bfg" => Some(7),
        _ => None,
    }
}

/// Arena parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaConfig {
    /// Seed for enemy spawn positions.
    pub seed: u64,
    pub enemy_count: usize,
    /// Episode length limit in ticks.
    pub episode_ticks: u64,
    pub framebuffer_len: usize,
    /// Register player and enemies with redundant copies, making them
    /// repairable in place.
    pub mirrored: bool,
    /// Weapon slot the player spawns holding.
    pub start_weapon: u8,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            enemy_count: 8,
            episode_ticks: 2_100,
            framebuffer_len: 1_024,
            mirrored: true,
            start_weapon: FIRST_WEAPON,
        }
    }
}

impl ArenaConfig {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_enemy_count(mut self, count: usize) -> Self {
        self.enemy_count = count;
        self
    }

    #[must_use]
    pub const fn with_episode_ticks(mut self, ticks: u64) -> Self {
        self.episode_ticks = ticks;
        self
    }

    #[must_use]
    pub const fn with_framebuffer_len(mut self, len: usize) -> Self {
        self.framebuffer_len = len;
        self
    }

    #[must_use]
    pub const fn with_mirrored(mut self, mirrored: bool) -> Self {
        self.mirrored = mirrored;
        self
    }

    #[must_use]
    pub const fn with_start_weapon(mut self, slot: u8) -> Self {
        self.start_weapon = slot;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Player {
    health: i32,
    armor: i32,
    kills: u32,
    x: f32,
    y: f32,
    yaw: f32,
    weapon: u8,
    ammo: u32,
    tick: u64,
    damage_dealt: u64,
    damage_taken: u64,
}

impl Player {
    fn decode(bytes: &[u8]) -> Self {
        Self {
            health: le_i32(bytes, 0),
            armor: le_i32(bytes, 4),
            kills: le_u32(bytes, 8),
            x: f32::from_bits(le_u32(bytes, 12)),
            y: f32::from_bits(le_u32(bytes, 16)),
            yaw: f32::from_bits(le_u32(bytes, 20)),
            weapon: bytes.get(24).copied().unwrap_or(FIRST_WEAPON),
            ammo: le_u32(bytes, 25),
            tick: le_u64(bytes, 29),
            damage_dealt: le_u64(bytes, 37),
            damage_taken: le_u64(bytes, 45),
        }
    }

    fn encode(&self) -> [u8; PLAYER_BLOCK_LEN] {
        let mut out = [0u8; PLAYER_BLOCK_LEN];
        out[0..4].copy_from_slice(&self.health.to_le_bytes());
        out[4..8].copy_from_slice(&self.armor.to_le_bytes());
        out[8..12].copy_from_slice(&self.kills.to_le_bytes());
        out[12..16].copy_from_slice(&self.x.to_le_bytes());
        out[16..20].copy_from_slice(&self.y.to_le_bytes());
        out[20..24].copy_from_slice(&self.yaw.to_le_bytes());
        out[24] = self.weapon;
        out[25..29].copy_from_slice(&self.ammo.to_le_bytes());
        out[29..37].copy_from_slice(&self.tick.to_le_bytes());
        out[37..45].copy_from_slice(&self.damage_dealt.to_le_bytes());
        out[45..53].copy_from_slice(&self.damage_taken.to_le_bytes());
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Enemy {
    health: i32,
    x: f32,
    y: f32,
}

impl Enemy {
    const fn is_alive(&self) -> bool {
        self.health > 0
    }

    fn decode_all(bytes: &[u8]) -> Vec<Self> {
        bytes
            .chunks_exact(ENEMY_RECORD_LEN)
            .map(|chunk| Self {
                health: le_i32(chunk, 0),
                x: f32::from_bits(le_u32(chunk, 4)),
                y: f32::from_bits(le_u32(chunk, 8)),
            })
            .collect()
    }

    fn encode_all(enemies: &[Self]) -> Vec<u8> {
        let mut out = Vec::with_capacity(enemies.len() * ENEMY_RECORD_LEN);
        for enemy in enemies {
            out.extend_from_slice(&enemy.health.to_le_bytes());
            out.extend_from_slice(&enemy.x.to_le_bytes());
            out.extend_from_slice(&enemy.y.to_le_bytes());
        }
        out
    }
}

#[derive(Debug, Clone, Copy)]
struct ArenaRegions {
    player: RegionId,
    enemies: RegionId,
    framebuffer: RegionId,
}

/// The built-in arena simulation.
#[derive(Debug)]
pub struct ArenaSim {
    config: ArenaConfig,
    regions: Option<ArenaRegions>,
    episode: u64,
}

impl ArenaSim {
    #[must_use]
    pub const fn new(config: ArenaConfig) -> Self {
        Self {
            config,
            regions: None,
            episode: 0,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &ArenaConfig {
        &self.config
    }

    /// Episodes started so far.
    #[must_use]
    pub const fn episode(&self) -> u64 {
        self.episode
    }

    fn regions(&self) -> Result<ArenaRegions, RegistryError> {
        self.regions
            .ok_or_else(|| RegistryError::UnknownName(PLAYER_REGION.to_string()))
    }

    fn read_state(
        &self,
        registry: &RegionRegistry,
    ) -> Result<(ArenaRegions, Player, Vec<Enemy>), RegistryError> {
        let regions = self.regions()?;
        let player = Player::decode(registry.bytes(regions.player)?);
        let enemies = Enemy::decode_all(registry.bytes(regions.enemies)?);
        Ok((regions, player, enemies))
    }

    fn spawn(&self) -> (Player, Vec<Enemy>) {
        let mut rng = StdRng::seed_from_u64(
            self.config
                .seed
                .wrapping_add(self.episode.wrapping_mul(0x9E37_79B9_7F4A_7C15)),
        );
        let player = Player {
            health: START_HEALTH,
            armor: START_ARMOR,
            kills: 0,
            x: ARENA_SIZE / 2.0,
            y: ARENA_SIZE / 2.0,
            yaw: 0.0,
            weapon: self.config.start_weapon,
            ammo: START_AMMO,
            tick: 0,
            damage_dealt: 0,
            damage_taken: 0,
        };
        let enemies = (0..self.config.enemy_count)
            .map(|_| Enemy {
                health: ENEMY_HEALTH,
                x: rng.random_range(0.0..ARENA_SIZE),
                y: rng.random_range(0.0..ARENA_SIZE),
            })
            .collect();
        (player, enemies)
    }

    fn render(&self, player: &Player, enemies: &[Enemy]) -> Vec<u8> {
        let alive = enemies.iter().filter(|e| e.is_alive()).count() as u8;
        let shade = (player.yaw / 360.0 * 255.0) as u8;
        (0..self.config.framebuffer_len)
            .map(|i| (player.tick as u8).wrapping_add(i as u8) ^ shade ^ alive)
            .collect()
    }
}

impl Simulation for ArenaSim {
    fn init(&mut self, registry: &mut RegionRegistry) -> Result<(), RegistryError> {
        let enemy_bytes = vec![0; self.config.enemy_count * ENEMY_RECORD_LEN];
        let (player, enemies) = if self.config.mirrored {
            (
                registry.register_mirrored(PLAYER_REGION, vec![0; PLAYER_BLOCK_LEN], Criticality::Critical)?,
                registry.register_mirrored(ENEMIES_REGION, enemy_bytes, Criticality::Important)?,
            )
        } else {
            (
                registry.register(PLAYER_REGION, vec![0; PLAYER_BLOCK_LEN], Criticality::Critical)?,
                registry.register(ENEMIES_REGION, enemy_bytes, Criticality::Important)?,
            )
        };
        let framebuffer = registry.register(
            FRAMEBUFFER_REGION,
            vec![0; self.config.framebuffer_len],
            Criticality::Cosmetic,
        )?;

        self.regions = Some(ArenaRegions {
            player,
            enemies,
            framebuffer,
        });
        Ok(())
    }

    fn reset(&mut self, registry: &mut RegionRegistry) -> Result<Observation, RegistryError> {
        let regions = self.regions()?;
        self.episode += 1;
        let (player, enemies) = self.spawn();

        registry.write(regions.player, 0, &player.encode())?;
        registry.write(regions.enemies, 0, &Enemy::encode_all(&enemies))?;
        registry.write(regions.framebuffer, 0, &self.render(&player, &enemies))?;
        tracing::debug!("arena episode {} started with {} enemies", self.episode, enemies.len());
        self.observe(registry)
    }

    fn step(
        &mut self,
        action: Action,
        registry: &mut RegionRegistry,
    ) -> Result<StepOutcome, RegistryError> {
        let (regions, mut player, mut enemies) = self.read_state(registry)?;
        let before = player;

        if action.is_pressed(Button::TurnLeft) {
            player.yaw = (player.yaw + TURN_DEGREES).rem_euclid(360.0);
        }
        if action.is_pressed(Button::TurnRight) {
            player.yaw = (player.yaw - TURN_DEGREES).rem_euclid(360.0);
        }
        if action.is_pressed(Button::NextWeapon) {
            player.weapon = if (FIRST_WEAPON..LAST_WEAPON).contains(&player.weapon) {
                player.weapon + 1
            } else {
                FIRST_WEAPON
            };
        }

        let heading = player.yaw.to_radians();
        let stride = match (
            action.is_pressed(Button::MoveForward),
            action.is_pressed(Button::MoveBackward),
        ) {
            (true, false) => PLAYER_SPEED,
            (false, true) => -PLAYER_SPEED,
            _ => 0.0,
        };
        player.x = heading.cos().mul_add(stride, player.x).clamp(0.0, ARENA_SIZE);
        player.y = heading.sin().mul_add(stride, player.y).clamp(0.0, ARENA_SIZE);

        if action.is_pressed(Button::Attack) && player.ammo > 0 {
            player.ammo -= 1;
            if let Some(target) = aim(&player, &enemies) {
                let damage = nominal_damage(player.weapon);
                let enemy = &mut enemies[target];
                enemy.health = enemy.health.saturating_sub_unsigned(damage);
                player.damage_dealt = player.damage_dealt.saturating_add(u64::from(damage));
                if !enemy.is_alive() {
                    player.kills = player.kills.saturating_add(1);
                }
            }
        }

        let mut incoming = 0;
        for enemy in enemies.iter_mut().filter(|e| e.is_alive()) {
            let (dx, dy) = (player.x - enemy.x, player.y - enemy.y);
            let dist = dx.hypot(dy);
            if dist <= MELEE_RANGE {
                incoming += ENEMY_DAMAGE;
            } else if dist > 0.0 {
                let advance = ENEMY_SPEED.min(dist - MELEE_RANGE);
                enemy.x = (dx / dist).mul_add(advance, enemy.x);
                enemy.y = (dy / dist).mul_add(advance, enemy.y);
            }
        }
        if incoming > 0 {
            let absorbed = player.armor.clamp(0, incoming / 3);
            player.armor -= absorbed;
            player.health = player.health.saturating_sub(incoming - absorbed);
            player.damage_taken = player
                .damage_taken
                .saturating_add(u64::from(incoming.unsigned_abs()));
        }

        player.tick = player.tick.saturating_add(1);

        registry.write(regions.player, 0, &player.encode())?;
        registry.write(regions.enemies, 0, &Enemy::encode_all(&enemies))?;
        registry.write(regions.framebuffer, 0, &self.render(&player, &enemies))?;

        let observation = self.observe(registry)?;
        let kills_gained = player.kills.saturating_sub(before.kills);
        #[allow(clippy::cast_precision_loss)]
        let reward = f64::from(kills_gained).mul_add(
            KILL_REWARD,
            player.damage_dealt.saturating_sub(before.damage_dealt) as f64,
        ) - player.damage_taken.saturating_sub(before.damage_taken) as f64;
        let done = observation.is_dead()
            || observation.enemies_alive == 0
            || observation.tick >= self.config.episode_ticks;

        Ok(StepOutcome {
            observation,
            reward,
            done,
        })
    }

    fn observe(&self, registry: &RegionRegistry) -> Result<Observation, RegistryError> {
        let (_, player, enemies) = self.read_state(registry)?;
        Ok(Observation {
            tick: player.tick,
            health: player.health,
            armor: player.armor,
            kills: player.kills,
            pose: Pose {
                x: f64::from(player.x),
                y: f64::from(player.y),
                yaw_deg: f64::from(player.yaw),
            },
            selected_weapon: player.weapon,
            ammo: player.ammo,
            damage_dealt: player.damage_dealt,
            damage_taken: player.damage_taken,
            enemies_alive: enemies.iter().filter(|e| e.is_alive()).count() as u32,
        })
    }

    fn level(&self) -> &str {
        "ARENA01"
    }
}

/// Index of the nearest living enemy inside the aim cone and range.
fn aim(player: &Player, enemies: &[Enemy]) -> Option<usize> {
    enemies
        .iter()
        .enumerate()
        .filter(|(_, e)| e.is_alive())
        .filter_map(|(i, e)| {
            let (dx, dy) = (e.x - player.x, e.y - player.y);
            let dist = dx.hypot(dy);
            let bearing = dy.atan2(dx).to_degrees();
            let off = (bearing - player.yaw + 180.0).rem_euclid(360.0) - 180.0;
            (dist <= ATTACK_RANGE && off.abs() <= AIM_CONE_DEGREES / 2.0).then_some((i, dist))
        })
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(i, _)| i)
}

fn le_u32(bytes: &[u8], at: usize) -> u32 {
    bytes
        .get(at..at + 4)
        .and_then(|s| <[u8; 4]>::try_from(s).ok())
        .map_or(0, u32::from_le_bytes)
}

fn le_i32(bytes: &[u8], at: usize) -> i32 {
    bytes
        .get(at..at + 4)
        .and_then(|s| <[u8; 4]>::try_from(s).ok())
        .map_or(0, i32::from_le_bytes)
}

fn le_u64(bytes: &[u8], at: usize) -> u64 {
    bytes
        .get(at..at + 8)
        .and_then(|s| <[u8; 8]>::try_from(s).ok())
        .map_or(0, u64::from_le_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::{CorruptionKind, FaultEvent, FaultInjector};

    fn arena(config: ArenaConfig) -> (ArenaSim, RegionRegistry, Observation) {
        let mut registry = RegionRegistry::new();
        let mut sim = ArenaSim::new(config);
        sim.init(&mut registry).unwrap();
        let obs = sim.reset(&mut registry).unwrap();
        registry.snapshot_all();
        (sim, registry, obs)
    }

    fn forward_fire() -> Action {
        Action::none()
            .with(Button::MoveForward)
            .with(Button::Attack)
            .with(Button::TurnLeft)
    }

    #[test]
    fn test_init_registers_tiered_regions() {
        let (_, registry, _) = arena(ArenaConfig::new(1).with_enemy_count(4));

        let player = registry.lookup(PLAYER_REGION).unwrap();
        let enemies = registry.lookup(ENEMIES_REGION).unwrap();
        let fb = registry.lookup(FRAMEBUFFER_REGION).unwrap();

        assert_eq!(registry.criticality(player).unwrap(), Criticality::Critical);
        assert_eq!(registry.criticality(enemies).unwrap(), Criticality::Important);
        assert_eq!(registry.criticality(fb).unwrap(), Criticality::Cosmetic);
        assert_eq!(registry.region_len(enemies).unwrap(), 4 * ENEMY_RECORD_LEN);
        assert!(registry.get(player).unwrap().is_mirrored());
        assert!(!registry.get(fb).unwrap().is_mirrored());
    }

    #[test]
    fn test_init_twice_is_duplicate() {
        let (mut sim, mut registry, _) = arena(ArenaConfig::new(1));
        assert_eq!(
            sim.init(&mut registry),
            Err(RegistryError::DuplicateRegion(PLAYER_REGION.to_string()))
        );
    }

    #[test]
    fn test_step_before_init_fails() {
        let mut registry = RegionRegistry::new();
        let mut sim = ArenaSim::new(ArenaConfig::default());
        assert!(matches!(
            sim.step(Action::none(), &mut registry),
            Err(RegistryError::UnknownName(_))
        ));
    }

    #[test]
    fn test_reset_observation() {
        let (sim, _, obs) = arena(ArenaConfig::new(3).with_enemy_count(5));
        assert_eq!(sim.episode(), 1);
        assert_eq!(obs.health, START_HEALTH);
        assert_eq!(obs.armor, START_ARMOR);
        assert_eq!(obs.ammo, START_AMMO);
        assert_eq!(obs.selected_weapon, FIRST_WEAPON);
        assert_eq!(obs.enemies_alive, 5);
        assert_eq!(obs.tick, 0);
    }

    #[test]
    fn test_same_seed_same_trajectory() {
        let (mut a, mut ra, _) = arena(ArenaConfig::new(9));
        let (mut b, mut rb, _) = arena(ArenaConfig::new(9));

        for _ in 0..200 {
            let oa = a.step(forward_fire(), &mut ra).unwrap();
            let ob = b.step(forward_fire(), &mut rb).unwrap();
            assert_eq!(oa, ob);
        }
    }

    #[test]
    fn test_trusted_steps_keep_regions_consistent() {
        let (mut sim, mut registry, _) = arena(ArenaConfig::new(2));
        for _ in 0..50 {
            sim.step(forward_fire(), &mut registry).unwrap();
        }
        assert!(registry.iter().all(|r| r.matches_witness() == Some(true)));
    }

    #[test]
    fn test_attack_consumes_ammo_and_turning_wraps() {
        let (mut sim, mut registry, _) = arena(ArenaConfig::new(4));

        let fire = Action::none().with(Button::Attack);
        let outcome = sim.step(fire, &mut registry).unwrap();
        assert_eq!(outcome.observation.ammo, START_AMMO - 1);

        let right = Action::none().with(Button::TurnRight);
        let outcome = sim.step(right, &mut registry).unwrap();
        assert!((outcome.observation.pose.yaw_deg - 355.0).abs() < 1e-3);
    }

    #[test]
    fn test_weapon_cycles_through_slots() {
        let (mut sim, mut registry, _) = arena(ArenaConfig::new(4));
        let next = Action::none().with(Button::NextWeapon);

        let mut seen = Vec::new();
        for _ in 0..7 {
            seen.push(sim.step(next, &mut registry).unwrap().observation.selected_weapon);
        }
        assert_eq!(seen, vec![3, 4, 5, 6, 7, 2, 3]);
    }

    #[test]
    fn test_episode_ends_at_tick_limit() {
        let (mut sim, mut registry, _) = arena(ArenaConfig::new(5).with_episode_ticks(10));
        let mut done_at = None;
        for step in 1..=10 {
            if sim.step(Action::none(), &mut registry).unwrap().done {
                done_at = Some(step);
                break;
            }
        }
        assert!(done_at.is_some_and(|s| s <= 10));
    }

    #[test]
    fn test_clearing_the_arena_ends_episode() {
        let (mut sim, mut registry, _) = arena(ArenaConfig::new(5).with_enemy_count(0));
        let outcome = sim.step(Action::none(), &mut registry).unwrap();
        assert!(outcome.done);
        assert_eq!(outcome.observation.enemies_alive, 0);
    }

    #[test]
    fn test_enemies_close_in_and_hurt() {
        let (mut sim, mut registry, _) = arena(ArenaConfig::new(6).with_enemy_count(8));
        let mut last = None;
        for _ in 0..600 {
            let outcome = sim.step(Action::none(), &mut registry).unwrap();
            last = Some(outcome.observation);
            if outcome.done {
                break;
            }
        }
        let obs = last.unwrap();
        assert!(obs.damage_taken > 0);
        assert!(obs.health < START_HEALTH);
    }

    #[test]
    fn test_injected_fault_changes_gameplay_state() {
        let (sim, mut registry, obs) = arena(ArenaConfig::new(7));
        let player = registry.lookup(PLAYER_REGION).unwrap();

        // Bit 30 lands in the health field.
        let event = FaultEvent {
            step: 1,
            region: player,
            bit_offset: 30,
            kind: CorruptionKind::SingleBitFlip,
            seed: 0,
        };
        FaultInjector::new().apply(&event, &mut registry).unwrap();

        let corrupted = sim.observe(&registry).unwrap();
        assert_ne!(corrupted.health, obs.health);
        assert_eq!(corrupted.health, obs.health ^ (1 << 30));
    }

    #[test]
    fn test_weapon_tables() {
        assert_eq!(nominal_damage(2), 10);
        assert_eq!(nominal_damage(3), 35);
        assert_eq!(nominal_damage(7), 250);
        assert_eq!(nominal_damage(200), 10);
        assert_eq!(weapon_name(5), "ROCKET");
        assert_eq!(weapon_name(0), "PISTOL");
    }

    #[test]
    fn test_start_weapon_is_configurable() {
        let (_, _, obs) = arena(ArenaConfig::new(8).with_start_weapon(weapon_slot("BFG").unwrap()));
        assert_eq!(obs.selected_weapon, 7);
        assert_eq!(weapon_slot("rocketlauncher"), Some(5));
        assert_eq!(weapon_slot("railgun"), None);
    }

    #[test]
    fn test_player_block_roundtrip() {
        let (sim, _, _) = arena(ArenaConfig::new(8));
        let (player, _) = sim.spawn();
        assert_eq!(Player::decode(&player.encode()), player);
    }
}
