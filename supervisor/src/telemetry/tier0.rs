//! Tier-0 telemetry: compact JSON-lines health records and F′ downlink frames.
//!
//! Every JSON record carries a `crc32c` field: the CRC-32 (zlib polynomial)
//! of the compact, key-sorted serialization of the record without that
//! field, as eight lowercase hex digits.
//!
//! # F′ frame format
//!
//! ```text
//! +-------+----------------------------------+
//! | 0-3   | magic "DSF0"                     |
//! | 4-7   | unix seconds (u32 BE)            |
//! | 8-9   | health (u16 BE, clamped)         |
//! | 10-11 | armor (u16 BE, clamped)          |
//! | 12-13 | kills (u16 BE, clamped)          |
//! +-------+----------------------------------+
//! ```

use std::io::Write;

use serde_json::{Map, Value, json};

use super::ResourceTracker;
use crate::game::{Observation, weapon_name};

/// Schema tag written into every record.
pub const SCHEMA: &str = "v1";

/// Size of an F′ frame in bytes.
pub const FPRIME_FRAME_LEN: usize = 14;

const FPRIME_MAGIC: &[u8; 4] = b"DSF0";
const CRC_FIELD: &str = "crc32c";

/// Errors writing Tier-0 output.
#[derive(Debug)]
pub enum Tier0Error {
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl std::fmt::Display for Tier0Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "tier-0 I/O error: {e}"),
            Self::Json(e) => write!(f, "tier-0 encoding error: {e}"),
        }
    }
}

impl std::error::Error for Tier0Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Json(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for Tier0Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for Tier0Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

/// Identifiers stamped on every record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunMetadata {
    pub run_id: String,
    pub episode_id: u64,
    pub algo_id: String,
    pub rng_seed: u64,
    pub level: String,
}

/// Player outcome reported in a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Alive,
    Dead,
    Halted,
}

impl Outcome {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Alive => "ALIVE",
            Self::Dead => "DEAD",
            Self::Halted => "HALTED",
        }
    }
}

/// Fault counters reported in a record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultCounters {
    pub bitflips_injected: u64,
    /// Successful in-place repairs.
    pub ecc_corrected: u64,
    /// Restarts from checkpoint.
    pub watchdog_resets: u32,
}

/// Everything one Tier-0 record reports besides the run metadata.
#[derive(Debug, Clone, Copy)]
pub struct Tier0Snapshot<'a> {
    pub step: u64,
    pub unix_time_us: u64,
    pub observation: &'a Observation,
    pub avg_fps: f64,
    pub avg_frame_ms: f64,
    pub faults: FaultCounters,
    pub outcome: Outcome,
    pub resources: &'a ResourceTracker,
}

/// Run-end totals for the `episode_summary` record.
#[derive(Debug, Clone, Copy)]
pub struct EpisodeTotals<'a> {
    pub steps: u64,
    pub unix_time_us: u64,
    pub observation: &'a Observation,
    pub episodes: u64,
    pub deaths: u64,
    pub avg_fps: f64,
    pub avg_frame_ms: f64,
    pub faults: FaultCounters,
    /// Final run state name.
    pub result: &'a str,
    pub resources: &'a ResourceTracker,
}

/// A 14-byte F′ health frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FprimeFrame {
    pub unix_secs: u32,
    pub health: u16,
    pub armor: u16,
    pub kills: u16,
}

impl FprimeFrame {
    /// Build a frame, clamping each counter to `0..=65535`.
    #[must_use]
    pub fn from_observation(observation: &Observation, unix_secs: u64) -> Self {
        Self {
            unix_secs: u32::try_from(unix_secs).unwrap_or(u32::MAX),
            health: clamp_u16(i64::from(observation.health)),
            armor: clamp_u16(i64::from(observation.armor)),
            kills: clamp_u16(i64::from(observation.kills)),
        }
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; FPRIME_FRAME_LEN] {
        let mut out = [0u8; FPRIME_FRAME_LEN];
        out[0..4].copy_from_slice(FPRIME_MAGIC);
        out[4..8].copy_from_slice(&self.unix_secs.to_be_bytes());
        out[8..10].copy_from_slice(&self.health.to_be_bytes());
        out[10..12].copy_from_slice(&self.armor.to_be_bytes());
        out[12..14].copy_from_slice(&self.kills.to_be_bytes());
        out
    }

    /// Parse a frame, returning `None` on a short buffer or bad magic.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < FPRIME_FRAME_LEN || &bytes[0..4] != FPRIME_MAGIC {
            return None;
        }
        Some(Self {
            unix_secs: u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            health: u16::from_be_bytes([bytes[8], bytes[9]]),
            armor: u16::from_be_bytes([bytes[10], bytes[11]]),
            kills: u16::from_be_bytes([bytes[12], bytes[13]]),
        })
    }
}

fn clamp_u16(value: i64) -> u16 {
    u16::try_from(value.clamp(0, i64::from(u16::MAX))).unwrap_or(u16::MAX)
}

/// Add the `crc32c` field to a JSON object.
///
/// Non-object values are returned unchanged.
pub fn seal(mut record: Value) -> Result<Value, serde_json::Error> {
    if let Value::Object(map) = &mut record {
        map.remove(CRC_FIELD);
        let body = serde_json::to_string(&Value::Object(map.clone()))?;
        map.insert(
            CRC_FIELD.to_string(),
            Value::String(format!("{:08x}", crc32fast::hash(body.as_bytes()))),
        );
    }
    Ok(record)
}

/// Check a record's `crc32c` field against its content.
#[must_use]
pub fn verify(record: &Value) -> bool {
    let Value::Object(map) = record else {
        return false;
    };
    let Some(Value::String(stored)) = map.get(CRC_FIELD) else {
        return false;
    };
    let mut body: Map<String, Value> = map.clone();
    body.remove(CRC_FIELD);
    serde_json::to_string(&Value::Object(body))
        .is_ok_and(|s| format!("{:08x}", crc32fast::hash(s.as_bytes())) == *stored)
}

/// Writes Tier-0 JSON lines and F′ frames.
///
/// Either sink may be absent. Combat deltas are computed against the
/// previous record this writer produced.
#[derive(Debug)]
pub struct Tier0Writer<W: Write> {
    meta: RunMetadata,
    jsonl: Option<W>,
    fprime: Option<W>,
    prev_health: Option<i32>,
    prev_damage_dealt: u64,
    prev_kills: u32,
    records: u64,
}

impl<W: Write> Tier0Writer<W> {
    #[must_use]
    pub const fn new(meta: RunMetadata, jsonl: Option<W>, fprime: Option<W>) -> Self {
        Self {
            meta,
            jsonl,
            fprime,
            prev_health: None,
            prev_damage_dealt: 0,
            prev_kills: 0,
            records: 0,
        }
    }

    #[must_use]
    pub const fn meta(&self) -> &RunMetadata {
        &self.meta
    }

    /// Start a new episode: bump the episode id and reset combat deltas.
    pub fn begin_episode(&mut self, episode_id: u64) {
        self.meta.episode_id = episode_id;
        self.prev_health = None;
        self.prev_damage_dealt = 0;
        self.prev_kills = 0;
    }

    /// Records written so far.
    #[must_use]
    pub const fn records(&self) -> u64 {
        self.records
    }

    /// Build the sealed JSON record for a snapshot and advance the delta
    /// baseline.
    pub fn telemetry_record(&mut self, snap: &Tier0Snapshot<'_>) -> Result<Value, serde_json::Error> {
        let obs = snap.observation;
        let dmg_in_delta = self
            .prev_health
            .map_or(0, |prev| i64::from(prev).saturating_sub(i64::from(obs.health)).max(0));
        let dmg_out_delta = obs.damage_dealt.saturating_sub(self.prev_damage_dealt);
        let kills_delta = obs.kills.saturating_sub(self.prev_kills);

        self.prev_health = Some(obs.health);
        self.prev_damage_dealt = obs.damage_dealt;
        self.prev_kills = obs.kills;

        seal(json!({
            "type": "tier0_telemetry",
            "schema": SCHEMA,
            "unix_time": snap.unix_time_us / 1_000_000,
            "unix_time_ms": snap.unix_time_us / 1_000,
            "step": snap.step,
            "run_id": self.meta.run_id,
            "episode_id": self.meta.episode_id,
            "algo_id": self.meta.algo_id,
            "rng_seed": self.meta.rng_seed,
            "level": self.meta.level,
            "health": obs.health,
            "armor": obs.armor,
            "kills": obs.kills,
            "selected_weapon": obs.selected_weapon,
            "weapon_name": weapon_name(obs.selected_weapon),
            "pose": obs.pose,
            "combat": {
                "dmg_in_delta": dmg_in_delta,
                "dmg_out_delta": dmg_out_delta,
                "kills_delta": kills_delta,
            },
            "performance": {
                "avg_fps": round2(snap.avg_fps),
                "avg_frame_ms": round2(snap.avg_frame_ms),
            },
            "faults": faults_json(snap.faults),
            "resources": {
                "ammo_used": snap.resources.ammo_used(),
            },
            "outcome": snap.outcome.as_str(),
        }))
    }

    /// Write one Tier-0 record and, if configured, its F′ frame.
    pub fn write(&mut self, snap: &Tier0Snapshot<'_>) -> Result<(), Tier0Error> {
        let record = self.telemetry_record(snap)?;
        if let Some(out) = self.jsonl.as_mut() {
            serde_json::to_writer(&mut *out, &record)?;
            out.write_all(b"\n")?;
            out.flush()?;
        }
        if let Some(out) = self.fprime.as_mut() {
            let frame = FprimeFrame::from_observation(snap.observation, snap.unix_time_us / 1_000_000);
            out.write_all(&frame.to_bytes())?;
            out.flush()?;
        }
        self.records += 1;
        Ok(())
    }

    /// Build the sealed `episode_summary` record.
    pub fn episode_summary(&self, totals: &EpisodeTotals<'_>) -> Result<Value, serde_json::Error> {
        let obs = totals.observation;
        seal(json!({
            "type": "episode_summary",
            "schema": SCHEMA,
            "unix_time": totals.unix_time_us / 1_000_000,
            "run_id": self.meta.run_id,
            "episode_id": self.meta.episode_id,
            "algo_id": self.meta.algo_id,
            "rng_seed": self.meta.rng_seed,
            "level_start": self.meta.level,
            "episodes": totals.episodes,
            "steps": totals.steps,
            "result": totals.result,
            "deaths": totals.deaths,
            "damage": {
                "taken_total": obs.damage_taken,
                "dealt_total": obs.damage_dealt,
            },
            "performance": {
                "avg_fps": round2(totals.avg_fps),
                "avg_frame_ms": round2(totals.avg_frame_ms),
            },
            "faults": faults_json(totals.faults),
            "resources": {
                "ammo_used": totals.resources.ammo_used(),
            },
            "nav": {
                "path_len_m": round2(totals.resources.path_len()),
            },
            "kills": obs.kills,
        }))
    }

    /// Write the `episode_summary` record to the JSON-lines sink and return it.
    pub fn write_episode_summary(&mut self, totals: &EpisodeTotals<'_>) -> Result<Value, Tier0Error> {
        let record = self.episode_summary(totals)?;
        if let Some(out) = self.jsonl.as_mut() {
            serde_json::to_writer(&mut *out, &record)?;
            out.write_all(b"\n")?;
            out.flush()?;
        }
        Ok(record)
    }

    /// Give back the sinks.
    pub fn into_inner(self) -> (Option<W>, Option<W>) {
        (self.jsonl, self.fprime)
    }
}

fn faults_json(faults: FaultCounters) -> Value {
    json!({
        "bitflips_injected": faults.bitflips_injected,
        "ecc_corrected": faults.ecc_corrected,
        "watchdog_resets": faults.watchdog_resets,
    })
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{Action, Button, Pose};

    static NO_RESOURCES: ResourceTracker = ResourceTracker::new();

    fn meta() -> RunMetadata {
        RunMetadata {
            run_id: "run-1".to_string(),
            episode_id: 1,
            algo_id: "linear-policy".to_string(),
            rng_seed: 123_456,
            level: "ARENA01".to_string(),
        }
    }

    fn observation(health: i32, damage_dealt: u64, kills: u32) -> Observation {
        Observation {
            tick: 10,
            health,
            armor: 20,
            kills,
            pose: Pose {
                x: 1.5,
                y: 2.0,
                yaw_deg: 90.0,
            },
            selected_weapon: 3,
            ammo: 50,
            damage_dealt,
            damage_taken: 0,
            enemies_alive: 2,
        }
    }

    fn snapshot(obs: &Observation) -> Tier0Snapshot<'_> {
        Tier0Snapshot {
            step: 10,
            unix_time_us: 1_700_000_000_123_456,
            observation: obs,
            avg_fps: 59.999,
            avg_frame_ms: 16.6666,
            faults: FaultCounters {
                bitflips_injected: 3,
                ecc_corrected: 1,
                watchdog_resets: 0,
            },
            outcome: Outcome::Alive,
            resources: &NO_RESOURCES,
        }
    }

    #[test]
    fn test_seal_matches_zlib_crc_of_sorted_compact_json() {
        let record = seal(json!({"b": 1, "a": "x"})).unwrap();
        let expected = format!("{:08x}", crc32fast::hash(br#"{"a":"x","b":1}"#));
        assert_eq!(record["crc32c"], Value::String(expected));
        assert!(verify(&record));
    }

    #[test]
    fn test_written_record_verifies_after_reading_back() {
        let mut writer = Tier0Writer::new(meta(), Some(Vec::new()), None);
        let mut obs = observation(100, 0, 0);
        obs.pose.x = f64::from(907.963_f32);
        obs.pose.y = f64::from(-0.1_f32);
        writer.write(&snapshot(&obs)).unwrap();

        let (jsonl, _) = writer.into_inner();
        let line: Value = serde_json::from_slice(jsonl.unwrap().trim_ascii_end()).unwrap();
        assert_eq!(line["pose"]["x"], f64::from(907.963_f32));
        assert!(verify(&line));
    }

    #[test]
    fn test_verify_detects_tampering() {
        let mut record = seal(json!({"health": 100})).unwrap();
        record["health"] = json!(99);
        assert!(!verify(&record));
        assert!(!verify(&json!({"health": 100})));
        assert!(!verify(&json!([1, 2])));
    }

    #[test]
    fn test_record_fields_and_deltas() {
        let mut writer: Tier0Writer<Vec<u8>> = Tier0Writer::new(meta(), None, None);

        let first = observation(100, 0, 0);
        let record = writer.telemetry_record(&snapshot(&first)).unwrap();
        assert_eq!(record["type"], "tier0_telemetry");
        assert_eq!(record["schema"], "v1");
        assert_eq!(record["unix_time"], 1_700_000_000u64);
        assert_eq!(record["unix_time_ms"], 1_700_000_000_123u64);
        assert_eq!(record["weapon_name"], "SHOTGUN");
        assert_eq!(record["combat"]["dmg_in_delta"], 0);
        assert_eq!(record["performance"]["avg_fps"], 60.0);
        assert_eq!(record["faults"]["ecc_corrected"], 1);
        assert_eq!(record["outcome"], "ALIVE");
        assert_eq!(record["resources"]["ammo_used"]["BFG"], 0);
        assert!(verify(&record));

        let second = observation(70, 45, 1);
        let record = writer.telemetry_record(&snapshot(&second)).unwrap();
        assert_eq!(record["combat"]["dmg_in_delta"], 30);
        assert_eq!(record["combat"]["dmg_out_delta"], 45);
        assert_eq!(record["combat"]["kills_delta"], 1);

        // Healing is not negative damage.
        let third = observation(90, 45, 1);
        let record = writer.telemetry_record(&snapshot(&third)).unwrap();
        assert_eq!(record["combat"]["dmg_in_delta"], 0);
    }

    #[test]
    fn test_begin_episode_resets_deltas() {
        let mut writer: Tier0Writer<Vec<u8>> = Tier0Writer::new(meta(), None, None);
        writer.telemetry_record(&snapshot(&observation(100, 500, 9))).unwrap();

        writer.begin_episode(2);
        let record = writer.telemetry_record(&snapshot(&observation(80, 10, 0))).unwrap();
        assert_eq!(record["episode_id"], 2);
        assert_eq!(record["combat"]["dmg_in_delta"], 0);
        assert_eq!(record["combat"]["dmg_out_delta"], 10);
    }

    #[test]
    fn test_write_emits_json_line_and_frame() {
        let mut writer = Tier0Writer::new(meta(), Some(Vec::new()), Some(Vec::new()));
        let obs = observation(100, 0, 2);
        writer.write(&snapshot(&obs)).unwrap();
        writer.write(&snapshot(&obs)).unwrap();
        assert_eq!(writer.records(), 2);

        let (jsonl, fprime) = writer.into_inner();
        let text = String::from_utf8(jsonl.unwrap()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            let value: Value = serde_json::from_str(line).unwrap();
            assert!(verify(&value));
        }

        let frames = fprime.unwrap();
        assert_eq!(frames.len(), 2 * FPRIME_FRAME_LEN);
        let frame = FprimeFrame::from_bytes(&frames[..FPRIME_FRAME_LEN]).unwrap();
        assert_eq!(frame.unix_secs, 1_700_000_000);
        assert_eq!(frame.health, 100);
        assert_eq!(frame.armor, 20);
        assert_eq!(frame.kills, 2);
    }

    #[test]
    fn test_fprime_frame_layout_and_clamping() {
        let mut obs = observation(-5, 0, 70_000);
        obs.armor = 300;
        let frame = FprimeFrame::from_observation(&obs, 0x0102_0304);
        let bytes = frame.to_bytes();

        assert_eq!(&bytes[0..4], b"DSF0");
        assert_eq!(&bytes[4..8], &[1, 2, 3, 4]);
        assert_eq!(&bytes[8..10], &[0, 0]);
        assert_eq!(&bytes[10..12], &300u16.to_be_bytes());
        assert_eq!(&bytes[12..14], &[0xFF, 0xFF]);

        assert_eq!(FprimeFrame::from_bytes(b"XXXX0000000000"), None);
        assert_eq!(FprimeFrame::from_bytes(&bytes[..10]), None);
    }

    #[test]
    fn test_episode_summary_record() {
        let mut writer = Tier0Writer::new(meta(), Some(Vec::new()), None);
        let obs = observation(0, 900, 7);
        let mut resources = ResourceTracker::new();
        let fire = Action::none().with(Button::Attack);
        resources.record(fire, &obs);
        let mut moved = obs;
        moved.pose.x += 3.0;
        moved.pose.y += 4.0;
        resources.record(fire, &moved);
        let totals = EpisodeTotals {
            steps: 500,
            unix_time_us: 1_700_000_100_000_000,
            observation: &obs,
            episodes: 2,
            deaths: 1,
            avg_fps: 120.0,
            avg_frame_ms: 8.333,
            faults: FaultCounters::default(),
            result: "running",
            resources: &resources,
        };

        let record = writer.write_episode_summary(&totals).unwrap();
        assert_eq!(record["type"], "episode_summary");
        assert_eq!(record["damage"]["dealt_total"], 900);
        assert_eq!(record["kills"], 7);
        assert_eq!(record["performance"]["avg_frame_ms"], 8.33);
        assert_eq!(record["resources"]["ammo_used"]["SHOTGUN"], 2);
        assert_eq!(record["resources"]["ammo_used"]["PISTOL"], 0);
        assert_eq!(record["nav"]["path_len_m"], 5.0);
        assert!(verify(&record));

        let (jsonl, _) = writer.into_inner();
        let line: Value = serde_json::from_slice(jsonl.unwrap().trim_ascii_end()).unwrap();
        assert_eq!(line, record);
    }
}
