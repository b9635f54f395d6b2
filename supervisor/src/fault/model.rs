//! Statistical fault model.
//!
//! Decides, step by step, whether a single-event upset fires and where it
//! lands. All randomness comes from one seeded generator owned by the model,
//! so two models built from the same configuration produce the same event
//! sequence when driven with the same steps against the same regions.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::event::{CorruptionKind, FaultEvent};
use crate::memory::{Criticality, MemoryRegion, RegionRegistry};

/// When faults fire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FaultSchedule {
    /// Each step independently fires with this probability (0.0 - 1.0).
    PerStep { flip_probability: f64 },
    /// Faults arrive as a Poisson process with this mean gap in steps.
    MeanTimeBetweenFaults { mean_steps: f64 },
}

impl Default for FaultSchedule {
    fn default() -> Self {
        Self::PerStep {
            flip_probability: 0.0,
        }
    }
}

/// How fault targets are chosen among registered regions.
///
/// The default is uniform over regions. Any bias must be configured
/// explicitly through one of the override variants.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RegionWeights {
    /// Every non-empty region is equally likely.
    #[default]
    Uniform,
    /// Weight by criticality tier.
    ByCriticality {
        critical: f64,
        important: f64,
        cosmetic: f64,
    },
    /// Weight by region name; unlisted regions weigh 1.0.
    ByName(Vec<(String, f64)>),
}

impl RegionWeights {
    fn weight_of(&self, region: &MemoryRegion) -> f64 {
        match self {
            Self::Uniform => 1.0,
            Self::ByCriticality {
                critical,
                important,
                cosmetic,
            } => match region.criticality() {
                Criticality::Critical => *critical,
                Criticality::Important => *important,
                Criticality::Cosmetic => *cosmetic,
            },
            Self::ByName(weights) => weights
                .iter()
                .find(|(name, _)| name == region.name())
                .map_or(1.0, |(_, w)| *w),
        }
    }
}

/// Configuration for the fault model.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FaultModelConfig {
    /// When faults fire.
    pub schedule: FaultSchedule,
    /// Probability that a fault is a multi-bit flip (0.0 - 1.0).
    pub multi_bit_probability: f64,
    /// Probability that a fault is a stuck bit (0.0 - 1.0).
    pub stuck_bit_probability: f64,
    /// Seed for the model's generator.
    pub seed: u64,
    /// Target selection weights.
    pub weights: RegionWeights,
}

impl FaultModelConfig {
    /// A configuration that never fires.
    #[must_use]
    pub fn no_faults(seed: u64) -> Self {
        Self {
            seed,
            ..Self::default()
        }
    }

    /// Fire each step with the given probability.
    #[must_use]
    pub fn per_step(seed: u64, flip_probability: f64) -> Self {
        Self {
            schedule: FaultSchedule::PerStep { flip_probability },
            seed,
            ..Self::default()
        }
    }

    /// Fire with exponentially distributed gaps of the given mean.
    #[must_use]
    pub fn mean_time_between_faults(seed: u64, mean_steps: f64) -> Self {
        Self {
            schedule: FaultSchedule::MeanTimeBetweenFaults { mean_steps },
            seed,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_multi_bit_probability(mut self, probability: f64) -> Self {
        self.multi_bit_probability = probability;
        self
    }

    #[must_use]
    pub const fn with_stuck_bit_probability(mut self, probability: f64) -> Self {
        self.stuck_bit_probability = probability;
        self
    }

    #[must_use]
    pub fn with_weights(mut self, weights: RegionWeights) -> Self {
        self.weights = weights;
        self
    }
}

/// Seeded generator of [`FaultEvent`]s.
#[derive(Debug)]
pub struct FaultModel {
    config: FaultModelConfig,
    rng: StdRng,
    /// Next step a Poisson-scheduled fault is due.
    next_due: Option<u64>,
    generated: u64,
}

impl FaultModel {
    #[must_use]
    pub fn new(config: FaultModelConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            config,
            rng,
            next_due: None,
            generated: 0,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &FaultModelConfig {
        &self.config
    }

    /// Number of events generated so far.
    #[must_use]
    pub const fn generated(&self) -> u64 {
        self.generated
    }

    /// Decide whether a fault fires at `step` and, if so, build it.
    ///
    /// Returns `None` when no fault fires or when no region can be targeted
    /// (none registered, all empty, or all weighted to zero).
    pub fn next_fault(&mut self, step: u64, registry: &RegionRegistry) -> Option<FaultEvent> {
        if registry.is_empty() {
            return None;
        }

        if !self.fires(step) {
            return None;
        }

        let target = self.pick_target(registry)?;
        let region_bits = (target.len() as u64) * 8;
        let bit_offset = self.rng.random_range(0..region_bits);
        let kind = self.pick_kind();
        let seed = self.rng.random::<u64>();

        self.generated += 1;
        Some(FaultEvent {
            step,
            region: target.id(),
            bit_offset,
            kind,
            seed,
        })
    }

    fn fires(&mut self, step: u64) -> bool {
        match self.config.schedule {
            FaultSchedule::PerStep { flip_probability } => {
                if flip_probability <= 0.0 {
                    return false;
                }
                self.rng.random::<f64>() < flip_probability
            }
            FaultSchedule::MeanTimeBetweenFaults { mean_steps } => {
                let due = match self.next_due {
                    Some(due) => due,
                    None => {
                        let due = step.saturating_add(self.sample_gap(mean_steps));
                        self.next_due = Some(due);
                        due
                    }
                };
                if step < due {
                    return false;
                }
                self.next_due = Some(step.saturating_add(self.sample_gap(mean_steps)));
                true
            }
        }
    }

    /// Exponentially distributed gap, rounded up, at least one step.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // Clamped to >= 1 and finite
    fn sample_gap(&mut self, mean_steps: f64) -> u64 {
        let u: f64 = self.rng.random();
        let gap = -(1.0 - u).ln() * mean_steps;
        if gap.is_finite() {
            gap.ceil().max(1.0) as u64
        } else {
            u64::MAX
        }
    }

    fn pick_target<'a>(&mut self, registry: &'a RegionRegistry) -> Option<&'a MemoryRegion> {
        let candidates: Vec<(&MemoryRegion, f64)> = registry
            .iter()
            .filter(|r| !r.is_empty())
            .map(|r| (r, self.config.weights.weight_of(r).max(0.0)))
            .filter(|(_, w)| *w > 0.0)
            .collect();

        let total: f64 = candidates.iter().map(|(_, w)| w).sum();
        if candidates.is_empty() || total <= 0.0 {
            return None;
        }

        let mut point = self.rng.random::<f64>() * total;
        for (region, weight) in &candidates {
            if point < *weight {
                return Some(*region);
            }
            point -= weight;
        }
        // Floating point leftovers land on the last candidate.
        candidates.last().map(|(r, _)| *r)
    }

    fn pick_kind(&mut self) -> CorruptionKind {
        let roll: f64 = self.rng.random();
        if roll < self.config.multi_bit_probability {
            CorruptionKind::MultiBitFlip
        } else if roll < self.config.multi_bit_probability + self.config.stuck_bit_probability {
            CorruptionKind::Stuck
        } else {
            CorruptionKind::SingleBitFlip
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::RegionId;

    fn registry() -> RegionRegistry {
        let mut registry = RegionRegistry::new();
        registry.register("player", vec![0; 64], Criticality::Critical).unwrap();
        registry.register("enemies", vec![0; 128], Criticality::Important).unwrap();
        registry.register("frame", vec![0; 256], Criticality::Cosmetic).unwrap();
        registry
    }

    fn collect(config: FaultModelConfig, steps: u64) -> Vec<FaultEvent> {
        let registry = registry();
        let mut model = FaultModel::new(config);
        (1..=steps)
            .filter_map(|step| model.next_fault(step, &registry))
            .collect()
    }

    #[test]
    fn test_no_regions_never_fires() {
        let registry = RegionRegistry::new();
        let mut model = FaultModel::new(FaultModelConfig::per_step(1, 1.0));
        for step in 1..=100 {
            assert!(model.next_fault(step, &registry).is_none());
        }
        assert_eq!(model.generated(), 0);
    }

    #[test]
    fn test_zero_probability_never_fires() {
        assert!(collect(FaultModelConfig::per_step(7, 0.0), 500).is_empty());
    }

    #[test]
    fn test_certain_probability_fires_every_step() {
        let events = collect(FaultModelConfig::per_step(7, 1.0), 50);
        assert_eq!(events.len(), 50);
        for (i, e) in events.iter().enumerate() {
            assert_eq!(e.step, i as u64 + 1);
        }
    }

    #[test]
    fn test_same_seed_same_sequence() {
        let config = FaultModelConfig::per_step(12345, 0.3)
            .with_multi_bit_probability(0.2)
            .with_stuck_bit_probability(0.1);

        let first = collect(config.clone(), 1000);
        let second = collect(config, 1000);
        assert!(!first.is_empty());
        assert_eq!(first, second);
    }

    #[test]
    fn test_different_seed_different_sequence() {
        let a = collect(FaultModelConfig::per_step(1, 0.5), 200);
        let b = collect(FaultModelConfig::per_step(2, 0.5), 200);
        assert_ne!(a, b);
    }

    #[test]
    fn test_offsets_within_target() {
        let registry = registry();
        for e in collect(FaultModelConfig::per_step(3, 1.0), 500) {
            let len = registry.region_len(e.region).unwrap() as u64;
            assert!(e.bit_offset < len * 8);
        }
    }

    #[test]
    fn test_uniform_weights_hit_every_region() {
        let events = collect(FaultModelConfig::per_step(11, 1.0), 600);
        for id in 0..3 {
            let hits = events.iter().filter(|e| e.region == RegionId(id)).count();
            assert!(hits > 120, "region {id} hit only {hits} times");
        }
    }

    #[test]
    fn test_criticality_override_biases_targets() {
        let config = FaultModelConfig::per_step(11, 1.0).with_weights(RegionWeights::ByCriticality {
            critical: 1.0,
            important: 0.0,
            cosmetic: 0.0,
        });
        let events = collect(config, 200);
        assert!(events.iter().all(|e| e.region == RegionId(0)));
    }

    #[test]
    fn test_name_override_excludes_region() {
        let config = FaultModelConfig::per_step(5, 1.0)
            .with_weights(RegionWeights::ByName(vec![("frame".to_string(), 0.0)]));
        let events = collect(config, 300);
        assert!(events.iter().all(|e| e.region != RegionId(2)));
    }

    #[test]
    fn test_all_zero_weights_never_fire() {
        let config = FaultModelConfig::per_step(5, 1.0).with_weights(RegionWeights::ByCriticality {
            critical: 0.0,
            important: 0.0,
            cosmetic: 0.0,
        });
        assert!(collect(config, 100).is_empty());
    }

    #[test]
    fn test_kind_mix() {
        let config = FaultModelConfig::per_step(99, 1.0).with_multi_bit_probability(1.0);
        assert!(collect(config, 50)
            .iter()
            .all(|e| e.kind == CorruptionKind::MultiBitFlip));

        let config = FaultModelConfig::per_step(99, 1.0).with_stuck_bit_probability(1.0);
        assert!(collect(config, 50).iter().all(|e| e.kind == CorruptionKind::Stuck));

        let events = collect(FaultModelConfig::per_step(99, 1.0), 50);
        assert!(events.iter().all(|e| e.kind == CorruptionKind::SingleBitFlip));
    }

    #[test]
    fn test_mtbf_rate_roughly_matches_mean() {
        let events = collect(FaultModelConfig::mean_time_between_faults(8, 10.0), 10_000);
        // Expect ~1000 events; allow a generous band.
        assert!(
            (700..=1300).contains(&events.len()),
            "got {} events",
            events.len()
        );

        // Steps strictly increase.
        assert!(events.windows(2).all(|w| w[0].step < w[1].step));
    }

    #[test]
    fn test_mtbf_deterministic() {
        let config = FaultModelConfig::mean_time_between_faults(21, 4.0);
        assert_eq!(collect(config.clone(), 500), collect(config, 500));
    }
}
