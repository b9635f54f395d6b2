//! Per-step efficiency metrics and their aggregation.
//!
//! The collector is pure bookkeeping: the run controller measures, the
//! collector stores and summarizes.

pub mod resources;
pub mod tier0;

use serde::Serialize;

pub use resources::{ResourceTracker, WEAPON_NAMES};

pub use tier0::{
    EpisodeTotals, FaultCounters, FprimeFrame, Outcome, RunMetadata, Tier0Error, Tier0Snapshot,
    Tier0Writer,
};

/// One step's measurements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSample {
    pub step: u64,
    /// Wall time spent on the whole step, in microseconds.
    pub wall_time_delta_us: u64,
    /// Time the agent took to choose its action, in microseconds.
    pub action_latency_us: u64,
    pub region_count: usize,
    pub region_bytes: usize,
    /// Corrupted verdicts seen so far in the run.
    pub corruption_count: u64,
    /// Restarts so far in the run.
    pub restarts: u32,
}

/// Aggregate view over all recorded samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TelemetrySummary {
    pub steps: u64,
    pub mean_latency_us: f64,
    pub p50_latency_us: u64,
    pub p95_latency_us: u64,
    pub p99_latency_us: u64,
    pub max_latency_us: u64,
    pub mean_frame_time_us: f64,
    pub avg_fps: f64,
    pub peak_region_bytes: usize,
    pub peak_region_count: usize,
    pub total_corruptions: u64,
    pub total_restarts: u32,
}

/// Append-only store of [`MetricsSample`]s.
#[derive(Debug, Default)]
pub struct TelemetryCollector {
    samples: Vec<MetricsSample>,
}

impl TelemetryCollector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, sample: MetricsSample) {
        self.samples.push(sample);
    }

    #[must_use]
    pub fn samples(&self) -> &[MetricsSample] {
        &self.samples
    }

    #[must_use]
    pub fn last(&self) -> Option<&MetricsSample> {
        self.samples.last()
    }

    /// Mean FPS and frame time (ms) over the most recent `window` samples.
    ///
    /// Returns zeros when nothing has been recorded.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn recent_performance(&self, window: usize) -> (f64, f64) {
        let start = self.samples.len().saturating_sub(window.max(1));
        let recent = &self.samples[start..];
        if recent.is_empty() {
            return (0.0, 0.0);
        }
        let total: u64 = recent.iter().map(|s| s.wall_time_delta_us).sum();
        let mean_us = total as f64 / recent.len() as f64;
        (fps_from_frame_time(mean_us), mean_us / 1000.0)
    }

    /// Summarize everything recorded so far.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn summary(&self) -> TelemetrySummary {
        if self.samples.is_empty() {
            return TelemetrySummary::default();
        }

        let n = self.samples.len();
        let mut latencies: Vec<u64> = self.samples.iter().map(|s| s.action_latency_us).collect();
        latencies.sort_unstable();

        let latency_total: u64 = latencies.iter().sum();
        let frame_total: u64 = self.samples.iter().map(|s| s.wall_time_delta_us).sum();
        let mean_frame_time_us = frame_total as f64 / n as f64;

        TelemetrySummary {
            steps: n as u64,
            mean_latency_us: latency_total as f64 / n as f64,
            p50_latency_us: percentile(&latencies, 50),
            p95_latency_us: percentile(&latencies, 95),
            p99_latency_us: percentile(&latencies, 99),
            max_latency_us: latencies.last().copied().unwrap_or(0),
            mean_frame_time_us,
            avg_fps: fps_from_frame_time(mean_frame_time_us),
            peak_region_bytes: self.samples.iter().map(|s| s.region_bytes).max().unwrap_or(0),
            peak_region_count: self.samples.iter().map(|s| s.region_count).max().unwrap_or(0),
            total_corruptions: self.samples.iter().map(|s| s.corruption_count).max().unwrap_or(0),
            total_restarts: self.samples.iter().map(|s| s.restarts).max().unwrap_or(0),
        }
    }
}

/// Nearest-rank percentile of an ascending slice.
fn percentile(sorted: &[u64], pct: usize) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = (pct * sorted.len()).div_ceil(100).max(1);
    sorted[rank.min(sorted.len()) - 1]
}

fn fps_from_frame_time(mean_us: f64) -> f64 {
    if mean_us > 0.0 { 1_000_000.0 / mean_us } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(step: u64, latency: u64) -> MetricsSample {
        MetricsSample {
            step,
            wall_time_delta_us: 2_000,
            action_latency_us: latency,
            region_count: 3,
            region_bytes: 128,
            corruption_count: 0,
            restarts: 0,
        }
    }

    #[test]
    fn test_empty_summary_is_zero() {
        let collector = TelemetryCollector::new();
        assert_eq!(collector.summary(), TelemetrySummary::default());
        assert_eq!(collector.recent_performance(10), (0.0, 0.0));
    }

    #[test]
    fn test_latency_percentiles() {
        let mut collector = TelemetryCollector::new();
        for step in 1..=100 {
            collector.record(sample(step, step * 10));
        }

        let summary = collector.summary();
        assert_eq!(summary.steps, 100);
        assert_eq!(summary.p50_latency_us, 500);
        assert_eq!(summary.p95_latency_us, 950);
        assert_eq!(summary.p99_latency_us, 990);
        assert_eq!(summary.max_latency_us, 1000);
        assert!((summary.mean_latency_us - 505.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_single_sample_percentiles() {
        let mut collector = TelemetryCollector::new();
        collector.record(sample(1, 42));
        let summary = collector.summary();
        assert_eq!(summary.p50_latency_us, 42);
        assert_eq!(summary.p99_latency_us, 42);
    }

    #[test]
    fn test_frame_time_and_fps() {
        let mut collector = TelemetryCollector::new();
        collector.record(sample(1, 1));
        collector.record(sample(2, 1));

        let summary = collector.summary();
        assert!((summary.mean_frame_time_us - 2_000.0).abs() < f64::EPSILON);
        assert!((summary.avg_fps - 500.0).abs() < 1e-9);

        let (fps, frame_ms) = collector.recent_performance(1);
        assert!((fps - 500.0).abs() < 1e-9);
        assert!((frame_ms - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_peaks_and_totals() {
        let mut collector = TelemetryCollector::new();
        collector.record(MetricsSample {
            region_count: 2,
            region_bytes: 64,
            corruption_count: 1,
            restarts: 0,
            ..sample(1, 5)
        });
        collector.record(MetricsSample {
            region_count: 5,
            region_bytes: 512,
            corruption_count: 4,
            restarts: 2,
            ..sample(2, 5)
        });
        collector.record(MetricsSample {
            region_count: 1,
            region_bytes: 16,
            corruption_count: 4,
            restarts: 2,
            ..sample(3, 5)
        });

        let summary = collector.summary();
        assert_eq!(summary.peak_region_count, 5);
        assert_eq!(summary.peak_region_bytes, 512);
        assert_eq!(summary.total_corruptions, 4);
        assert_eq!(summary.total_restarts, 2);
    }
}
