//! Performance metrics for install runs.
//!
//! Workers never touch the monitor directly: each unit's handling produces
//! a [`MetricSample`] that travels back with the wave's results, and the
//! scheduler merges the batch between waves. Recording therefore costs the
//! workers nothing and never delays the next wave.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How a sampled operation ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SampleOutcome {
    /// Action ran and succeeded
    Succeeded,
    /// Action ran and failed
    Failed,
    /// Served from cache without running the action
    CacheHit {
        /// Duration of the original install, i.e. the time saved
        original_secs: f64,
    },
}

/// One timed operation, appended per unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSample {
    /// Unit the sample belongs to
    pub unit_id: String,
    /// Operation label (e.g. "install", "cache-lookup")
    pub operation: String,
    /// Wall-clock duration in seconds
    pub duration_secs: f64,
    /// Terminal outcome of the operation
    pub outcome: SampleOutcome,
}

/// Aggregated timing for one operation label.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperationStats {
    pub count: usize,
    pub mean_secs: f64,
    pub median_secs: f64,
    pub p95_secs: f64,
    pub total_secs: f64,
}

/// Summary over all recorded samples.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorSummary {
    /// Per-operation timing statistics
    pub operations: BTreeMap<String, OperationStats>,
    /// Fraction of units served from cache
    pub cache_hit_ratio: f64,
    /// Total sampled units
    pub total_units: usize,
    /// Sum of all sample durations, in seconds
    pub total_secs: f64,
    /// Sum of original durations of cache-hit units, in seconds
    pub estimated_saved_secs: f64,
}

/// Append-only collector of metric samples.
#[derive(Debug, Default)]
pub struct PerformanceMonitor {
    samples: Vec<MetricSample>,
}

impl PerformanceMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a single sample.
    pub fn record(&mut self, sample: MetricSample) {
        log::debug!(
            "metric {}/{}: {:.2}s",
            sample.unit_id,
            sample.operation,
            sample.duration_secs
        );
        self.samples.push(sample);
    }

    /// Merge a wave's worth of samples.
    pub fn extend(&mut self, samples: impl IntoIterator<Item = MetricSample>) {
        self.samples.extend(samples);
    }

    /// All samples recorded so far.
    pub fn samples(&self) -> &[MetricSample] {
        &self.samples
    }

    /// Aggregate all samples into a summary. Prior samples are not mutated;
    /// calling this repeatedly is safe and cheap for realistic plan sizes.
    pub fn aggregate(&self) -> MonitorSummary {
        let mut by_operation: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
        let mut hits = 0usize;
        let mut saved = 0.0;
        let mut total_secs = 0.0;

        for sample in &self.samples {
            by_operation
                .entry(sample.operation.as_str())
                .or_default()
                .push(sample.duration_secs);
            total_secs += sample.duration_secs;
            if let SampleOutcome::CacheHit { original_secs } = sample.outcome {
                hits += 1;
                saved += original_secs;
            }
        }

        let operations = by_operation
            .into_iter()
            .map(|(label, durations)| (label.to_string(), stats_for(&durations)))
            .collect();

        let total_units = self.samples.len();
        MonitorSummary {
            operations,
            cache_hit_ratio: if total_units == 0 {
                0.0
            } else {
                hits as f64 / total_units as f64
            },
            total_units,
            total_secs,
            estimated_saved_secs: saved,
        }
    }
}

fn stats_for(durations: &[f64]) -> OperationStats {
    let mut sorted = durations.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let count = sorted.len();
    let total: f64 = sorted.iter().sum();
    OperationStats {
        count,
        mean_secs: if count == 0 { 0.0 } else { total / count as f64 },
        median_secs: percentile(&sorted, 0.50),
        p95_secs: percentile(&sorted, 0.95),
        total_secs: total,
    }
}

/// Nearest-rank percentile over an ascending-sorted slice.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (q * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(id: &str, op: &str, secs: f64, outcome: SampleOutcome) -> MetricSample {
        MetricSample {
            unit_id: id.to_string(),
            operation: op.to_string(),
            duration_secs: secs,
            outcome,
        }
    }

    #[test]
    fn test_empty_summary() {
        let monitor = PerformanceMonitor::new();
        let summary = monitor.aggregate();
        assert_eq!(summary.total_units, 0);
        assert!(summary.operations.is_empty());
        assert!(summary.cache_hit_ratio.abs() < f64::EPSILON);
    }

    #[test]
    fn test_operation_stats() {
        let mut monitor = PerformanceMonitor::new();
        for (i, secs) in [1.0, 2.0, 3.0, 4.0].into_iter().enumerate() {
            monitor.record(sample(
                &format!("u{i}"),
                "install",
                secs,
                SampleOutcome::Succeeded,
            ));
        }

        let summary = monitor.aggregate();
        let stats = &summary.operations["install"];
        assert_eq!(stats.count, 4);
        assert!((stats.mean_secs - 2.5).abs() < 1e-9);
        assert!((stats.median_secs - 2.0).abs() < 1e-9);
        assert!((stats.p95_secs - 4.0).abs() < 1e-9);
        assert!((stats.total_secs - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_cache_hit_ratio_and_saved_time() {
        let mut monitor = PerformanceMonitor::new();
        for i in 0..6 {
            monitor.record(sample(
                &format!("hit{i}"),
                "install",
                0.01,
                SampleOutcome::CacheHit { original_secs: 5.0 },
            ));
        }
        for i in 0..4 {
            monitor.record(sample(
                &format!("fresh{i}"),
                "install",
                5.0,
                SampleOutcome::Succeeded,
            ));
        }

        let summary = monitor.aggregate();
        assert_eq!(summary.total_units, 10);
        assert!((summary.cache_hit_ratio - 0.6).abs() < 1e-9);
        assert!((summary.estimated_saved_secs - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_extend_merges_wave_batches() {
        let mut monitor = PerformanceMonitor::new();
        monitor.extend(vec![
            sample("a", "install", 1.0, SampleOutcome::Succeeded),
            sample("b", "install", 2.0, SampleOutcome::Failed),
        ]);
        monitor.extend(vec![sample("c", "install", 3.0, SampleOutcome::Succeeded)]);

        assert_eq!(monitor.samples().len(), 3);
        assert_eq!(monitor.aggregate().operations["install"].count, 3);
    }

    #[test]
    fn test_percentile_single_sample() {
        assert!((percentile(&[7.0], 0.95) - 7.0).abs() < f64::EPSILON);
        assert!((percentile(&[7.0], 0.5) - 7.0).abs() < f64::EPSILON);
    }
}
