//! Advisory configuration suggestions.
//!
//! Inspects monitor and cache statistics after a run and produces ordered,
//! human-readable hints. Never mutates scheduler state, cache contents, or
//! configuration.

use crate::cache::CacheStats;
use crate::graph::GraphShape;
use crate::monitor::MonitorSummary;
use crate::types::InstallReport;

/// Mean duration above which an operation is called out as slow.
const SLOW_OPERATION_SECS: f64 = 30.0;

/// Cache size above which clearing is suggested.
const LARGE_CACHE_ENTRIES: usize = 100;

/// Hit ratio below which a longer TTL is suggested (when anything ran).
const LOW_HIT_RATIO: f64 = 0.2;

/// Advisory analyzer over a finished run.
#[derive(Debug, Clone, Copy, Default)]
pub struct Optimizer {
    /// Concurrency limit the run actually used
    pub concurrency_limit: usize,
}

impl Optimizer {
    pub fn new(concurrency_limit: usize) -> Self {
        Self { concurrency_limit }
    }

    /// Produce ordered suggestions for the next run.
    pub fn analyze(
        &self,
        summary: &MonitorSummary,
        cache_stats: &CacheStats,
        shape: &GraphShape,
        report: &InstallReport,
    ) -> Vec<String> {
        let mut suggestions = Vec::new();

        // Parallelism left on the table: a wave wider than the pool
        if shape.max_wave_width > self.concurrency_limit && self.concurrency_limit > 0 {
            suggestions.push(format!(
                "widest wave has {} independent units but only {} ran at once; \
                 consider --max-parallel={}",
                shape.max_wave_width,
                self.concurrency_limit,
                shape.max_wave_width.min(2 * self.concurrency_limit)
            ));
        }

        for (label, stats) in &summary.operations {
            if stats.mean_secs > SLOW_OPERATION_SECS {
                suggestions.push(format!(
                    "slow operation '{label}': avg {:.1}s over {} runs",
                    stats.mean_secs, stats.count
                ));
            }
        }

        // Failed units with dependents show up as blocked counts
        let failed: Vec<&str> = report
            .units
            .iter()
            .filter(|(_, r)| r.status.label() == "failed")
            .map(|(id, _)| id.as_str())
            .collect();
        if !failed.is_empty() && report.blocked() > 0 {
            suggestions.push(format!(
                "{} unit(s) blocked behind failures ({}); consider isolating their dependents \
                 or fixing the failing units first",
                report.blocked(),
                failed.join(", ")
            ));
        }

        if cache_stats.entries > LARGE_CACHE_ENTRIES {
            suggestions.push(format!(
                "cache holds {} entries; run 'rigup cache clear' to reclaim space",
                cache_stats.entries
            ));
        }

        if summary.total_units > 0
            && summary.cache_hit_ratio < LOW_HIT_RATIO
            && summary.total_secs > SLOW_OPERATION_SECS
        {
            suggestions.push(format!(
                "cache hit ratio {:.0}% is low for a {:.0}s run; a longer --cache-ttl may help",
                summary.cache_hit_ratio * 100.0,
                summary.total_secs
            ));
        }

        suggestions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::OperationStats;
    use crate::types::{RunOutcome, UnitReport, UnitStatus};
    use std::collections::BTreeMap;

    fn empty_report() -> InstallReport {
        InstallReport {
            units: BTreeMap::new(),
            outcome: RunOutcome::AllSucceeded,
            waves_completed: 0,
            total_secs: 0.0,
        }
    }

    fn report_with(statuses: &[(&str, UnitStatus)]) -> InstallReport {
        let units = statuses
            .iter()
            .map(|(id, status)| {
                (
                    (*id).to_string(),
                    UnitReport {
                        status: status.clone(),
                        output: None,
                        duration_secs: 0.0,
                    },
                )
            })
            .collect();
        InstallReport {
            units,
            outcome: RunOutcome::Partial,
            waves_completed: 1,
            total_secs: 1.0,
        }
    }

    #[test]
    fn test_quiet_run_yields_nothing() {
        let optimizer = Optimizer::new(4);
        let suggestions = optimizer.analyze(
            &MonitorSummary::default(),
            &CacheStats::default(),
            &GraphShape::default(),
            &empty_report(),
        );
        assert!(suggestions.is_empty());
    }

    #[test]
    fn test_wide_wave_suggests_more_parallelism() {
        let optimizer = Optimizer::new(2);
        let shape = GraphShape {
            unit_count: 10,
            wave_count: 2,
            max_wave_width: 8,
        };
        let suggestions = optimizer.analyze(
            &MonitorSummary::default(),
            &CacheStats::default(),
            &shape,
            &empty_report(),
        );
        assert_eq!(suggestions.len(), 1);
        assert!(suggestions[0].contains("--max-parallel=4"));
    }

    #[test]
    fn test_slow_operation_flagged() {
        let optimizer = Optimizer::new(4);
        let mut summary = MonitorSummary::default();
        summary.operations.insert(
            "install".to_string(),
            OperationStats {
                count: 3,
                mean_secs: 45.0,
                median_secs: 40.0,
                p95_secs: 60.0,
                total_secs: 135.0,
            },
        );
        let suggestions = optimizer.analyze(
            &summary,
            &CacheStats::default(),
            &GraphShape::default(),
            &empty_report(),
        );
        assert!(suggestions.iter().any(|s| s.contains("slow operation")));
    }

    #[test]
    fn test_blocked_behind_failure_flagged() {
        let optimizer = Optimizer::new(4);
        let report = report_with(&[
            (
                "db",
                UnitStatus::Failed {
                    error: "boom".into(),
                },
            ),
            ("api", UnitStatus::Blocked { cause: "db".into() }),
            ("web", UnitStatus::Blocked { cause: "db".into() }),
        ]);
        let suggestions = optimizer.analyze(
            &MonitorSummary::default(),
            &CacheStats::default(),
            &GraphShape::default(),
            &report,
        );
        let hit = suggestions
            .iter()
            .find(|s| s.contains("blocked behind failures"))
            .expect("should flag blocked units");
        assert!(hit.contains("db"));
        assert!(hit.contains('2'));
    }

    #[test]
    fn test_large_cache_suggests_clear() {
        let optimizer = Optimizer::new(4);
        let stats = CacheStats {
            entries: 250,
            ..CacheStats::default()
        };
        let suggestions = optimizer.analyze(
            &MonitorSummary::default(),
            &stats,
            &GraphShape::default(),
            &empty_report(),
        );
        assert!(suggestions.iter().any(|s| s.contains("cache clear")));
    }
}
