//! Wave-based parallel install scheduler.
//!
//! Waves execute strictly in sequence; units within a wave run on a bounded
//! rayon pool. Before running a unit's action a worker consults the
//! installation cache; afterwards the outcome is classified into exactly one
//! terminal status. A failing unit never aborts its siblings - its dependents
//! are marked blocked between waves instead.

use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use crate::action::InstallAction;
use crate::cache::{CachedResult, InstallationCache};
use crate::error::Result;
use crate::fingerprint::Fingerprint;
use crate::graph::{self, Wave};
use crate::monitor::{MetricSample, PerformanceMonitor, SampleOutcome};
use crate::retry::with_retry;
use crate::types::{
    CommandOutput, ExecuteOptions, InstallReport, InstallUnit, RunOutcome, UnitReport, UnitStatus,
};

/// Operation label used for install samples.
const INSTALL_OP: &str = "install";

/// Shared cancellation signal.
///
/// Once cancelled, no new unit starts; in-flight actions run to completion.
/// Units that never started stay `pending` in the final report.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-unit progress notifications, called from worker threads.
pub trait ProgressCallback: Send + Sync {
    /// Called once per unit when it reaches a terminal state.
    fn on_unit_done(&self, unit_id: &str, status: &UnitStatus);
}

/// No-op progress callback.
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_unit_done(&self, _unit_id: &str, _status: &UnitStatus) {}
}

/// What one worker hands back for one unit.
struct UnitOutcome {
    id: String,
    status: UnitStatus,
    output: Option<CommandOutput>,
    duration_secs: f64,
    sample: Option<MetricSample>,
}

/// The scheduler: executes resolved waves against the cache.
pub struct ParallelInstaller {
    cache: Arc<InstallationCache>,
    options: ExecuteOptions,
    cancel: CancelToken,
    monitor: PerformanceMonitor,
    progress: Box<dyn ProgressCallback>,
}

impl ParallelInstaller {
    pub fn new(cache: Arc<InstallationCache>, options: ExecuteOptions) -> Self {
        Self {
            cache,
            options,
            cancel: CancelToken::new(),
            monitor: PerformanceMonitor::new(),
            progress: Box::new(NoProgress),
        }
    }

    /// Install a progress callback.
    pub fn with_progress(mut self, progress: Box<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Token that external code can use to cancel this run.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Metrics recorded so far (merged at wave boundaries).
    pub fn monitor(&self) -> &PerformanceMonitor {
        &self.monitor
    }

    /// Resolve dependencies and execute the whole plan.
    ///
    /// A cycle aborts before anything runs. Per-unit failures never surface
    /// as errors here; they land in the report's status map.
    pub fn run(&mut self, units: &[InstallUnit]) -> Result<InstallReport> {
        let waves = graph::resolve(units)?;
        Ok(self.execute_waves(units, &waves))
    }

    /// Execute pre-resolved waves.
    ///
    /// `waves` must come from [`graph::resolve`] over the same `units`.
    pub fn execute_waves(&mut self, units: &[InstallUnit], waves: &[Wave]) -> InstallReport {
        let run_start = Instant::now();
        let by_id: BTreeMap<&str, &InstallUnit> =
            units.iter().map(|u| (u.id.as_str(), u)).collect();

        let mut statuses: BTreeMap<String, UnitStatus> = units
            .iter()
            .map(|u| (u.id.clone(), UnitStatus::Pending))
            .collect();
        let mut reports: BTreeMap<String, UnitReport> = BTreeMap::new();

        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.concurrency_limit.max(1))
            .build()
        {
            Ok(pool) => pool,
            Err(e) => {
                log::error!("failed to create worker pool: {e}");
                return self.aborted_report(statuses, run_start);
            }
        };

        let mut waves_completed = 0usize;

        for (index, wave) in waves.iter().enumerate() {
            if self.cancel.is_cancelled() {
                log::info!("cancelled before wave {}", index + 1);
                break;
            }

            // Units already marked blocked by an earlier wave don't run
            let runnable: Vec<&InstallUnit> = wave
                .iter()
                .filter(|id| statuses.get(*id) == Some(&UnitStatus::Pending))
                .filter_map(|id| by_id.get(id.as_str()).copied())
                .collect();

            log::info!(
                "wave {}/{}: {} unit(s), {} worker(s)",
                index + 1,
                waves.len(),
                runnable.len(),
                self.options.concurrency_limit
            );

            let outcomes: Vec<UnitOutcome> = pool.install(|| {
                runnable
                    .par_iter()
                    .map(|unit| self.handle_unit(unit))
                    .collect()
            });

            // Wave boundary: merge worker samples and statuses
            let mut wave_fully_resolved = true;
            for outcome in outcomes {
                if let Some(sample) = outcome.sample {
                    self.monitor.record(sample);
                }
                if !outcome.status.is_terminal() {
                    wave_fully_resolved = false;
                }
                statuses.insert(outcome.id.clone(), outcome.status.clone());
                reports.insert(
                    outcome.id,
                    UnitReport {
                        status: outcome.status,
                        output: outcome.output,
                        duration_secs: outcome.duration_secs,
                    },
                );
            }

            if wave_fully_resolved {
                waves_completed += 1;
            }

            let wave_failed = wave
                .iter()
                .any(|id| matches!(statuses.get(id), Some(UnitStatus::Failed { .. })));

            propagate_blocked(units, waves, &mut statuses);

            if self.options.fail_fast && wave_failed {
                log::warn!("fail-fast: halting after wave {}", index + 1);
                let cause = wave_failure_cause(wave, &statuses);
                block_remaining(&mut statuses, &cause);
                break;
            }
        }

        // Anything still pending that was blocked by propagation gets its
        // report entry here; cancelled units stay pending.
        for (id, status) in &statuses {
            reports.entry(id.clone()).or_insert_with(|| UnitReport {
                status: status.clone(),
                output: None,
                duration_secs: 0.0,
            });
        }
        // Keep report statuses in sync with post-wave propagation
        for (id, report) in &mut reports {
            if let Some(status) = statuses.get(id) {
                report.status = status.clone();
            }
        }

        let outcome = overall_outcome(&reports, waves_completed, self.cancel.is_cancelled());
        InstallReport {
            units: reports,
            outcome,
            waves_completed,
            total_secs: run_start.elapsed().as_secs_f64(),
        }
    }

    /// Handle one unit on a worker thread: cache consult, action, classify.
    fn handle_unit(&self, unit: &InstallUnit) -> UnitOutcome {
        let start = Instant::now();

        if self.cancel.is_cancelled() {
            // Never started; stays pending per the cancellation contract
            return UnitOutcome {
                id: unit.id.clone(),
                status: UnitStatus::Pending,
                output: None,
                duration_secs: 0.0,
                sample: None,
            };
        }

        let fingerprint = Fingerprint::of(&unit.spec);

        if self.options.use_cache {
            if let Some(cached) = self.cache.get(&fingerprint) {
                log::info!("{}: cached, skipping install", unit.id);
                let status = UnitStatus::SkippedCached;
                self.progress.on_unit_done(&unit.id, &status);
                return UnitOutcome {
                    id: unit.id.clone(),
                    status,
                    output: Some(cached.output),
                    duration_secs: start.elapsed().as_secs_f64(),
                    sample: Some(MetricSample {
                        unit_id: unit.id.clone(),
                        operation: INSTALL_OP.to_string(),
                        duration_secs: start.elapsed().as_secs_f64(),
                        outcome: SampleOutcome::CacheHit {
                            original_secs: cached.duration_secs,
                        },
                    }),
                };
            }
        }

        log::debug!("{}: running {}", unit.id, unit.action.describe());
        let result = with_retry(
            &self.options.retry,
            |attempt, err, delay| {
                log::warn!(
                    "{}: attempt {attempt} failed: {err}; retrying in {}s",
                    unit.id,
                    delay.as_secs()
                );
            },
            || unit.action.run(),
        );
        let duration_secs = start.elapsed().as_secs_f64();

        let (status, output, sample_outcome) = match result {
            Ok(output) => {
                if self.options.use_cache {
                    // Only fully successful units may mint cache entries
                    self.cache.put(
                        &fingerprint,
                        CachedResult {
                            output: output.clone(),
                            duration_secs,
                        },
                        self.options.cache_ttl,
                    );
                }
                (UnitStatus::Succeeded, Some(output), SampleOutcome::Succeeded)
            }
            Err(e) => {
                log::warn!("{}: {} ({})", unit.id, e, e.category().description());
                (
                    UnitStatus::Failed {
                        error: e.to_string(),
                    },
                    None,
                    SampleOutcome::Failed,
                )
            }
        };

        self.progress.on_unit_done(&unit.id, &status);

        UnitOutcome {
            id: unit.id.clone(),
            status,
            output,
            duration_secs,
            sample: Some(MetricSample {
                unit_id: unit.id.clone(),
                operation: INSTALL_OP.to_string(),
                duration_secs,
                outcome: sample_outcome,
            }),
        }
    }

    fn aborted_report(
        &self,
        statuses: BTreeMap<String, UnitStatus>,
        run_start: Instant,
    ) -> InstallReport {
        let units = statuses
            .into_iter()
            .map(|(id, status)| {
                (
                    id,
                    UnitReport {
                        status,
                        output: None,
                        duration_secs: 0.0,
                    },
                )
            })
            .collect();
        InstallReport {
            units,
            outcome: RunOutcome::Aborted,
            waves_completed: 0,
            total_secs: run_start.elapsed().as_secs_f64(),
        }
    }
}

/// Mark every pending dependent of a failed/blocked unit as blocked, with
/// the originating failure's id as the cause.
///
/// Iterating in wave order makes the propagation transitive in one pass:
/// by the time a unit is inspected, all its dependencies already carry
/// their final status.
fn propagate_blocked(
    units: &[InstallUnit],
    waves: &[Wave],
    statuses: &mut BTreeMap<String, UnitStatus>,
) {
    let by_id: BTreeMap<&str, &InstallUnit> = units.iter().map(|u| (u.id.as_str(), u)).collect();

    for wave in waves {
        for id in wave {
            if statuses.get(id) != Some(&UnitStatus::Pending) {
                continue;
            }
            let Some(unit) = by_id.get(id.as_str()) else {
                continue;
            };
            let cause = unit.depends_on.iter().find_map(|dep| {
                match statuses.get(dep) {
                    // A failed dependency is itself the origin
                    Some(UnitStatus::Failed { .. }) => Some(dep.clone()),
                    // A blocked dependency forwards its origin
                    Some(UnitStatus::Blocked { cause }) => Some(cause.clone()),
                    _ => None,
                }
            });
            if let Some(cause) = cause {
                log::info!("{id}: blocked by {cause}");
                statuses.insert(id.clone(), UnitStatus::Blocked { cause });
            }
        }
    }
}

/// Fail-fast halt: every still-pending unit becomes blocked.
fn block_remaining(statuses: &mut BTreeMap<String, UnitStatus>, cause: &str) {
    for status in statuses.values_mut() {
        if *status == UnitStatus::Pending {
            *status = UnitStatus::Blocked {
                cause: cause.to_string(),
            };
        }
    }
}

/// Id of the first failed unit in a wave (for fail-fast cause attribution).
fn wave_failure_cause(wave: &Wave, statuses: &BTreeMap<String, UnitStatus>) -> String {
    wave.iter()
        .find(|id| matches!(statuses.get(*id), Some(UnitStatus::Failed { .. })))
        .cloned()
        .unwrap_or_default()
}

/// Tri-state outcome of the whole run.
fn overall_outcome(
    reports: &BTreeMap<String, UnitReport>,
    waves_completed: usize,
    cancelled: bool,
) -> RunOutcome {
    if cancelled && waves_completed == 0 {
        return RunOutcome::Aborted;
    }
    let all_ok = reports.values().all(|r| {
        matches!(
            r.status,
            UnitStatus::Succeeded | UnitStatus::SkippedCached
        )
    });
    if all_ok {
        RunOutcome::AllSucceeded
    } else {
        RunOutcome::Partial
    }
}
