//! Core types for install plans and their execution.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use crate::action::InstallAction;

/// Normalized specification of a single installable item.
///
/// This is what gets fingerprinted for the cache: two units with the same
/// name, version, and options share a cache entry regardless of option
/// insertion order or which plan they came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitSpec {
    /// Package/tool name (e.g. "ripgrep")
    pub name: String,
    /// Optional pinned version
    pub version: Option<String>,
    /// Additional installer options; `BTreeMap` keeps ordering deterministic
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

impl UnitSpec {
    /// Create a spec with just a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            options: BTreeMap::new(),
        }
    }

    /// Set the version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Add an option.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }
}

/// A single install unit: stable id, normalized spec, dependencies, and
/// the action that performs the installation.
///
/// Immutable once scheduling begins; all mutable state lives in the
/// per-run status map.
#[derive(Clone)]
pub struct InstallUnit {
    /// Stable identifier, unique within a plan
    pub id: String,
    /// Normalized specification (cache key material)
    pub spec: UnitSpec,
    /// Ids of units that must reach a terminal state first
    pub depends_on: BTreeSet<String>,
    /// The runnable install action
    pub action: Arc<dyn InstallAction>,
}

impl InstallUnit {
    /// Create a unit with no dependencies.
    pub fn new(id: impl Into<String>, spec: UnitSpec, action: Arc<dyn InstallAction>) -> Self {
        Self {
            id: id.into(),
            spec,
            depends_on: BTreeSet::new(),
            action,
        }
    }

    /// Add a dependency on another unit id.
    pub fn with_dependency(mut self, id: impl Into<String>) -> Self {
        self.depends_on.insert(id.into());
        self
    }

    /// Add several dependencies.
    pub fn with_dependencies<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(ids.into_iter().map(Into::into));
        self
    }
}

impl std::fmt::Debug for InstallUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallUnit")
            .field("id", &self.id)
            .field("spec", &self.spec)
            .field("depends_on", &self.depends_on)
            .finish_non_exhaustive()
    }
}

/// Status of a unit during and after a run.
///
/// `Pending` and `Running` are transient; everything else is terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum UnitStatus {
    /// Not yet picked up by a worker
    Pending,
    /// A worker is executing the unit's action
    Running,
    /// Action completed successfully
    Succeeded,
    /// Action ran and failed (after any retries)
    Failed {
        /// Final error message
        error: String,
    },
    /// Cache hit; the action was never invoked
    SkippedCached,
    /// Never attempted because a dependency failed or was itself blocked
    Blocked {
        /// Id of the unit whose failure caused the block
        cause: String,
    },
}

impl UnitStatus {
    /// Whether this status is terminal (the unit will not run again).
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }

    /// Whether the unit ended without running its action successfully.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::Blocked { .. })
    }

    /// Short label for logs and reports.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed { .. } => "failed",
            Self::SkippedCached => "skipped-cached",
            Self::Blocked { .. } => "blocked",
        }
    }
}

/// Captured output of an install action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
}

impl From<std::process::Output> for CommandOutput {
    fn from(output: std::process::Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
        }
    }
}

/// Configuration for retry logic.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first)
    pub max_attempts: u32,
    /// Base delay between retries
    pub base_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_factor: f64,
    /// Maximum delay between retries
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(5),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(120),
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with custom settings.
    pub fn new(max_attempts: u32, base_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            max_attempts,
            base_delay,
            backoff_factor,
            max_delay: Duration::from_secs(120),
        }
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.base_delay.as_secs_f64() * self.backoff_factor.powi(attempt as i32);
        let capped = delay.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    /// Create a config that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }
}

/// Options for a scheduler run.
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Maximum number of units in flight within a wave
    pub concurrency_limit: usize,
    /// Stop scheduling new waves after a wave with failures
    pub fail_fast: bool,
    /// Consult and populate the installation cache
    pub use_cache: bool,
    /// Time-to-live for cache entries written by this run
    pub cache_ttl: Duration,
    /// Retry policy for transient action failures
    pub retry: RetryConfig,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            concurrency_limit: 4,
            fail_fast: false,
            use_cache: true,
            cache_ttl: Duration::from_secs(24 * 60 * 60),
            retry: RetryConfig::default(),
        }
    }
}

/// Overall result of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunOutcome {
    /// Every unit succeeded or was served from cache
    AllSucceeded,
    /// Some units failed or were blocked
    Partial,
    /// Cycle, or cancellation before any wave completed
    Aborted,
}

/// Terminal record for one unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitReport {
    /// Terminal (or, after cancellation, pending) status
    pub status: UnitStatus,
    /// Captured output, when the action ran or a cached result was reused
    pub output: Option<CommandOutput>,
    /// Wall-clock duration of the unit's handling, in seconds
    pub duration_secs: f64,
}

/// Final status map and outcome of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallReport {
    /// Per-unit terminal records, keyed by unit id
    pub units: BTreeMap<String, UnitReport>,
    /// Tri-state overall outcome
    pub outcome: RunOutcome,
    /// Number of waves that fully resolved
    pub waves_completed: usize,
    /// Total wall-clock time of the run, in seconds
    pub total_secs: f64,
}

impl InstallReport {
    /// Count units with the given status label.
    fn count(&self, label: &str) -> usize {
        self.units
            .values()
            .filter(|u| u.status.label() == label)
            .count()
    }

    pub fn succeeded(&self) -> usize {
        self.count("succeeded")
    }

    pub fn failed(&self) -> usize {
        self.count("failed")
    }

    pub fn blocked(&self) -> usize {
        self.count("blocked")
    }

    pub fn skipped_cached(&self) -> usize {
        self.count("skipped-cached")
    }

    /// Check if the run completed with no failures.
    pub fn is_success(&self) -> bool {
        self.outcome == RunOutcome::AllSucceeded
    }
}
