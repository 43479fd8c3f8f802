//! # schedkit
//!
//! Cached, dependency-ordered, bounded-parallel execution of install plans.
//!
//! This crate takes a batch of install units with declared dependencies and
//! decides what to (re)install, in what order, and with how much
//! concurrency - while safely skipping work a previous run already did.
//!
//! ## Core Concepts
//!
//! - **InstallUnit**: one installable item with a normalized spec, a
//!   dependency set, and a runnable [`InstallAction`]
//! - **Wave**: a batch of units with no unresolved dependencies among them,
//!   eligible for concurrent execution
//! - **InstallationCache**: on-disk store of previous outcomes, keyed by a
//!   deterministic [`Fingerprint`] of the spec, with TTL expiration
//! - **ParallelInstaller**: executes waves on a bounded worker pool and
//!   classifies every unit into exactly one terminal status
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use schedkit::{
//!     CommandAction, ExecuteOptions, InstallUnit, InstallationCache,
//!     ParallelInstaller, UnitSpec,
//! };
//!
//! let git = InstallUnit::new(
//!     "git",
//!     UnitSpec::new("git"),
//!     Arc::new(CommandAction::new("apt-get", vec!["install".into(), "-y".into(), "git".into()])),
//! );
//! let tig = InstallUnit::new(
//!     "tig",
//!     UnitSpec::new("tig"),
//!     Arc::new(CommandAction::new("apt-get", vec!["install".into(), "-y".into(), "tig".into()])),
//! )
//! .with_dependency("git");
//!
//! let cache = Arc::new(InstallationCache::open("/tmp/rig-cache"));
//! let mut installer = ParallelInstaller::new(cache, ExecuteOptions::default());
//! let report = installer.run(&[git, tig])?;
//! println!("{} succeeded", report.succeeded());
//! ```
//!
//! ## Guarantees
//!
//! - No unit runs before all of its dependencies reach a terminal state
//! - A failed or blocked dependency blocks all transitive dependents;
//!   their actions are never invoked
//! - At most `concurrency_limit` units are in flight at any instant
//! - Expired cache entries are never used to skip work
//! - Per-unit failures stay in the status map; only a dependency cycle
//!   aborts a run before execution

pub mod action;
pub mod cache;
pub mod error;
pub mod fingerprint;
pub mod graph;
pub mod installer;
pub mod monitor;
pub mod optimizer;
pub mod retry;
pub mod types;

// Re-export main types at crate root
pub use action::{CommandAction, InstallAction};
pub use cache::{CacheStats, CachedResult, InstallationCache};
pub use error::{Error, ErrorCategory, Result};
pub use fingerprint::Fingerprint;
pub use graph::{GraphShape, Wave, estimate_duration, resolve};
pub use installer::{CancelToken, NoProgress, ParallelInstaller, ProgressCallback};
pub use monitor::{MetricSample, MonitorSummary, OperationStats, PerformanceMonitor, SampleOutcome};
pub use optimizer::Optimizer;
pub use retry::with_retry;
pub use types::{
    CommandOutput, ExecuteOptions, InstallReport, InstallUnit, RetryConfig, RunOutcome,
    UnitReport, UnitSpec, UnitStatus,
};
