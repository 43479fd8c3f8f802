use clap::{Parser, Subcommand};
use clap_complete::Shell;

#[derive(Parser)]
#[command(name = "rigup")]
#[command(version)]
#[command(about = "Provision a dev workstation from a declarative install plan", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Execute an install plan
    Apply(ApplyArgs),

    /// Resolve a plan into waves without executing anything
    Plan(PlanArgs),

    /// Manage the installation cache
    #[command(subcommand)]
    Cache(CacheCommand),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Parser)]
pub struct ApplyArgs {
    /// Path to the plan file (TOML)
    pub plan: String,

    /// Maximum number of parallel installs within a wave
    #[arg(long, value_name = "N")]
    pub max_parallel: Option<usize>,

    /// Stop scheduling new waves after a wave with failures
    #[arg(long)]
    pub fail_fast: bool,

    /// Resolve waves and show planned actions without executing
    #[arg(long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Ignore the installation cache for this run
    #[arg(long)]
    pub no_cache: bool,

    /// Time-to-live for cache entries written by this run, in hours
    #[arg(long, value_name = "HOURS")]
    pub cache_ttl: Option<u64>,
}

#[derive(Parser)]
pub struct PlanArgs {
    /// Path to the plan file (TOML)
    pub plan: String,

    /// Parallelism assumed for the duration estimate
    #[arg(long, value_name = "N")]
    pub max_parallel: Option<usize>,
}

#[derive(Subcommand)]
pub enum CacheCommand {
    /// Show cache statistics
    Stats,

    /// Remove all cache entries
    Clear,
}
