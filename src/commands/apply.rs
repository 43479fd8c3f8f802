//! Execute an install plan: resolve waves, consult the cache, run installs
//! in parallel, and report per-unit outcomes.

use anyhow::{Context as AnyhowContext, Result};
use colored::Colorize;
use indicatif::ProgressBar;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use schedkit::{
    GraphShape, InstallReport, InstallUnit, InstallationCache, MonitorSummary, Optimizer,
    ParallelInstaller, ProgressCallback, RunOutcome, UnitStatus, Wave, estimate_duration, resolve,
};

use crate::Context;
use crate::cli::ApplyArgs;
use crate::config::RigupConfig;
use crate::{plan, progress, ui};

/// Rough per-unit install time used for the upfront estimate.
const ESTIMATE_PER_UNIT: Duration = Duration::from_secs(10);

/// Progress callback driving the indicatif bar from worker threads.
struct BarProgress(ProgressBar);

impl ProgressCallback for BarProgress {
    fn on_unit_done(&self, unit_id: &str, status: &UnitStatus) {
        let symbol = match status {
            UnitStatus::Succeeded => "✓",
            UnitStatus::SkippedCached => "⊘",
            UnitStatus::Failed { .. } => "✗",
            _ => "·",
        };
        self.0.set_message(format!("{symbol} {unit_id}"));
        self.0.inc(1);
    }
}

pub fn run(ctx: &Context, args: ApplyArgs) -> Result<()> {
    let config = RigupConfig::load()?;
    let options = config.execute_options(
        args.max_parallel,
        args.fail_fast,
        args.no_cache,
        args.cache_ttl,
    );

    let plan_path = PathBuf::from(shellexpand::tilde(&args.plan).to_string());
    let units = plan::load(&plan_path)?;

    ui::header("Applying Install Plan");
    ui::dim(&format!("Using: {}", plan_path.display()));

    let waves = resolve(&units).context("Plan is not resolvable")?;
    let shape = GraphShape::of(&waves);

    print_waves(&waves, &shape);
    let estimate = estimate_duration(&waves, options.concurrency_limit, ESTIMATE_PER_UNIT);
    ui::dim(&format!(
        "Estimated up to {}s fresh install time at {} worker(s)",
        estimate.as_secs(),
        options.concurrency_limit
    ));

    if args.dry_run {
        print_planned_actions(&units, &waves);
        println!();
        ui::info("Dry run - no changes made");
        return Ok(());
    }

    if !args.yes && !confirm_proceed()? {
        println!();
        println!("  {} Aborted", "✗".red());
        return Ok(());
    }

    let cache = Arc::new(
        InstallationCache::open(config.cache_path()?).with_max_entries(config.cache_max_entries),
    );

    println!();
    println!(
        "  {} Installing {} unit(s) across {} wave(s)...",
        "→".cyan(),
        units.len(),
        waves.len()
    );

    let pb = progress::install_bar(units.len() as u64);
    let mut installer = ParallelInstaller::new(cache.clone(), options.clone())
        .with_progress(Box::new(BarProgress(pb.clone())));

    let report = installer.execute_waves(&units, &waves);
    progress::finish_clear(&pb);

    print_report(&report, ctx.verbose);

    if !ctx.quiet {
        let summary = installer.monitor().aggregate();
        print_performance(&summary);
        print_suggestions(&Optimizer::new(options.concurrency_limit).analyze(
            &summary,
            &cache.stats(),
            &shape,
            &report,
        ));
    }

    Ok(())
}

/// Show the resolved wave structure.
fn print_waves(waves: &[Wave], shape: &GraphShape) {
    println!();
    ui::kv("units", &shape.unit_count.to_string());
    ui::kv("waves", &shape.wave_count.to_string());
    ui::kv("widest wave", &shape.max_wave_width.to_string());
}

/// Dry-run detail: every action, grouped by wave.
fn print_planned_actions(units: &[InstallUnit], waves: &[Wave]) {
    for (index, wave) in waves.iter().enumerate() {
        println!();
        println!("  {} wave {}", "→".cyan(), index + 1);
        for id in wave {
            if let Some(unit) = units.iter().find(|u| &u.id == id) {
                println!("    {} {}", id.bold(), unit.action.describe().dimmed());
            }
        }
    }
}

/// Confirm with user
fn confirm_proceed() -> Result<bool> {
    use dialoguer::Confirm;

    let confirmed = Confirm::new()
        .with_prompt("Continue?")
        .default(true)
        .interact()?;

    Ok(confirmed)
}

/// Print the final status map and summary.
fn print_report(report: &InstallReport, verbose: u8) {
    println!();
    match report.outcome {
        RunOutcome::AllSucceeded => {
            println!("  {} Plan applied successfully!", "✓".green().bold());
        }
        RunOutcome::Partial => {
            println!("  {} Plan applied with errors", "⚠".yellow().bold());
        }
        RunOutcome::Aborted => {
            println!("  {} Run aborted", "✗".red().bold());
        }
    }

    if report.succeeded() > 0 {
        println!("    • {} installed", report.succeeded());
    }
    if report.skipped_cached() > 0 {
        println!("    • {} already done (cached)", report.skipped_cached());
    }
    if report.failed() > 0 {
        println!("    • {} {}", report.failed(), "failed".red());
    }
    if report.blocked() > 0 {
        println!("    • {} {}", report.blocked(), "blocked".yellow());
    }

    // Failed units with their reason, blocked units with their origin, so
    // "it broke" and "something before it broke" stay distinguishable
    for (id, unit) in &report.units {
        match &unit.status {
            UnitStatus::Failed { error } => {
                println!("    {} {}: {}", "✗".red(), id.bold(), error);
                if verbose > 0 {
                    if let Some(output) = &unit.output {
                        for line in output.stderr.lines() {
                            ui::dim(&format!("    {line}"));
                        }
                    }
                }
            }
            UnitStatus::Blocked { cause } => {
                println!(
                    "    {} {}: never attempted (blocked by {})",
                    "⊘".yellow(),
                    id.bold(),
                    cause
                );
            }
            UnitStatus::Pending => {
                println!("    {} {}: not started (cancelled)", "·".dimmed(), id);
            }
            _ => {}
        }
    }
}

/// Print aggregated timing and cache effectiveness.
fn print_performance(summary: &MonitorSummary) {
    if summary.total_units == 0 {
        return;
    }

    ui::section("Performance");
    for (label, stats) in &summary.operations {
        println!(
            "  {}: {} run(s), avg {:.1}s, median {:.1}s, p95 {:.1}s",
            label, stats.count, stats.mean_secs, stats.median_secs, stats.p95_secs
        );
    }
    ui::kv(
        "cache hit ratio",
        &format!("{:.0}%", summary.cache_hit_ratio * 100.0),
    );
    if summary.estimated_saved_secs > 0.0 {
        ui::kv(
            "estimated time saved",
            &format!("{:.0}s", summary.estimated_saved_secs),
        );
    }
}

fn print_suggestions(suggestions: &[String]) {
    if suggestions.is_empty() {
        return;
    }

    ui::section("Suggestions");
    for suggestion in suggestions {
        println!("  • {suggestion}");
    }
}
