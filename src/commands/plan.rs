//! Resolve a plan into waves and show what `apply` would do, without
//! touching the cache or running any actions.

use anyhow::{Context as AnyhowContext, Result};
use colored::Colorize;
use std::path::PathBuf;
use std::time::Duration;

use schedkit::{GraphShape, estimate_duration, resolve};

use crate::Context;
use crate::cli::PlanArgs;
use crate::config::RigupConfig;
use crate::{plan, ui};

const ESTIMATE_PER_UNIT: Duration = Duration::from_secs(10);

pub fn run(_ctx: &Context, args: PlanArgs) -> Result<()> {
    let config = RigupConfig::load()?;
    let limit = args.max_parallel.unwrap_or(config.max_parallel).max(1);

    let plan_path = PathBuf::from(shellexpand::tilde(&args.plan).to_string());
    let units = plan::load(&plan_path)?;

    ui::header("Install Plan");
    ui::dim(&format!("Using: {}", plan_path.display()));

    let waves = resolve(&units).context("Plan is not resolvable")?;
    let shape = GraphShape::of(&waves);

    println!();
    ui::kv("units", &shape.unit_count.to_string());
    ui::kv("waves", &shape.wave_count.to_string());
    ui::kv("widest wave", &shape.max_wave_width.to_string());

    for (index, wave) in waves.iter().enumerate() {
        println!();
        println!("  {} wave {}", "→".cyan(), index + 1);
        for id in wave {
            if let Some(unit) = units.iter().find(|u| &u.id == id) {
                println!("    {} {}", id.bold(), unit.action.describe().dimmed());
            }
        }
    }

    let estimate = estimate_duration(&waves, limit, ESTIMATE_PER_UNIT);
    println!();
    ui::dim(&format!(
        "Estimated up to {}s fresh install time at {} worker(s)",
        estimate.as_secs(),
        limit
    ));

    Ok(())
}
