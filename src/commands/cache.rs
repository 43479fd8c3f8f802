//! Inspect and clear the installation cache.

use anyhow::Result;

use schedkit::InstallationCache;

use crate::Context;
use crate::cli::CacheCommand;
use crate::config::RigupConfig;
use crate::ui;

pub fn run(_ctx: &Context, cmd: CacheCommand) -> Result<()> {
    let config = RigupConfig::load()?;
    let cache = InstallationCache::open(config.cache_path()?);

    match cmd {
        CacheCommand::Stats => stats(&cache),
        CacheCommand::Clear => clear(&cache),
    }
}

fn stats(cache: &InstallationCache) -> Result<()> {
    let stats = cache.stats();

    ui::header("Installation Cache");
    ui::kv("location", &cache.dir().display().to_string());
    ui::kv("entries", &stats.entries.to_string());
    ui::kv("size", &ui::format_size(stats.size_bytes));

    Ok(())
}

fn clear(cache: &InstallationCache) -> Result<()> {
    let removed = cache.clear()?;

    if removed == 0 {
        ui::info("Cache is already empty");
    } else {
        ui::success(&format!("Removed {removed} cache entries"));
    }

    Ok(())
}
