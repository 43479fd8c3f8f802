//! Progress indicators for the rigup CLI.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Bar tracking units through a run.
pub fn install_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::with_template("  {bar:30.cyan/dim} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    pb
}

/// Spinner for indeterminate work.
pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("  {spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// Finish a bar/spinner and clear it from the terminal.
pub fn finish_clear(pb: &ProgressBar) {
    pb.finish_and_clear();
}
