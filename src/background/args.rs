use std::{path::PathBuf, time::Duration};

use clap::Parser;
use tracing::level_filters::LevelFilter;

/// Longest accepted rollover check interval, one week in minutes.
pub const MAX_CHECK_INTERVAL: u64 = 7 * 24 * 60;

/// Native messaging host. Meant to be started by the browser, not by hand.
#[derive(Parser)]
pub struct HostArgs {
    #[arg(long)]
    pub dir: Option<PathBuf>,
    /// Minutes between month rollover checks.
    #[arg(
        long = "check-interval",
        default_value_t = 60,
        value_parser = clap::value_parser!(u64).range(1..=MAX_CHECK_INTERVAL)
    )]
    pub check_interval: u64,
    /// This option is for debugging purposes only. Logs go to stderr, stdout belongs to the browser.
    #[arg(long = "log-console")]
    pub log_console: bool,
    #[arg(long = "log-filter")]
    pub log: Option<LevelFilter>,
    /// Passed by Chrome on Windows.
    #[arg(long = "parent-window", hide = true)]
    pub parent_window: Option<i64>,
    /// Extension origin or manifest path, depending on the browser.
    #[arg(hide = true)]
    pub browser_args: Vec<String>,
}

impl HostArgs {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval * 60)
    }
}
