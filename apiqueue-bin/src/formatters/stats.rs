use anyhow::{Context, Result};
use apiqueue_lib::ratelimit::ClientStats;

pub(crate) trait StatsFormatter {
    /// Format the request statistics of a run
    fn format(&self, stats: &ClientStats) -> Result<String>;
}

/// Single summary line
pub(crate) struct Compact;

impl StatsFormatter for Compact {
    fn format(&self, stats: &ClientStats) -> Result<String> {
        Ok(format!("📊 {}", stats.summary()))
    }
}

pub(crate) struct Json;

impl StatsFormatter for Json {
    /// Format stats as JSON object
    fn format(&self, stats: &ClientStats) -> Result<String> {
        serde_json::to_string_pretty(stats).context("Cannot format stats as JSON")
    }
}
