pub(crate) mod body;
pub(crate) mod log;
pub(crate) mod stats;

use self::{body::BodyFormatter, stats::StatsFormatter};
use crate::options::{OutputFormat, StatsFormat};

/// Create a body formatter based on the given format option
pub(crate) fn get_body_formatter(format: &OutputFormat) -> Box<dyn BodyFormatter> {
    match format {
        OutputFormat::Raw => Box::new(body::Raw),
        OutputFormat::Compact => Box::new(body::Compact),
        OutputFormat::Pretty => Box::new(body::Pretty),
    }
}

pub(crate) fn get_stats_formatter(format: &StatsFormat) -> Box<dyn StatsFormatter> {
    match format {
        StatsFormat::Compact => Box::new(stats::Compact),
        StatsFormat::Json => Box::new(stats::Json),
    }
}
