//! `-v`/`-q` flags controlling how much `apiqueue` logs.
//!
//! Each flag moves one step along `off < error < warn < info < debug < trace`,
//! starting from `info`. `-v` shows every request that is sent or queued,
//! `-qqq` silences logging entirely, which keeps stderr clean for `--stats`.
//!
//! In a configuration file the level is given by name:
//!
//! ```toml
//! verbose = "debug"
//! ```

use std::fmt;

use log::LevelFilter;
use serde::Deserialize;

/// Levels reachable with the flags, least output first
const STEPS: [LevelFilter; 6] = [
    LevelFilter::Off,
    LevelFilter::Error,
    LevelFilter::Warn,
    LevelFilter::Info,
    LevelFilter::Debug,
    LevelFilter::Trace,
];

/// Position of the default level in [`STEPS`]
const DEFAULT_STEP: usize = 3;

#[derive(clap::Args, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Verbosity {
    /// Log more: `-v` for every request sent and queued, `-vv` for everything
    #[arg(
        long,
        short = 'v',
        action = clap::ArgAction::Count,
        global = true,
        conflicts_with = "quiet"
    )]
    verbose: u8,

    /// Log less: `-q` for warnings, `-qq` for errors, `-qqq` for nothing
    #[arg(
        long,
        short = 'q',
        action = clap::ArgAction::Count,
        global = true,
        conflicts_with = "verbose"
    )]
    quiet: u8,
}

impl Verbosity {
    /// Level filter selected by the flags
    pub(crate) fn log_level_filter(self) -> LevelFilter {
        let step = (DEFAULT_STEP + usize::from(self.verbose))
            .saturating_sub(usize::from(self.quiet))
            .min(STEPS.len() - 1);
        STEPS[step]
    }

    /// Flags that select `level`
    // Both differences are at most the number of steps
    #[allow(clippy::cast_possible_truncation)]
    fn from_level_filter(level: LevelFilter) -> Self {
        let step = STEPS
            .iter()
            .position(|candidate| *candidate == level)
            .unwrap_or(DEFAULT_STEP);
        Self {
            verbose: step.saturating_sub(DEFAULT_STEP) as u8,
            quiet: DEFAULT_STEP.saturating_sub(step) as u8,
        }
    }
}

impl<'de> Deserialize<'de> for Verbosity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let name = String::deserialize(deserializer)?;
        name.parse::<LevelFilter>()
            .map(Self::from_level_filter)
            .map_err(|_| serde::de::Error::custom(format!("invalid log level `{name}`")))
    }
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.log_level_filter().as_str().to_lowercase())
    }
}
