use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{ErrorKind, Result};

/// Default number of requests per quota window
const DEFAULT_LIMIT_CEILING: usize = 40;

/// Default length of a quota window
const DEFAULT_WINDOW: Duration = Duration::from_secs(10);

/// Rate limiting configuration of a client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Track the quota on the client side and queue requests that exceed it.
    /// When `false`, every request is sent immediately (pass-through mode).
    #[serde(default = "default_use_default_limits")]
    pub use_default_limits: bool,

    /// Maximum number of requests per window
    #[serde(default = "default_limit_ceiling")]
    pub limit_ceiling: usize,

    /// Length of a quota window
    #[serde(default = "default_window", with = "humantime_serde")]
    pub window: Duration,

    /// Maximum time a request may wait in the pending queue.
    /// Requests waiting longer fail with [`ErrorKind::QueueTimeout`].
    /// `None` lets requests wait until the quota recovers.
    #[serde(default, with = "humantime_serde")]
    pub max_queue_wait: Option<Duration>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            use_default_limits: default_use_default_limits(),
            limit_ceiling: default_limit_ceiling(),
            window: default_window(),
            max_queue_wait: None,
        }
    }
}

const fn default_use_default_limits() -> bool {
    true
}

const fn default_limit_ceiling() -> usize {
    DEFAULT_LIMIT_CEILING
}

const fn default_window() -> Duration {
    DEFAULT_WINDOW
}

impl RateLimitConfig {
    /// Create a `RateLimitConfig` from CLI options, using defaults for missing values
    #[must_use]
    pub fn from_options(
        use_default_limits: bool,
        limit_ceiling: Option<usize>,
        window: Option<Duration>,
        max_queue_wait: Option<Duration>,
    ) -> Self {
        Self {
            use_default_limits,
            limit_ceiling: limit_ceiling.unwrap_or(DEFAULT_LIMIT_CEILING),
            window: window.unwrap_or(DEFAULT_WINDOW),
            max_queue_wait,
        }
    }

    /// A configuration that disables client-side rate limiting
    #[must_use]
    pub fn pass_through() -> Self {
        Self {
            use_default_limits: false,
            ..Self::default()
        }
    }

    /// Check that the limits can be enforced
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidRateLimitConfig`] for a zero ceiling or a
    /// zero-length window while rate limiting is enabled.
    pub fn validate(&self) -> Result<()> {
        if !self.use_default_limits {
            return Ok(());
        }
        if self.limit_ceiling == 0 {
            return Err(ErrorKind::InvalidRateLimitConfig(
                "limit ceiling must be at least 1".into(),
            ));
        }
        if self.window.is_zero() {
            return Err(ErrorKind::InvalidRateLimitConfig(
                "window must not be zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rate_limit_config() {
        let config = RateLimitConfig::default();
        assert!(config.use_default_limits);
        assert_eq!(config.limit_ceiling, 40);
        assert_eq!(config.window, Duration::from_secs(10));
        assert_eq!(config.max_queue_wait, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_options() {
        let config = RateLimitConfig::from_options(true, Some(2), None, Some(Duration::from_secs(60)));
        assert_eq!(config.limit_ceiling, 2);
        assert_eq!(config.window, Duration::from_secs(10));
        assert_eq!(config.max_queue_wait, Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_validate() {
        let config = RateLimitConfig {
            limit_ceiling: 0,
            ..RateLimitConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ErrorKind::InvalidRateLimitConfig(_))
        ));

        let config = RateLimitConfig {
            window: Duration::ZERO,
            ..RateLimitConfig::default()
        };
        assert!(config.validate().is_err());

        // Limits are not enforced in pass-through mode
        let config = RateLimitConfig {
            limit_ceiling: 0,
            ..RateLimitConfig::pass_through()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = RateLimitConfig {
            use_default_limits: true,
            limit_ceiling: 15,
            window: Duration::from_millis(1500),
            max_queue_wait: Some(Duration::from_secs(30)),
        };

        let toml = toml::to_string(&config).unwrap();
        let deserialized: RateLimitConfig = toml::from_str(&toml).unwrap();

        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_config_from_partial_toml() {
        let config: RateLimitConfig = toml::from_str(
            r#"
            limit_ceiling = 5
            window = "2s"
            "#,
        )
        .unwrap();
        assert!(config.use_default_limits);
        assert_eq!(config.limit_ceiling, 5);
        assert_eq!(config.window, Duration::from_secs(2));
        assert_eq!(config.max_queue_wait, None);

        let result: std::result::Result<RateLimitConfig, _> = toml::from_str("burst = 3");
        assert!(result.is_err());
    }
}
