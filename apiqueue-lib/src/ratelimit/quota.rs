use std::time::{Duration, Instant};

use super::QuotaFeedback;

/// Minimum pause after the server rejected a request for exceeding the quota
pub const MIN_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Longer `Retry-After` delays are capped to this
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(3600);

/// Point-in-time view of a [`QuotaTracker`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaSnapshot {
    /// Requests left in the current window
    pub remaining: usize,
    /// Configured number of requests per window
    pub ceiling: usize,
    /// Instant at which the current window resets, if a window has started
    pub reset_at: Option<Instant>,
}

/// Client-side bookkeeping of the request budget.
///
/// `remaining` only goes down on admission. It is restored to the ceiling
/// when the window rolls over, or overwritten by what the server reports.
/// All methods take the current instant as an argument.
#[derive(Debug, Clone)]
pub struct QuotaTracker {
    remaining: usize,
    reset_at: Option<Instant>,
    /// `reset_at` was reported by the server rather than opened locally
    server_reset: bool,
    ceiling: usize,
    window: Duration,
}

impl QuotaTracker {
    /// Create a tracker with a full budget. The first window starts with the
    /// first call to [`QuotaTracker::on_window_elapsed`].
    #[must_use]
    pub const fn new(ceiling: usize, window: Duration) -> Self {
        Self {
            remaining: ceiling,
            reset_at: None,
            server_reset: false,
            ceiling,
            window,
        }
    }

    /// Take one request from the budget.
    /// Returns `false` and changes nothing if the budget is used up.
    pub const fn try_admit(&mut self) -> bool {
        if self.remaining > 0 {
            self.remaining -= 1;
            true
        } else {
            false
        }
    }

    /// Start a new window if the current one is over (or none was started
    /// yet). Returns `true` if the budget was refilled.
    pub fn on_window_elapsed(&mut self, now: Instant) -> bool {
        match self.reset_at {
            Some(reset_at) if now < reset_at => false,
            _ => {
                self.remaining = self.ceiling;
                self.reset_at = now.checked_add(self.window);
                self.server_reset = false;
                true
            }
        }
    }

    /// Adopt the quota reported by the server.
    /// Values missing from the feedback are left as they are, and so is a
    /// reset too far out to be represented.
    pub fn on_server_feedback(&mut self, feedback: QuotaFeedback, now: Instant) {
        if let Some(remaining) = feedback.remaining {
            self.remaining = remaining;
        }
        if let Some(reset_at) = feedback
            .reset_after
            .and_then(|reset_after| now.checked_add(reset_after))
        {
            self.reset_at = Some(reset_at);
            self.server_reset = true;
        }
    }

    /// The server rejected a request because the quota is exhausted.
    ///
    /// The budget drops to zero. A pending reset reported by the server is
    /// kept as it is. Otherwise the reset moves to `now + retry_after`
    /// (at least [`MIN_RETRY_DELAY`], at most [`MAX_RETRY_DELAY`]) unless the
    /// local window ends even later.
    pub fn on_rate_limit_rejection(&mut self, retry_after: Option<Duration>, now: Instant) {
        self.remaining = 0;
        let pending = self.reset_at.filter(|reset_at| *reset_at > now);
        if self.server_reset && pending.is_some() {
            return;
        }

        let delay = retry_after
            .unwrap_or_default()
            .clamp(MIN_RETRY_DELAY, MAX_RETRY_DELAY);
        let retry_at = now.checked_add(delay);
        self.reset_at = match (pending, retry_at) {
            (Some(pending), Some(retry_at)) => Some(pending.max(retry_at)),
            (pending, retry_at) => retry_at.or(pending),
        };
        self.server_reset = true;
    }

    /// Time left until the window resets; zero if it already has
    #[must_use]
    pub fn delay_until_reset(&self, now: Instant) -> Duration {
        self.reset_at
            .map(|reset_at| reset_at.saturating_duration_since(now))
            .unwrap_or_default()
    }

    /// Requests left in the current window
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.remaining
    }

    /// Instant at which the current window resets
    #[must_use]
    pub const fn reset_at(&self) -> Option<Instant> {
        self.reset_at
    }

    /// Length of a window
    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    /// Current state for observability
    #[must_use]
    pub const fn snapshot(&self) -> QuotaSnapshot {
        QuotaSnapshot {
            remaining: self.remaining,
            ceiling: self.ceiling,
            reset_at: self.reset_at,
        }
    }
}
