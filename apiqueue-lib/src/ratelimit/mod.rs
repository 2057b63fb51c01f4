//! Quota-aware request scheduling.
//!
//! The server grants a fixed number of requests per time window. This
//! module keeps track of that budget on the client side, parks requests that
//! don't fit into the current window and hands them back out in order once
//! the window resets.
//!
//! # Architecture
//!
//! - [`QuotaTracker`]: remaining requests and the instant the window resets
//! - [`PendingQueue`]: FIFO of requests waiting for quota, each carrying the
//!   completion handle of its original caller
//! - [`Scheduler`]: both of the above behind one lock, plus the time-injected
//!   drain logic ([`Scheduler::drain_step`])
//! - [`RateLimitConfig`]: per-client limits, (de)serializable for config files
//! - [`ClientStats`]: request statistics for observability
//!
//! The drain task that wakes up when the quota resets lives in the client;
//! everything in here is synchronous and takes the current time as an
//! argument, so it can be tested without real timers.

mod config;
mod headers;
mod queue;
mod quota;
mod scheduler;
mod stats;
mod window;

pub use config::RateLimitConfig;
pub use headers::{FeedbackParseError, QuotaFeedback, parse_quota_feedback};
pub(crate) use headers::parse_retry_after;
pub use queue::{PendingQueue, PendingRequest};
pub use quota::{MAX_RETRY_DELAY, MIN_RETRY_DELAY, QuotaSnapshot, QuotaTracker};
pub use scheduler::{Admission, DrainStep, Scheduler};
pub use stats::ClientStats;
pub use window::Window;
