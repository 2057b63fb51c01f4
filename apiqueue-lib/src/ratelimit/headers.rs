//! Handle rate limiting headers.
//!
//! Servers report their view of the quota through `X-RateLimit-*` style
//! headers and ask clients to back off with `Retry-After`. Neither is fully
//! standardised yet, see the
//! [IETF draft](https://datatracker.ietf.org/doc/draft-ietf-httpapi-ratelimit-headers/).

use http::{HeaderMap, HeaderValue};
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

const REMAINING_HEADERS: &[&str] = &[
    "x-ratelimit-remaining",
    "x-rate-limit-remaining",
    "ratelimit-remaining",
];

const RESET_HEADERS: &[&str] = &["x-ratelimit-reset", "x-rate-limit-reset", "ratelimit-reset"];

/// Reset values up to this many seconds are relative delays (as in the IETF
/// draft), larger values are Unix timestamps
const MAX_RELATIVE_RESET_SECS: u64 = 365 * 24 * 60 * 60;

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum RetryAfterParseError {
    #[error("Unable to parse value '{0}'")]
    ValueError(String),

    #[error("Header value contains invalid chars")]
    HeaderValueError,
}

/// Quota headers were present but could not be understood
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum FeedbackParseError {
    /// The header value is not visible ASCII
    #[error("Header `{0}` contains invalid chars")]
    HeaderValue(&'static str),

    /// The header value is not a non-negative integer, or a reset lies
    /// implausibly far in the future
    #[error("Unable to parse value '{value}' of header `{name}`")]
    Value {
        /// Header name
        name: &'static str,
        /// Raw header value
        value: String,
    },
}

/// Authoritative quota information reported by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QuotaFeedback {
    /// Requests left in the current window
    pub remaining: Option<usize>,
    /// Time until the window resets, relative to when the response was parsed
    pub reset_after: Option<Duration>,
}

/// Parse the "Retry-After" header as specified per
/// [RFC 7231 section 7.1.3](https://www.rfc-editor.org/rfc/rfc7231#section-7.1.3)
pub(crate) fn parse_retry_after(value: &HeaderValue) -> Result<Duration, RetryAfterParseError> {
    let value = value
        .to_str()
        .map_err(|_| RetryAfterParseError::HeaderValueError)?
        .trim();

    // RFC 7231: Retry-After = HTTP-date / delay-seconds
    value.parse::<u64>().map(Duration::from_secs).or_else(|_| {
        httpdate::parse_http_date(value)
            .map(|s| {
                s.duration_since(SystemTime::now())
                    // if date is in the past, we can use ZERO
                    .unwrap_or(Duration::ZERO)
            })
            .map_err(|_| RetryAfterParseError::ValueError(value.into()))
    })
}

/// Parse the quota headers of a response.
///
/// Returns `Ok(None)` if the response carries no quota headers at all.
/// Reset values are accepted both as seconds from now and as Unix
/// timestamps; `now` is the wall-clock time used for the latter.
///
/// # Errors
///
/// Returns a [`FeedbackParseError`] if any quota header is present but
/// malformed. Partial feedback is never returned in that case.
pub fn parse_quota_feedback(
    headers: &HeaderMap,
    now: SystemTime,
) -> Result<Option<QuotaFeedback>, FeedbackParseError> {
    let remaining = parse_header_value::<usize>(headers, REMAINING_HEADERS)?;
    let reset = parse_header_value::<u64>(headers, RESET_HEADERS)?;

    if remaining.is_none() && reset.is_none() {
        return Ok(None);
    }

    let reset_after = reset
        .map(|(name, secs)| {
            reset_delay(secs, now).ok_or_else(|| FeedbackParseError::Value {
                name,
                value: secs.to_string(),
            })
        })
        .transpose()?;

    Ok(Some(QuotaFeedback {
        remaining: remaining.map(|(_, remaining)| remaining),
        reset_after,
    }))
}

/// Time until a reset given in seconds, either relative or as Unix timestamp.
/// `None` if the reset lies further out than [`MAX_RELATIVE_RESET_SECS`].
fn reset_delay(secs: u64, now: SystemTime) -> Option<Duration> {
    let max = Duration::from_secs(MAX_RELATIVE_RESET_SECS);
    if secs <= MAX_RELATIVE_RESET_SECS {
        return Some(Duration::from_secs(secs));
    }
    let reset_after = UNIX_EPOCH
        .checked_add(Duration::from_secs(secs))?
        .duration_since(now)
        .unwrap_or(Duration::ZERO);
    (reset_after <= max).then_some(reset_after)
}

/// Parse the first of the given headers that is present, along with its name
fn parse_header_value<T: FromStr>(
    headers: &HeaderMap,
    header_names: &[&'static str],
) -> Result<Option<(&'static str, T)>, FeedbackParseError> {
    for &name in header_names {
        if let Some(value) = headers.get(name) {
            let value = value
                .to_str()
                .map_err(|_| FeedbackParseError::HeaderValue(name))?
                .trim();
            return value
                .parse::<T>()
                .map(|parsed| Some((name, parsed)))
                .map_err(|_| FeedbackParseError::Value {
                    name,
                    value: value.to_string(),
                });
        }
    }
    Ok(None)
}
