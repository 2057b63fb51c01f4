use http::StatusCode;
use serde::{Serialize, Serializer};
use std::time::Duration;
use thiserror::Error;

use crate::ratelimit::FeedbackParseError;

/// Possible errors when talking to an API through `apiqueue_lib`
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The endpoint template and the parameter bag don't fit together,
    /// e.g. a scalar parameter for a template with several placeholders.
    #[error("Invalid parameters for endpoint `{template}`: {reason}")]
    InvalidParameters {
        /// The endpoint template as written by the caller
        template: String,
        /// What exactly did not match
        reason: String,
    },

    /// The server rejected the request with `429 Too Many Requests`.
    ///
    /// With rate limiting enabled this never reaches the caller, because
    /// rejected requests are queued and retried. It is only returned by
    /// clients running in pass-through mode.
    #[error("Rate limit exceeded{}", match .retry_after {
        Some(d) => format!(", retry after {}ms", d.as_millis()),
        None => String::new(),
    })]
    RateLimited {
        /// The delay requested by the server, if any
        retry_after: Option<Duration>,
    },

    /// Reqwest network error
    #[error("Network error while sending request: {0}")]
    NetworkRequest(#[source] reqwest::Error),

    /// Failure reported by a custom [`crate::Transport`]
    #[error("Transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The server answered with a non-success status code
    #[error("Server rejected the request with status {status}")]
    RejectedStatusCode {
        /// The HTTP status code returned by the server
        status: StatusCode,
        /// The response body, useful for API error messages
        body: String,
    },

    /// Cannot read the body of the received response
    #[error("Error reading response body: {0}")]
    ReadResponseBody(#[source] reqwest::Error),

    /// The response body is not the expected JSON document
    #[error("Cannot deserialize response body: {0}")]
    InvalidResponseBody(#[source] serde_json::Error),

    /// Quota headers were present but could not be parsed.
    /// The quota state is left untouched when this happens.
    #[error("Malformed rate limit headers: {0}")]
    MalformedServerFeedback(#[from] FeedbackParseError),

    /// The request waited in the pending queue for longer than the
    /// configured maximum
    #[error("Request was queued for {}ms without being admitted", .0.as_millis())]
    QueueTimeout(Duration),

    /// The client was shut down before the request could be sent
    #[error("Client was shut down before the request completed")]
    ClientShutdown,

    /// The base URL or the URL derived from a template is invalid
    #[error("Invalid URL `{0}`: {1}")]
    InvalidUrl(String, #[source] url::ParseError),

    /// The rate limit configuration cannot be used
    #[error("Invalid rate limit configuration: {0}")]
    InvalidRateLimitConfig(String),

    /// The given header could not be parsed.
    /// A possible error when converting a `HeaderValue` from a string or byte
    /// slice.
    #[error("Header could not be parsed.")]
    InvalidHeader(#[from] http::header::InvalidHeaderValue),

    /// The request client cannot be built
    #[error("Error creating request client: {0}")]
    BuildRequestClient(#[source] reqwest::Error),
}

impl ErrorKind {
    /// Return the underlying `reqwest` error, if any
    #[must_use]
    pub const fn reqwest_error(&self) -> Option<&reqwest::Error> {
        match self {
            Self::NetworkRequest(e) | Self::ReadResponseBody(e) | Self::BuildRequestClient(e) => {
                Some(e)
            }
            _ => None,
        }
    }

    /// The HTTP status code behind this error, if the server answered at all
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::RejectedStatusCode { status, .. } => Some(*status),
            Self::RateLimited { .. } => Some(StatusCode::TOO_MANY_REQUESTS),
            Self::NetworkRequest(e) => e.status(),
            _ => None,
        }
    }

    /// Shorthand for building an [`ErrorKind::InvalidParameters`]
    pub(crate) fn invalid_parameters(template: &str, reason: impl Into<String>) -> Self {
        Self::InvalidParameters {
            template: template.to_string(),
            reason: reason.into(),
        }
    }
}

impl Serialize for ErrorKind {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for ErrorKind {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        // The completion handle was dropped without an answer
        Self::ClientShutdown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_message() {
        let err = ErrorKind::RateLimited {
            retry_after: Some(Duration::from_secs(2)),
        };
        assert_eq!(err.to_string(), "Rate limit exceeded, retry after 2000ms");
        assert_eq!(err.status(), Some(StatusCode::TOO_MANY_REQUESTS));

        let err = ErrorKind::RateLimited { retry_after: None };
        assert_eq!(err.to_string(), "Rate limit exceeded");
    }

    #[test]
    fn test_rejected_status_code() {
        let err = ErrorKind::RejectedStatusCode {
            status: StatusCode::NOT_FOUND,
            body: r#"{"status_code":34}"#.into(),
        };
        assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
        assert!(err.reqwest_error().is_none());
    }

    #[test]
    fn test_serialize_as_message() {
        let err = ErrorKind::invalid_parameters("movie/:id/:kind", "nope");
        assert_eq!(
            serde_json::to_string(&err).unwrap(),
            r#""Invalid parameters for endpoint `movie/:id/:kind`: nope""#
        );
    }
}
