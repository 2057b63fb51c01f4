use std::collections::HashMap;
use std::time::Duration;

use http::StatusCode;
use serde::Serialize;
use serde::ser::SerializeStruct;

use super::Window;

/// Request statistics of a [`crate::Client`]
#[derive(Debug, Clone, Default)]
pub struct ClientStats {
    /// Number of responses received, whatever their status
    pub total_requests: u64,
    /// Number of successful responses (2xx status)
    pub successful_requests: u64,
    /// Number of `429 Too Many Requests` responses
    pub rate_limited: u64,
    /// Number of client error responses (4xx, excluding 429)
    pub client_errors: u64,
    /// Number of server error responses (5xx)
    pub server_errors: u64,
    /// Number of requests that never got a response
    pub transport_errors: u64,
    /// Number of times a request was parked in the pending queue,
    /// including requeues after a 429
    pub queued: u64,
    /// Number of requests that gave up waiting in the queue
    pub expired: u64,
    /// Number of responses with unparsable quota headers
    pub malformed_feedback: u64,
    /// Durations of the most recent requests
    pub request_times: Window<Duration>,
    /// Status code counts
    pub status_codes: HashMap<u16, u64>,
}

impl ClientStats {
    /// Record a response with its status code and request duration
    pub fn record_response(&mut self, status: StatusCode, request_time: Duration) {
        self.total_requests += 1;
        *self.status_codes.entry(status.as_u16()).or_insert(0) += 1;

        match status.as_u16() {
            200..=299 => self.successful_requests += 1,
            429 => self.rate_limited += 1,
            400..=499 => self.client_errors += 1,
            500..=599 => self.server_errors += 1,
            _ => {}
        }

        self.request_times.push(request_time);
    }

    /// Record a request that never got a response
    pub const fn record_transport_error(&mut self) {
        self.transport_errors += 1;
    }

    /// Record a request parked in the pending queue
    pub const fn record_queued(&mut self) {
        self.queued += 1;
    }

    /// Record `count` requests that gave up waiting
    pub const fn record_expired(&mut self, count: u64) {
        self.expired += count;
    }

    /// Record a response whose quota headers could not be parsed
    pub const fn record_malformed_feedback(&mut self) {
        self.malformed_feedback += 1;
    }

    /// Get median request time
    #[must_use]
    pub fn median_request_time(&self) -> Option<Duration> {
        let times = self.request_times.sorted();
        if times.is_empty() {
            return None;
        }

        let mid = times.len() / 2;
        if times.len().is_multiple_of(2) {
            Some((times[mid - 1] + times[mid]) / 2)
        } else {
            Some(times[mid])
        }
    }

    /// Get error rate (percentage)
    #[must_use]
    pub fn error_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        let errors = self.rate_limited + self.client_errors + self.server_errors;
        #[allow(clippy::cast_precision_loss)]
        let error_rate = errors as f64 / self.total_requests as f64;
        error_rate * 100.0
    }

    /// Get the current success rate (0.0 to 1.0)
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            1.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            let success_rate = self.successful_requests as f64 / self.total_requests as f64;
            success_rate
        }
    }

    /// Human-readable one-line summary
    #[must_use]
    pub fn summary(&self) -> String {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let success_pct = (self.success_rate() * 100.0) as u64;

        let median = self
            .median_request_time()
            .map_or_else(|| "N/A".to_string(), |d| format!("{}ms", d.as_millis()));

        format!(
            "{} requests ({}% success, {} rate limited, {} queued, {} expired), median: {}",
            self.total_requests, success_pct, self.rate_limited, self.queued, self.expired, median
        )
    }
}

impl Serialize for ClientStats {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let median_request_time_ms = self.median_request_time().map(|d| d.as_millis());

        let mut s = serializer.serialize_struct("ClientStats", 12)?;
        s.serialize_field("total_requests", &self.total_requests)?;
        s.serialize_field("successful_requests", &self.successful_requests)?;
        s.serialize_field("success_rate", &self.success_rate())?;
        s.serialize_field("rate_limited", &self.rate_limited)?;
        s.serialize_field("client_errors", &self.client_errors)?;
        s.serialize_field("server_errors", &self.server_errors)?;
        s.serialize_field("transport_errors", &self.transport_errors)?;
        s.serialize_field("queued", &self.queued)?;
        s.serialize_field("expired", &self.expired)?;
        s.serialize_field("malformed_feedback", &self.malformed_feedback)?;
        s.serialize_field("median_request_time_ms", &median_request_time_ms)?;
        s.serialize_field("status_codes", &self.status_codes)?;
        s.end()
    }
}
