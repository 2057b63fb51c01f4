//! The HTTP seam of the client.
//!
//! [`Transport`] is everything the scheduler needs from the network: send
//! one fully built request, hand back status, headers and body. The default
//! implementation is [`ReqwestTransport`]; tests plug in scripted ones.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use http::Method;
use serde_json::Value;
use url::Url;

use crate::{ApiResponse, ErrorKind, Result};

/// Query parameters whose values are never printed
const REDACTED_QUERY_KEYS: &[&str] = &["api_key", "session_id"];

/// A request ready to be put on the wire
#[derive(Clone, PartialEq)]
pub struct OutgoingRequest {
    /// HTTP method
    pub method: Method,
    /// Absolute URL, including a raw query string if the caller gave one
    pub url: Url,
    /// Query parameters appended to the URL
    pub query: Vec<(String, String)>,
    /// JSON body, for methods that carry one
    pub body: Option<Value>,
    /// Request timeout; `None` uses the transport's default
    pub timeout: Option<Duration>,
}

impl OutgoingRequest {
    /// The value of the first query parameter named `key`
    #[must_use]
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

// Credentials travel in the query string; keep them out of logs
impl fmt::Debug for OutgoingRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let query: Vec<(&str, &str)> = self
            .query
            .iter()
            .map(|(k, v)| {
                if REDACTED_QUERY_KEYS.contains(&k.as_str()) {
                    (k.as_str(), "[REDACTED]")
                } else {
                    (k.as_str(), v.as_str())
                }
            })
            .collect();
        f.debug_struct("OutgoingRequest")
            .field("method", &self.method)
            .field("url", &self.url.as_str())
            .field("query", &query)
            .field("body", &self.body)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Sends a single request and returns whatever the server answered.
///
/// Non-success status codes are *not* errors at this level; the client
/// decides what to do with them. Errors are reserved for requests that never
/// got an answer.
#[async_trait]
pub trait Transport: fmt::Debug + Send + Sync {
    /// Execute `request`
    ///
    /// # Errors
    ///
    /// Returns an error if no response was received, e.g. on connection
    /// failures or timeouts.
    async fn execute(&self, request: OutgoingRequest) -> Result<ApiResponse>;
}

/// [`Transport`] backed by a [`reqwest::Client`]
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Wrap a preconfigured `reqwest` client
    #[must_use]
    pub const fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: OutgoingRequest) -> Result<ApiResponse> {
        let OutgoingRequest {
            method,
            url,
            query,
            body,
            timeout,
        } = request;

        let mut builder = self.client.request(method, url).query(&query);
        if let Some(body) = &body {
            builder = builder.json(body);
        }
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(ErrorKind::NetworkRequest)?;
        ApiResponse::from_response(response).await
    }
}
