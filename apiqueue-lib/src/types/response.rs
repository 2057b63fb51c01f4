use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;

use crate::{ErrorKind, Result};

/// A response received from the API.
///
/// The body is read eagerly so that the response can be handed across the
/// pending queue and inspected more than once.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: String,
}

impl ApiResponse {
    /// Create a response from its parts
    #[must_use]
    pub const fn new(status: StatusCode, headers: HeaderMap, body: String) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    pub(crate) async fn from_response(response: reqwest::Response) -> Result<Self> {
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await.map_err(ErrorKind::ReadResponseBody)?;

        Ok(Self {
            status,
            headers,
            body,
        })
    }

    /// The HTTP status code
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// The response headers
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The raw response body
    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Consume the response and return its body
    #[must_use]
    pub fn into_body(self) -> String {
        self.body
    }

    /// Deserialize the body as JSON
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidResponseBody`] if the body is not valid
    /// JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body).map_err(ErrorKind::InvalidResponseBody)
    }
}
