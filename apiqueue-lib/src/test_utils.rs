use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use tokio::time::Instant;

use crate::ratelimit::RateLimitConfig;
use crate::{ApiResponse, Client, ClientBuilder, ErrorKind, OutgoingRequest, Result, Transport};

/// Base URL used by clients in unit tests
pub(crate) const TEST_BASE_URL: &str = "https://api.example.com/3";

/// A request seen by [`ScriptedTransport`], with the (tokio) time it arrived
#[derive(Debug, Clone)]
pub(crate) struct Sent {
    pub(crate) request: OutgoingRequest,
    pub(crate) at: Instant,
}

/// In-memory [`Transport`] answering from a script.
///
/// Responses are handed out in order; once the script runs out every request
/// gets an empty `200 OK`. Works with paused tokio time.
#[derive(Debug, Default)]
pub(crate) struct ScriptedTransport {
    script: Mutex<VecDeque<Result<ApiResponse>>>,
    sent: Mutex<Vec<Sent>>,
    latency: Duration,
    /// Path of a request that makes the transport panic (once)
    panic_on: Mutex<Option<String>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn with_latency(latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            latency,
            ..Self::default()
        })
    }

    /// Append a response to the script
    pub(crate) fn respond(&self, response: Result<ApiResponse>) {
        self.script.lock().unwrap().push_back(response);
    }

    /// Panic instead of answering the next request for `path`
    pub(crate) fn panic_on(&self, path: &str) {
        *self.panic_on.lock().unwrap() = Some(path.to_string());
    }

    pub(crate) fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    /// Paths of all requests so far, in the order they were sent
    pub(crate) fn paths(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .map(|sent| sent.request.url.path().to_string())
            .collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(&self, request: OutgoingRequest) -> Result<ApiResponse> {
        let path = request.url.path().to_string();
        let panics = self
            .panic_on
            .lock()
            .unwrap()
            .take_if(|panic_path| *panic_path == path)
            .is_some();
        self.sent.lock().unwrap().push(Sent {
            request,
            at: Instant::now(),
        });
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        assert!(!panics, "transport blew up on {path}");
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(response(StatusCode::OK, &[], "")))
    }
}

/// Build a response with the given headers
pub(crate) fn response(status: StatusCode, headers: &[(&'static str, &str)], body: &str) -> ApiResponse {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        map.insert(
            HeaderName::from_static(name),
            HeaderValue::from_str(value).unwrap(),
        );
    }
    ApiResponse::new(status, map, body.to_string())
}

/// A `429 Too Many Requests` response
pub(crate) fn too_many_requests(headers: &[(&'static str, &str)]) -> Result<ApiResponse> {
    Ok(response(StatusCode::TOO_MANY_REQUESTS, headers, ""))
}

/// A transport failure
pub(crate) fn connection_refused() -> Result<ApiResponse> {
    Err(ErrorKind::Transport("connection refused".into()))
}

/// Client pointing at [`TEST_BASE_URL`] and sending through `transport`
pub(crate) fn scripted_client(transport: &Arc<ScriptedTransport>, rate_limit: RateLimitConfig) -> Client {
    ClientBuilder::builder()
        .base_url(TEST_BASE_URL)
        .rate_limit(rate_limit)
        .transport(transport.clone() as Arc<dyn Transport>)
        .build()
        .client()
        .unwrap()
}

/// Rate limiting with the given ceiling and window
pub(crate) fn limits(limit_ceiling: usize, window: Duration) -> RateLimitConfig {
    RateLimitConfig {
        limit_ceiling,
        window,
        ..RateLimitConfig::default()
    }
}
