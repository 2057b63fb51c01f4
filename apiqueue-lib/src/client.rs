//! Handler of API requests.
//!
//! This module defines two structs, [`Client`] and [`ClientBuilder`].
//! `Client` admits requests against the quota, sends them and queues the
//! ones that have to wait. `ClientBuilder` holds the configuration a
//! `Client` is created from.
#![allow(clippy::module_name_repetitions)]
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant, SystemTime};

use http::header::{self, HeaderMap, HeaderValue};
use http::{Method, StatusCode};
use log::{debug, warn};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use typed_builder::TypedBuilder;
use url::Url;

use crate::ratelimit::{
    Admission, ClientStats, DrainStep, PendingRequest, QuotaFeedback, QuotaSnapshot,
    RateLimitConfig, Scheduler, parse_quota_feedback, parse_retry_after,
};
use crate::template::value_text;
use crate::{
    ApiResponse, EndpointTemplate, ErrorKind, OutgoingRequest, Params, ReqwestTransport,
    RequestOptions, RequestSpec, Result, SessionProvider, Transport,
};

/// Default user agent, `apiqueue/<PKG_VERSION>`.
pub const DEFAULT_USER_AGENT: &str = concat!("apiqueue/", env!("CARGO_PKG_VERSION"));

/// Builder for [`Client`].
///
/// See crate-level documentation for usage example.
#[derive(TypedBuilder, Debug, Clone)]
#[builder(builder_method(doc = "
Create a builder for building `ClientBuilder`.

On the builder call, call methods with same name as its fields to set their values.

Finally, call `.build()` to create the instance of `ClientBuilder`.
"))]
pub struct ClientBuilder {
    /// Base URL every resolved endpoint is appended to,
    /// e.g. `https://api.example.com/3`.
    #[builder(setter(into))]
    base_url: String,
    /// API key, sent as the `api_key` query parameter of every request.
    #[builder(default, setter(into))]
    api_key: Option<SecretString>,
    /// Client-side quota.
    #[builder(default)]
    rate_limit: RateLimitConfig,
    /// Timeout for requests that don't set their own.
    #[builder(default, setter(into))]
    timeout: Option<Duration>,
    /// User-agent sent with every request of the default transport.
    #[builder(default_code = "String::from(DEFAULT_USER_AGENT)", setter(into))]
    user_agent: String,
    /// Sets the default [headers] for every request of the default transport.
    ///
    /// [headers]: https://docs.rs/http/latest/http/header/struct.HeaderName.html
    #[builder(default)]
    custom_headers: HeaderMap,
    /// Source of the `session_id` query parameter.
    /// Without one, no session is ever active.
    #[builder(default, setter(strip_option))]
    session: Option<Arc<dyn SessionProvider>>,
    /// Replaces the default `reqwest` transport.
    /// `user_agent` and `custom_headers` are ignored when this is set.
    #[builder(default, setter(strip_option))]
    transport: Option<Arc<dyn Transport>>,
}

impl ClientBuilder {
    /// Instantiates a [`Client`].
    ///
    /// # Errors
    ///
    /// Returns an `Err` if:
    /// - The rate limit configuration is unusable (zero ceiling or window).
    /// - The base URL cannot be parsed.
    /// - The user-agent is invalid.
    /// - The request client cannot be created.
    ///   See [here](https://docs.rs/reqwest/latest/reqwest/struct.ClientBuilder.html#errors).
    pub fn client(self) -> Result<Client> {
        let Self {
            base_url,
            api_key,
            rate_limit,
            timeout,
            user_agent,
            custom_headers: mut headers,
            session,
            transport,
        } = self;

        rate_limit.validate()?;

        let parsed = Url::parse(&base_url).map_err(|e| ErrorKind::InvalidUrl(base_url.clone(), e))?;
        if parsed.cannot_be_a_base() {
            return Err(ErrorKind::InvalidUrl(
                base_url,
                url::ParseError::RelativeUrlWithCannotBeABaseBase,
            ));
        }

        let transport = if let Some(transport) = transport {
            transport
        } else {
            headers.insert(
                header::USER_AGENT,
                HeaderValue::from_str(&user_agent).map_err(ErrorKind::InvalidHeader)?,
            );
            headers
                .entry(header::ACCEPT)
                .or_insert(HeaderValue::from_static("application/json"));

            let reqwest_client = reqwest::ClientBuilder::new()
                .gzip(true)
                .default_headers(headers)
                .build()
                .map_err(ErrorKind::BuildRequestClient)?;
            Arc::new(ReqwestTransport::new(reqwest_client))
        };

        Ok(Client {
            inner: Arc::new(Inner {
                base_url: base_url.trim_end_matches('/').to_string(),
                api_key,
                session,
                transport,
                timeout,
                rate_limited: rate_limit.use_default_limits,
                scheduler: Mutex::new(Scheduler::new(&rate_limit)),
                stats: Mutex::new(ClientStats::default()),
                wake: Notify::new(),
                drainer: Mutex::new(None),
            }),
        })
    }
}

/// Sends requests to the API within the configured quota.
///
/// Cloning is cheap: clones share the quota, the pending queue and the
/// statistics. Separately built clients never share anything.
///
/// See [`ClientBuilder`] which contains sane defaults for all configuration options.
#[derive(Debug, Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    base_url: String,
    api_key: Option<SecretString>,
    session: Option<Arc<dyn SessionProvider>>,
    transport: Arc<dyn Transport>,
    timeout: Option<Duration>,
    /// `false` in pass-through mode
    rate_limited: bool,
    scheduler: Mutex<Scheduler>,
    stats: Mutex<ClientStats>,
    /// Cuts a sleeping drain task short
    wake: Notify,
    drainer: Mutex<Option<JoinHandle<()>>>,
}

impl Client {
    /// Submit a request and wait for its outcome.
    ///
    /// If the quota is exhausted, or the server answers with
    /// `429 Too Many Requests`, the request waits in the pending queue and is
    /// sent again once the quota recovers. The returned future resolves
    /// exactly once, with the final response or error.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::InvalidParameters`] if the parameters don't fit the
    ///   endpoint template. Nothing is sent.
    /// - [`ErrorKind::RejectedStatusCode`] for non-success responses other
    ///   than 429.
    /// - [`ErrorKind::RateLimited`] for 429 responses in pass-through mode.
    /// - [`ErrorKind::NetworkRequest`] or [`ErrorKind::Transport`] if no
    ///   response was received.
    /// - [`ErrorKind::QueueTimeout`] if the request waited longer than
    ///   [`RateLimitConfig::max_queue_wait`].
    /// - [`ErrorKind::ClientShutdown`] if the client was shut down.
    pub async fn submit(&self, spec: RequestSpec) -> Result<ApiResponse> {
        if !self.inner.rate_limited {
            if self.inner.lock_scheduler().is_closed() {
                return Err(ErrorKind::ClientShutdown);
            }
            return self.inner.execute(&spec).await;
        }

        let admission = self.inner.lock_scheduler().admit(spec, now())?;
        let receiver = match admission {
            Admission::Admitted(spec) => {
                let result = self.inner.execute(&spec).await;
                if !matches!(result, Err(ErrorKind::RateLimited { .. })) {
                    return result;
                }
                debug!("`{}` was rate limited, queueing it for a retry", spec.template);
                let (pending, receiver) = PendingRequest::new(spec, now());
                self.inner.park(pending);
                receiver
            }
            Admission::Queued {
                receiver,
                spawn_drainer,
            } => {
                self.inner.lock_stats().record_queued();
                if spawn_drainer {
                    self.inner.spawn_drainer();
                }
                receiver
            }
        };

        receiver.await?
    }

    /// Submit a request built from its parts, see [`Client::submit`]
    ///
    /// # Errors
    ///
    /// See [`Client::submit`].
    pub async fn request(
        &self,
        method: Method,
        template: impl Into<EndpointTemplate>,
        params: impl Into<Params>,
        options: RequestOptions,
    ) -> Result<ApiResponse> {
        let spec = RequestSpec::new(method, template)
            .with_params(params)
            .with_options(options);
        self.submit(spec).await
    }

    /// Submit a `GET` request with default options, see [`Client::submit`]
    ///
    /// # Errors
    ///
    /// See [`Client::submit`].
    pub async fn get(
        &self,
        template: impl Into<EndpointTemplate>,
        params: impl Into<Params>,
    ) -> Result<ApiResponse> {
        self.request(Method::GET, template, params, RequestOptions::default())
            .await
    }

    /// Number of requests waiting for quota
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.inner.lock_scheduler().queue_len()
    }

    /// Current quota state
    #[must_use]
    pub fn quota(&self) -> QuotaSnapshot {
        self.inner.lock_scheduler().quota()
    }

    /// Request statistics so far
    #[must_use]
    pub fn stats(&self) -> ClientStats {
        self.inner.lock_stats().clone()
    }

    /// Returns `true` if requests are admitted against a client-side quota
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        self.inner.rate_limited
    }

    /// Stop the client.
    ///
    /// Every waiting request fails with [`ErrorKind::ClientShutdown`], and so
    /// does every later submission. Requests already on the wire finish
    /// normally unless they were sent from the pending queue.
    pub fn shutdown(&self) {
        let pending = self.inner.lock_scheduler().shutdown();
        if let Some(drainer) = self
            .inner
            .drainer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            drainer.abort();
        }

        debug!("Client shut down, failing {} queued request(s)", pending.len());
        for request in pending {
            request.complete(Err(ErrorKind::ClientShutdown));
        }
    }
}

/// Current time on the tokio clock, so that paused test time applies
fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

impl Inner {
    fn lock_scheduler(&self) -> MutexGuard<'_, Scheduler> {
        self.scheduler.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_stats(&self) -> MutexGuard<'_, ClientStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Put a rate limited request at the tail of the queue
    fn park(self: &Arc<Self>, pending: PendingRequest) {
        let spawn_drainer = self.lock_scheduler().enqueue(pending);
        self.lock_stats().record_queued();
        if spawn_drainer {
            self.spawn_drainer();
        } else {
            self.wake.notify_one();
        }
    }

    fn spawn_drainer(self: &Arc<Self>) {
        debug!("Starting queue drainer");
        let handle = tokio::spawn(drain(Arc::clone(self)));
        *self.drainer.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    /// Resolve, send and evaluate one request.
    ///
    /// Quota headers are applied to the scheduler in every outcome. A 429 is
    /// recorded as a rejection and returned as [`ErrorKind::RateLimited`];
    /// deciding whether to retry is up to the caller.
    async fn execute(&self, spec: &RequestSpec) -> Result<ApiResponse> {
        let request = self.build_request(spec)?;
        debug!("{} {:?}", request.method, request);

        let started = now();
        let response = match self.transport.execute(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Request to `{}` failed: {e}", spec.template);
                self.lock_stats().record_transport_error();
                return Err(e);
            }
        };
        let finished = now();
        let status = response.status();
        self.lock_stats()
            .record_response(status, finished.saturating_duration_since(started));

        let feedback = self.quota_feedback(&response);

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response.headers().get(header::RETRY_AFTER).and_then(|value| {
                parse_retry_after(value)
                    .inspect_err(|e| warn!("Ignoring Retry-After header: {e}"))
                    .ok()
            });
            if self.rate_limited {
                let mut scheduler = self.lock_scheduler();
                if let Some(feedback) = feedback {
                    scheduler.apply_feedback(feedback, finished);
                }
                scheduler.on_rate_limit_rejection(retry_after, finished);
            }
            return Err(ErrorKind::RateLimited { retry_after });
        }

        if self.rate_limited
            && let Some(feedback) = feedback
        {
            self.lock_scheduler().apply_feedback(feedback, finished);
            self.wake.notify_one();
        }

        if status.is_success() {
            Ok(response)
        } else {
            Err(ErrorKind::RejectedStatusCode {
                status,
                body: response.into_body(),
            })
        }
    }

    /// Parse the quota headers of `response`.
    /// Malformed headers are logged and otherwise ignored.
    fn quota_feedback(&self, response: &ApiResponse) -> Option<QuotaFeedback> {
        match parse_quota_feedback(response.headers(), SystemTime::now()) {
            Ok(feedback) => feedback,
            Err(e) => {
                let e = ErrorKind::from(e);
                warn!("{e}");
                self.lock_stats().record_malformed_feedback();
                None
            }
        }
    }

    /// Turn a [`RequestSpec`] into a request for the transport
    fn build_request(&self, spec: &RequestSpec) -> Result<OutgoingRequest> {
        let session_id = self
            .session
            .as_ref()
            .and_then(|session| session.current_session_id());
        let resolved = spec
            .template
            .resolve_for_session(&spec.params, session_id.is_some())?;

        let url = format!("{}/{}", self.base_url, resolved.path.trim_start_matches('/'));
        let url = Url::parse(&url).map_err(|e| ErrorKind::InvalidUrl(url.clone(), e))?;

        let mut query = Vec::new();
        if let Some(api_key) = &self.api_key {
            query.push(("api_key".to_string(), api_key.expose_secret().to_string()));
        }
        if let Some(session_id) = &session_id {
            query.push((
                "session_id".to_string(),
                session_id.expose_secret().to_string(),
            ));
        }
        if !spec.options.append_to_response.is_empty() {
            query.push((
                "append_to_response".to_string(),
                spec.options.append_to_response.join(","),
            ));
        }

        let body = if spec.sends_body() {
            (!resolved.remainder.is_empty())
                .then(|| Value::Object(resolved.remainder.into_iter().collect()))
        } else {
            query.extend(
                resolved
                    .remainder
                    .iter()
                    .map(|(key, value)| (key.clone(), value_text(value))),
            );
            None
        };

        Ok(OutgoingRequest {
            method: spec.method.clone(),
            url,
            query,
            body,
            timeout: spec.options.timeout.or(self.timeout),
        })
    }
}

/// Keeps the queue served if a drain task goes away early, e.g. because
/// the transport panicked.
struct DrainGuard {
    inner: Arc<Inner>,
    armed: bool,
}

impl Drop for DrainGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let handle = Handle::try_current().ok();
        let restart = self.inner.lock_scheduler().drainer_exited(handle.is_some());
        if let Some(handle) = handle.filter(|_| restart) {
            warn!("Queue drainer stopped unexpectedly, restarting it");
            let task = handle.spawn(drain(Arc::clone(&self.inner)));
            *self.inner.drainer.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);
        }
    }
}

/// Serve the pending queue until it is empty.
///
/// At most one of these runs per client, so queued requests go out one at a
/// time and in order.
async fn drain(inner: Arc<Inner>) {
    let mut guard = DrainGuard {
        inner: Arc::clone(&inner),
        armed: true,
    };
    loop {
        let step = inner.lock_scheduler().drain_step(now());
        match step {
            DrainStep::Idle => {
                debug!("Pending queue is empty, stopping drainer");
                guard.armed = false;
                return;
            }
            DrainStep::Expired(expired) => {
                let now = now();
                inner.lock_stats().record_expired(expired.len() as u64);
                for request in expired {
                    let waited = request.waited(now);
                    request.complete(Err(ErrorKind::QueueTimeout(waited)));
                }
            }
            DrainStep::Sleep(delay) => {
                debug!("Quota exhausted, drainer sleeping for {}ms", delay.as_millis());
                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    () = inner.wake.notified() => {}
                }
            }
            DrainStep::Dispatch(request) => {
                let result = inner.execute(request.spec()).await;
                if matches!(result, Err(ErrorKind::RateLimited { .. })) {
                    debug!(
                        "`{}` was rate limited again, keeping it at the head of the queue",
                        request.spec().template
                    );
                    inner.lock_stats().record_queued();
                    inner.lock_scheduler().requeue_front(request);
                } else {
                    request.complete(result);
                }
            }
        }
    }
}
