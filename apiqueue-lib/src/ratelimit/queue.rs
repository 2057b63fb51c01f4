use std::collections::VecDeque;
use std::time::{Duration, Instant};

use log::debug;
use tokio::sync::oneshot;

use crate::{ApiResponse, RequestSpec, Result};

/// A request waiting for quota.
///
/// Carries the completion handle of the caller that submitted it; whoever
/// eventually sends the request settles the caller's future through it.
#[derive(Debug)]
pub struct PendingRequest {
    spec: RequestSpec,
    enqueued_at: Instant,
    completion: oneshot::Sender<Result<ApiResponse>>,
}

impl PendingRequest {
    /// Park `spec` and return the receiving end of its completion handle
    #[must_use]
    pub fn new(spec: RequestSpec, now: Instant) -> (Self, oneshot::Receiver<Result<ApiResponse>>) {
        let (completion, receiver) = oneshot::channel();
        let pending = Self {
            spec,
            enqueued_at: now,
            completion,
        };
        (pending, receiver)
    }

    /// The request to send
    #[must_use]
    pub const fn spec(&self) -> &RequestSpec {
        &self.spec
    }

    /// When the request was first parked
    #[must_use]
    pub const fn enqueued_at(&self) -> Instant {
        self.enqueued_at
    }

    /// How long the request has been waiting
    #[must_use]
    pub fn waited(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.enqueued_at)
    }

    /// Returns `true` if the caller stopped waiting for the outcome
    #[must_use]
    pub fn is_abandoned(&self) -> bool {
        self.completion.is_closed()
    }

    /// Settle the caller's future with `result`
    pub fn complete(self, result: Result<ApiResponse>) {
        if self.completion.send(result).is_err() {
            debug!(
                "Caller of `{}` went away before the request completed",
                self.spec.template
            );
        }
    }
}

/// FIFO of requests waiting for quota
#[derive(Debug, Default)]
pub struct PendingQueue {
    requests: VecDeque<PendingRequest>,
}

impl PendingQueue {
    /// Create an empty queue
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a request to the tail
    pub fn push_back(&mut self, request: PendingRequest) {
        self.requests.push_back(request);
    }

    /// Put a request back at the head, ahead of everything that is waiting
    pub fn push_front(&mut self, request: PendingRequest) {
        self.requests.push_front(request);
    }

    /// Take the oldest request
    pub fn pop_front(&mut self) -> Option<PendingRequest> {
        self.requests.pop_front()
    }

    /// Number of waiting requests
    #[must_use]
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Returns `true` if no request is waiting
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Remove every waiting request, oldest first
    pub fn drain_all(&mut self) -> Vec<PendingRequest> {
        self.requests.drain(..).collect()
    }

    /// Remove requests that have waited at least `max_wait`.
    /// Relative order of the rest is kept.
    pub fn pop_expired(&mut self, now: Instant, max_wait: Option<Duration>) -> Vec<PendingRequest> {
        let Some(max_wait) = max_wait else {
            return Vec::new();
        };
        let (expired, kept): (VecDeque<_>, VecDeque<_>) = self
            .requests
            .drain(..)
            .partition(|request| request.waited(now) >= max_wait);
        self.requests = kept;
        expired.into()
    }

    /// Drop requests whose caller stopped waiting. Returns how many were removed.
    pub fn remove_abandoned(&mut self) -> usize {
        let before = self.requests.len();
        self.requests.retain(|request| !request.is_abandoned());
        before - self.requests.len()
    }

    /// Time until the next request runs out of `max_wait`
    #[must_use]
    pub fn next_expiry(&self, now: Instant, max_wait: Option<Duration>) -> Option<Duration> {
        let max_wait = max_wait?;
        self.requests
            .iter()
            .map(|request| max_wait.saturating_sub(request.waited(now)))
            .min()
    }
}
