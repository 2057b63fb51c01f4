use std::time::{Duration, Instant};

use log::debug;
use tokio::sync::oneshot;

use super::{PendingQueue, PendingRequest, QuotaFeedback, QuotaSnapshot, QuotaTracker, RateLimitConfig};
use crate::{ApiResponse, ErrorKind, RequestSpec, Result};

/// Outcome of [`Scheduler::admit`]
#[derive(Debug)]
pub enum Admission {
    /// The request fits into the current window and can be sent right away
    Admitted(RequestSpec),
    /// The request was parked; its result arrives through `receiver`
    Queued {
        /// Completion handle of the parked request
        receiver: oneshot::Receiver<Result<ApiResponse>>,
        /// No drain task is running; the caller has to start one
        spawn_drainer: bool,
    },
}

/// What the drain task should do next, see [`Scheduler::drain_step`]
#[derive(Debug)]
pub enum DrainStep {
    /// Nothing is waiting; the drain task stops
    Idle,
    /// Requests that waited longer than the configured limit
    Expired(Vec<PendingRequest>),
    /// Quota is exhausted; check again after this delay
    Sleep(Duration),
    /// Quota was taken for the oldest waiting request; send it
    Dispatch(PendingRequest),
}

/// Quota and pending queue of one client, mutated together under one lock.
///
/// Every method takes the current instant, nothing in here reads a clock.
#[derive(Debug)]
pub struct Scheduler {
    quota: QuotaTracker,
    queue: PendingQueue,
    max_queue_wait: Option<Duration>,
    drainer_running: bool,
    closed: bool,
}

impl Scheduler {
    /// Create a scheduler with a full budget and an empty queue
    #[must_use]
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            quota: QuotaTracker::new(config.limit_ceiling, config.window),
            queue: PendingQueue::new(),
            max_queue_wait: config.max_queue_wait,
            drainer_running: false,
            closed: false,
        }
    }

    /// Take quota for `spec`, or park it until quota is available.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::ClientShutdown`] once [`Scheduler::shutdown`] was
    /// called.
    pub fn admit(&mut self, spec: RequestSpec, now: Instant) -> Result<Admission> {
        if self.closed {
            return Err(ErrorKind::ClientShutdown);
        }

        self.quota.on_window_elapsed(now);
        if self.quota.try_admit() {
            return Ok(Admission::Admitted(spec));
        }

        debug!(
            "Quota exhausted, queueing `{}` ({} already waiting)",
            spec.template,
            self.queue.len()
        );
        let (pending, receiver) = PendingRequest::new(spec, now);
        let spawn_drainer = self.enqueue(pending);
        Ok(Admission::Queued {
            receiver,
            spawn_drainer,
        })
    }

    /// Park a request at the tail of the queue.
    /// Returns `true` if the caller has to start a drain task.
    pub fn enqueue(&mut self, pending: PendingRequest) -> bool {
        self.park(pending, PendingQueue::push_back)
    }

    /// Put a request that was rejected again back at the head of the queue.
    /// Returns `true` if the caller has to start a drain task.
    pub fn requeue_front(&mut self, pending: PendingRequest) -> bool {
        self.park(pending, PendingQueue::push_front)
    }

    fn park(&mut self, pending: PendingRequest, push: fn(&mut PendingQueue, PendingRequest)) -> bool {
        if self.closed {
            pending.complete(Err(ErrorKind::ClientShutdown));
            return false;
        }
        push(&mut self.queue, pending);
        let spawn_drainer = !self.drainer_running;
        self.drainer_running = true;
        spawn_drainer
    }

    /// Adopt quota information reported by the server
    pub fn apply_feedback(&mut self, feedback: QuotaFeedback, now: Instant) {
        self.quota.on_server_feedback(feedback, now);
    }

    /// The server rejected a request with `429 Too Many Requests`
    pub fn on_rate_limit_rejection(&mut self, retry_after: Option<Duration>, now: Instant) {
        self.quota.on_rate_limit_rejection(retry_after, now);
    }

    /// Decide the next move of the drain task.
    ///
    /// An empty queue yields [`DrainStep::Idle`] without touching the quota,
    /// and marks the drain task as stopped.
    pub fn drain_step(&mut self, now: Instant) -> DrainStep {
        let abandoned = self.queue.remove_abandoned();
        if abandoned > 0 {
            debug!("Dropped {abandoned} queued request(s) nobody is waiting for");
        }

        if self.queue.is_empty() {
            self.drainer_running = false;
            return DrainStep::Idle;
        }

        let expired = self.queue.pop_expired(now, self.max_queue_wait);
        if !expired.is_empty() {
            return DrainStep::Expired(expired);
        }

        let delay = self.quota.delay_until_reset(now);
        if !delay.is_zero() {
            let delay = self
                .queue
                .next_expiry(now, self.max_queue_wait)
                .map_or(delay, |expiry| delay.min(expiry));
            return DrainStep::Sleep(delay);
        }

        self.quota.on_window_elapsed(now);
        if self.quota.try_admit()
            && let Some(pending) = self.queue.pop_front()
        {
            return DrainStep::Dispatch(pending);
        }

        // Only reachable with a zero ceiling
        DrainStep::Sleep(self.quota.window())
    }

    /// The drain task stopped before the queue was empty.
    ///
    /// Returns `true` if requests are still waiting and `can_restart` allows
    /// a new drain task; the running flag then stays set for it. Otherwise
    /// the next parked request starts one.
    pub fn drainer_exited(&mut self, can_restart: bool) -> bool {
        let restart = can_restart && !self.closed && !self.queue.is_empty();
        self.drainer_running = restart;
        restart
    }

    /// Close the scheduler. Later admissions fail; the returned requests
    /// are all that was waiting.
    pub fn shutdown(&mut self) -> Vec<PendingRequest> {
        self.closed = true;
        self.queue.drain_all()
    }

    /// Returns `true` after [`Scheduler::shutdown`]
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Number of waiting requests
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Current quota state
    #[must_use]
    pub const fn quota(&self) -> QuotaSnapshot {
        self.quota.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderMap, StatusCode};

    const WINDOW: Duration = Duration::from_secs(10);

    fn scheduler(ceiling: usize, max_queue_wait: Option<Duration>) -> Scheduler {
        Scheduler::new(&RateLimitConfig {
            limit_ceiling: ceiling,
            window: WINDOW,
            max_queue_wait,
            ..RateLimitConfig::default()
        })
    }

    fn ok() -> Result<ApiResponse> {
        Ok(ApiResponse::new(StatusCode::OK, HeaderMap::new(), String::new()))
    }

    #[test]
    fn test_admit_until_exhausted_then_queue() {
        let now = Instant::now();
        let mut scheduler = scheduler(2, None);

        assert!(matches!(
            scheduler.admit(RequestSpec::get("a"), now),
            Ok(Admission::Admitted(_))
        ));
        assert!(matches!(
            scheduler.admit(RequestSpec::get("b"), now),
            Ok(Admission::Admitted(_))
        ));

        let Ok(Admission::Queued { spawn_drainer, .. }) = scheduler.admit(RequestSpec::get("c"), now)
        else {
            panic!("expected the third request to be queued");
        };
        assert!(spawn_drainer);
        assert_eq!(scheduler.queue_len(), 1);

        // The drain task is already running for the next one
        let Ok(Admission::Queued { spawn_drainer, .. }) = scheduler.admit(RequestSpec::get("d"), now)
        else {
            panic!("expected the fourth request to be queued");
        };
        assert!(!spawn_drainer);
        assert_eq!(scheduler.queue_len(), 2);
    }

    #[test]
    fn test_exhausted_quota_queues_exactly_one() {
        let now = Instant::now();
        let mut scheduler = scheduler(40, None);
        scheduler.apply_feedback(
            QuotaFeedback {
                remaining: Some(0),
                reset_after: Some(Duration::from_secs(5)),
            },
            now,
        );

        let admission = scheduler.admit(RequestSpec::get("movie/:id"), now).unwrap();

        assert!(matches!(admission, Admission::Queued { .. }));
        assert_eq!(scheduler.queue_len(), 1);
        assert_eq!(scheduler.quota().remaining, 0);
    }

    #[test]
    fn test_drain_empty_queue_is_noop() {
        let now = Instant::now();
        let mut scheduler = scheduler(1, None);
        scheduler.apply_feedback(
            QuotaFeedback {
                remaining: Some(0),
                reset_after: Some(Duration::from_secs(5)),
            },
            now,
        );
        let before = scheduler.quota();

        assert!(matches!(scheduler.drain_step(now), DrainStep::Idle));
        assert!(matches!(
            scheduler.drain_step(now + Duration::from_secs(60)),
            DrainStep::Idle
        ));

        assert_eq!(scheduler.quota(), before);
        assert_eq!(scheduler.queue_len(), 0);
    }

    #[test]
    fn test_drain_sleeps_until_reset_then_dispatches_in_order() {
        let start = Instant::now();
        let mut scheduler = scheduler(1, None);
        scheduler.admit(RequestSpec::get("first"), start).unwrap();
        let _a = scheduler.admit(RequestSpec::get("a"), start).unwrap();
        let _b = scheduler.admit(RequestSpec::get("b"), start).unwrap();

        let DrainStep::Sleep(delay) = scheduler.drain_step(start + Duration::from_secs(4)) else {
            panic!("expected the drain task to sleep");
        };
        assert_eq!(delay, Duration::from_secs(6));

        let reset = start + WINDOW;
        let DrainStep::Dispatch(pending) = scheduler.drain_step(reset) else {
            panic!("expected a dispatch after the reset");
        };
        assert_eq!(pending.spec().template.as_str(), "a");
        pending.complete(ok());

        // Budget of one is spent, `b` waits for the next window
        assert!(matches!(scheduler.drain_step(reset), DrainStep::Sleep(_)));
        let DrainStep::Dispatch(pending) = scheduler.drain_step(reset + WINDOW) else {
            panic!("expected a dispatch in the following window");
        };
        assert_eq!(pending.spec().template.as_str(), "b");

        assert!(matches!(scheduler.drain_step(reset + WINDOW), DrainStep::Idle));
    }

    #[test]
    fn test_requeue_keeps_request_at_head() {
        let start = Instant::now();
        let mut scheduler = scheduler(1, None);
        scheduler.admit(RequestSpec::get("first"), start).unwrap();
        let _a = scheduler.admit(RequestSpec::get("a"), start).unwrap();
        let _b = scheduler.admit(RequestSpec::get("b"), start).unwrap();

        let reset = start + WINDOW;
        let DrainStep::Dispatch(pending) = scheduler.drain_step(reset) else {
            panic!("expected a dispatch");
        };

        // Server says no: back to the head, drain task is still running.
        // The window opened by the dispatch is later than the retry delay.
        scheduler.on_rate_limit_rejection(Some(Duration::from_secs(2)), reset);
        assert!(!scheduler.requeue_front(pending));
        assert_eq!(scheduler.quota().remaining, 0);

        assert!(matches!(scheduler.drain_step(reset), DrainStep::Sleep(d) if d == WINDOW));
        let DrainStep::Dispatch(pending) = scheduler.drain_step(reset + WINDOW) else {
            panic!("expected a dispatch in the next window");
        };
        assert_eq!(pending.spec().template.as_str(), "a");
        assert_eq!(scheduler.queue_len(), 1);
    }

    #[test]
    fn test_expired_requests() {
        let start = Instant::now();
        let mut scheduler = scheduler(1, Some(Duration::from_secs(3)));
        scheduler.admit(RequestSpec::get("first"), start).unwrap();
        let _a = scheduler.admit(RequestSpec::get("a"), start).unwrap();

        // Sleep is capped by the queue wait limit
        assert!(matches!(
            scheduler.drain_step(start + Duration::from_secs(1)),
            DrainStep::Sleep(d) if d == Duration::from_secs(2)
        ));

        let DrainStep::Expired(expired) = scheduler.drain_step(start + Duration::from_secs(3)) else {
            panic!("expected the request to expire");
        };
        assert_eq!(expired.len(), 1);
        assert!(matches!(scheduler.drain_step(start + Duration::from_secs(3)), DrainStep::Idle));
    }

    #[test]
    fn test_elapsed_reset_overrides_stale_feedback() {
        let start = Instant::now();
        let mut scheduler = scheduler(1, None);
        scheduler.admit(RequestSpec::get("first"), start).unwrap();
        let _a = scheduler.admit(RequestSpec::get("a"), start).unwrap();

        // Reset has passed but the server still reports nothing left
        scheduler.apply_feedback(
            QuotaFeedback {
                remaining: Some(0),
                reset_after: Some(Duration::ZERO),
            },
            start,
        );
        let now = start + Duration::from_secs(1);
        assert!(matches!(scheduler.drain_step(now), DrainStep::Dispatch(_)));
    }

    #[test]
    fn test_abandoned_requests_are_not_expired() {
        let start = Instant::now();
        let mut scheduler = scheduler(1, None);
        scheduler.admit(RequestSpec::get("first"), start).unwrap();
        let Ok(Admission::Queued { receiver, .. }) = scheduler.admit(RequestSpec::get("gone"), start)
        else {
            panic!("expected the request to be queued");
        };
        drop(receiver);

        assert!(matches!(
            scheduler.drain_step(start + Duration::from_secs(1)),
            DrainStep::Idle
        ));
        assert_eq!(scheduler.queue_len(), 0);
    }

    #[test]
    fn test_drainer_exit_with_waiting_requests() {
        let now = Instant::now();
        let mut scheduler = scheduler(1, None);
        scheduler.admit(RequestSpec::get("first"), now).unwrap();
        let Ok(Admission::Queued { spawn_drainer, receiver: _a }) = scheduler.admit(RequestSpec::get("a"), now)
        else {
            panic!("expected the request to be queued");
        };
        assert!(spawn_drainer);

        // A replacement is needed and already accounted for
        assert!(scheduler.drainer_exited(true));
        let Ok(Admission::Queued { spawn_drainer, receiver: _b }) = scheduler.admit(RequestSpec::get("b"), now)
        else {
            panic!("expected the request to be queued");
        };
        assert!(!spawn_drainer);

        // Without a replacement the next parked request starts one
        assert!(!scheduler.drainer_exited(false));
        let Ok(Admission::Queued { spawn_drainer, receiver: _c }) =
            scheduler.admit(RequestSpec::get("c"), now)
        else {
            panic!("expected the request to be queued");
        };
        assert!(spawn_drainer);

        drop(scheduler.shutdown());
        assert!(!scheduler.drainer_exited(true));
    }

    #[tokio::test]
    async fn test_shutdown_fails_waiting_and_later_requests() {
        let now = Instant::now();
        let mut scheduler = scheduler(1, None);
        scheduler.admit(RequestSpec::get("first"), now).unwrap();
        let Ok(Admission::Queued { receiver, .. }) = scheduler.admit(RequestSpec::get("a"), now) else {
            panic!("expected the request to be queued");
        };

        for pending in scheduler.shutdown() {
            pending.complete(Err(ErrorKind::ClientShutdown));
        }

        assert!(matches!(receiver.await, Ok(Err(ErrorKind::ClientShutdown))));
        assert!(scheduler.is_closed());
        assert!(matches!(
            scheduler.admit(RequestSpec::get("b"), now),
            Err(ErrorKind::ClientShutdown)
        ));
    }
}
