//! # Event Scheduling
//!
//! Events are handled one at a time. A handler that returns
//! [`HandlerOutcome::Retry`] gets the event back later: it is queued with an
//! exponentially growing delay and redelivered, in queue order, before the
//! next new event. The queue is serializable so a short-lived process can
//! persist it between invocations.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::SchedulerConfig;
use crate::events::{Event, EventHandler, HandlerOutcome};
use crate::observability::metrics;

/// Exponential backoff between redeliveries of a deferred event.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first redelivery
    pub initial_backoff: Duration,
    /// Cap for exponential growth
    pub max_backoff: Duration,
    /// Growth factor per attempt (2.0 doubles)
    pub backoff_multiplier: f64,
    /// Redeliveries before an event is dropped; `None` retries forever
    pub max_attempts: Option<u32>,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(300),
            backoff_multiplier: 2.0,
            max_attempts: None,
        }
    }
}

impl From<&SchedulerConfig> for BackoffPolicy {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_secs(config.max_backoff_seconds),
            backoff_multiplier: config.backoff_multiplier,
            max_attempts: config.max_attempts,
        }
    }
}

impl BackoffPolicy {
    /// Delay after the `attempt`-th failed delivery (1-based).
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let multiplier = self.backoff_multiplier.powi(attempt.saturating_sub(1).min(i32::MAX as u32) as i32);
        let backoff_ms = self.initial_backoff.as_millis() as f64 * multiplier;
        let capped_ms = backoff_ms.min(self.max_backoff.as_millis() as f64);

        Duration::from_millis(capped_ms as u64)
    }

    fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts > max)
    }
}

/// `now + delay`, saturating at the latest representable instant.
fn redelivery_time(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|delay| now.checked_add_signed(delay))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// A deferred event awaiting redelivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedEvent {
    pub event: Event,
    /// Failed deliveries so far
    pub attempts: u32,
    pub not_before: DateTime<Utc>,
}

/// Counts from one scheduler pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub handled: usize,
    pub deferred: usize,
    pub failed: usize,
    pub dropped: usize,
}

impl DispatchReport {
    pub fn merge(&mut self, other: DispatchReport) {
        self.handled += other.handled;
        self.deferred += other.deferred;
        self.failed += other.failed;
        self.dropped += other.dropped;
    }
}

#[derive(Debug, Clone)]
pub struct EventScheduler {
    policy: BackoffPolicy,
    queue: VecDeque<QueuedEvent>,
}

impl EventScheduler {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self { policy, queue: VecDeque::new() }
    }

    /// Resume with events deferred by an earlier run.
    pub fn from_pending(policy: BackoffPolicy, pending: Vec<QueuedEvent>) -> Self {
        Self { policy, queue: pending.into() }
    }

    pub fn pending(&self) -> Vec<QueuedEvent> {
        self.queue.iter().cloned().collect()
    }

    pub fn pending_len(&self) -> usize {
        self.queue.len()
    }

    /// Deliver due deferred events, then `event`.
    pub async fn dispatch<H>(&mut self, handler: &mut H, event: Event, now: DateTime<Utc>) -> DispatchReport
    where
        H: EventHandler + ?Sized,
    {
        let mut report = self.run_until_idle(handler, now).await;
        report.merge(self.deliver(handler, event, 0, now).await);
        report
    }

    /// Deliver every deferred event that is due at `now`, once each.
    pub async fn run_until_idle<H>(&mut self, handler: &mut H, now: DateTime<Utc>) -> DispatchReport
    where
        H: EventHandler + ?Sized,
    {
        let mut report = DispatchReport::default();
        // Snapshot the length so events re-queued during this pass wait for the next one.
        for _ in 0..self.queue.len() {
            let Some(queued) = self.queue.pop_front() else {
                break;
            };
            if queued.not_before > now {
                self.queue.push_back(queued);
                continue;
            }
            report.merge(self.deliver(handler, queued.event, queued.attempts, now).await);
        }
        report
    }

    async fn deliver<H>(
        &mut self,
        handler: &mut H,
        event: Event,
        attempts: u32,
        now: DateTime<Utc>,
    ) -> DispatchReport
    where
        H: EventHandler + ?Sized,
    {
        let mut report = DispatchReport::default();
        let name = event.name();
        let relation = event.relation().map(|r| r.relation.get());
        tracing::debug!(event = %name, relation = ?relation, attempts = attempts, "Dispatching event");

        match handler.handle(&event).await {
            HandlerOutcome::Done => {
                metrics::record_event(name, "done");
                report.handled += 1;
            }
            HandlerOutcome::Failed(reason) => {
                tracing::error!(event = %name, reason = %reason, "Event handler failed");
                metrics::record_event(name, "failed");
                report.failed += 1;
            }
            HandlerOutcome::Retry => {
                let attempts = attempts + 1;
                if self.policy.exhausted(attempts) {
                    tracing::error!(event = %name, attempts = attempts, "Dropping event after exhausting retries");
                    metrics::record_event(name, "dropped");
                    report.dropped += 1;
                } else {
                    let delay = self.policy.backoff_for_attempt(attempts);
                    let not_before = redelivery_time(now, delay);
                    tracing::info!(event = %name, attempts = attempts, delay_ms = delay.as_millis() as u64, "Deferring event");
                    metrics::record_event(name, "deferred");
                    self.queue.push_back(QueuedEvent { event, attempts, not_before });
                    report.deferred += 1;
                }
            }
        }
        report
    }
}
