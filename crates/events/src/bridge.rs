//! Hands events to the transport with bounded retries.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

use rf_domain::config::{DeliveryConfig, DeliveryRoute};
use rf_domain::error::DeliveryFailure;
use rf_domain::event::AgentEvent;
use rf_domain::trace::TraceEvent;

use crate::backoff::{jitter_seed, RetryPolicy};
use crate::transport::Transport;

/// Running delivery counters.
#[derive(Debug, Default)]
pub struct DeliveryStats {
    attempts: AtomicU64,
    retries: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeliveryStatsSnapshot {
    pub attempts: u64,
    pub retries: u64,
    pub delivered: u64,
    pub failed: u64,
}

impl DeliveryStats {
    pub fn snapshot(&self) -> DeliveryStatsSnapshot {
        DeliveryStatsSnapshot {
            attempts: self.attempts.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Shared between every emitter; holds no per-user state, so a slow or
/// failing user never blocks delivery to another.
pub struct EventBridge {
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
    route: DeliveryRoute,
    stats: DeliveryStats,
}

impl EventBridge {
    pub fn new(transport: Arc<dyn Transport>, config: &DeliveryConfig) -> Self {
        Self::with_policy(transport, RetryPolicy::from(config), config.route)
    }

    pub fn with_policy(
        transport: Arc<dyn Transport>,
        retry: RetryPolicy,
        route: DeliveryRoute,
    ) -> Self {
        Self {
            transport,
            retry,
            route,
            stats: DeliveryStats::default(),
        }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn stats(&self) -> DeliveryStatsSnapshot {
        self.stats.snapshot()
    }

    /// Send `event`, retrying per the policy.
    ///
    /// On exhaustion an error notice goes to the event's user (and only that
    /// user) and the failure is returned.
    pub async fn deliver(&self, event: &AgentEvent) -> Result<(), DeliveryFailure> {
        let message = event.to_message();
        let mut attempts = 0u32;
        let seed = jitter_seed(&[
            event.user_id.as_str(),
            event.run_id.as_str(),
            event.agent_name.as_str(),
        ]);

        loop {
            attempts += 1;
            self.stats.attempts.fetch_add(1, Ordering::Relaxed);

            let sent = match self.route {
                DeliveryRoute::User => {
                    self.transport
                        .send_message(&event.user_id, message.clone())
                        .await
                }
                DeliveryRoute::Thread => {
                    self.transport
                        .send_to_thread(&event.thread_id, message.clone())
                        .await
                }
            };

            if sent {
                self.stats.delivered.fetch_add(1, Ordering::Relaxed);
                return Ok(());
            }

            if self.retry.should_give_up(attempts) {
                break;
            }

            let delay = self.retry.delay_for_attempt(attempts - 1, seed);
            self.stats.retries.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                user_id = %event.user_id,
                event_kind = %event.kind,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                "event send failed, retrying"
            );
            TraceEvent::DeliveryRetried {
                user_id: event.user_id.clone(),
                event_kind: event.kind.to_string(),
                attempt: attempts,
                delay_ms: delay.as_millis() as u64,
            }
            .emit();
            tokio::time::sleep(delay).await;
        }

        self.stats.failed.fetch_add(1, Ordering::Relaxed);
        let failure = DeliveryFailure {
            user_id: event.user_id.clone(),
            thread_id: event.thread_id.clone(),
            event_kind: event.kind.to_string(),
            attempts,
            reason: "transport rejected the message".into(),
        };

        tracing::warn!(
            user_id = %failure.user_id,
            thread_id = %failure.thread_id,
            run_id = %event.run_id,
            event_kind = %failure.event_kind,
            attempts,
            "event delivery failed"
        );
        TraceEvent::DeliveryFailed {
            user_id: failure.user_id.clone(),
            thread_id: failure.thread_id.clone(),
            event_kind: failure.event_kind.clone(),
            attempts,
        }
        .emit();

        let notice = format!(
            "could not deliver {} for agent {}",
            event.kind, event.agent_name
        );
        if !self.transport.send_error(&event.user_id, &notice).await {
            tracing::warn!(user_id = %event.user_id, "error notice could not be sent either");
        }

        Err(failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::RecordingTransport;
    use rf_domain::event::EventKind;

    fn bridge(t: Arc<RecordingTransport>, attempts: u32) -> EventBridge {
        EventBridge::with_policy(t, RetryPolicy::immediate(attempts), DeliveryRoute::User)
    }

    fn started(user: &str) -> AgentEvent {
        AgentEvent::new(EventKind::AgentStarted, user, "t1", "r1", "a")
    }

    #[tokio::test]
    async fn delivers_first_try() {
        let t = Arc::new(RecordingTransport::new());
        let b = bridge(t.clone(), 3);
        b.deliver(&started("u1")).await.unwrap();

        assert_eq!(t.events_to("u1").len(), 1);
        let stats = b.stats();
        assert_eq!(stats.attempts, 1);
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.retries, 0);
    }

    #[tokio::test]
    async fn transient_failure_is_retried() {
        let t = Arc::new(RecordingTransport::new());
        t.fail_next("u1", 2);
        let b = bridge(t.clone(), 3);

        b.deliver(&started("u1")).await.unwrap();
        assert_eq!(t.attempts_to("u1"), 3);
        assert_eq!(t.events_to("u1").len(), 1);
        assert_eq!(b.stats().retries, 2);
        assert!(t.errors_for("u1").is_empty());
    }

    #[tokio::test]
    async fn exhaustion_notifies_only_affected_user() {
        let t = Arc::new(RecordingTransport::new());
        t.fail_always("u1");
        let b = bridge(t.clone(), 3);

        let failure = b.deliver(&started("u1")).await.unwrap_err();
        assert_eq!(failure.attempts, 3);
        assert_eq!(failure.event_kind, "agent_started");
        assert_eq!(t.errors_for("u1").len(), 1);

        b.deliver(&started("u2")).await.unwrap();
        assert!(t.errors_for("u2").is_empty());
        assert_eq!(t.events_to("u2").len(), 1);
        assert_eq!(b.stats().failed, 1);
    }

    #[tokio::test]
    async fn thread_route_targets_thread() {
        let t = Arc::new(RecordingTransport::new());
        let b = EventBridge::with_policy(t.clone(), RetryPolicy::immediate(1), DeliveryRoute::Thread);
        b.deliver(&started("u1")).await.unwrap();
        assert!(t.messages_to("u1").is_empty());
        assert_eq!(t.messages_to("t1").len(), 1);
    }
}
