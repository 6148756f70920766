//! In-memory transport that records everything it is asked to send.
//!
//! Used by the `demo` command and by tests.  Failures can be injected per
//! target so retry and isolation behaviour can be exercised.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde_json::Value;

use rf_domain::event::AgentEvent;

use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    User,
    Thread,
}

#[derive(Debug, Clone)]
pub struct Recorded {
    pub route: Route,
    /// `user_id` or `thread_id` depending on `route`.
    pub target: String,
    pub message: Value,
}

#[derive(Default)]
struct Inner {
    sent: Vec<Recorded>,
    errors: Vec<(String, String)>,
    /// Remaining forced failures per target.
    fail_next: HashMap<String, u32>,
    attempts: HashMap<String, u32>,
}

#[derive(Default)]
pub struct RecordingTransport {
    inner: Mutex<Inner>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` sends to `target` report failure.
    pub fn fail_next(&self, target: &str, n: u32) {
        self.inner.lock().fail_next.insert(target.to_owned(), n);
    }

    /// Make every send to `target` fail until [`heal`](Self::heal) is called.
    pub fn fail_always(&self, target: &str) {
        self.fail_next(target, u32::MAX);
    }

    pub fn heal(&self, target: &str) {
        self.inner.lock().fail_next.remove(target);
    }

    /// Messages successfully sent to `target`, in order.
    pub fn messages_to(&self, target: &str) -> Vec<Value> {
        self.inner
            .lock()
            .sent
            .iter()
            .filter(|r| r.target == target)
            .map(|r| r.message.clone())
            .collect()
    }

    /// Successfully sent messages decoded back into events.  Messages that
    /// are not lifecycle events are skipped.
    pub fn events_to(&self, target: &str) -> Vec<AgentEvent> {
        self.messages_to(target)
            .into_iter()
            .filter_map(|m| serde_json::from_value(m).ok())
            .collect()
    }

    pub fn all_sent(&self) -> Vec<Recorded> {
        self.inner.lock().sent.clone()
    }

    /// Error notices sent to `user_id`.
    pub fn errors_for(&self, user_id: &str) -> Vec<String> {
        self.inner
            .lock()
            .errors
            .iter()
            .filter(|(u, _)| u == user_id)
            .map(|(_, text)| text.clone())
            .collect()
    }

    /// Send attempts against `target`, failed ones included.
    pub fn attempts_to(&self, target: &str) -> u32 {
        self.inner.lock().attempts.get(target).copied().unwrap_or(0)
    }

    fn record(&self, route: Route, target: &str, message: Value) -> bool {
        let mut inner = self.inner.lock();
        *inner.attempts.entry(target.to_owned()).or_default() += 1;

        if let Some(remaining) = inner.fail_next.get_mut(target) {
            if *remaining > 0 {
                if *remaining != u32::MAX {
                    *remaining -= 1;
                }
                return false;
            }
        }

        inner.sent.push(Recorded {
            route,
            target: target.to_owned(),
            message,
        });
        true
    }
}

#[async_trait::async_trait]
impl Transport for RecordingTransport {
    async fn send_message(&self, user_id: &str, message: Value) -> bool {
        self.record(Route::User, user_id, message)
    }

    async fn send_to_thread(&self, thread_id: &str, message: Value) -> bool {
        self.record(Route::Thread, thread_id, message)
    }

    async fn send_error(&self, user_id: &str, text: &str) -> bool {
        self.inner
            .lock()
            .errors
            .push((user_id.to_owned(), text.to_owned()));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn records_by_target() {
        let t = RecordingTransport::new();
        assert!(t.send_message("u1", json!({"n": 1})).await);
        assert!(t.send_to_thread("t9", json!({"n": 2})).await);
        assert_eq!(t.messages_to("u1"), vec![json!({"n": 1})]);
        assert_eq!(t.messages_to("t9").len(), 1);
        assert_eq!(t.all_sent()[1].route, Route::Thread);
    }

    #[tokio::test]
    async fn injected_failures_run_out() {
        let t = RecordingTransport::new();
        t.fail_next("u1", 2);
        assert!(!t.send_message("u1", json!(1)).await);
        assert!(!t.send_message("u1", json!(2)).await);
        assert!(t.send_message("u1", json!(3)).await);
        assert_eq!(t.attempts_to("u1"), 3);
        assert_eq!(t.messages_to("u1"), vec![json!(3)]);
        // Other users are unaffected.
        assert!(t.send_message("u2", json!(1)).await);
    }

    #[tokio::test]
    async fn fail_always_until_healed() {
        let t = RecordingTransport::new();
        t.fail_always("u1");
        for _ in 0..5 {
            assert!(!t.send_message("u1", json!(null)).await);
        }
        t.heal("u1");
        assert!(t.send_message("u1", json!(null)).await);
    }
}
