use async_trait::async_trait;
use serde_json::Value;

use rf_events::Transport;

/// Transport used by `serve` when no external delivery channel is wired in.
///
/// Every message is written to the structured log and reported as
/// delivered.
#[derive(Debug, Default)]
pub struct LogTransport;

#[async_trait]
impl Transport for LogTransport {
    async fn send_message(&self, user_id: &str, message: Value) -> bool {
        tracing::info!(user_id = %user_id, message = %message, "event delivered");
        true
    }

    async fn send_to_thread(&self, thread_id: &str, message: Value) -> bool {
        tracing::info!(thread_id = %thread_id, message = %message, "event delivered");
        true
    }

    async fn send_error(&self, user_id: &str, text: &str) -> bool {
        tracing::warn!(user_id = %user_id, text = %text, "error notice delivered");
        true
    }
}
