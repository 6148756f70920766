use serde_json::Value;

/// The connection layer that actually reaches clients.
///
/// Every method reports success as a plain `bool`; a `false` is treated as a
/// transient failure and retried by the bridge.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Send to every connection of `user_id`.
    async fn send_message(&self, user_id: &str, message: Value) -> bool;

    /// Send to the connections subscribed to `thread_id`.
    async fn send_to_thread(&self, thread_id: &str, message: Value) -> bool;

    /// Send a human-readable error notice to `user_id`.
    async fn send_error(&self, user_id: &str, text: &str) -> bool;
}
