use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Event delivery
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Retry and routing rules for handing events to the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Total send attempts per event, including the first.
    #[serde(default = "d_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (milliseconds).
    #[serde(default = "d_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Cap on the delay between retries (milliseconds).
    #[serde(default = "d_max_backoff")]
    pub max_backoff_ms: u64,

    /// Multiplier applied after each failed attempt.
    #[serde(default = "d_factor")]
    pub backoff_factor: f64,

    #[serde(default)]
    pub route: DeliveryRoute,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: d_attempts(),
            initial_backoff_ms: d_initial_backoff(),
            max_backoff_ms: d_max_backoff(),
            backoff_factor: d_factor(),
            route: DeliveryRoute::default(),
        }
    }
}

/// Which transport method carries lifecycle events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryRoute {
    /// `send_message(user_id, ..)`.
    #[default]
    User,
    /// `send_to_thread(thread_id, ..)`.
    Thread,
}

fn d_attempts() -> u32 {
    3
}
fn d_initial_backoff() -> u64 {
    100
}
fn d_max_backoff() -> u64 {
    2_000
}
fn d_factor() -> f64 {
    2.0
}
