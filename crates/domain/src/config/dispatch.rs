use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request-scoped dispatchers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Concurrently active dispatchers allowed per user.
    #[serde(default = "d_max_dispatchers")]
    pub max_dispatchers_per_user: usize,

    /// Upper bound on a single tool execution (seconds).
    #[serde(default = "d_tool_timeout")]
    pub tool_timeout_secs: u64,

    /// Agent name used when the context's `agent_context` carries none.
    #[serde(default = "d_agent_name")]
    pub default_agent_name: String,

    /// How emitters react to out-of-order lifecycle events.
    #[serde(default)]
    pub ordering: OrderingMode,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_dispatchers_per_user: d_max_dispatchers(),
            tool_timeout_secs: d_tool_timeout(),
            default_agent_name: d_agent_name(),
            ordering: OrderingMode::default(),
        }
    }
}

/// Runtime ordering guard mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderingMode {
    /// No runtime checking.
    Off,
    /// Log violations and deliver anyway.
    #[default]
    Warn,
    /// Reject out-of-order events before they reach the transport.
    Strict,
}

fn d_max_dispatchers() -> usize {
    5
}
fn d_tool_timeout() -> u64 {
    120
}
fn d_agent_name() -> String {
    "assistant".into()
}
