//! Lifecycle events delivered to connected clients.
//!
//! Five kinds are business-critical and subject to the per-agent ordering
//! protocol; the auxiliary kinds carry connection and system notices.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    AgentStarted,
    AgentThinking,
    ToolExecuting,
    ToolCompleted,
    AgentCompleted,
    ConnectionReady,
    Error,
    SystemStatus,
}

impl EventKind {
    /// The five kinds every agent run is expected to produce.
    pub const CRITICAL: [EventKind; 5] = [
        EventKind::AgentStarted,
        EventKind::AgentThinking,
        EventKind::ToolExecuting,
        EventKind::ToolCompleted,
        EventKind::AgentCompleted,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::AgentStarted => "agent_started",
            Self::AgentThinking => "agent_thinking",
            Self::ToolExecuting => "tool_executing",
            Self::ToolCompleted => "tool_completed",
            Self::AgentCompleted => "agent_completed",
            Self::ConnectionReady => "connection_ready",
            Self::Error => "error",
            Self::SystemStatus => "system_status",
        }
    }

    pub fn is_critical(self) -> bool {
        Self::CRITICAL.contains(&self)
    }

    /// Kinds that must already have been seen for the same
    /// `(run_id, agent_name)` before this kind may be emitted.
    ///
    /// `tool_completed` additionally needs an open `tool_executing` for the
    /// same tool, which is tracked separately.
    pub fn prerequisites(self) -> &'static [EventKind] {
        match self {
            Self::AgentThinking => &[Self::AgentStarted],
            Self::ToolExecuting | Self::ToolCompleted | Self::AgentCompleted => {
                &[Self::AgentStarted, Self::AgentThinking]
            }
            _ => &[],
        }
    }

    pub fn is_tool_event(self) -> bool {
        matches!(self, Self::ToolExecuting | Self::ToolCompleted)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One lifecycle event, addressed to a single user and thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub user_id: String,
    pub thread_id: String,
    pub run_id: String,
    pub agent_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub payload: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl AgentEvent {
    pub fn new(
        kind: EventKind,
        user_id: impl Into<String>,
        thread_id: impl Into<String>,
        run_id: impl Into<String>,
        agent_name: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            user_id: user_id.into(),
            thread_id: thread_id.into(),
            run_id: run_id.into(),
            agent_name: agent_name.into(),
            tool_name: None,
            payload: Map::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_tool(mut self, tool_name: impl Into<String>) -> Self {
        self.tool_name = Some(tool_name.into());
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.payload.insert(key.into(), value);
        self
    }

    pub fn with_payload(mut self, payload: Map<String, Value>) -> Self {
        self.payload.extend(payload);
        self
    }

    /// The wire shape handed to the transport.
    pub fn to_message(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
