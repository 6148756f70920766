//! Per-request event emitter.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};

use rf_domain::config::OrderingMode;
use rf_domain::error::DeliveryFailure;
use rf_domain::event::{AgentEvent, EventKind};

use crate::bridge::EventBridge;
use crate::ordering::{OrderViolation, SequenceTracker};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EmitError {
    #[error("emitter is detached")]
    Detached,

    #[error("emitter for user {expected} cannot send events for user {actual}")]
    WrongUser { expected: String, actual: String },

    #[error("out of order: {0}")]
    OutOfOrder(#[from] OrderViolation),

    #[error(transparent)]
    Delivery(#[from] DeliveryFailure),
}

/// Emits lifecycle events for one user, thread and run.
///
/// Owned by a single dispatcher.  Once [`detach`](Self::detach) is called
/// every further emit fails with [`EmitError::Detached`].
pub struct AgentEventEmitter {
    user_id: String,
    thread_id: String,
    run_id: String,
    bridge: Arc<EventBridge>,
    ordering: OrderingMode,
    tracker: Mutex<SequenceTracker>,
    detached: AtomicBool,
}

impl AgentEventEmitter {
    pub fn new(
        bridge: Arc<EventBridge>,
        user_id: impl Into<String>,
        thread_id: impl Into<String>,
        run_id: impl Into<String>,
        ordering: OrderingMode,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            thread_id: thread_id.into(),
            run_id: run_id.into(),
            bridge,
            ordering,
            tracker: Mutex::new(SequenceTracker::new()),
            detached: AtomicBool::new(false),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Acquire)
    }

    /// Stop accepting events.  Idempotent.
    pub fn detach(&self) {
        self.detached.store(true, Ordering::Release);
    }

    fn event(&self, kind: EventKind, agent_name: &str) -> AgentEvent {
        AgentEvent::new(kind, &self.user_id, &self.thread_id, &self.run_id, agent_name)
    }

    /// Send an already-built event.
    pub async fn emit(&self, event: AgentEvent) -> Result<(), EmitError> {
        if self.is_detached() {
            return Err(EmitError::Detached);
        }
        if event.user_id != self.user_id {
            return Err(EmitError::WrongUser {
                expected: self.user_id.clone(),
                actual: event.user_id,
            });
        }

        match self.ordering {
            OrderingMode::Off => {}
            OrderingMode::Warn => {
                let verdict = self.tracker.lock().check(&event);
                if let Err(v) = verdict {
                    tracing::warn!(
                        user_id = %self.user_id,
                        run_id = %v.run_id,
                        agent_name = %v.agent_name,
                        event_kind = %v.kind,
                        missing = ?v.missing,
                        "lifecycle event out of order"
                    );
                }
            }
            OrderingMode::Strict => self.tracker.lock().check(&event)?,
        }

        self.bridge.deliver(&event).await?;

        // Only delivered events count towards later prerequisites.
        if self.ordering != OrderingMode::Off {
            self.tracker.lock().record(&event);
        }
        Ok(())
    }

    pub async fn notify_agent_started(&self, agent_name: &str) -> Result<(), EmitError> {
        self.emit(self.event(EventKind::AgentStarted, agent_name))
            .await
    }

    pub async fn notify_agent_thinking(
        &self,
        agent_name: &str,
        thought: &str,
    ) -> Result<(), EmitError> {
        self.emit(
            self.event(EventKind::AgentThinking, agent_name)
                .with_field("thought", Value::from(thought)),
        )
        .await
    }

    pub async fn notify_tool_executing(
        &self,
        agent_name: &str,
        tool_name: &str,
        params: &Value,
    ) -> Result<(), EmitError> {
        self.emit(
            self.event(EventKind::ToolExecuting, agent_name)
                .with_tool(tool_name)
                .with_field("params", params.clone()),
        )
        .await
    }

    /// `result` is the tool's output on success or an error description.
    pub async fn notify_tool_completed(
        &self,
        agent_name: &str,
        tool_name: &str,
        result: std::result::Result<&Value, &str>,
    ) -> Result<(), EmitError> {
        let event = self.event(EventKind::ToolCompleted, agent_name).with_tool(tool_name);
        let event = match result {
            Ok(value) => event
                .with_field("status", json!("success"))
                .with_field("result", value.clone()),
            Err(message) => event
                .with_field("status", json!("error"))
                .with_field("error", Value::from(message)),
        };
        self.emit(event).await
    }

    pub async fn notify_agent_completed(
        &self,
        agent_name: &str,
        result: &Value,
    ) -> Result<(), EmitError> {
        self.emit(
            self.event(EventKind::AgentCompleted, agent_name)
                .with_field("result", result.clone()),
        )
        .await
    }

    pub async fn notify_error(&self, agent_name: &str, message: &str) -> Result<(), EmitError> {
        self.emit(
            self.event(EventKind::Error, agent_name)
                .with_field("message", Value::from(message)),
        )
        .await
    }
}

impl std::fmt::Debug for AgentEventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentEventEmitter")
            .field("user_id", &self.user_id)
            .field("thread_id", &self.thread_id)
            .field("run_id", &self.run_id)
            .field("ordering", &self.ordering)
            .field("detached", &self.is_detached())
            .finish()
    }
}
