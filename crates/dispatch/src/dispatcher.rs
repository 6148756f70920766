//! One isolated dispatcher per in-flight request.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::OwnedSemaphorePermit;
use tokio_util::sync::CancellationToken;

use rf_context::ExecutionContext;
use rf_domain::error::{Error, Result};
use rf_domain::event::EventKind;
use rf_domain::tool::{ToolContext, ToolError, ToolRegistry};
use rf_domain::trace::TraceEvent;
use rf_events::{AgentEventEmitter, EmitError};
use rf_sessions::{AgentRecord, SessionRegistry};

use crate::cancel::CancelRegistry;
use crate::metrics::FactoryMetrics;

/// Everything the factory hands to a new dispatcher.
pub(crate) struct DispatcherParts {
    pub context: ExecutionContext,
    pub agent_name: String,
    pub tools: ToolRegistry,
    pub emitter: Arc<AgentEventEmitter>,
    /// The factory built the emitter, so cleanup may detach it.
    pub owns_emitter: bool,
    pub slot: OwnedSemaphorePermit,
    pub cancel: CancellationToken,
    pub tool_timeout: Duration,
    pub registry: Arc<SessionRegistry>,
    pub cancels: Arc<CancelRegistry>,
    pub metrics: Arc<FactoryMetrics>,
}

pub struct RequestScopedDispatcher {
    dispatcher_id: String,
    created_at: DateTime<Utc>,
    started: Instant,
    context: ExecutionContext,
    agent_name: String,
    tools: ToolRegistry,
    emitter: Mutex<Option<Arc<AgentEventEmitter>>>,
    owns_emitter: bool,
    slot: Mutex<Option<OwnedSemaphorePermit>>,
    is_active: AtomicBool,
    /// Calls currently running; the emitter is detached after the last one.
    in_flight: AtomicUsize,
    cancel: CancellationToken,
    tool_timeout: Duration,
    registry: Arc<SessionRegistry>,
    cancels: Arc<CancelRegistry>,
    metrics: Arc<FactoryMetrics>,
}

impl RequestScopedDispatcher {
    pub(crate) fn new(parts: DispatcherParts) -> Self {
        Self {
            dispatcher_id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            started: Instant::now(),
            context: parts.context,
            agent_name: parts.agent_name,
            tools: parts.tools,
            emitter: Mutex::new(Some(parts.emitter)),
            owns_emitter: parts.owns_emitter,
            slot: Mutex::new(Some(parts.slot)),
            is_active: AtomicBool::new(true),
            in_flight: AtomicUsize::new(0),
            cancel: parts.cancel,
            tool_timeout: parts.tool_timeout,
            registry: parts.registry,
            cancels: parts.cancels,
            metrics: parts.metrics,
        }
    }

    pub fn dispatcher_id(&self) -> &str {
        &self.dispatcher_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    pub fn user_id(&self) -> &str {
        self.context.user_id()
    }

    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.tool_names()
    }

    pub fn is_active(&self) -> bool {
        self.is_active.load(Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// The bound emitter, until cleanup detaches it.
    pub fn emitter(&self) -> Option<Arc<AgentEventEmitter>> {
        self.emitter.lock().clone()
    }

    /// Admit one call, or fail if cleanup already ran.
    fn enter(&self) -> Result<InFlight<'_>> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let call = InFlight { dispatcher: self };
        if self.is_active.load(Ordering::SeqCst) {
            Ok(call)
        } else {
            Err(Error::DispatcherInactive(self.dispatcher_id.clone()))
        }
    }

    fn detach_emitter(&self) {
        if let Some(em) = self.emitter.lock().take() {
            if self.owns_emitter {
                em.detach();
            }
        }
    }

    fn log_emit(&self, kind: EventKind, outcome: std::result::Result<(), EmitError>) {
        if let Err(e) = outcome {
            tracing::warn!(
                dispatcher_id = %self.dispatcher_id,
                user_id = %self.context.user_id(),
                run_id = %self.context.run_id(),
                event_kind = %kind,
                error = %e,
                "event emission failed"
            );
        }
    }

    // ── agent lifecycle ─────────────────────────────────────────────

    /// Register the agent in the user's session and emit `agent_started`.
    ///
    /// The session is looked up again here, so a dispatcher that outlived an
    /// emergency cleanup registers into a fresh session.
    pub async fn start_agent(&self) -> Result<()> {
        let _call = self.enter()?;
        let session = self.registry.get_user_session(self.context.user_id())?;
        let record = AgentRecord::new(&self.agent_name)
            .for_run(self.context.run_id(), self.context.request_id())
            .with_metadata("dispatcher_id", Value::from(self.dispatcher_id.as_str()));
        session.register_agent(&self.agent_name, record);

        if let Some(em) = self.emitter() {
            let outcome = em.notify_agent_started(&self.agent_name).await;
            self.log_emit(EventKind::AgentStarted, outcome);
        }
        Ok(())
    }

    pub async fn think(&self, thought: &str) -> Result<()> {
        let _call = self.enter()?;
        if let Some(em) = self.emitter() {
            let outcome = em.notify_agent_thinking(&self.agent_name, thought).await;
            self.log_emit(EventKind::AgentThinking, outcome);
        }
        Ok(())
    }

    pub async fn complete_agent(&self, result: &Value) -> Result<()> {
        let _call = self.enter()?;
        if let Some(session) = self.registry.get_session(self.context.user_id()) {
            session.touch_agent(&self.agent_name);
        }
        if let Some(em) = self.emitter() {
            let outcome = em.notify_agent_completed(&self.agent_name, result).await;
            self.log_emit(EventKind::AgentCompleted, outcome);
        }
        Ok(())
    }

    /// Send an `error` event for this dispatcher's agent.
    pub async fn report_error(&self, message: &str) -> Result<()> {
        let _call = self.enter()?;
        if let Some(em) = self.emitter() {
            let outcome = em.notify_error(&self.agent_name, message).await;
            self.log_emit(EventKind::Error, outcome);
        }
        Ok(())
    }

    // ── tools ───────────────────────────────────────────────────────

    /// Run a registered tool, bracketed by `tool_executing` and
    /// `tool_completed` events.
    ///
    /// The call is bounded by the configured tool timeout and stops early
    /// when the request is cancelled.  A panicking tool is reported as a
    /// failed tool.
    pub async fn dispatch(&self, tool_name: &str, params: Value) -> Result<Value> {
        let _call = self.enter()?;
        let tool = self
            .tools
            .get(tool_name)
            .ok_or_else(|| Error::ToolNotFound(tool_name.to_owned()))?;
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled(self.context.request_id().to_owned()));
        }

        if let Some(session) = self.registry.get_session(self.context.user_id()) {
            session.touch_agent(&self.agent_name);
        }

        let emitter = self.emitter();
        if let Some(em) = &emitter {
            let outcome = em
                .notify_tool_executing(&self.agent_name, tool_name, &params)
                .await;
            self.log_emit(EventKind::ToolExecuting, outcome);
        }

        let ctx = ToolContext {
            request_id: self.context.request_id().to_owned(),
            user_id: self.context.user_id().to_owned(),
            run_id: self.context.run_id().to_owned(),
            agent_name: self.agent_name.clone(),
            tool_name: tool_name.to_owned(),
            cancel: self.cancel.child_token(),
        };

        let started = Instant::now();
        let call = AssertUnwindSafe(tool.execute(ctx, params)).catch_unwind();
        let outcome: std::result::Result<Value, ToolError> = tokio::select! {
            _ = self.cancel.cancelled() => {
                Err(ToolError::Cancelled("request cancelled".into()))
            }
            res = tokio::time::timeout(self.tool_timeout, call) => match res {
                Err(_) => Err(ToolError::Timeout(format!(
                    "exceeded {}s",
                    self.tool_timeout.as_secs()
                ))),
                Ok(Err(_panic)) => Err(ToolError::Failed("tool panicked".into())),
                Ok(Ok(result)) => result,
            },
        };

        tracing::debug!(
            dispatcher_id = %self.dispatcher_id,
            tool = %tool_name,
            ok = outcome.is_ok(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "tool dispatched"
        );

        if let Some(em) = &emitter {
            let reported = match &outcome {
                Ok(value) => em
                    .notify_tool_completed(&self.agent_name, tool_name, Ok(value))
                    .await,
                Err(e) => {
                    let message = e.to_string();
                    em.notify_tool_completed(&self.agent_name, tool_name, Err(message.as_str()))
                        .await
                }
            };
            self.log_emit(EventKind::ToolCompleted, reported);
        }

        match outcome {
            Ok(value) => Ok(value),
            Err(ToolError::Cancelled(_)) => {
                Err(Error::Cancelled(self.context.request_id().to_owned()))
            }
            Err(source) => Err(Error::Tool {
                tool: tool_name.to_owned(),
                source,
            }),
        }
    }

    // ── teardown ────────────────────────────────────────────────────

    /// Cancel in-flight calls, release the user's dispatcher slot and
    /// detach the emitter.
    ///
    /// A call still running gets to report its `tool_completed` (as
    /// cancelled) before the emitter is detached.  Safe to call any number
    /// of times; only the first call does work.
    pub fn cleanup(&self) {
        if !self.is_active.swap(false, Ordering::SeqCst) {
            return;
        }

        self.cancel.cancel();
        drop(self.slot.lock().take());
        if self.in_flight.load(Ordering::SeqCst) == 0 {
            self.detach_emitter();
        }
        self.cancels.remove(self.context.request_id());
        self.metrics.record_released();

        let lifetime_ms = self.started.elapsed().as_millis() as u64;
        tracing::debug!(
            dispatcher_id = %self.dispatcher_id,
            user_id = %self.context.user_id(),
            lifetime_ms,
            "dispatcher released"
        );
        TraceEvent::DispatcherReleased {
            dispatcher_id: self.dispatcher_id.clone(),
            user_id: self.context.user_id().to_owned(),
            lifetime_ms,
        }
        .emit();
    }
}

/// Marks one running call; the last call to finish after cleanup detaches
/// the emitter.
struct InFlight<'a> {
    dispatcher: &'a RequestScopedDispatcher,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let d = self.dispatcher;
        if d.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 && !d.is_active.load(Ordering::SeqCst) {
            d.detach_emitter();
        }
    }
}

impl Drop for RequestScopedDispatcher {
    fn drop(&mut self) {
        if self.is_active() {
            tracing::warn!(
                dispatcher_id = %self.dispatcher_id,
                user_id = %self.context.user_id(),
                "dispatcher dropped without cleanup"
            );
            self.cleanup();
        }
    }
}

impl std::fmt::Debug for RequestScopedDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestScopedDispatcher")
            .field("dispatcher_id", &self.dispatcher_id)
            .field("user_id", &self.context.user_id())
            .field("agent_name", &self.agent_name)
            .field("tools", &self.tools.tool_names())
            .field("is_active", &self.is_active())
            .finish()
    }
}
