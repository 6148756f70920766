//! The single creation path for request-scoped dispatchers.

use std::sync::Arc;
use std::time::Duration;

use rf_context::ExecutionContext;
use rf_domain::config::DispatchConfig;
use rf_domain::error::{Result, ValidationError};
use rf_domain::tool::ToolRegistry;
use rf_domain::trace::TraceEvent;
use rf_events::{AgentEventEmitter, EventBridge};
use rf_sessions::SessionRegistry;

use crate::cancel::CancelRegistry;
use crate::dispatcher::{DispatcherParts, RequestScopedDispatcher};
use crate::limits::DispatcherLimiter;
use crate::metrics::{EntryPoint, FactoryMetrics, FactoryMetricsSnapshot};
use crate::scoped::ScopedDispatcher;

pub struct DispatcherFactory {
    config: DispatchConfig,
    registry: Arc<SessionRegistry>,
    bridge: Arc<EventBridge>,
    limiter: DispatcherLimiter,
    cancels: Arc<CancelRegistry>,
    metrics: Arc<FactoryMetrics>,
    default_tools: ToolRegistry,
}

impl DispatcherFactory {
    pub fn new(
        config: DispatchConfig,
        registry: Arc<SessionRegistry>,
        bridge: Arc<EventBridge>,
    ) -> Self {
        Self {
            limiter: DispatcherLimiter::new(config.max_dispatchers_per_user),
            config,
            registry,
            bridge,
            cancels: Arc::new(CancelRegistry::new()),
            metrics: Arc::new(FactoryMetrics::default()),
            default_tools: ToolRegistry::new(),
        }
    }

    /// Tools given to dispatchers created without an explicit registry.
    pub fn with_default_tools(mut self, tools: ToolRegistry) -> Self {
        self.default_tools = tools;
        self
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn bridge(&self) -> &Arc<EventBridge> {
        &self.bridge
    }

    // ── public entry points ─────────────────────────────────────────

    /// Build a dispatcher for one request.
    ///
    /// The caller owns cleanup; prefer [`create_scoped`](Self::create_scoped).
    pub fn create_for_request(
        &self,
        context: &ExecutionContext,
        tools: Option<ToolRegistry>,
        emitter: Option<Arc<AgentEventEmitter>>,
    ) -> Result<Arc<RequestScopedDispatcher>> {
        self.create(EntryPoint::ForRequest, context, tools, emitter)
    }

    /// Build a dispatcher whose cleanup runs when the returned guard drops.
    pub fn create_scoped(
        &self,
        context: &ExecutionContext,
        tools: Option<ToolRegistry>,
        emitter: Option<Arc<AgentEventEmitter>>,
    ) -> Result<ScopedDispatcher> {
        self.create(EntryPoint::Scoped, context, tools, emitter)
            .map(ScopedDispatcher::new)
    }

    #[deprecated(since = "0.1.0", note = "use create_for_request")]
    pub fn create_for_user(
        &self,
        context: &ExecutionContext,
        tools: Option<ToolRegistry>,
    ) -> Result<Arc<RequestScopedDispatcher>> {
        self.create(EntryPoint::LegacyForUser, context, tools, None)
    }

    #[deprecated(since = "0.1.0", note = "use create_for_request or create_scoped")]
    pub fn create_request_scoped(
        &self,
        context: &ExecutionContext,
        tools: Option<ToolRegistry>,
        emitter: Option<Arc<AgentEventEmitter>>,
    ) -> Result<Arc<RequestScopedDispatcher>> {
        self.create(EntryPoint::LegacyRequestScoped, context, tools, emitter)
    }

    // ── creation ────────────────────────────────────────────────────

    fn create(
        &self,
        entry: EntryPoint,
        context: &ExecutionContext,
        tools: Option<ToolRegistry>,
        emitter: Option<Arc<AgentEventEmitter>>,
    ) -> Result<Arc<RequestScopedDispatcher>> {
        let user_id = context.user_id();
        context.verify_isolation();

        if let Some(em) = &emitter {
            if em.user_id() != user_id {
                self.metrics.record_validation_failure();
                return Err(ValidationError::EmitterMismatch {
                    emitter_user: em.user_id().to_owned(),
                    context_user: user_id.to_owned(),
                }
                .into());
            }
        }

        let slot = match self.limiter.try_acquire(user_id) {
            Ok(slot) => slot,
            Err(e) => {
                self.metrics.record_limit_rejection();
                tracing::warn!(
                    user_id = %user_id,
                    limit = self.limiter.limit(),
                    correlation_id = %context.correlation_id(),
                    "dispatcher limit reached"
                );
                TraceEvent::DispatcherLimitHit {
                    user_id: user_id.to_owned(),
                    limit: self.limiter.limit(),
                }
                .emit();
                return Err(e);
            }
        };

        // Resolve (or recreate) the user's session before handing out the
        // dispatcher; the slot is released on the error path by drop.
        self.registry.get_user_session(user_id)?.touch();

        let (emitter, owns_emitter) = match emitter {
            Some(em) => (em, false),
            None => (
                Arc::new(AgentEventEmitter::new(
                    self.bridge.clone(),
                    user_id,
                    context.thread_id(),
                    context.run_id(),
                    self.config.ordering,
                )),
                true,
            ),
        };

        let agent_name = context
            .agent_context_str("agent_name")
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(self.config.default_agent_name.as_str())
            .to_owned();

        let cancel = self
            .cancels
            .register(context.request_id(), context.parent_request_id());

        let dispatcher = RequestScopedDispatcher::new(DispatcherParts {
            context: context.clone(),
            agent_name,
            tools: tools.unwrap_or_else(|| self.default_tools.clone()),
            emitter,
            owns_emitter,
            slot,
            cancel,
            tool_timeout: Duration::from_secs(self.config.tool_timeout_secs),
            registry: self.registry.clone(),
            cancels: self.cancels.clone(),
            metrics: self.metrics.clone(),
        });
        self.metrics.record_created(entry);

        let active_for_user = self.limiter.active_for_user(user_id);
        tracing::debug!(
            dispatcher_id = %dispatcher.dispatcher_id(),
            user_id = %user_id,
            run_id = %context.run_id(),
            correlation_id = %context.correlation_id(),
            entry_point = entry.as_str(),
            active_for_user,
            "dispatcher created"
        );
        TraceEvent::DispatcherCreated {
            dispatcher_id: dispatcher.dispatcher_id().to_owned(),
            user_id: user_id.to_owned(),
            run_id: context.run_id().to_owned(),
            entry_point: entry.as_str().to_owned(),
            active_for_user,
        }
        .emit();

        Ok(Arc::new(dispatcher))
    }

    // ── control & introspection ─────────────────────────────────────

    /// Cancel an in-flight request and every request spawned under it.
    /// Returns false if no dispatcher is registered for `request_id`.
    pub fn cancel_request(&self, request_id: &str) -> bool {
        let found = self.cancels.cancel(request_id);
        if found {
            tracing::info!(request_id = %request_id, "request cancelled");
        }
        found
    }

    pub fn active_for_user(&self, user_id: &str) -> usize {
        self.limiter.active_for_user(user_id)
    }

    pub fn metrics(&self) -> FactoryMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Forget slot bookkeeping for users with no active dispatcher.
    pub fn prune_idle(&self) {
        self.limiter.prune_idle();
    }
}

