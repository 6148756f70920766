//! Tool capability: a named, asynchronously invocable unit of work.
//!
//! Tool business logic lives outside Runfence; dispatchers only see the
//! [`Tool`] trait and a [`ToolRegistry`] mapping names to handlers.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Context provided to every tool invocation.
#[derive(Clone, Debug)]
pub struct ToolContext {
    pub request_id: String,
    pub user_id: String,
    pub run_id: String,
    pub agent_name: String,
    pub tool_name: String,
    /// Cancelled when the owning request is cancelled.
    pub cancel: CancellationToken,
}

/// Result type for tool handlers.
pub type ToolResult = Result<Value, ToolError>;

/// Errors a tool handler can return.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("invalid_args: {0}")]
    InvalidArgs(String),
    #[error("not_allowed: {0}")]
    NotAllowed(String),
    #[error("failed: {0}")]
    Failed(String),
    #[error("timeout: {0}")]
    Timeout(String),
    #[error("cancelled: {0}")]
    Cancelled(String),
}

/// Implement this trait to expose a tool to dispatchers.
///
/// ```rust,no_run
/// use rf_domain::tool::{Tool, ToolContext, ToolResult};
///
/// struct Ping;
///
/// #[async_trait::async_trait]
/// impl Tool for Ping {
///     async fn execute(&self, _ctx: ToolContext, _params: serde_json::Value) -> ToolResult {
///         Ok(serde_json::json!({ "pong": true }))
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait Tool: Send + Sync + 'static {
    async fn execute(&self, ctx: ToolContext, params: Value) -> ToolResult;
}

/// Adapter turning an async closure into a [`Tool`].
pub struct FnTool<F> {
    f: F,
}

#[async_trait::async_trait]
impl<F, Fut> Tool for FnTool<F>
where
    F: Fn(ToolContext, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ToolResult> + Send + 'static,
{
    async fn execute(&self, ctx: ToolContext, params: Value) -> ToolResult {
        (self.f)(ctx, params).await
    }
}

/// Name → handler mapping owned by a single dispatcher.
///
/// Names are normalized to lowercase so lookups are case-insensitive.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool under `name`.  Returns `&mut Self` for chaining.
    pub fn register<T: Tool>(&mut self, name: impl Into<String>, tool: T) -> &mut Self {
        self.tools
            .insert(name.into().to_ascii_lowercase(), Arc::new(tool));
        self
    }

    /// Register a pre-wrapped handler.
    pub fn register_shared(&mut self, name: impl Into<String>, tool: Arc<dyn Tool>) -> &mut Self {
        self.tools.insert(name.into().to_ascii_lowercase(), tool);
        self
    }

    /// Register an async closure as a tool.
    pub fn register_fn<F, Fut>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(ToolContext, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ToolResult> + Send + 'static,
    {
        self.register(name, FnTool { f })
    }

    /// Look up a handler by name (case-insensitive).
    pub fn get(&self, tool_name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(&tool_name.to_ascii_lowercase()).cloned()
    }

    /// All registered tool names, sorted.
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tool_names())
            .finish()
    }
}
