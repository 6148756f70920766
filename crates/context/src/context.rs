use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use rf_domain::error::ValidationError;

use crate::storage::StorageHandle;
use crate::validation::{
    validate_identifier, validate_metadata_keys, MAX_OPERATION_DEPTH,
};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ExecutionContext
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Immutable identity and metadata for one in-flight request.
///
/// Built through [`ExecutionContext::builder`]; all fields are validated
/// once and exposed read-only.  Cloning deep-copies the metadata maps, so
/// two contexts never alias each other's `agent_context` or
/// `audit_metadata`.  The optional storage handle is shared, not copied.
#[derive(Clone)]
pub struct ExecutionContext {
    user_id: String,
    thread_id: String,
    run_id: String,
    request_id: String,
    operation_depth: u32,
    parent_request_id: Option<String>,
    websocket_client_id: Option<String>,
    agent_context: Map<String, Value>,
    audit_metadata: Map<String, Value>,
    created_at: DateTime<Utc>,
    storage_handle: Option<Arc<dyn StorageHandle>>,
}

impl ExecutionContext {
    pub fn builder(
        user_id: impl Into<String>,
        thread_id: impl Into<String>,
        run_id: impl Into<String>,
    ) -> ExecutionContextBuilder {
        ExecutionContextBuilder::new(user_id, thread_id, run_id)
    }

    /// Shorthand for a context with no metadata and a generated request ID.
    pub fn new(
        user_id: impl Into<String>,
        thread_id: impl Into<String>,
        run_id: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        Self::builder(user_id, thread_id, run_id).build()
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

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn operation_depth(&self) -> u32 {
        self.operation_depth
    }

    pub fn parent_request_id(&self) -> Option<&str> {
        self.parent_request_id.as_deref()
    }

    pub fn websocket_client_id(&self) -> Option<&str> {
        self.websocket_client_id.as_deref()
    }

    pub fn agent_context(&self) -> &Map<String, Value> {
        &self.agent_context
    }

    pub fn audit_metadata(&self) -> &Map<String, Value> {
        &self.audit_metadata
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn storage_handle(&self) -> Option<&Arc<dyn StorageHandle>> {
        self.storage_handle.as_ref()
    }

    pub fn has_storage_handle(&self) -> bool {
        self.storage_handle.is_some()
    }

    /// Convenience lookup of a string entry in `agent_context`.
    pub fn agent_context_str(&self, key: &str) -> Option<&str> {
        self.agent_context.get(key).and_then(Value::as_str)
    }

    // ── Derivations ─────────────────────────────────────────────────

    /// Derive a context for a nested operation.
    ///
    /// The child gets a fresh `request_id`, `operation_depth + 1`, and
    /// `parent_request_id` pointing at this context.  Metadata is copied and
    /// merged with the extras; the child records `operation_name` and
    /// `parent_operation` in its agent context.
    pub fn create_child_context(
        &self,
        operation_name: &str,
        extra_agent_context: Option<Map<String, Value>>,
        extra_audit_metadata: Option<Map<String, Value>>,
    ) -> Result<Self, ValidationError> {
        let operation_name = operation_name.trim();
        if operation_name.is_empty() {
            return Err(ValidationError::EmptyArgument {
                name: "operation_name",
            });
        }

        let depth = self.operation_depth + 1;
        if depth > MAX_OPERATION_DEPTH {
            return Err(ValidationError::DepthExceeded {
                depth,
                max: MAX_OPERATION_DEPTH,
            });
        }

        let parent_operation = self
            .agent_context_str("operation_name")
            .unwrap_or("root")
            .to_owned();

        let mut agent_context = self.agent_context.clone();
        agent_context.extend(extra_agent_context.unwrap_or_default());
        agent_context.insert("operation_name".into(), Value::from(operation_name));
        agent_context.insert("parent_operation".into(), Value::from(parent_operation));

        let mut audit_metadata = self.audit_metadata.clone();
        audit_metadata.extend(extra_audit_metadata.unwrap_or_default());
        audit_metadata.insert("spawned_by_operation".into(), Value::from(operation_name));

        let mut builder = Self::builder(&self.user_id, &self.thread_id, &self.run_id)
            .agent_context(agent_context)
            .audit_metadata(audit_metadata);
        builder.operation_depth = depth;
        builder.parent_request_id = Some(self.request_id.clone());
        builder.websocket_client_id = self.websocket_client_id.clone();
        builder.storage_handle = self.storage_handle.clone();

        let child = builder.build()?;
        tracing::debug!(
            correlation_id = %child.correlation_id(),
            parent_request_id = %self.request_id,
            operation = %operation_name,
            depth,
            "child context created"
        );
        Ok(child)
    }

    /// Return a copy of this context carrying `handle`.
    pub fn with_storage_handle(&self, handle: Arc<dyn StorageHandle>) -> Self {
        let mut next = self.clone();
        next.storage_handle = Some(handle);
        next
    }

    /// Return a copy of this context bound to a client connection.
    pub fn with_websocket_connection(&self, client_id: &str) -> Result<Self, ValidationError> {
        let client_id = client_id.trim();
        if client_id.is_empty() {
            return Err(ValidationError::EmptyArgument {
                name: "websocket_client_id",
            });
        }
        let mut next = self.clone();
        next.websocket_client_id = Some(client_id.to_owned());
        Ok(next)
    }

    // ── Introspection ───────────────────────────────────────────────

    /// Heuristic check that the context's own identifiers are distinct.
    ///
    /// Never fails; duplicated identifiers usually mean a caller copied one
    /// ID into several fields, so each pair is logged as a warning.
    pub fn verify_isolation(&self) -> IsolationCheck {
        let ids: [(&'static str, &str); 4] = [
            ("user_id", self.user_id.as_str()),
            ("thread_id", self.thread_id.as_str()),
            ("run_id", self.run_id.as_str()),
            ("request_id", self.request_id.as_str()),
        ];

        let mut duplicates = Vec::new();
        for (i, (a_name, a_val)) in ids.iter().enumerate() {
            for (b_name, b_val) in &ids[i + 1..] {
                if a_val == b_val {
                    duplicates.push((*a_name, *b_name));
                }
            }
        }

        if !duplicates.is_empty() {
            tracing::warn!(
                correlation_id = %self.correlation_id(),
                duplicates = ?duplicates,
                "isolation violation: context identifiers are not distinct"
            );
        }

        IsolationCheck { duplicates }
    }

    /// Short, deterministic ID for log correlation.
    pub fn correlation_id(&self) -> String {
        [
            &self.user_id,
            &self.thread_id,
            &self.run_id,
            &self.request_id,
        ]
        .iter()
        .map(|id| id.chars().take(8).collect::<String>())
        .collect::<Vec<_>>()
        .join(":")
    }

    /// Serialize all fields.  The storage handle is reported only as a flag.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(ContextSnapshot {
            user_id: &self.user_id,
            thread_id: &self.thread_id,
            run_id: &self.run_id,
            request_id: &self.request_id,
            operation_depth: self.operation_depth,
            parent_request_id: self.parent_request_id.as_deref(),
            websocket_client_id: self.websocket_client_id.as_deref(),
            agent_context: &self.agent_context,
            audit_metadata: &self.audit_metadata,
            created_at: self.created_at,
            has_storage_handle: self.has_storage_handle(),
        })
        .unwrap_or(Value::Null)
    }

    /// Compliance-oriented view of the context.
    pub fn audit_trail(&self) -> AuditTrail {
        AuditTrail {
            correlation_id: self.correlation_id(),
            user_id: self.user_id.clone(),
            thread_id: self.thread_id.clone(),
            run_id: self.run_id.clone(),
            request_id: self.request_id.clone(),
            operation_depth: self.operation_depth,
            parent_request_id: self.parent_request_id.clone(),
            has_websocket_connection: self.websocket_client_id.is_some(),
            has_storage_handle: self.has_storage_handle(),
            created_at: self.created_at,
            context_age_ms: Utc::now()
                .signed_duration_since(self.created_at)
                .num_milliseconds()
                .max(0) as u64,
            audit_metadata: self.audit_metadata.clone(),
        }
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("user_id", &self.user_id)
            .field("thread_id", &self.thread_id)
            .field("run_id", &self.run_id)
            .field("request_id", &self.request_id)
            .field("operation_depth", &self.operation_depth)
            .field("parent_request_id", &self.parent_request_id)
            .field("websocket_client_id", &self.websocket_client_id)
            .field("has_storage_handle", &self.has_storage_handle())
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct ContextSnapshot<'a> {
    user_id: &'a str,
    thread_id: &'a str,
    run_id: &'a str,
    request_id: &'a str,
    operation_depth: u32,
    parent_request_id: Option<&'a str>,
    websocket_client_id: Option<&'a str>,
    agent_context: &'a Map<String, Value>,
    audit_metadata: &'a Map<String, Value>,
    created_at: DateTime<Utc>,
    has_storage_handle: bool,
}

/// Result of [`ExecutionContext::verify_isolation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsolationCheck {
    /// Field pairs holding the same value.
    pub duplicates: Vec<(&'static str, &'static str)>,
}

impl IsolationCheck {
    pub fn is_clean(&self) -> bool {
        self.duplicates.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditTrail {
    pub correlation_id: String,
    pub user_id: String,
    pub thread_id: String,
    pub run_id: String,
    pub request_id: String,
    pub operation_depth: u32,
    pub parent_request_id: Option<String>,
    pub has_websocket_connection: bool,
    pub has_storage_handle: bool,
    pub created_at: DateTime<Utc>,
    pub context_age_ms: u64,
    pub audit_metadata: Map<String, Value>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Builder
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Fluent builder for [`ExecutionContext`].
///
/// ```rust
/// # use rf_context::ExecutionContext;
/// let ctx = ExecutionContext::builder("u1", "t1", "r1")
///     .websocket_client_id("ws-42")
///     .agent_value("agent_name", "data_agent".into())
///     .build()
///     .unwrap();
/// assert_eq!(ctx.operation_depth(), 0);
/// ```
pub struct ExecutionContextBuilder {
    user_id: String,
    thread_id: String,
    run_id: String,
    request_id: Option<String>,
    operation_depth: u32,
    parent_request_id: Option<String>,
    websocket_client_id: Option<String>,
    agent_context: Map<String, Value>,
    audit_metadata: Map<String, Value>,
    storage_handle: Option<Arc<dyn StorageHandle>>,
}

impl ExecutionContextBuilder {
    fn new(
        user_id: impl Into<String>,
        thread_id: impl Into<String>,
        run_id: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            thread_id: thread_id.into(),
            run_id: run_id.into(),
            request_id: None,
            operation_depth: 0,
            parent_request_id: None,
            websocket_client_id: None,
            agent_context: Map::new(),
            audit_metadata: Map::new(),
            storage_handle: None,
        }
    }

    /// Use a caller-supplied request ID instead of a generated one.
    pub fn request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn websocket_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.websocket_client_id = Some(client_id.into());
        self
    }

    /// Replace the agent context.  The map is moved in, so the caller's
    /// copy can never alias the context's.
    pub fn agent_context(mut self, map: Map<String, Value>) -> Self {
        self.agent_context = map;
        self
    }

    pub fn agent_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.agent_context.insert(key.into(), value);
        self
    }

    pub fn audit_metadata(mut self, map: Map<String, Value>) -> Self {
        self.audit_metadata = map;
        self
    }

    pub fn audit_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.audit_metadata.insert(key.into(), value);
        self
    }

    pub fn storage_handle(mut self, handle: Arc<dyn StorageHandle>) -> Self {
        self.storage_handle = Some(handle);
        self
    }

    pub fn build(self) -> Result<ExecutionContext, ValidationError> {
        let user_id = validate_identifier("user_id", &self.user_id)?;
        let thread_id = validate_identifier("thread_id", &self.thread_id)?;
        let run_id = validate_identifier("run_id", &self.run_id)?;
        let request_id = match self.request_id {
            Some(id) => validate_identifier("request_id", &id)?,
            None => uuid::Uuid::new_v4().to_string(),
        };

        if self.operation_depth > MAX_OPERATION_DEPTH {
            return Err(ValidationError::DepthExceeded {
                depth: self.operation_depth,
                max: MAX_OPERATION_DEPTH,
            });
        }

        let websocket_client_id = match self.websocket_client_id {
            Some(id) if id.trim().is_empty() => {
                return Err(ValidationError::EmptyField {
                    field: "websocket_client_id",
                })
            }
            Some(id) => Some(id.trim().to_owned()),
            None => None,
        };

        validate_metadata_keys("agent_context", &self.agent_context)?;
        validate_metadata_keys("audit_metadata", &self.audit_metadata)?;

        Ok(ExecutionContext {
            user_id,
            thread_id,
            run_id,
            request_id,
            operation_depth: self.operation_depth,
            parent_request_id: self.parent_request_id,
            websocket_client_id,
            agent_context: self.agent_context,
            audit_metadata: self.audit_metadata,
            created_at: Utc::now(),
            storage_handle: self.storage_handle,
        })
    }
}
