use crate::tool::ToolError;

/// Shared error type used across all Runfence crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("validation: {0}")]
    Validation(#[from] ValidationError),

    #[error("user {user_id} has {active} active dispatchers (limit {limit})")]
    ResourceLimitExceeded {
        user_id: String,
        active: usize,
        limit: usize,
    },

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("tool {tool}: {source}")]
    Tool {
        tool: String,
        #[source]
        source: ToolError,
    },

    #[error("delivery: {0}")]
    Delivery(#[from] DeliveryFailure),

    #[error("dispatcher {0} is no longer active")]
    DispatcherInactive(String),

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("no session for user {0}")]
    SessionNotFound(String),

    #[error("config: {0}")]
    Config(String),

    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// A malformed or forbidden execution-context field.
///
/// Fatal to the single request that produced it; never retried.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} must not be empty")]
    EmptyField { field: &'static str },

    #[error("{field} uses forbidden placeholder value {value:?}")]
    PlaceholderValue { field: &'static str, value: String },

    #[error("{field} value {value:?} looks like a placeholder")]
    PlaceholderPattern { field: &'static str, value: String },

    #[error("{map} uses reserved key {key:?}")]
    ReservedKey { map: &'static str, key: String },

    #[error("operation depth {depth} exceeds maximum {max}")]
    DepthExceeded { depth: u32, max: u32 },

    #[error("{name} must not be empty")]
    EmptyArgument { name: &'static str },

    #[error("emitter bound to user {emitter_user} cannot serve user {context_user}")]
    EmitterMismatch {
        emitter_user: String,
        context_user: String,
    },
}

impl ValidationError {
    /// Name of the field or argument the error is about.
    pub fn field(&self) -> &str {
        match self {
            Self::EmptyField { field }
            | Self::PlaceholderValue { field, .. }
            | Self::PlaceholderPattern { field, .. } => field,
            Self::ReservedKey { map, .. } => map,
            Self::DepthExceeded { .. } => "operation_depth",
            Self::EmptyArgument { name } => name,
            Self::EmitterMismatch { .. } => "event_emitter",
        }
    }
}

/// An event could not be handed to the transport after all retries.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("delivery of {event_kind} to user {user_id} failed after {attempts} attempts: {reason}")]
pub struct DeliveryFailure {
    pub user_id: String,
    pub thread_id: String,
    pub event_kind: String,
    pub attempts: u32,
    pub reason: String,
}
