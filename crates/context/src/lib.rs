//! Per-request execution context.
//!
//! An [`ExecutionContext`] carries the identity (`user_id`, `thread_id`,
//! `run_id`, `request_id`) and free-form metadata of one in-flight request.
//! It is validated on construction and never mutated afterwards: every
//! "change" produces a new context.

pub mod context;
pub mod storage;
pub mod validation;

pub use context::{AuditTrail, ExecutionContext, ExecutionContextBuilder, IsolationCheck};
pub use storage::{with_storage_scope, StorageHandle};
pub use validation::{MAX_OPERATION_DEPTH, RESERVED_KEYS};
