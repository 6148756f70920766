//! Lifecycle event delivery for Runfence.
//!
//! Events flow `AgentEventEmitter -> EventBridge -> Transport`.  The emitter
//! is bound to one user/thread/run and enforces the per-agent ordering
//! protocol; the bridge retries transient transport failures; the
//! [`EventSequenceValidator`] checks a recorded stream after the fact.

pub mod backoff;
pub mod bridge;
pub mod emitter;
pub mod memory;
pub mod ordering;
pub mod transport;
pub mod validator;

pub use backoff::{jitter_seed, RetryPolicy};
pub use bridge::{DeliveryStats, DeliveryStatsSnapshot, EventBridge};
pub use emitter::{AgentEventEmitter, EmitError};
pub use memory::RecordingTransport;
pub use ordering::{OrderViolation, SequenceTracker};
pub use transport::Transport;
pub use validator::{ContentError, EventSequenceValidator, SequenceReport};
