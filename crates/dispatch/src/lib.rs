//! Request-scoped tool dispatchers for Runfence.
//!
//! [`DispatcherFactory::create_for_request`] is the single creation path:
//! it checks the per-user dispatcher cap, binds an event emitter, registers
//! a cancellation token and hands back a [`RequestScopedDispatcher`] that
//! belongs to exactly one request.  [`ScopedDispatcher`] runs `cleanup()`
//! when it goes out of scope.

pub mod cancel;
pub mod dispatcher;
pub mod factory;
pub mod limits;
pub mod metrics;
pub mod scoped;

pub use cancel::CancelRegistry;
pub use dispatcher::RequestScopedDispatcher;
pub use factory::DispatcherFactory;
pub use limits::DispatcherLimiter;
pub use metrics::{EntryPoint, FactoryMetrics, FactoryMetricsSnapshot};
pub use scoped::ScopedDispatcher;
