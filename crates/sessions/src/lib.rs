//! Per-user agent sessions for Runfence.
//!
//! The [`SessionRegistry`] owns one [`Session`] per user, created lazily on
//! first access and guarded per user.  The [`LifecycleManager`] sweeps the
//! registry on its own schedule: it reports per-user and fleet health,
//! evicts idle or over-limit state, and triggers emergency cleanup when the
//! fleet is overloaded.

pub mod health;
pub mod lifecycle;
pub mod registry;
pub mod session;

pub use health::{
    CleanupReport, CleanupStatus, EmergencyCleanupReport, FleetReport, HealthStatus,
    UserHealthReport,
};
pub use lifecycle::{LifecycleManager, SweepError, SweepReport, UserCheck};
pub use registry::SessionRegistry;
pub use session::{AgentRecord, Session, SessionMetrics};
