use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use rf_domain::config::Config;
use rf_dispatch::DispatcherFactory;
use rf_events::{EventBridge, Transport};
use rf_sessions::{LifecycleManager, SessionRegistry};

/// Shared application root.
///
/// Owns the single session registry and dispatcher factory for the
/// process; everything user-scoped hangs off those two.
#[derive(Clone)]
pub struct AppState {
    // ── Core ──────────────────────────────────────────────────────────
    pub config: Arc<Config>,
    pub config_path: String,

    // ── Sessions ──────────────────────────────────────────────────────
    pub registry: Arc<SessionRegistry>,
    pub lifecycle: Arc<LifecycleManager>,

    // ── Delivery & dispatch ───────────────────────────────────────────
    pub transport: Arc<dyn Transport>,
    pub bridge: Arc<EventBridge>,
    pub factory: Arc<DispatcherFactory>,

    /// Cancelled on shutdown; background loops select on it.
    pub shutdown: CancellationToken,
}
