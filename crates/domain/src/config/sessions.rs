use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Per-user and fleet-wide thresholds used by session health reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Agent count above which a user's session is reported as `warning`.
    #[serde(default = "d_agent_warning")]
    pub agent_warning_threshold: usize,

    /// Hard per-user agent cap.  Above it the session is reported as
    /// `error` and the sweeper evicts least-recently-used agents.
    #[serde(default = "d_max_agents")]
    pub max_agents_per_user: usize,

    /// Seconds without activity after which a session counts as idle.
    #[serde(default = "d_session_idle")]
    pub session_idle_secs: u64,

    /// Fleet-wide user count that signals system overload.
    #[serde(default = "d_fleet_users")]
    pub fleet_max_users: usize,

    /// Fleet-wide agent count that signals system overload.
    #[serde(default = "d_fleet_agents")]
    pub fleet_max_agents: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            agent_warning_threshold: d_agent_warning(),
            max_agents_per_user: d_max_agents(),
            session_idle_secs: d_session_idle(),
            fleet_max_users: d_fleet_users(),
            fleet_max_agents: d_fleet_agents(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Lifecycle sweeper
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Background sweeper schedule and eviction rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Run the sweeper at all.
    #[serde(default = "d_true")]
    pub enabled: bool,

    /// Seconds between sweeps.
    #[serde(default = "d_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Agents unused for this many seconds are removed from their session.
    /// `0` disables per-agent idle eviction.
    #[serde(default = "d_agent_idle")]
    pub agent_idle_secs: u64,

    /// Drop whole sessions that exceeded `registry.session_idle_secs`.
    #[serde(default = "d_true")]
    pub evict_idle_sessions: bool,

    /// Empty the whole registry when the fleet report signals overload.
    #[serde(default = "d_true")]
    pub emergency_cleanup: bool,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sweep_interval_secs: d_sweep_interval(),
            agent_idle_secs: d_agent_idle(),
            evict_idle_sessions: true,
            emergency_cleanup: true,
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_agent_warning() -> usize {
    50
}
fn d_max_agents() -> usize {
    100
}
fn d_session_idle() -> u64 {
    1800
}
fn d_fleet_users() -> usize {
    10_000
}
fn d_fleet_agents() -> usize {
    100_000
}
fn d_sweep_interval() -> u64 {
    60
}
fn d_agent_idle() -> u64 {
    900
}
fn d_true() -> bool {
    true
}
