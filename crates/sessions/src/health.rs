//! Health and cleanup reports produced by the session registry.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::session::SessionMetrics;

/// Coarse health of one user's session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Error,
}

impl HealthStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of `monitor_memory_usage` for one user.
#[derive(Debug, Clone, Serialize)]
pub struct UserHealthReport {
    pub user_id: String,
    pub status: HealthStatus,
    pub metrics: SessionMetrics,
    pub issues: Vec<String>,
}

/// Aggregate of every user's health plus fleet-wide pressure signals.
#[derive(Debug, Clone, Serialize)]
pub struct FleetReport {
    pub total_users: usize,
    pub total_agents: usize,
    pub users: BTreeMap<String, UserHealthReport>,
    pub global_issues: Vec<String>,
    /// Fleet-wide limits were exceeded.
    pub overloaded: bool,
    pub timestamp: DateTime<Utc>,
}

impl FleetReport {
    /// Users whose status is not healthy.
    pub fn unhealthy_users(&self) -> impl Iterator<Item = &UserHealthReport> {
        self.users
            .values()
            .filter(|r| r.status != HealthStatus::Healthy)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupStatus {
    Cleaned,
    NotFound,
}

/// Result of `cleanup_user_session`.
#[derive(Debug, Clone, Serialize)]
pub struct CleanupReport {
    pub user_id: String,
    pub status: CleanupStatus,
    pub cleaned_agents: usize,
}

/// Result of `emergency_cleanup_all`.
#[derive(Debug, Clone, Serialize)]
pub struct EmergencyCleanupReport {
    pub users_cleaned: usize,
    pub agents_cleaned: usize,
    pub timestamp: DateTime<Utc>,
}
