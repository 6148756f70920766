//! Background sweeper over the session registry.
//!
//! Each sweep builds a fleet report first.  When fleet-wide limits are
//! exceeded and emergency cleanup is enabled, the whole registry is emptied
//! and the sweep ends there.  Otherwise every user is visited in turn:
//! idle sessions are dropped, idle agents removed, and sessions above the
//! per-user cap trimmed by least-recent use.  A failure while visiting one
//! user is logged and recorded, and the sweep moves on to the next user.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use rf_domain::config::LifecycleConfig;
use rf_domain::error::Result;
use rf_domain::trace::TraceEvent;

use crate::health::{EmergencyCleanupReport, UserHealthReport};
use crate::registry::SessionRegistry;

/// Extra per-user check run during a sweep.  An `Err` (or a panic) is
/// recorded against that user only.
pub type UserCheck = Arc<dyn Fn(&UserHealthReport) -> Result<()> + Send + Sync>;

#[derive(Debug, Clone, Serialize)]
pub struct SweepError {
    pub user_id: String,
    pub message: String,
}

/// What one sweep did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub users_checked: usize,
    pub sessions_evicted: usize,
    pub agents_evicted: usize,
    pub errors: Vec<SweepError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emergency: Option<EmergencyCleanupReport>,
    pub duration_ms: u64,
}

#[derive(Default)]
struct UserOutcome {
    session_evicted: bool,
    agents_evicted: usize,
}

pub struct LifecycleManager {
    registry: Arc<SessionRegistry>,
    config: LifecycleConfig,
    user_check: Option<UserCheck>,
}

impl LifecycleManager {
    pub fn new(registry: Arc<SessionRegistry>, config: LifecycleConfig) -> Self {
        Self {
            registry,
            config,
            user_check: None,
        }
    }

    pub fn with_user_check(mut self, check: UserCheck) -> Self {
        self.user_check = Some(check);
        self
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.config.sweep_interval_secs.max(1))
    }

    /// Run one full sweep.
    pub fn sweep_once(&self) -> SweepReport {
        let started = Instant::now();
        let mut report = SweepReport::default();

        let fleet = self.registry.monitor_all_users();
        if fleet.overloaded {
            tracing::error!(
                total_users = fleet.total_users,
                total_agents = fleet.total_agents,
                issues = ?fleet.global_issues,
                "system overload detected"
            );
            if self.config.emergency_cleanup {
                report.users_checked = fleet.total_users;
                report.emergency = Some(self.registry.emergency_cleanup_all());
                return self.finish(report, started);
            }
        }

        for report_for_user in fleet.users.values() {
            report.users_checked += 1;
            let user_id = &report_for_user.user_id;

            let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
                self.sweep_user(report_for_user)
            }));
            match outcome {
                Ok(Ok(done)) => {
                    if done.session_evicted {
                        report.sessions_evicted += 1;
                    }
                    report.agents_evicted += done.agents_evicted;
                }
                Ok(Err(e)) => {
                    tracing::warn!(user_id = %user_id, error = %e, "sweep failed for user");
                    report.errors.push(SweepError {
                        user_id: user_id.clone(),
                        message: e.to_string(),
                    });
                }
                Err(_) => {
                    tracing::error!(user_id = %user_id, "sweep panicked for user");
                    report.errors.push(SweepError {
                        user_id: user_id.clone(),
                        message: "panicked".into(),
                    });
                }
            }
        }

        self.finish(report, started)
    }

    fn sweep_user(&self, health: &UserHealthReport) -> Result<UserOutcome> {
        let mut outcome = UserOutcome::default();

        // Removed since the fleet report was taken.
        let Some(session) = self.registry.get_session(&health.user_id) else {
            return Ok(outcome);
        };

        if let Some(check) = &self.user_check {
            check(health)?;
        }

        let registry_cfg = self.registry.config();
        let now = Utc::now();
        let idle_secs = session.metrics(now).idle_secs;

        if self.config.evict_idle_sessions
            && idle_secs >= 0
            && idle_secs as u64 >= registry_cfg.session_idle_secs
            && self.registry.evict_if_same(&health.user_id, &session)
        {
            outcome.session_evicted = true;
            outcome.agents_evicted = session.clear();
            tracing::info!(
                user_id = %health.user_id,
                idle_secs,
                agents = outcome.agents_evicted,
                "evicted idle session"
            );
            return Ok(outcome);
        }

        if self.config.agent_idle_secs > 0 {
            let max_idle = chrono::Duration::seconds(self.config.agent_idle_secs as i64);
            let evicted = session.evict_idle_agents(max_idle, now);
            if !evicted.is_empty() {
                tracing::debug!(user_id = %health.user_id, agents = ?evicted, "evicted idle agents");
            }
            outcome.agents_evicted += evicted.len();
        }

        let trimmed = session.evict_lru(registry_cfg.max_agents_per_user);
        if !trimmed.is_empty() {
            tracing::info!(
                user_id = %health.user_id,
                evicted = trimmed.len(),
                limit = registry_cfg.max_agents_per_user,
                "trimmed session to agent limit"
            );
        }
        outcome.agents_evicted += trimmed.len();

        Ok(outcome)
    }

    fn finish(&self, mut report: SweepReport, started: Instant) -> SweepReport {
        report.duration_ms = started.elapsed().as_millis() as u64;
        TraceEvent::SweepCompleted {
            users_checked: report.users_checked,
            sessions_evicted: report.sessions_evicted,
            agents_evicted: report.agents_evicted,
            errors: report.errors.len(),
            duration_ms: report.duration_ms,
        }
        .emit();
        report
    }

    /// Sweep on `sweep_interval_secs` until `shutdown` is cancelled.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval());
        // The first tick completes immediately.
        interval.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::debug!("lifecycle sweeper stopped");
                    return;
                }
                _ = interval.tick() => {
                    let report = self.sweep_once();
                    if !report.errors.is_empty() {
                        tracing::warn!(errors = report.errors.len(), "sweep finished with errors");
                    }
                }
            }
        }
    }
}
