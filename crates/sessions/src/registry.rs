//! The `user_id -> Session` map.
//!
//! The outer map is only locked long enough to find or insert an
//! `Arc<Session>`; all agent mutation happens under the session's own lock.
//! The one exception is [`SessionRegistry::emergency_cleanup_all`], which
//! holds the write lock while it drains the map.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;

use rf_domain::config::RegistryConfig;
use rf_domain::error::{Error, Result};
use rf_domain::trace::TraceEvent;

use crate::health::{
    CleanupReport, CleanupStatus, EmergencyCleanupReport, FleetReport, HealthStatus,
    UserHealthReport,
};
use crate::session::Session;

pub struct SessionRegistry {
    config: RegistryConfig,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    // ── lookup ──────────────────────────────────────────────────────

    /// Return the user's session, creating it on first access.
    ///
    /// Concurrent callers for the same user always get the same instance.
    pub fn get_user_session(&self, user_id: &str) -> Result<Arc<Session>> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(Error::Validation(
                rf_domain::error::ValidationError::EmptyArgument { name: "user_id" },
            ));
        }

        // Fast path: read lock.
        if let Some(session) = self.sessions.read().get(user_id) {
            return Ok(session.clone());
        }

        // Slow path: another writer may have won the race, so use entry().
        let mut sessions = self.sessions.write();
        let mut created = false;
        let session = sessions
            .entry(user_id.to_owned())
            .or_insert_with(|| {
                created = true;
                Arc::new(Session::new(user_id))
            })
            .clone();
        drop(sessions);

        if created {
            tracing::debug!(user_id = %user_id, "session created");
            TraceEvent::SessionCreated {
                user_id: user_id.to_owned(),
            }
            .emit();
        }
        Ok(session)
    }

    /// Look up without creating.
    pub fn get_session(&self, user_id: &str) -> Option<Arc<Session>> {
        self.sessions.read().get(user_id).cloned()
    }

    pub fn user_count(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn total_agents(&self) -> usize {
        self.snapshot().iter().map(|s| s.agent_count()).sum()
    }

    /// Known user ids, sorted.
    pub fn user_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Clone the current session handles so callers can inspect them
    /// without holding the map lock.
    fn snapshot(&self) -> Vec<Arc<Session>> {
        self.sessions.read().values().cloned().collect()
    }

    // ── monitoring ──────────────────────────────────────────────────

    /// Health of one user's session, or `None` if the user has none.
    pub fn monitor_memory_usage(&self, user_id: &str) -> Option<UserHealthReport> {
        let session = self.get_session(user_id)?;
        Some(self.assess(&session))
    }

    pub(crate) fn assess(&self, session: &Session) -> UserHealthReport {
        let metrics = session.metrics(Utc::now());
        let mut status = HealthStatus::Healthy;
        let mut issues = Vec::new();

        if metrics.agent_count > self.config.max_agents_per_user {
            status = HealthStatus::Error;
            issues.push(format!(
                "agent count {} exceeds limit {}",
                metrics.agent_count, self.config.max_agents_per_user
            ));
        } else if metrics.agent_count > self.config.agent_warning_threshold {
            status = HealthStatus::Warning;
            issues.push(format!(
                "agent count {} above warning threshold {}",
                metrics.agent_count, self.config.agent_warning_threshold
            ));
        }

        if metrics.idle_secs >= 0 && metrics.idle_secs as u64 >= self.config.session_idle_secs {
            status = status.max(HealthStatus::Warning);
            issues.push(format!("session idle for {}s", metrics.idle_secs));
        }

        UserHealthReport {
            user_id: session.user_id().to_owned(),
            status,
            metrics,
            issues,
        }
    }

    /// Per-user reports plus fleet-wide pressure signals.
    pub fn monitor_all_users(&self) -> FleetReport {
        let sessions = self.snapshot();
        let mut users = BTreeMap::new();
        let mut total_agents = 0;

        for session in &sessions {
            let report = self.assess(session);
            total_agents += report.metrics.agent_count;
            users.insert(report.user_id.clone(), report);
        }

        let total_users = users.len();
        let mut global_issues = Vec::new();
        if total_users > self.config.fleet_max_users {
            global_issues.push(format!(
                "user count {total_users} exceeds fleet limit {}",
                self.config.fleet_max_users
            ));
        }
        if total_agents > self.config.fleet_max_agents {
            global_issues.push(format!(
                "agent count {total_agents} exceeds fleet limit {}",
                self.config.fleet_max_agents
            ));
        }

        FleetReport {
            total_users,
            total_agents,
            users,
            overloaded: !global_issues.is_empty(),
            global_issues,
            timestamp: Utc::now(),
        }
    }

    // ── cleanup ─────────────────────────────────────────────────────

    /// Remove one user's session and every agent in it.
    pub fn cleanup_user_session(&self, user_id: &str) -> CleanupReport {
        let removed = self.sessions.write().remove(user_id);
        let Some(session) = removed else {
            return CleanupReport {
                user_id: user_id.to_owned(),
                status: CleanupStatus::NotFound,
                cleaned_agents: 0,
            };
        };

        let cleaned_agents = session.clear();
        tracing::info!(user_id = %user_id, agents = cleaned_agents, "user session cleaned");
        TraceEvent::SessionCleaned {
            user_id: user_id.to_owned(),
            agents_cleaned: cleaned_agents,
        }
        .emit();

        CleanupReport {
            user_id: user_id.to_owned(),
            status: CleanupStatus::Cleaned,
            cleaned_agents,
        }
    }

    /// Remove a single agent.  Returns false if the user or agent is unknown.
    pub fn cleanup_agent_resources(&self, user_id: &str, agent_name: &str) -> bool {
        match self.get_session(user_id) {
            Some(session) => session.remove_agent(agent_name).is_some(),
            None => false,
        }
    }

    /// Drop a session only if it is still the instance the caller inspected.
    ///
    /// Used by the sweeper so a session recreated between inspection and
    /// eviction is left alone.
    pub(crate) fn evict_if_same(&self, user_id: &str, expected: &Arc<Session>) -> bool {
        let mut sessions = self.sessions.write();
        match sessions.get(user_id) {
            Some(current) if Arc::ptr_eq(current, expected) => {
                sessions.remove(user_id);
                true
            }
            _ => false,
        }
    }

    /// Empty the whole registry.
    ///
    /// Holds the map's write lock while draining, so new lookups stall
    /// briefly.  Dispatchers already holding an `Arc<Session>` keep it; their
    /// next lookup creates a fresh session.
    pub fn emergency_cleanup_all(&self) -> EmergencyCleanupReport {
        let drained: Vec<Arc<Session>> = {
            let mut sessions = self.sessions.write();
            sessions.drain().map(|(_, s)| s).collect()
        };

        let users_cleaned = drained.len();
        let agents_cleaned: usize = drained.iter().map(|s| s.clear()).sum();

        tracing::error!(
            users = users_cleaned,
            agents = agents_cleaned,
            "emergency cleanup emptied the session registry"
        );
        TraceEvent::EmergencyCleanup {
            users_cleaned,
            agents_cleaned,
        }
        .emit();

        EmergencyCleanupReport {
            users_cleaned,
            agents_cleaned,
            timestamp: Utc::now(),
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::AgentRecord;

    fn populate(registry: &SessionRegistry, users: usize, agents: usize) {
        for u in 0..users {
            let session = registry.get_user_session(&format!("user-{u}")).unwrap();
            for a in 0..agents {
                let name = format!("agent-{a}");
                session.register_agent(&name, AgentRecord::new(&name));
            }
        }
    }

    #[test]
    fn same_user_gets_same_session() {
        let registry = SessionRegistry::default();
        let a = registry.get_user_session("u1").unwrap();
        let b = registry.get_user_session("u1").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.user_count(), 1);
    }

    #[test]
    fn empty_user_id_rejected() {
        let registry = SessionRegistry::default();
        assert!(matches!(
            registry.get_user_session("  "),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn concurrent_lookups_observe_one_instance() {
        let registry = Arc::new(SessionRegistry::default());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.get_user_session("shared").unwrap())
            })
            .collect();

        let sessions: Vec<Arc<Session>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for s in &sessions[1..] {
            assert!(Arc::ptr_eq(&sessions[0], s));
        }
        assert_eq!(registry.user_count(), 1);
    }

    #[test]
    fn health_thresholds() {
        let registry = SessionRegistry::new(RegistryConfig {
            agent_warning_threshold: 2,
            max_agents_per_user: 4,
            ..RegistryConfig::default()
        });
        populate(&registry, 1, 2);
        let report = registry.monitor_memory_usage("user-0").unwrap();
        assert_eq!(report.status, HealthStatus::Healthy);
        assert!(report.issues.is_empty());

        let session = registry.get_session("user-0").unwrap();
        session.register_agent("extra", AgentRecord::new("extra"));
        assert_eq!(
            registry.monitor_memory_usage("user-0").unwrap().status,
            HealthStatus::Warning
        );

        session.register_agent("x1", AgentRecord::new("x1"));
        session.register_agent("x2", AgentRecord::new("x2"));
        let report = registry.monitor_memory_usage("user-0").unwrap();
        assert_eq!(report.status, HealthStatus::Error);
        assert_eq!(report.metrics.agent_count, 5);
        assert_eq!(report.issues.len(), 1);
    }

    #[test]
    fn unknown_user_has_no_report() {
        let registry = SessionRegistry::default();
        assert!(registry.monitor_memory_usage("nobody").is_none());
        assert_eq!(registry.user_count(), 0);
    }

    #[test]
    fn fleet_report_aggregates_and_flags_overload() {
        let registry = SessionRegistry::new(RegistryConfig {
            fleet_max_users: 2,
            fleet_max_agents: 100,
            ..RegistryConfig::default()
        });
        populate(&registry, 3, 2);

        let fleet = registry.monitor_all_users();
        assert_eq!(fleet.total_users, 3);
        assert_eq!(fleet.total_agents, 6);
        assert_eq!(fleet.users.len(), 3);
        assert!(fleet.overloaded);
        assert_eq!(fleet.global_issues.len(), 1);
        assert_eq!(fleet.unhealthy_users().count(), 0);
    }

    #[test]
    fn cleanup_user_session_leaves_others_alone() {
        let registry = SessionRegistry::default();
        populate(&registry, 2, 3);
        let other = registry.get_session("user-1").unwrap();

        let report = registry.cleanup_user_session("user-0");
        assert_eq!(report.status, CleanupStatus::Cleaned);
        assert_eq!(report.cleaned_agents, 3);
        assert!(registry.get_session("user-0").is_none());

        assert_eq!(other.agent_count(), 3);
        assert_eq!(
            other.agent_names(),
            vec!["agent-0".to_string(), "agent-1".into(), "agent-2".into()]
        );

        let again = registry.cleanup_user_session("user-0");
        assert_eq!(again.status, CleanupStatus::NotFound);
        assert_eq!(again.cleaned_agents, 0);
    }

    #[test]
    fn cleanup_user_session_under_concurrent_writes() {
        let registry = Arc::new(SessionRegistry::default());
        let b = registry.get_user_session("b").unwrap();
        for i in 0..10 {
            registry
                .get_user_session("a")
                .unwrap()
                .register_agent(&format!("a{i}"), AgentRecord::new("a"));
        }

        let writer = {
            let b = b.clone();
            std::thread::spawn(move || {
                for i in 0..200 {
                    b.register_agent(&format!("b{i}"), AgentRecord::new("b"));
                }
            })
        };
        let cleaner = {
            let registry = registry.clone();
            std::thread::spawn(move || registry.cleanup_user_session("a"))
        };

        let report = cleaner.join().unwrap();
        writer.join().unwrap();
        assert_eq!(report.cleaned_agents, 10);
        assert_eq!(b.agent_count(), 200);
        assert!(Arc::ptr_eq(&registry.get_session("b").unwrap(), &b));
    }

    #[test]
    fn cleanup_single_agent() {
        let registry = SessionRegistry::default();
        populate(&registry, 1, 2);
        assert!(registry.cleanup_agent_resources("user-0", "agent-1"));
        assert!(!registry.cleanup_agent_resources("user-0", "agent-1"));
        assert!(!registry.cleanup_agent_resources("nobody", "agent-0"));
        assert_eq!(registry.total_agents(), 1);
    }

    #[test]
    fn emergency_cleanup_counts_and_recovers() {
        let registry = SessionRegistry::default();
        populate(&registry, 4, 5);
        let held = registry.get_session("user-2").unwrap();

        let report = registry.emergency_cleanup_all();
        assert_eq!(report.users_cleaned, 4);
        assert_eq!(report.agents_cleaned, 20);
        assert_eq!(registry.user_count(), 0);

        for u in 0..4 {
            let fresh = registry.get_user_session(&format!("user-{u}")).unwrap();
            assert_eq!(fresh.agent_count(), 0);
        }
        // A handle taken before the cleanup is not the live session.
        assert!(!Arc::ptr_eq(&held, &registry.get_session("user-2").unwrap()));
    }

    #[test]
    fn evict_if_same_skips_recreated_session() {
        let registry = SessionRegistry::default();
        let first = registry.get_user_session("u1").unwrap();
        registry.cleanup_user_session("u1");
        let _second = registry.get_user_session("u1").unwrap();

        assert!(!registry.evict_if_same("u1", &first));
        assert_eq!(registry.user_count(), 1);
    }
}
