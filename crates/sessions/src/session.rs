//! One user's agent state.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agent record
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An agent instance registered in a user's session.
#[derive(Debug, Clone, Serialize)]
pub struct AgentRecord {
    pub agent_name: String,
    /// The run that last used this agent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
}

impl AgentRecord {
    pub fn new(agent_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            agent_name: agent_name.into(),
            run_id: None,
            request_id: None,
            metadata: Map::new(),
            created_at: now,
            last_used: now,
        }
    }

    pub fn for_run(mut self, run_id: impl Into<String>, request_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Point-in-time metrics for one session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionMetrics {
    pub agent_count: usize,
    pub uptime_secs: i64,
    pub idle_secs: i64,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

struct SessionState {
    agents: HashMap<String, AgentRecord>,
    last_activity: DateTime<Utc>,
}

/// A user's agent session.
///
/// All mutation goes through a per-session lock, so operations on
/// different users never contend with each other.
pub struct Session {
    user_id: String,
    created_at: DateTime<Utc>,
    state: Mutex<SessionState>,
}

impl Session {
    pub fn new(user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.into(),
            created_at: now,
            state: Mutex::new(SessionState {
                agents: HashMap::new(),
                last_activity: now,
            }),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.state.lock().last_activity
    }

    /// Record activity without changing any agent.
    pub fn touch(&self) {
        self.state.lock().last_activity = Utc::now();
    }

    /// Insert or replace an agent.  Returns the replaced record, if any.
    pub fn register_agent(&self, name: &str, record: AgentRecord) -> Option<AgentRecord> {
        let mut state = self.state.lock();
        state.last_activity = Utc::now();
        state.agents.insert(name.to_owned(), record)
    }

    pub fn get_agent(&self, name: &str) -> Option<AgentRecord> {
        self.state.lock().agents.get(name).cloned()
    }

    /// Mark an agent as used now.  Returns false if it is not registered.
    pub fn touch_agent(&self, name: &str) -> bool {
        let mut state = self.state.lock();
        let now = Utc::now();
        state.last_activity = now;
        match state.agents.get_mut(name) {
            Some(record) => {
                record.last_used = now;
                true
            }
            None => false,
        }
    }

    pub fn remove_agent(&self, name: &str) -> Option<AgentRecord> {
        self.state.lock().agents.remove(name)
    }

    pub fn agent_count(&self) -> usize {
        self.state.lock().agents.len()
    }

    /// Registered agent names, sorted.
    pub fn agent_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.lock().agents.keys().cloned().collect();
        names.sort();
        names
    }

    /// Drop every agent.  Returns how many were removed.
    pub fn clear(&self) -> usize {
        let mut state = self.state.lock();
        let n = state.agents.len();
        state.agents.clear();
        n
    }

    /// Remove agents not used for at least `max_idle`.  Returns their names.
    pub fn evict_idle_agents(&self, max_idle: chrono::Duration, now: DateTime<Utc>) -> Vec<String> {
        let mut state = self.state.lock();
        let stale: Vec<String> = state
            .agents
            .iter()
            .filter(|(_, r)| now.signed_duration_since(r.last_used) >= max_idle)
            .map(|(name, _)| name.clone())
            .collect();
        for name in &stale {
            state.agents.remove(name);
        }
        stale
    }

    /// Remove least-recently-used agents until at most `keep` remain.
    pub fn evict_lru(&self, keep: usize) -> Vec<String> {
        let mut state = self.state.lock();
        if state.agents.len() <= keep {
            return Vec::new();
        }
        let mut by_age: Vec<(DateTime<Utc>, String)> = state
            .agents
            .iter()
            .map(|(name, r)| (r.last_used, name.clone()))
            .collect();
        by_age.sort();

        let excess = state.agents.len() - keep;
        let evicted: Vec<String> = by_age.into_iter().take(excess).map(|(_, n)| n).collect();
        for name in &evicted {
            state.agents.remove(name);
        }
        evicted
    }

    pub fn metrics(&self, now: DateTime<Utc>) -> SessionMetrics {
        let state = self.state.lock();
        SessionMetrics {
            agent_count: state.agents.len(),
            uptime_secs: now.signed_duration_since(self.created_at).num_seconds(),
            idle_secs: now.signed_duration_since(state.last_activity).num_seconds(),
            created_at: self.created_at,
            last_activity: state.last_activity,
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("agents", &self.agent_count())
            .finish()
    }
}
