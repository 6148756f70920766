use serde::Serialize;

/// Structured trace events emitted across all Runfence crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    SessionCreated {
        user_id: String,
    },
    SessionCleaned {
        user_id: String,
        agents_cleaned: usize,
    },
    EmergencyCleanup {
        users_cleaned: usize,
        agents_cleaned: usize,
    },
    SweepCompleted {
        users_checked: usize,
        sessions_evicted: usize,
        agents_evicted: usize,
        errors: usize,
        duration_ms: u64,
    },
    DispatcherCreated {
        dispatcher_id: String,
        user_id: String,
        run_id: String,
        entry_point: String,
        active_for_user: usize,
    },
    DispatcherReleased {
        dispatcher_id: String,
        user_id: String,
        lifetime_ms: u64,
    },
    DispatcherLimitHit {
        user_id: String,
        limit: usize,
    },
    DeliveryRetried {
        user_id: String,
        event_kind: String,
        attempt: u32,
        delay_ms: u64,
    },
    DeliveryFailed {
        user_id: String,
        thread_id: String,
        event_kind: String,
        attempts: u32,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "rf_event");
    }
}
