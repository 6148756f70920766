//! Factory counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Which public method asked for a dispatcher.  All of them share one
/// creation path; this only labels the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryPoint {
    ForRequest,
    Scoped,
    LegacyForUser,
    LegacyRequestScoped,
}

impl EntryPoint {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ForRequest => "create_for_request",
            Self::Scoped => "create_scoped",
            Self::LegacyForUser => "create_for_user",
            Self::LegacyRequestScoped => "create_request_scoped",
        }
    }
}

#[derive(Debug, Default)]
pub struct FactoryMetrics {
    created_for_request: AtomicU64,
    created_scoped: AtomicU64,
    created_legacy_for_user: AtomicU64,
    created_legacy_request_scoped: AtomicU64,
    released: AtomicU64,
    limit_rejections: AtomicU64,
    validation_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FactoryMetricsSnapshot {
    pub created: u64,
    pub active: u64,
    pub released: u64,
    pub limit_rejections: u64,
    pub validation_failures: u64,
    pub created_for_request: u64,
    pub created_scoped: u64,
    pub created_legacy_for_user: u64,
    pub created_legacy_request_scoped: u64,
}

impl FactoryMetrics {
    pub fn record_created(&self, entry: EntryPoint) {
        let counter = match entry {
            EntryPoint::ForRequest => &self.created_for_request,
            EntryPoint::Scoped => &self.created_scoped,
            EntryPoint::LegacyForUser => &self.created_legacy_for_user,
            EntryPoint::LegacyRequestScoped => &self.created_legacy_request_scoped,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_released(&self) {
        self.released.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_limit_rejection(&self) {
        self.limit_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_validation_failure(&self) {
        self.validation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> FactoryMetricsSnapshot {
        let created_for_request = self.created_for_request.load(Ordering::Relaxed);
        let created_scoped = self.created_scoped.load(Ordering::Relaxed);
        let created_legacy_for_user = self.created_legacy_for_user.load(Ordering::Relaxed);
        let created_legacy_request_scoped =
            self.created_legacy_request_scoped.load(Ordering::Relaxed);
        let created = created_for_request
            + created_scoped
            + created_legacy_for_user
            + created_legacy_request_scoped;
        let released = self.released.load(Ordering::Relaxed);

        FactoryMetricsSnapshot {
            created,
            active: created.saturating_sub(released),
            released,
            limit_rejections: self.limit_rejections.load(Ordering::Relaxed),
            validation_failures: self.validation_failures.load(Ordering::Relaxed),
            created_for_request,
            created_scoped,
            created_legacy_for_user,
            created_legacy_request_scoped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_totals_entry_points() {
        let m = FactoryMetrics::default();
        m.record_created(EntryPoint::ForRequest);
        m.record_created(EntryPoint::Scoped);
        m.record_created(EntryPoint::LegacyForUser);
        m.record_released();

        let s = m.snapshot();
        assert_eq!(s.created, 3);
        assert_eq!(s.active, 2);
        assert_eq!(s.created_legacy_for_user, 1);
        assert_eq!(s.created_legacy_request_scoped, 0);
    }
}
