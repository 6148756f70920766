//! After-the-fact checks over a recorded event stream.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use rf_domain::event::{AgentEvent, EventKind};

use crate::ordering::{OrderViolation, SequenceTracker};

/// An event missing a field its kind requires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentError {
    /// Position in the validated stream.
    pub index: usize,
    pub kind: EventKind,
    pub field: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct SequenceReport {
    pub valid: bool,
    pub total_events: usize,
    pub received: BTreeMap<EventKind, usize>,
    pub missing_events: BTreeSet<EventKind>,
    /// Share of the critical kinds that appeared at least once, 0..=100.
    pub coverage_pct: f64,
    pub order_violations: Vec<OrderViolation>,
    pub content_errors: Vec<ContentError>,
}

impl SequenceReport {
    pub fn count(&self, kind: EventKind) -> usize {
        self.received.get(&kind).copied().unwrap_or(0)
    }
}

/// Stateless validator; every call starts from scratch.
#[derive(Debug, Default, Clone, Copy)]
pub struct EventSequenceValidator;

impl EventSequenceValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate(&self, events: &[AgentEvent]) -> SequenceReport {
        let mut received: BTreeMap<EventKind, usize> = BTreeMap::new();
        let mut tracker = SequenceTracker::new();
        let mut order_violations = Vec::new();
        let mut content_errors = Vec::new();

        for (index, event) in events.iter().enumerate() {
            *received.entry(event.kind).or_default() += 1;

            if let Err(v) = tracker.observe(event) {
                order_violations.push(v);
            }
            content_errors.extend(
                missing_fields(event)
                    .into_iter()
                    .map(|field| ContentError {
                        index,
                        kind: event.kind,
                        field,
                    }),
            );
        }

        let missing_events: BTreeSet<EventKind> = EventKind::CRITICAL
            .iter()
            .copied()
            .filter(|k| !received.contains_key(k))
            .collect();

        let required = EventKind::CRITICAL.len();
        let coverage_pct = ((required - missing_events.len()) * 100) as f64 / required as f64;

        SequenceReport {
            valid: missing_events.is_empty()
                && order_violations.is_empty()
                && content_errors.is_empty(),
            total_events: events.len(),
            received,
            missing_events,
            coverage_pct,
            order_violations,
            content_errors,
        }
    }
}

/// Fields an event of this kind must carry.
fn missing_fields(event: &AgentEvent) -> Vec<&'static str> {
    let mut missing = Vec::new();

    if event.kind.is_critical() {
        if event.user_id.trim().is_empty() {
            missing.push("user_id");
        }
        if event.run_id.trim().is_empty() {
            missing.push("run_id");
        }
        if event.agent_name.trim().is_empty() {
            missing.push("agent_name");
        }
    }

    if event.kind.is_tool_event()
        && event.tool_name.as_deref().map_or(true, |t| t.trim().is_empty())
    {
        missing.push("tool_name");
    }

    if event.kind == EventKind::Error && !event.payload.contains_key("message") {
        missing.push("message");
    }

    missing
}
