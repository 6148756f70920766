//! Per-agent ordering state machine.
//!
//! Ordering is tracked independently for every `(run_id, agent_name)` pair;
//! events of different agents or runs interleave freely.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

use rf_domain::event::{AgentEvent, EventKind};

/// An event arrived before one or more of its prerequisites.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("{kind} for agent {agent_name} (run {run_id}) is missing {missing:?}")]
pub struct OrderViolation {
    pub run_id: String,
    pub agent_name: String,
    pub kind: EventKind,
    pub missing: Vec<EventKind>,
}

#[derive(Debug, Default)]
struct AgentState {
    seen: BTreeSet<EventKind>,
    /// Outstanding `tool_executing` count per tool name.
    open_tools: HashMap<String, usize>,
}

#[derive(Debug, Default)]
pub struct SequenceTracker {
    agents: HashMap<(String, String), AgentState>,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check `event` against what has been recorded so far, without
    /// recording it.
    pub fn check(&self, event: &AgentEvent) -> Result<(), OrderViolation> {
        if !event.kind.is_critical() {
            return Ok(());
        }

        let state = self
            .agents
            .get(&(event.run_id.clone(), event.agent_name.clone()));

        let mut missing: Vec<EventKind> = event
            .kind
            .prerequisites()
            .iter()
            .copied()
            .filter(|k| !state.is_some_and(|s| s.seen.contains(k)))
            .collect();

        if event.kind == EventKind::ToolCompleted {
            let tool = event.tool_name.as_deref().unwrap_or_default();
            let open = state
                .and_then(|s| s.open_tools.get(tool))
                .copied()
                .unwrap_or(0);
            if open == 0 {
                missing.push(EventKind::ToolExecuting);
            }
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(OrderViolation {
                run_id: event.run_id.clone(),
                agent_name: event.agent_name.clone(),
                kind: event.kind,
                missing,
            })
        }
    }

    /// Record `event` as delivered.
    pub fn record(&mut self, event: &AgentEvent) {
        if !event.kind.is_critical() {
            return;
        }
        let state = self
            .agents
            .entry((event.run_id.clone(), event.agent_name.clone()))
            .or_default();
        state.seen.insert(event.kind);

        let tool = event.tool_name.clone().unwrap_or_default();
        match event.kind {
            EventKind::ToolExecuting => *state.open_tools.entry(tool).or_default() += 1,
            EventKind::ToolCompleted => {
                if let Some(open) = state.open_tools.get_mut(&tool) {
                    *open = open.saturating_sub(1);
                }
            }
            _ => {}
        }
    }

    /// Check, then record regardless of the verdict.
    pub fn observe(&mut self, event: &AgentEvent) -> Result<(), OrderViolation> {
        let verdict = self.check(event);
        self.record(event);
        verdict
    }

    /// Tool executions started but not completed for one agent.
    pub fn open_tool_count(&self, run_id: &str, agent_name: &str) -> usize {
        self.agents
            .get(&(run_id.to_owned(), agent_name.to_owned()))
            .map(|s| s.open_tools.values().sum())
            .unwrap_or(0)
    }
}
