//! `runfence demo`: one agent run end to end on the in-memory transport.

use std::sync::Arc;

use clap::Args;
use serde::Serialize;
use serde_json::{json, Value};

use rf_context::ExecutionContext;
use rf_domain::config::{Config, DeliveryRoute};
use rf_domain::tool::{ToolError, ToolRegistry};
use rf_dispatch::FactoryMetricsSnapshot;
use rf_events::{DeliveryStatsSnapshot, EventSequenceValidator, RecordingTransport, SequenceReport};
use rf_sessions::FleetReport;

use crate::bootstrap;

#[derive(Debug, Clone, Args)]
pub struct DemoArgs {
    #[arg(long, default_value = "operator-01")]
    pub user: String,
    #[arg(long, default_value = "thread-01")]
    pub thread: String,
    #[arg(long, default_value = "run-01")]
    pub run: String,
    #[arg(long, default_value = "data_agent")]
    pub agent: String,
    /// Number of `cost_analyzer` calls the agent makes.
    #[arg(long, default_value_t = 3)]
    pub calls: usize,
}

#[derive(Debug, Serialize)]
pub struct DemoOutcome {
    pub sequence: SequenceReport,
    pub delivery: DeliveryStatsSnapshot,
    pub dispatchers: FactoryMetricsSnapshot,
    pub fleet: FleetReport,
}

/// Tools the demo agent can call.
pub fn demo_tools() -> ToolRegistry {
    let mut tools = ToolRegistry::new();
    tools.register_fn("cost_analyzer", |ctx, params| async move {
        let region = params
            .get("region")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArgs("region is required".into()))?
            .to_owned();
        let cost = 100.0 + region.len() as f64 * 12.5;
        Ok(json!({ "user": ctx.user_id, "region": region, "monthly_cost": cost }))
    });
    tools
}

pub async fn run(config: Config, config_path: String, args: &DemoArgs) -> anyhow::Result<DemoOutcome> {
    let transport = Arc::new(RecordingTransport::new());
    let route = config.delivery.route;
    let state = bootstrap::build_app_state(Arc::new(config), config_path, transport.clone())?;

    let context = ExecutionContext::builder(&args.user, &args.thread, &args.run)
        .agent_value("agent_name", Value::from(args.agent.as_str()))
        .audit_value("source", Value::from("cli"))
        .build()?;

    {
        let dispatcher = state
            .factory
            .create_scoped(&context, Some(demo_tools()), None)?;

        dispatcher.start_agent().await?;
        dispatcher
            .think(&format!("splitting the cost question into {} lookups", args.calls))
            .await?;
        for i in 0..args.calls {
            let region = format!("region-{}", i + 1);
            let out = dispatcher
                .dispatch("cost_analyzer", json!({ "region": region }))
                .await?;
            tracing::debug!(output = %out, "tool returned");
        }
        dispatcher
            .complete_agent(&json!({ "lookups": args.calls }))
            .await?;
    }

    let target = match route {
        DeliveryRoute::User => context.user_id(),
        DeliveryRoute::Thread => context.thread_id(),
    };
    let events = transport.events_to(target);

    Ok(DemoOutcome {
        sequence: EventSequenceValidator::new().validate(&events),
        delivery: state.bridge.stats(),
        dispatchers: state.factory.metrics(),
        fleet: state.registry.monitor_all_users(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(calls: usize) -> DemoArgs {
        DemoArgs {
            user: "operator-01".into(),
            thread: "thread-01".into(),
            run: "run-01".into(),
            agent: "data_agent".into(),
            calls,
        }
    }

    #[tokio::test]
    async fn default_run_is_complete_and_ordered() {
        let outcome = run(Config::default(), "config.toml".into(), &args(3))
            .await
            .unwrap();
        assert!(outcome.sequence.valid);
        assert_eq!(outcome.sequence.total_events, 9);
        assert_eq!(outcome.sequence.coverage_pct, 100.0);
        assert_eq!(outcome.dispatchers.active, 0);
        assert_eq!(outcome.fleet.total_users, 1);
        assert_eq!(outcome.delivery.failed, 0);
    }

    #[tokio::test]
    async fn thread_route_collects_from_thread() {
        let mut cfg = Config::default();
        cfg.delivery.route = DeliveryRoute::Thread;
        let outcome = run(cfg, "config.toml".into(), &args(1)).await.unwrap();
        assert_eq!(outcome.sequence.total_events, 5);
        assert!(outcome.sequence.valid);
    }

    #[tokio::test]
    async fn placeholder_user_is_rejected() {
        let mut a = args(1);
        a.user = "demo".into();
        assert!(run(Config::default(), "config.toml".into(), &a).await.is_err());
    }

    #[tokio::test]
    async fn cost_analyzer_requires_region() {
        use rf_domain::tool::Tool;

        let tools = demo_tools();
        let tool = tools.get("cost_analyzer").unwrap();
        let ctx = rf_domain::tool::ToolContext {
            request_id: "req-1".into(),
            user_id: "u1".into(),
            run_id: "r1".into(),
            agent_name: "data_agent".into(),
            tool_name: "cost_analyzer".into(),
            cancel: tokio_util::sync::CancellationToken::new(),
        };
        assert!(matches!(
            tool.execute(ctx, json!({})).await,
            Err(ToolError::InvalidArgs(_))
        ));
    }
}
