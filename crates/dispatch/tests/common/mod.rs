#![allow(dead_code)]

use std::sync::Arc;

use serde_json::{json, Value};

use rf_context::ExecutionContext;
use rf_domain::config::{DispatchConfig, OrderingMode, RegistryConfig};
use rf_domain::tool::{ToolError, ToolRegistry};
use rf_dispatch::DispatcherFactory;
use rf_events::{EventBridge, RecordingTransport, RetryPolicy};
use rf_sessions::SessionRegistry;

pub struct Harness {
    pub transport: Arc<RecordingTransport>,
    pub registry: Arc<SessionRegistry>,
    pub factory: DispatcherFactory,
}

pub fn harness(max_per_user: usize) -> Harness {
    harness_with(DispatchConfig {
        max_dispatchers_per_user: max_per_user,
        ordering: OrderingMode::Strict,
        ..DispatchConfig::default()
    })
}

pub fn harness_with(config: DispatchConfig) -> Harness {
    let transport = Arc::new(RecordingTransport::new());
    let registry = Arc::new(SessionRegistry::new(RegistryConfig::default()));
    let bridge = Arc::new(EventBridge::with_policy(
        transport.clone(),
        RetryPolicy::immediate(3),
        rf_domain::config::DeliveryRoute::User,
    ));
    let factory = DispatcherFactory::new(config, registry.clone(), bridge);
    Harness {
        transport,
        registry,
        factory,
    }
}

pub fn context(user: &str, thread: &str, run: &str, agent: &str) -> ExecutionContext {
    ExecutionContext::builder(user, thread, run)
        .agent_value("agent_name", Value::from(agent))
        .build()
        .unwrap()
}

pub fn analysis_tools() -> ToolRegistry {
    let mut tools = ToolRegistry::new();
    tools
        .register_fn("cost_analyzer", |ctx, params| async move {
            let region = params
                .get("region")
                .and_then(Value::as_str)
                .unwrap_or("global")
                .to_owned();
            Ok(json!({ "user": ctx.user_id, "region": region, "cost": 42.5 }))
        })
        .register_fn("broken", |_ctx, _params| async move {
            Err(ToolError::Failed("upstream returned 500".into()))
        })
        .register_fn("slow", |ctx, _params| async move {
            tokio::select! {
                _ = ctx.cancel.cancelled() => Err(ToolError::Cancelled("stopped".into())),
                _ = tokio::time::sleep(std::time::Duration::from_secs(30)) => Ok(Value::Null),
            }
        })
        .register_fn("panicky", |_ctx, _params| async move {
            if true {
                panic!("tool bug");
            }
            Ok(Value::Null)
        });
    tools
}
