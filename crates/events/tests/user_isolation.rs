use std::sync::Arc;

use serde_json::json;

use rf_domain::config::{DeliveryRoute, OrderingMode};
use rf_events::{AgentEventEmitter, EventBridge, EventSequenceValidator, RecordingTransport, RetryPolicy};

async fn run_agent(emitter: &AgentEventEmitter) -> usize {
    let mut failures = 0;
    let agent = "data_agent";
    let steps = [
        emitter.notify_agent_started(agent).await,
        emitter.notify_agent_thinking(agent, "looking").await,
        emitter
            .notify_tool_executing(agent, "cost_analyzer", &json!({}))
            .await,
        emitter
            .notify_tool_completed(agent, "cost_analyzer", Ok(&json!(1)))
            .await,
        emitter.notify_agent_completed(agent, &json!("ok")).await,
    ];
    for step in steps {
        if step.is_err() {
            failures += 1;
        }
    }
    failures
}

#[tokio::test]
async fn failing_user_does_not_affect_others() {
    let transport = Arc::new(RecordingTransport::new());
    transport.fail_always("user-3");
    let bridge = Arc::new(EventBridge::with_policy(
        transport.clone(),
        RetryPolicy::immediate(3),
        DeliveryRoute::User,
    ));

    let mut handles = Vec::new();
    for u in 0..8 {
        let bridge = bridge.clone();
        handles.push(tokio::spawn(async move {
            let emitter = AgentEventEmitter::new(
                bridge,
                format!("user-{u}"),
                format!("thread-{u}"),
                format!("run-{u}"),
                OrderingMode::Warn,
            );
            run_agent(&emitter).await
        }));
    }

    let mut failures = Vec::new();
    for h in handles {
        failures.push(h.await.unwrap());
    }

    for (u, failed) in failures.iter().enumerate() {
        let user = format!("user-{u}");
        if u == 3 {
            assert_eq!(*failed, 5);
            assert_eq!(transport.errors_for(&user).len(), 5);
            assert!(transport.events_to(&user).is_empty());
            continue;
        }
        assert_eq!(*failed, 0, "{user} saw failures");
        let events = transport.events_to(&user);
        assert_eq!(events.len(), 5);
        assert!(events.iter().all(|e| e.user_id == user));
        assert!(EventSequenceValidator::new().validate(&events).valid);
        assert!(transport.errors_for(&user).is_empty());
    }
}
