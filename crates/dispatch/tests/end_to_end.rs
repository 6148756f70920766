mod common;

use serde_json::json;

use rf_domain::event::EventKind;
use rf_events::EventSequenceValidator;

use common::{analysis_tools, context, harness};

#[tokio::test]
async fn data_agent_run_produces_complete_valid_stream() {
    let h = harness(5);
    let ctx = context("u1", "t1", "r1", "data_agent");

    {
        let dispatcher = h
            .factory
            .create_scoped(&ctx, Some(analysis_tools()), None)
            .unwrap();
        assert_eq!(dispatcher.agent_name(), "data_agent");

        dispatcher.start_agent().await.unwrap();
        dispatcher.think("breaking down the cost question").await.unwrap();
        for region in ["eu", "us", "apac"] {
            let out = dispatcher
                .dispatch("cost_analyzer", json!({ "region": region }))
                .await
                .unwrap();
            assert_eq!(out["region"], region);
            assert_eq!(out["user"], "u1");
        }
        dispatcher
            .complete_agent(&json!({ "summary": "done" }))
            .await
            .unwrap();
    }

    let events = h.transport.events_to("u1");
    let report = EventSequenceValidator::new().validate(&events);
    assert_eq!(report.count(EventKind::AgentStarted), 1);
    assert_eq!(report.count(EventKind::AgentThinking), 1);
    assert_eq!(report.count(EventKind::ToolExecuting), 3);
    assert_eq!(report.count(EventKind::ToolCompleted), 3);
    assert_eq!(report.count(EventKind::AgentCompleted), 1);
    assert!(report.valid, "{report:?}");
    assert_eq!(report.coverage_pct, 100.0);

    assert!(events
        .iter()
        .all(|e| e.user_id == "u1" && e.thread_id == "t1" && e.run_id == "r1"));

    // The guard released the slot and the agent stays registered.
    assert_eq!(h.factory.active_for_user("u1"), 0);
    let session = h.registry.get_session("u1").unwrap();
    assert!(session.get_agent("data_agent").is_some());
}

#[tokio::test]
async fn failing_tool_still_closes_the_bracket() {
    let h = harness(5);
    let ctx = context("u1", "t1", "r1", "data_agent");
    let d = h
        .factory
        .create_scoped(&ctx, Some(analysis_tools()), None)
        .unwrap();
    d.start_agent().await.unwrap();
    d.think("trying").await.unwrap();

    let err = d.dispatch("broken", json!({})).await.unwrap_err();
    assert!(matches!(err, rf_domain::error::Error::Tool { ref tool, .. } if tool == "broken"));

    let err = d.dispatch("panicky", json!({})).await.unwrap_err();
    assert!(err.to_string().contains("panicked"));

    let events = h.transport.events_to("u1");
    let completed: Vec<_> = events
        .iter()
        .filter(|e| e.kind == EventKind::ToolCompleted)
        .collect();
    assert_eq!(completed.len(), 2);
    assert!(completed.iter().all(|e| e.payload["status"] == "error"));

    // Dispatcher is still usable after a tool panic.
    assert!(d.dispatch("cost_analyzer", json!({})).await.is_ok());
}

#[tokio::test]
async fn unknown_tool_is_reported_without_events() {
    let h = harness(5);
    let d = h
        .factory
        .create_scoped(&context("u1", "t1", "r1", "a"), Some(analysis_tools()), None)
        .unwrap();
    let err = d.dispatch("nope", json!({})).await.unwrap_err();
    assert!(matches!(err, rf_domain::error::Error::ToolNotFound(ref n) if n == "nope"));
    assert!(h.transport.events_to("u1").is_empty());
}

#[tokio::test]
async fn concurrent_users_never_see_each_others_events() {
    let h = std::sync::Arc::new(harness(5));
    let mut tasks = Vec::new();
    for u in 0..6 {
        let h = h.clone();
        tasks.push(tokio::spawn(async move {
            let user = format!("user-{u}");
            let ctx = context(&user, &format!("thread-{u}"), &format!("run-{u}"), "analyst");
            let d = h
                .factory
                .create_scoped(&ctx, Some(analysis_tools()), None)
                .unwrap();
            d.start_agent().await.unwrap();
            d.think("go").await.unwrap();
            d.dispatch("cost_analyzer", json!({})).await.unwrap();
            d.complete_agent(&json!(null)).await.unwrap();
        }));
    }
    for t in tasks {
        t.await.unwrap();
    }

    for u in 0..6 {
        let user = format!("user-{u}");
        let events = h.transport.events_to(&user);
        assert_eq!(events.len(), 5);
        assert!(events.iter().all(|e| e.user_id == user));
        assert!(EventSequenceValidator::new().validate(&events).valid);
    }
    assert_eq!(h.registry.user_count(), 6);
}
