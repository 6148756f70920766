//! AppState construction and background-task spawning.
//!
//! `serve` and `demo` share [`build_app_state`]; only `serve` spawns the
//! background loops.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use rf_domain::config::{Config, ConfigSeverity};
use rf_dispatch::DispatcherFactory;
use rf_events::{EventBridge, Transport};
use rf_sessions::{LifecycleManager, SessionRegistry};

use crate::state::AppState;

/// How often the factory forgets slot bookkeeping for idle users.
const LIMITER_PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// Validate config, wire every subsystem and return the application root.
pub fn build_app_state(
    config: Arc<Config>,
    config_path: String,
    transport: Arc<dyn Transport>,
) -> anyhow::Result<AppState> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    let error_count = issues
        .iter()
        .filter(|i| i.severity == ConfigSeverity::Error)
        .count();
    if error_count > 0 {
        anyhow::bail!("config validation failed with {error_count} error(s)");
    }

    // ── Sessions ─────────────────────────────────────────────────────
    let registry = Arc::new(SessionRegistry::new(config.registry.clone()));
    let lifecycle = Arc::new(LifecycleManager::new(
        registry.clone(),
        config.lifecycle.clone(),
    ));
    tracing::info!(
        max_agents_per_user = config.registry.max_agents_per_user,
        fleet_max_users = config.registry.fleet_max_users,
        "session registry ready"
    );

    // ── Delivery ─────────────────────────────────────────────────────
    let bridge = Arc::new(EventBridge::new(transport.clone(), &config.delivery));
    tracing::info!(
        max_attempts = config.delivery.max_attempts,
        route = ?config.delivery.route,
        "event bridge ready"
    );

    // ── Dispatch ─────────────────────────────────────────────────────
    let factory = Arc::new(DispatcherFactory::new(
        config.dispatch.clone(),
        registry.clone(),
        bridge.clone(),
    ));
    tracing::info!(
        max_dispatchers_per_user = config.dispatch.max_dispatchers_per_user,
        ordering = ?config.dispatch.ordering,
        "dispatcher factory ready"
    );

    Ok(AppState {
        config,
        config_path,
        registry,
        lifecycle,
        transport,
        bridge,
        factory,
        shutdown: CancellationToken::new(),
    })
}

/// Spawn the long-running background tasks (lifecycle sweeper, limiter
/// pruning). Every task exits once `state.shutdown` is cancelled.
pub fn spawn_background_tasks(state: &AppState) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();

    // ── Lifecycle sweeper ────────────────────────────────────────────
    if state.config.lifecycle.enabled {
        let lifecycle = state.lifecycle.clone();
        let shutdown = state.shutdown.clone();
        handles.push(tokio::spawn(lifecycle.run(shutdown)));
        tracing::info!(
            interval_secs = state.config.lifecycle.sweep_interval_secs,
            "lifecycle sweeper started"
        );
    } else {
        tracing::info!("lifecycle sweeper disabled");
    }

    // ── Periodic limiter pruning ─────────────────────────────────────
    {
        let factory = state.factory.clone();
        let shutdown = state.shutdown.clone();
        handles.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(LIMITER_PRUNE_INTERVAL);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = interval.tick() => factory.prune_idle(),
                }
            }
        }));
    }

    tracing::info!(tasks = handles.len(), "background tasks spawned");
    handles
}

#[cfg(test)]
mod tests {
    use super::*;
    use rf_events::RecordingTransport;

    fn transport() -> Arc<dyn Transport> {
        Arc::new(RecordingTransport::new())
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut cfg = Config::default();
        cfg.dispatch.max_dispatchers_per_user = 0;
        let err = build_app_state(Arc::new(cfg), "config.toml".into(), transport())
            .err()
            .unwrap();
        assert!(err.to_string().contains("1 error(s)"));
    }

    #[test]
    fn warnings_do_not_block_startup() {
        let mut cfg = Config::default();
        cfg.registry.agent_warning_threshold = 500;
        assert!(build_app_state(Arc::new(cfg), "config.toml".into(), transport()).is_ok());
    }

    #[tokio::test]
    async fn background_tasks_stop_on_shutdown() {
        let state =
            build_app_state(Arc::new(Config::default()), "config.toml".into(), transport())
                .unwrap();
        let handles = spawn_background_tasks(&state);
        assert_eq!(handles.len(), 2);

        state.shutdown.cancel();
        for h in handles {
            tokio::time::timeout(Duration::from_secs(5), h)
                .await
                .unwrap()
                .unwrap();
        }
    }

    #[tokio::test]
    async fn disabled_sweeper_is_not_spawned() {
        let mut cfg = Config::default();
        cfg.lifecycle.enabled = false;
        let state = build_app_state(Arc::new(cfg), "config.toml".into(), transport()).unwrap();
        let handles = spawn_background_tasks(&state);
        assert_eq!(handles.len(), 1);
        state.shutdown.cancel();
    }
}
