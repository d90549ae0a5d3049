//! Stratagen HTTP server binary

use std::sync::Arc;
use std::time::Duration;
use stratagen::memory::{MemoryStore, MemorySweeper};
use stratagen::selection::StrategySelector;
use stratagen::workflow::{NoopDelegate, WorkflowCoordinator};
use stratagen::{ContentClassifier, EngineConfig, StrategyCatalog};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut config = EngineConfig::default();
    if let Ok(ms) = std::env::var("STRATAGEN_TIMEOUT_MS") {
        if let Ok(ms) = ms.parse::<u64>() {
            config.stage_timeout = Duration::from_millis(ms);
        }
    }
    if let Ok(flag) = std::env::var("STRATAGEN_FALLBACK") {
        config.fallback_on_error = flag != "false" && flag != "0";
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_filter())),
        )
        .with_target(false)
        .init();

    let port: u16 = std::env::var("STRATAGEN_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8082);

    // Wire the service graph once at startup; no module-level singletons
    let store = MemoryStore::new(config.memory.clone());
    let catalog = Arc::new(StrategyCatalog::new());
    let selector = StrategySelector::new(Arc::clone(&catalog), Arc::clone(&store));
    let coordinator = WorkflowCoordinator::new(
        Arc::clone(&store),
        ContentClassifier::new(),
        selector,
        catalog,
        Box::new(NoopDelegate),
        config.clone(),
    );

    let sweeper = MemorySweeper::new(Arc::clone(&store), config.memory.sweep_interval);
    let shutdown = sweeper.shutdown_notifier();
    let sweeper_handle = sweeper.spawn();

    let result = stratagen::server::run_server(coordinator, port).await;

    shutdown.notify_one();
    sweeper_handle.await?;

    result
}
