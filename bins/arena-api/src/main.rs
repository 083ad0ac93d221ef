mod handlers;
mod metrics;
mod routes;

use anyhow::{Context, Result};
use arena_common::config::AppConfig;
use arena_common::redis::RedisStore;
use arena_common::store::{ProblemStore, SubmissionStore};
use arena_engine::config::LanguageConfigManager;
use arena_engine::{Dispatcher, Executor, HttpSandboxClient, PollPolicy, RetryPolicy, WorkerPool};
use axum::Router;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

pub struct AppState {
    pub problems: Arc<dyn ProblemStore>,
    pub submissions: Arc<dyn SubmissionStore>,
    pub executor: Executor,
    pub run_pool: WorkerPool,
    pub submit_pool: WorkerPool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("Arena API booting...");

    let config = AppConfig::from_env()?;

    let store = Arc::new(
        RedisStore::connect(&config.redis_url)
            .await
            .context("Failed to connect to Redis")?,
    );
    info!("Connected to Redis: {}", config.redis_url);

    let languages = Arc::new(LanguageConfigManager::load(Path::new(&config.languages_config))?);
    info!(languages = ?languages.list_languages(), "Loaded language configuration");

    let client = HttpSandboxClient::new(&config.sandbox)?;
    let dispatcher = Dispatcher::new(
        Arc::new(client),
        PollPolicy::from_settings(&config.sandbox),
        RetryPolicy::from_settings(&config.sandbox),
    );
    info!(sandbox = %config.sandbox.base_url, "Sandbox client ready");

    let executor = Executor::new(dispatcher, languages, store.clone());

    let state = Arc::new(AppState {
        problems: store.clone(),
        submissions: store,
        executor,
        run_pool: WorkerPool::new("run", config.run_pool.workers, config.run_pool.queue_depth),
        submit_pool: WorkerPool::new("submit", config.submit_pool.workers, config.submit_pool.queue_depth),
    });

    // Build router
    let app = Router::new().merge(routes::routes()).with_state(state);

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    info!("HTTP server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Arena API stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutdown signal received");
}
