//! intent-engine - decision worker pool, stuck-job watchdog and ops server.
//!
//! All three share one job store and one shutdown signal. The process exits
//! non-zero only when configuration is invalid or the store is unreachable.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use intent_engine::adapters::advisory::{LlmAdvisoryReasoner, ProviderRegistry};
use intent_engine::adapters::callback::{HttpResultNotifier, TracingDecisionObserver};
use intent_engine::adapters::http::{ops_router, OpsAppState};
use intent_engine::adapters::queue::{InMemoryJobStore, PostgresJobStore, RedisJobStore};
use intent_engine::application::worker::{JobProcessor, Watchdog, WorkerPool};
use intent_engine::config::{AppConfig, QueueBackend};
use intent_engine::domain::intent::IntentEngine;
use intent_engine::ports::JobStore;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load().context("loading configuration")?;
    init_tracing(&config);
    config.validate().context("validating configuration")?;

    let store = connect_store(&config).await?;
    store
        .ping()
        .await
        .context("job store unreachable at startup")?;
    info!(backend = ?config.queue.backend, "Job store connected");

    let registry = Arc::new(ProviderRegistry::new(config.advisory.provider_defaults()));
    let reasoner = Arc::new(LlmAdvisoryReasoner::new(
        registry,
        config.advisory.request_timeout(),
    ));
    let engine = Arc::new(IntentEngine::new(reasoner));
    let notifier = Arc::new(HttpResultNotifier::new(config.worker.callback_timeout()));

    let processor = Arc::new(
        JobProcessor::new(store.clone(), engine, notifier.clone())
            .with_config(config.worker.processor_config())
            .with_observer(Arc::new(TracingDecisionObserver)),
    );
    let pool = WorkerPool::new(processor, config.worker.pool_config());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let pool_task = tokio::spawn({
        let shutdown = shutdown_rx.clone();
        async move { pool.run(shutdown).await }
    });

    let watchdog = Arc::new(Watchdog::new(
        store.clone(),
        notifier,
        config
            .watchdog
            .settings()
            .with_callback_timeout(config.worker.callback_timeout()),
    ));
    let watchdog_task = config.watchdog.enabled.then(|| {
        let watchdog = watchdog.clone();
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { watchdog.run(shutdown).await })
    });

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding ops server to {}", addr))?;
    info!(%addr, "Ops server listening");

    let app = ops_router(
        OpsAppState::new(store, watchdog),
        config.server.request_timeout(),
    );
    let server_task = tokio::spawn({
        let mut shutdown = shutdown_rx.clone();
        async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown.wait_for(|stop| *stop).await;
                })
                .await
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("installing ctrl-c handler")?;
    info!("Shutdown requested, draining workers");
    let _ = shutdown_tx.send(true);

    match pool_task.await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => error!(error = %err, "Worker pool failed"),
        Err(err) => error!(error = %err, "Worker pool task panicked"),
    }
    if let Some(task) = watchdog_task {
        if let Err(err) = task.await {
            warn!(error = %err, "Watchdog task panicked");
        }
    }
    match server_task.await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => error!(error = %err, "Ops server failed"),
        Err(err) => error!(error = %err, "Ops server task panicked"),
    }

    info!("Shutdown complete");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));

    if config.is_production() {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}

async fn connect_store(config: &AppConfig) -> Result<Arc<dyn JobStore>> {
    match config.queue.backend {
        QueueBackend::Redis => {
            let redis = config
                .redis
                .as_ref()
                .context("redis backend selected without redis settings")?;
            let store = tokio::time::timeout(
                redis.timeout(),
                RedisJobStore::connect(&redis.url, config.queue.keys()),
            )
            .await
            .context("timed out connecting to redis")?
            .context("connecting to redis")?
            .with_log_cap(config.queue.log_cap)
            .with_cancel_ttl(config.queue.cancel_ttl());
            Ok(Arc::new(store))
        }
        QueueBackend::Postgres => {
            let database = config
                .database
                .as_ref()
                .context("postgres backend selected without database settings")?;
            let pool = database
                .pool_options()
                .connect(&database.url)
                .await
                .context("connecting to postgres")?;
            let store = PostgresJobStore::new(pool)
                .with_poll_interval(database.poll_interval())
                .with_cancel_ttl(config.queue.cancel_ttl());
            if database.run_migrations {
                store.migrate().await.context("running migrations")?;
            }
            Ok(Arc::new(store))
        }
        QueueBackend::Memory => {
            warn!("Using the in-memory job store; jobs do not survive a restart");
            Ok(Arc::new(
                InMemoryJobStore::new()
                    .with_log_cap(config.queue.log_cap)
                    .with_cancel_ttl(config.queue.cancel_ttl()),
            ))
        }
    }
}
