use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use futures::future::join4;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use dbbackup_orchestrator::catalog::{Catalog, PostgresCatalog};
use dbbackup_orchestrator::config::Config;
use dbbackup_orchestrator::fanout::ws::{progress_ws, WsState};
use dbbackup_orchestrator::fanout::FanOutBus;
use dbbackup_orchestrator::health::HealthProber;
use dbbackup_orchestrator::metrics::MetricsState;
use dbbackup_orchestrator::notification::NotificationSink;
use dbbackup_orchestrator::reaper::RetentionReaper;
use dbbackup_orchestrator::scheduler::SchedulerLoop;
use dbbackup_orchestrator::storage::build_blob_store;
use dbbackup_orchestrator::worker::WorkerPool;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .json()
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "starting dbbackup-orchestrator"
    );

    let config = Arc::new(Config::from_env()?);

    let catalog = Arc::new(PostgresCatalog::connect(&config.database_url, config.database_pool_size).await?);
    catalog.migrate().await?;
    info!("connected to catalog database");

    let blob_store = build_blob_store(&config.object_store_url)?;
    let metrics = Arc::new(MetricsState::new());
    let fanout = FanOutBus::new();
    let notifications = NotificationSink::new(config.notification_webhook_url.clone());

    let shutdown = CancellationToken::new();

    let scheduler = SchedulerLoop::new(catalog.clone() as Arc<dyn Catalog>, metrics.clone(), config.clone());
    let reaper = RetentionReaper::new(
        catalog.clone() as Arc<dyn Catalog>,
        blob_store.clone(),
        metrics.clone(),
        config.clone(),
    );
    let health = HealthProber::new(
        catalog.clone() as Arc<dyn Catalog>,
        fanout.clone(),
        metrics.clone(),
        notifications.clone(),
        config.clone(),
    );
    let worker_pool = WorkerPool::new(
        catalog.clone() as Arc<dyn Catalog>,
        blob_store.clone(),
        fanout.clone(),
        metrics.clone(),
        notifications.clone(),
        config.clone(),
    );

    let http_server = {
        let metrics = metrics.clone();
        let fanout = fanout.clone();
        let addr = config.http_addr;
        async move {
            let ws_state = WsState { fanout, metrics: metrics.clone() };
            let app = Router::new()
                .route("/healthz", get(|| async { "ok" }))
                .route("/readyz", get(|| async { "ok" }))
                .route(
                    "/metrics",
                    get({
                        let metrics = metrics.clone();
                        move || {
                            let metrics = metrics.clone();
                            async move { metrics.gather() }
                        }
                    }),
                )
                .route("/ws", get(progress_ws))
                .with_state(ws_state);

            info!(%addr, "starting health/metrics/websocket server");
            let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await
            {
                error!(error = %e, "http server error");
            }
        }
    };

    let scheduler_task = {
        let shutdown = shutdown.clone();
        async move { scheduler.run(shutdown).await }
    };
    let reaper_task = {
        let shutdown = shutdown.clone();
        async move { reaper.run(shutdown).await }
    };
    let health_task = {
        let shutdown = shutdown.clone();
        async move { health.run(shutdown).await }
    };
    let worker_task = {
        let shutdown = shutdown.clone();
        async move { worker_pool.run(shutdown).await }
    };

    info!("scheduler, retention reaper, health prober, and worker pool started");

    tokio::spawn(async move {
        join4(scheduler_task, reaper_task, health_task, worker_task).await;
    });

    http_server.await;
    shutdown.cancel();

    info!("dbbackup-orchestrator shutting down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
