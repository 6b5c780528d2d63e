use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::catalog::Catalog;
use crate::config::Config;
use crate::crypto::decrypt_server_credentials;
use crate::engine::build_engine;
use crate::error::Result;
use crate::executor::build_executor;
use crate::fanout::FanOutBus;
use crate::metrics::MetricsState;
use crate::model::{BackupStatus, ResourceType, RestoreJobStatus};
use crate::notification::{BackupNotification, NotificationSink};
use crate::pipeline::{run_backup_pipeline, run_restore_pipeline};
use crate::storage::BlobStore;

const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Drains PENDING backups from the catalog with bounded concurrency. Each
/// accepted job moves pending -> in_progress via compare-and-set before any
/// work starts, so two workers racing on the same row never both pick it up.
pub struct WorkerPool {
    catalog: Arc<dyn Catalog>,
    blob_store: BlobStore,
    fanout: FanOutBus,
    metrics: Arc<MetricsState>,
    notifications: NotificationSink,
    config: Arc<Config>,
    semaphore: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        blob_store: BlobStore,
        fanout: FanOutBus,
        metrics: Arc<MetricsState>,
        notifications: NotificationSink,
        config: Arc<Config>,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_backups));
        Self {
            catalog,
            blob_store,
            fanout,
            metrics,
            notifications,
            config,
            semaphore,
        }
    }

    pub async fn run(&self, shutdown: CancellationToken) {
        info!(concurrency = self.config.max_concurrent_backups, "worker pool starting");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("worker pool shutting down");
                    return;
                }
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
            }

            let available = self.semaphore.available_permits();
            if available == 0 {
                continue;
            }

            let pending = match self.catalog.list_pending_backups(available as i64).await {
                Ok(backups) => backups,
                Err(err) => {
                    error!(error = %err, "failed to list pending backups");
                    continue;
                }
            };

            for backup in pending {
                let permit = match self.semaphore.clone().try_acquire_owned() {
                    Ok(permit) => permit,
                    Err(_) => break,
                };

                if self
                    .catalog
                    .transition_backup_status(backup.id, BackupStatus::Pending, BackupStatus::InProgress)
                    .await
                    .is_err()
                {
                    // another worker won the race, or the job was cancelled
                    drop(permit);
                    continue;
                }

                let catalog = self.catalog.clone();
                let blob_store = self.blob_store.clone();
                let fanout = self.fanout.clone();
                let metrics = self.metrics.clone();
                let notifications = self.notifications.clone();
                let config = self.config.clone();
                let job_shutdown = shutdown.clone();

                tokio::spawn(async move {
                    let _permit = permit;
                    run_job(
                        catalog,
                        blob_store,
                        fanout,
                        metrics,
                        notifications,
                        config,
                        backup.id,
                        job_shutdown,
                    )
                    .await;
                });
            }

            let available = self.semaphore.available_permits();
            if available == 0 {
                continue;
            }

            let pending_restores = match self.catalog.list_pending_restore_jobs(available as i64).await {
                Ok(jobs) => jobs,
                Err(err) => {
                    error!(error = %err, "failed to list pending restore jobs");
                    continue;
                }
            };

            for job in pending_restores {
                let permit = match self.semaphore.clone().try_acquire_owned() {
                    Ok(permit) => permit,
                    Err(_) => break,
                };

                if self
                    .catalog
                    .transition_restore_job_status(job.id, RestoreJobStatus::Pending, RestoreJobStatus::InProgress)
                    .await
                    .is_err()
                {
                    drop(permit);
                    continue;
                }

                let catalog = self.catalog.clone();
                let blob_store = self.blob_store.clone();
                let fanout = self.fanout.clone();
                let metrics = self.metrics.clone();
                let config = self.config.clone();

                tokio::spawn(async move {
                    let _permit = permit;
                    run_restore_job(catalog, blob_store, fanout, metrics, config, job.id).await;
                });
            }
        }
    }
}

#[instrument(skip(catalog, blob_store, fanout, metrics, notifications, config, shutdown))]
async fn run_job(
    catalog: Arc<dyn Catalog>,
    blob_store: BlobStore,
    fanout: FanOutBus,
    metrics: Arc<MetricsState>,
    notifications: NotificationSink,
    config: Arc<Config>,
    backup_id: uuid::Uuid,
    shutdown: CancellationToken,
) {
    let outcome = tokio::select! {
        _ = shutdown.cancelled() => {
            warn!(%backup_id, "job cancelled by shutdown before completion");
            let _ = catalog
                .transition_backup_status(backup_id, BackupStatus::InProgress, BackupStatus::Cancelled)
                .await;
            let _ = catalog
                .insert_audit_log(None, "backup.cancelled", ResourceType::Backup, Some(backup_id), None)
                .await;
            return;
        }
        result = execute(&catalog, &blob_store, &fanout, &metrics, &config, backup_id) => result,
    };

    match outcome {
        Ok(()) => {
            info!(%backup_id, "backup completed");
        }
        Err(err) => {
            error!(%backup_id, error = %err, "backup failed");
            let _ = catalog.fail_backup(backup_id, err.reason()).await;
            let _ = catalog
                .insert_audit_log(
                    None,
                    "backup.failed",
                    ResourceType::Backup,
                    Some(backup_id),
                    Some(serde_json::json!({ "reason": err.reason() })),
                )
                .await;

            if let Ok(backup) = catalog.get_backup(backup_id).await {
                if let Ok(server) = catalog.get_server(backup.server_id).await {
                    metrics.record_backup_failure(&server.name, &backup.database_name);
                    notifications
                        .notify(&BackupNotification {
                            event: "backup_failed",
                            server: &server.name,
                            database: &backup.database_name,
                            backup_id: backup_id.to_string(),
                            message: err.reason(),
                        })
                        .await;
                }
            }
        }
    }
}

async fn execute(
    catalog: &Arc<dyn Catalog>,
    blob_store: &BlobStore,
    fanout: &FanOutBus,
    metrics: &Arc<MetricsState>,
    config: &Arc<Config>,
    backup_id: uuid::Uuid,
) -> Result<()> {
    let backup = catalog.get_backup(backup_id).await?;
    let server = catalog.get_server(backup.server_id).await?;

    // a bad decrypt must fail the job, not silently run with empty credentials
    let credentials = decrypt_server_credentials(config, &server)?;

    let executor = build_executor(&server, &credentials).await?;
    let engine = build_engine(server.database_family);

    run_backup_pipeline(
        catalog.as_ref(),
        blob_store,
        fanout,
        metrics,
        config,
        &server,
        &credentials,
        executor.as_ref(),
        engine.as_ref(),
        &backup,
    )
    .await?;

    let _ = catalog
        .insert_audit_log(None, "backup.completed", ResourceType::Backup, Some(backup.id), None)
        .await;

    Ok(())
}

#[instrument(skip(catalog, blob_store, fanout, metrics, config))]
async fn run_restore_job(
    catalog: Arc<dyn Catalog>,
    blob_store: BlobStore,
    fanout: FanOutBus,
    metrics: Arc<MetricsState>,
    config: Arc<Config>,
    restore_job_id: uuid::Uuid,
) {
    let outcome = execute_restore(&catalog, &blob_store, &fanout, &metrics, &config, restore_job_id).await;

    match outcome {
        Ok(()) => {
            let _ = catalog.complete_restore_job(restore_job_id).await;
            let _ = catalog
                .insert_audit_log(
                    None,
                    "restore.completed",
                    ResourceType::Backup,
                    Some(restore_job_id),
                    None,
                )
                .await;
            info!(%restore_job_id, "restore completed");
        }
        Err(err) => {
            error!(%restore_job_id, error = %err, "restore failed");
            let _ = catalog.fail_restore_job(restore_job_id, err.reason()).await;
            let _ = catalog
                .insert_audit_log(
                    None,
                    "restore.failed",
                    ResourceType::Backup,
                    Some(restore_job_id),
                    Some(serde_json::json!({ "reason": err.reason() })),
                )
                .await;
        }
    }
}

async fn execute_restore(
    catalog: &Arc<dyn Catalog>,
    blob_store: &BlobStore,
    fanout: &FanOutBus,
    metrics: &Arc<MetricsState>,
    config: &Arc<Config>,
    restore_job_id: uuid::Uuid,
) -> Result<()> {
    let job = catalog.get_restore_job(restore_job_id).await?;
    let backup = catalog.get_backup(job.backup_id).await?;
    let server = catalog.get_server(job.server_id).await?;

    let credentials = decrypt_server_credentials(config, &server)?;
    let executor = build_executor(&server, &credentials).await?;
    let engine = build_engine(server.database_family);

    run_restore_pipeline(
        blob_store,
        fanout,
        metrics,
        config,
        &server,
        &credentials,
        executor.as_ref(),
        engine.as_ref(),
        &backup,
        &job.target_database_name,
        &job.masking_rules.0,
    )
    .await
}
