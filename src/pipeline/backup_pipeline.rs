use std::time::Duration;

use chrono::Utc;
use tracing::{instrument, warn};

use crate::catalog::Catalog;
use crate::config::Config;
use crate::crypto::{compress, AesGcmCipher, Sha256Checksum};
use crate::engine::{BackupEngine, ConnectionParams};
use crate::error::Result;
use crate::executor::Executor;
use crate::fanout::FanOutBus;
use crate::metrics::MetricsState;
use crate::model::{Backup, ProgressEvent, Server, ServerCredentials};
use crate::storage::BlobStore;

const MAX_UPLOAD_ATTEMPTS: u32 = 3;

/// 1. dump on the remote host
/// 2. pull the dump back to local scratch space
/// 3. compress
/// 4. encrypt (if requested)
/// 5. checksum the final bytes
/// 6. upload to the blob store
/// 7. record completion in the catalog
/// 8. clean up scratch files on both ends
#[instrument(skip(catalog, blob_store, fanout, metrics, config, server, credentials, executor, engine, backup))]
#[allow(clippy::too_many_arguments)]
pub async fn run_backup_pipeline(
    catalog: &dyn Catalog,
    blob_store: &BlobStore,
    fanout: &FanOutBus,
    metrics: &MetricsState,
    config: &Config,
    server: &Server,
    credentials: &ServerCredentials,
    executor: &dyn Executor,
    engine: &dyn BackupEngine,
    backup: &Backup,
) -> Result<()> {
    let conn = ConnectionParams::new(server, credentials);
    let started_at = Utc::now();
    fanout
        .publish(ProgressEvent::Started {
            backup_id: backup.id,
            server_id: server.id,
            at: started_at,
        })
        .await;

    let remote_dump_path = format!("{}/{}.dump", config.backup_temp_dir, backup.id);
    let local_dump_file = tempfile::Builder::new()
        .prefix(&format!("{}-", backup.id))
        .suffix(".dump")
        .tempfile()?;
    let local_dump_path = local_dump_file.path().to_path_buf();

    // step 1: dump on the remote host
    fanout
        .publish(stage(backup.id, "dump", None))
        .await;
    engine
        .create_backup(
            executor,
            &conn,
            &backup.database_name,
            backup.kind,
            &remote_dump_path,
            config.remote_exec_timeout_secs,
        )
        .await?;

    // step 2: pull the dump back
    fanout
        .publish(stage(backup.id, "transfer", None))
        .await;
    executor.download_file(&remote_dump_path, &local_dump_path).await?;
    let raw = tokio::fs::read(&local_dump_path).await?;

    // step 3: compress
    fanout
        .publish(stage(backup.id, "compress", Some(format!("{:?}", backup.compression))))
        .await;
    let compressed = compress(backup.compression, &raw)?;

    // step 4: encrypt
    let final_bytes = if backup.encrypted {
        fanout.publish(stage(backup.id, "encrypt", None)).await;
        let cipher = AesGcmCipher::new(&config.encryption_key, &config.encryption_salt)?;
        cipher.encrypt(&compressed)?
    } else {
        compressed
    };

    // step 5: checksum
    let checksum = Sha256Checksum::digest(&final_bytes);

    // step 6: upload
    fanout.publish(stage(backup.id, "upload", None)).await;
    let storage_path = format!(
        "{}/{}/{}.bak",
        server.name, backup.database_name, backup.id
    );
    upload_with_retry(catalog, blob_store, backup.id, &storage_path, &final_bytes).await?;

    fanout
        .publish(ProgressEvent::BytesTransferred {
            backup_id: backup.id,
            bytes: final_bytes.len() as u64,
            at: Utc::now(),
        })
        .await;

    // step 7: record completion
    catalog
        .complete_backup(backup.id, &storage_path, final_bytes.len() as i64, &checksum)
        .await?;

    let finished_at = Utc::now();
    let duration = (finished_at - started_at).num_milliseconds() as f64 / 1000.0;
    metrics.record_backup_success(
        &server.name,
        &backup.database_name,
        1,
        final_bytes.len() as u64,
        duration,
    );

    fanout
        .publish(ProgressEvent::Completed {
            backup_id: backup.id,
            size_bytes: final_bytes.len() as u64,
            duration_seconds: (finished_at - started_at).num_seconds(),
            at: finished_at,
        })
        .await;

    // step 8: clean up scratch files
    let cleanup_command = format!("rm -f {remote_dump_path}");
    if crate::executor::validation::validate_command(&cleanup_command).is_ok() {
        let _ = executor
            .execute(&cleanup_command, config.remote_exec_timeout_secs)
            .await;
    }
    drop(local_dump_file);

    Ok(())
}

/// Retries a transient upload failure with exponential backoff, recording
/// each retry against the backup's retry counter. A non-retryable error (or
/// exhausting the attempt budget) is returned as-is to fail the job.
async fn upload_with_retry(
    catalog: &dyn Catalog,
    blob_store: &BlobStore,
    backup_id: uuid::Uuid,
    storage_path: &str,
    bytes: &[u8],
) -> Result<()> {
    let mut attempt = 0u32;
    loop {
        match blob_store.put(storage_path, bytes.to_vec()).await {
            Ok(()) => return Ok(()),
            Err(err) if err.is_retryable() && attempt + 1 < MAX_UPLOAD_ATTEMPTS => {
                attempt += 1;
                warn!(%backup_id, attempt, error = %err, "retrying blob upload");
                let _ = catalog.increment_backup_retry_count(backup_id).await;
                tokio::time::sleep(Duration::from_secs(2u64.pow(attempt))).await;
            }
            Err(err) => return Err(err),
        }
    }
}

fn stage(backup_id: uuid::Uuid, stage: &str, detail: Option<String>) -> ProgressEvent {
    ProgressEvent::Stage {
        backup_id,
        stage: stage.to_string(),
        detail,
        at: Utc::now(),
    }
}
