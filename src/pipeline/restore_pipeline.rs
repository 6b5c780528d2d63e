use chrono::Utc;
use tracing::instrument;

use crate::config::Config;
use crate::crypto::{decompress, AesGcmCipher, Sha256Checksum};
use crate::engine::{
    mysql_connection_flags, pg_connection_flags, with_mysql_pwd, with_pgpassword, BackupEngine,
    ConnectionParams,
};
use crate::error::Result;
use crate::executor::Executor;
use crate::fanout::FanOutBus;
use crate::masking::MaskingRule;
use crate::metrics::MetricsState;
use crate::model::{Backup, ProgressEvent, Server, ServerCredentials};
use crate::storage::BlobStore;

/// Inverse of the backup pipeline: download -> verify checksum -> decrypt ->
/// decompress -> push to the remote host -> engine restore -> optional
/// masking pass over the restored data.
#[instrument(skip(blob_store, fanout, metrics, config, server, credentials, executor, engine, backup, masking_rules))]
#[allow(clippy::too_many_arguments)]
pub async fn run_restore_pipeline(
    blob_store: &BlobStore,
    fanout: &FanOutBus,
    metrics: &MetricsState,
    config: &Config,
    server: &Server,
    credentials: &ServerCredentials,
    executor: &dyn Executor,
    engine: &dyn BackupEngine,
    backup: &Backup,
    target_database_name: &str,
    masking_rules: &[MaskingRule],
) -> Result<()> {
    let conn = ConnectionParams::new(server, credentials);
    let started_at = Utc::now();
    fanout
        .publish(stage(backup.id, "download", None))
        .await;

    let storage_path = backup
        .storage_path
        .as_deref()
        .ok_or_else(|| crate::error::Error::Engine("backup has no storage_path".to_string()))?;
    let downloaded = blob_store.get(storage_path).await?;

    if let Some(expected) = &backup.checksum_sha256 {
        fanout.publish(stage(backup.id, "verify_checksum", None)).await;
        Sha256Checksum::verify(&downloaded, expected)?;
    }

    let decrypted = if backup.encrypted {
        fanout.publish(stage(backup.id, "decrypt", None)).await;
        let cipher = AesGcmCipher::new(&config.encryption_key, &config.encryption_salt)?;
        cipher.decrypt(&downloaded)?
    } else {
        downloaded
    };

    fanout.publish(stage(backup.id, "decompress", None)).await;
    let raw = decompress(backup.compression, &decrypted)?;

    let remote_dump_path = format!("{}/{}-restore.dump", config.backup_temp_dir, backup.id);
    let local_dump_file = tempfile::Builder::new()
        .prefix(&format!("{}-restore-", backup.id))
        .suffix(".dump")
        .tempfile()?;
    let local_dump_path = local_dump_file.path().to_path_buf();
    tokio::fs::write(&local_dump_path, &raw).await?;

    fanout.publish(stage(backup.id, "transfer", None)).await;
    executor.upload_file(&local_dump_path, &remote_dump_path).await?;

    fanout.publish(stage(backup.id, "restore", None)).await;
    engine
        .restore_backup(
            executor,
            &conn,
            target_database_name,
            &remote_dump_path,
            config.remote_exec_timeout_secs,
        )
        .await?;

    if !masking_rules.is_empty() {
        fanout.publish(stage(backup.id, "mask", None)).await;
        apply_masking(
            executor,
            server,
            &conn,
            target_database_name,
            masking_rules,
            config.remote_exec_timeout_secs,
        )
        .await?;
    }

    let cleanup_command = format!("rm -f {remote_dump_path}");
    if crate::executor::validation::validate_command(&cleanup_command).is_ok() {
        let _ = executor
            .execute(&cleanup_command, config.remote_exec_timeout_secs)
            .await;
    }
    drop(local_dump_file);

    let finished_at = Utc::now();
    let duration = (finished_at - started_at).num_milliseconds() as f64 / 1000.0;
    metrics.record_restore_success(&server.name, &backup.database_name, 1, raw.len() as u64, duration);

    fanout
        .publish(ProgressEvent::Completed {
            backup_id: backup.id,
            size_bytes: raw.len() as u64,
            duration_seconds: (finished_at - started_at).num_seconds(),
            at: finished_at,
        })
        .await;

    Ok(())
}

/// Runs each masking rule's generated SQL statement through the engine's
/// database family, immediately after a restore lands — before the restored
/// database is promoted for use. Only meaningful for SQL-backed families;
/// document-store/keystore families skip silently (see masking::generate_masking_statement).
async fn apply_masking(
    executor: &dyn Executor,
    server: &Server,
    conn: &ConnectionParams<'_>,
    database_name: &str,
    rules: &[MaskingRule],
    timeout_secs: u64,
) -> Result<()> {
    for rule in rules {
        let statement = crate::masking::generate_masking_statement(rule, server.database_family.as_str());
        let command = match server.database_family {
            crate::model::DatabaseFamily::Postgresql => {
                let flags = pg_connection_flags(conn);
                let command = format!(
                    "psql {flags} -d {} -c \"{}\"",
                    database_name,
                    statement.replace('"', "\\\"")
                );
                with_pgpassword(conn, command)
            }
            crate::model::DatabaseFamily::Mysql => {
                let flags = mysql_connection_flags(conn);
                let command = format!(
                    "mysql {flags} {} -e \"{}\"",
                    database_name,
                    statement.replace('"', "\\\"")
                );
                with_mysql_pwd(conn, command)
            }
            _ => continue,
        };
        crate::executor::validation::validate_command(&command)?;
        let result = executor.execute(&command, timeout_secs).await?;
        if !result.success() {
            return Err(crate::error::Error::Engine(format!(
                "masking statement failed for {}.{}: {}",
                rule.table,
                rule.column,
                String::from_utf8_lossy(&result.stderr)
            )));
        }
    }
    Ok(())
}

fn stage(backup_id: uuid::Uuid, stage: &str, detail: Option<String>) -> ProgressEvent {
    ProgressEvent::Stage {
        backup_id,
        stage: stage.to_string(),
        detail,
        at: Utc::now(),
    }
}
