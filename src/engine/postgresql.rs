use async_trait::async_trait;

use super::{pg_connection_flags as connection_flags, with_pgpassword, BackupEngine, ConnectionParams};
use crate::error::Result;
use crate::executor::validation::validate_command;
use crate::executor::Executor;
use crate::model::BackupKind;

pub struct PostgresEngine;

#[async_trait]
impl BackupEngine for PostgresEngine {
    async fn create_backup(
        &self,
        executor: &dyn Executor,
        conn: &ConnectionParams<'_>,
        database_name: &str,
        kind: BackupKind,
        remote_dump_path: &str,
        timeout_secs: u64,
    ) -> Result<()> {
        let flags = connection_flags(conn);
        let command = match kind {
            BackupKind::Full | BackupKind::Logical => format!(
                "pg_dump --format=custom --no-owner {flags} --file={remote_dump_path} {database_name}"
            ),
            // a base-backup tree, not a single-database logical dump — the
            // incremental chain is anchored by Backup::parent_backup_id, not
            // by anything pg_basebackup itself tracks.
            BackupKind::Incremental => {
                format!("pg_basebackup {flags} -D {remote_dump_path} -Ft -z -Xs -P")
            }
        };
        let command = with_pgpassword(conn, command);

        validate_command(&command)?;
        let result = executor.execute(&command, timeout_secs).await?;
        if !result.success() {
            return Err(crate::error::Error::Engine(format!(
                "{} exited {}: {}",
                if kind == BackupKind::Incremental { "pg_basebackup" } else { "pg_dump" },
                result.exit_code,
                String::from_utf8_lossy(&result.stderr)
            )));
        }
        Ok(())
    }

    async fn restore_backup(
        &self,
        executor: &dyn Executor,
        conn: &ConnectionParams<'_>,
        database_name: &str,
        remote_dump_path: &str,
        timeout_secs: u64,
    ) -> Result<()> {
        let flags = connection_flags(conn);
        let command = format!(
            "pg_restore --clean --if-exists --no-owner {flags} --dbname={database_name} {remote_dump_path}"
        );
        let command = with_pgpassword(conn, command);

        validate_command(&command)?;
        let result = executor.execute(&command, timeout_secs).await?;
        if !result.success() {
            return Err(crate::error::Error::Engine(format!(
                "pg_restore exited {}: {}",
                result.exit_code,
                String::from_utf8_lossy(&result.stderr)
            )));
        }
        Ok(())
    }

    async fn list_databases(
        &self,
        executor: &dyn Executor,
        conn: &ConnectionParams<'_>,
        timeout_secs: u64,
    ) -> Result<Vec<String>> {
        let flags = connection_flags(conn);
        let command = format!(
            "psql {flags} -At -c \"SELECT datname FROM pg_database WHERE datistemplate = false\""
        );
        let command = with_pgpassword(conn, command);

        validate_command(&command)?;
        let result = executor.execute(&command, timeout_secs).await?;
        Ok(String::from_utf8_lossy(&result.stdout)
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect())
    }
}
