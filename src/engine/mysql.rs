use async_trait::async_trait;

use super::{mysql_connection_flags as connection_flags, with_mysql_pwd, BackupEngine, ConnectionParams};
use crate::error::Result;
use crate::executor::validation::validate_command;
use crate::executor::Executor;
use crate::model::BackupKind;

pub struct MysqlEngine;

#[async_trait]
impl BackupEngine for MysqlEngine {
    async fn create_backup(
        &self,
        executor: &dyn Executor,
        conn: &ConnectionParams<'_>,
        database_name: &str,
        kind: BackupKind,
        remote_dump_path: &str,
        timeout_secs: u64,
    ) -> Result<()> {
        if kind == BackupKind::Incremental {
            return Err(super::reject_unsupported("mysql", kind));
        }

        let flags = connection_flags(conn);
        let command = format!(
            "mysqldump --single-transaction --quick --lock-tables=false --routines --triggers {flags} --result-file={remote_dump_path} {database_name}"
        );
        let command = with_mysql_pwd(conn, command);

        validate_command(&command)?;
        let result = executor.execute(&command, timeout_secs).await?;
        if !result.success() {
            return Err(crate::error::Error::Engine(format!(
                "mysqldump exited {}: {}",
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
        let command = format!("mysql {flags} {database_name} -e \"source {remote_dump_path}\"");
        let command = with_mysql_pwd(conn, command);

        validate_command(&command)?;
        let result = executor.execute(&command, timeout_secs).await?;
        if !result.success() {
            return Err(crate::error::Error::Engine(format!(
                "mysql restore exited {}: {}",
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
        let command = format!("mysql {flags} -N -e \"SHOW DATABASES\"");
        let command = with_mysql_pwd(conn, command);

        validate_command(&command)?;
        let result = executor.execute(&command, timeout_secs).await?;
        Ok(String::from_utf8_lossy(&result.stdout)
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty() && !matches!(l.as_str(), "information_schema" | "performance_schema" | "mysql" | "sys"))
            .collect())
    }
}
