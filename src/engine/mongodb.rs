use async_trait::async_trait;

use super::{shell_quote, BackupEngine, ConnectionParams};
use crate::error::Result;
use crate::executor::validation::validate_command;
use crate::executor::Executor;
use crate::model::BackupKind;

pub struct MongodbEngine;

/// `--host/--port/--username` plus `--authenticationDatabase=admin` whenever
/// credentials are present — mongodump/mongorestore have no env-var form for
/// the password, so it rides on argv the way the tools actually accept it.
fn connection_flags(conn: &ConnectionParams<'_>) -> String {
    let mut flags = format!("--host {}", conn.host);
    if let Some(port) = conn.port {
        flags.push_str(&format!(" --port {port}"));
    }
    if let Some(user) = conn.username {
        flags.push_str(&format!(" --username {user} --authenticationDatabase admin"));
    }
    if let Some(password) = conn.password {
        flags.push_str(&format!(" --password {}", shell_quote(password)));
    }
    flags
}

#[async_trait]
impl BackupEngine for MongodbEngine {
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
            return Err(super::reject_unsupported("mongodb", kind));
        }

        let flags = connection_flags(conn);
        let command =
            format!("mongodump {flags} --db={database_name} --archive={remote_dump_path} --gzip=false");

        validate_command(&command)?;
        let result = executor.execute(&command, timeout_secs).await?;
        if !result.success() {
            return Err(crate::error::Error::Engine(format!(
                "mongodump exited {}: {}",
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
        let command =
            format!("mongorestore {flags} --db={database_name} --archive={remote_dump_path} --drop");

        validate_command(&command)?;
        let result = executor.execute(&command, timeout_secs).await?;
        if !result.success() {
            return Err(crate::error::Error::Engine(format!(
                "mongorestore exited {}: {}",
                result.exit_code,
                String::from_utf8_lossy(&result.stderr)
            )));
        }
        Ok(())
    }

    async fn list_databases(
        &self,
        _executor: &dyn Executor,
        _conn: &ConnectionParams<'_>,
        _timeout_secs: u64,
    ) -> Result<Vec<String>> {
        // Listing databases needs an interactive JS evaluator (mongosh) or a
        // native driver; mongosh is deliberately not in the command
        // allow-list (§6), so this is a documented gap rather than a command
        // run under a tool this crate won't validate as safe.
        Err(crate::error::Error::Engine(
            "mongodb database listing requires a native driver or mongosh, neither of which \
             this executor is permitted to invoke; discover databases out of band"
                .to_string(),
        ))
    }
}
