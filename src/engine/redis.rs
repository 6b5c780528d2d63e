use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::{shell_quote, BackupEngine, ConnectionParams};
use crate::error::{Error, Result};
use crate::executor::validation::validate_command;
use crate::executor::Executor;
use crate::model::BackupKind;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Redis has no logical per-database dump; a "backup" is a point-in-time
/// RDB snapshot of the whole keyspace.
pub struct RedisEngine;

fn connection_flags(conn: &ConnectionParams<'_>) -> String {
    let mut flags = format!("-h {}", conn.host);
    if let Some(port) = conn.port {
        flags.push_str(&format!(" -p {port}"));
    }
    if let Some(user) = conn.username {
        flags.push_str(&format!(" --user {user}"));
    }
    if let Some(password) = conn.password {
        flags.push_str(&format!(" -a {} --no-auth-warning", shell_quote(password)));
    }
    flags
}

fn parse_trimmed_stdout(stdout: &[u8]) -> String {
    String::from_utf8_lossy(stdout).trim().to_string()
}

/// `CONFIG GET` replies with the key on one line and the value on the next.
fn parse_config_get_value(stdout: &[u8]) -> Option<String> {
    String::from_utf8_lossy(stdout)
        .lines()
        .nth(1)
        .map(|l| l.trim().to_string())
        .filter(|v| !v.is_empty())
}

async fn resolve_rdb_path(
    executor: &dyn Executor,
    flags: &str,
    timeout_secs: u64,
) -> Result<String> {
    let dir_cmd = format!("redis-cli {flags} CONFIG GET dir");
    validate_command(&dir_cmd)?;
    let dir_result = executor.execute(&dir_cmd, timeout_secs).await?;
    let dir = parse_config_get_value(&dir_result.stdout).unwrap_or_else(|| "/data".to_string());

    let dbfilename_cmd = format!("redis-cli {flags} CONFIG GET dbfilename");
    validate_command(&dbfilename_cmd)?;
    let dbfilename_result = executor.execute(&dbfilename_cmd, timeout_secs).await?;
    let dbfilename =
        parse_config_get_value(&dbfilename_result.stdout).unwrap_or_else(|| "dump.rdb".to_string());

    Ok(format!("{}/{}", dir.trim_end_matches('/'), dbfilename))
}

#[async_trait]
impl BackupEngine for RedisEngine {
    async fn create_backup(
        &self,
        executor: &dyn Executor,
        conn: &ConnectionParams<'_>,
        _database_name: &str,
        kind: BackupKind,
        remote_dump_path: &str,
        timeout_secs: u64,
    ) -> Result<()> {
        if kind != BackupKind::Full {
            return Err(super::reject_unsupported("redis", kind));
        }

        let flags = connection_flags(conn);

        let lastsave_cmd = format!("redis-cli {flags} LASTSAVE");
        validate_command(&lastsave_cmd)?;
        let before = executor.execute(&lastsave_cmd, timeout_secs).await?;
        let before_ts = parse_trimmed_stdout(&before.stdout);

        let bgsave_cmd = format!("redis-cli {flags} BGSAVE");
        validate_command(&bgsave_cmd)?;
        let bgsave = executor.execute(&bgsave_cmd, timeout_secs).await?;
        if !bgsave.success() {
            return Err(Error::Engine(format!(
                "redis BGSAVE exited {}: {}",
                bgsave.exit_code,
                String::from_utf8_lossy(&bgsave.stderr)
            )));
        }

        let deadline = Instant::now() + Duration::from_secs(timeout_secs);
        loop {
            tokio::time::sleep(POLL_INTERVAL).await;
            let after = executor.execute(&lastsave_cmd, timeout_secs).await?;
            if parse_trimmed_stdout(&after.stdout) != before_ts {
                break;
            }
            if Instant::now() >= deadline {
                return Err(Error::Engine(
                    "redis BGSAVE did not complete before the remote exec timeout".to_string(),
                ));
            }
        }

        let rdb_path = resolve_rdb_path(executor, &flags, timeout_secs).await?;
        let copy_cmd = format!("cp {rdb_path} {remote_dump_path}");
        validate_command(&copy_cmd)?;
        let copy = executor.execute(&copy_cmd, timeout_secs).await?;
        if !copy.success() {
            return Err(Error::Engine(format!(
                "copying {rdb_path} to {remote_dump_path} exited {}: {}",
                copy.exit_code,
                String::from_utf8_lossy(&copy.stderr)
            )));
        }
        Ok(())
    }

    async fn restore_backup(
        &self,
        executor: &dyn Executor,
        conn: &ConnectionParams<'_>,
        _database_name: &str,
        remote_dump_path: &str,
        timeout_secs: u64,
    ) -> Result<()> {
        let flags = connection_flags(conn);
        let rdb_path = resolve_rdb_path(executor, &flags, timeout_secs).await?;

        // SHUTDOWN NOSAVE drops the connection as part of succeeding, so its
        // own exit code isn't a meaningful success signal here.
        let shutdown_cmd = format!("redis-cli {flags} SHUTDOWN NOSAVE");
        validate_command(&shutdown_cmd)?;
        let _ = executor.execute(&shutdown_cmd, timeout_secs).await;

        let copy_cmd = format!("cp {remote_dump_path} {rdb_path}");
        validate_command(&copy_cmd)?;
        let copy = executor.execute(&copy_cmd, timeout_secs).await?;
        if !copy.success() {
            return Err(Error::Engine(format!(
                "staging {remote_dump_path} over {rdb_path} exited {}: {}",
                copy.exit_code,
                String::from_utf8_lossy(&copy.stderr)
            )));
        }

        let restart_cmd = "redis-server --daemonize yes".to_string();
        validate_command(&restart_cmd)?;
        let restart = executor.execute(&restart_cmd, timeout_secs).await?;
        if !restart.success() {
            return Err(Error::Engine(format!(
                "redis-server restart exited {}: {}",
                restart.exit_code,
                String::from_utf8_lossy(&restart.stderr)
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
        let command = format!("redis-cli {flags} CONFIG GET databases");
        validate_command(&command)?;
        let result = executor.execute(&command, timeout_secs).await?;
        let count: usize = parse_config_get_value(&result.stdout)
            .and_then(|v| v.parse().ok())
            .unwrap_or(16);
        Ok((0..count).map(|i| i.to_string()).collect())
    }
}
