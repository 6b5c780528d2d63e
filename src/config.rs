use std::env;
use std::time::Duration;

use crate::error::{Error, Result};

/// Process-wide configuration, loaded once from the environment at startup.
///
/// Mirrors the shape of the original platform's `Settings` object: required
/// values are fatal if absent, everything else carries a sane default.
#[derive(Clone, Debug)]
pub struct Config {
    pub environment: String,
    pub database_url: String,
    pub database_pool_size: u32,

    pub encryption_key: String,
    pub encryption_salt: String,

    pub object_store_url: String,

    pub notification_webhook_url: Option<String>,

    pub backup_temp_dir: String,
    pub max_concurrent_backups: usize,
    pub backup_task_time_limit_secs: u64,
    pub remote_exec_timeout_secs: u64,

    pub scheduler_tick_interval: Duration,
    pub retention_tick_interval: Duration,
    pub health_tick_interval: Duration,

    pub http_addr: std::net::SocketAddr,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let environment = env_or("ENVIRONMENT", "development");

        let database_url = require_env("DATABASE_URL")?;
        let database_pool_size = env_parse_or("DATABASE_POOL_SIZE", 20)?;

        let encryption_key = require_env("ENCRYPTION_KEY")?;
        let encryption_salt = match env::var("ENCRYPTION_SALT") {
            Ok(v) => v,
            Err(_) if environment != "production" => "dbbackup_dev_salt".to_string(),
            Err(_) => {
                return Err(Error::InvalidConfig(
                    "ENCRYPTION_SALT is required in production (no fixed salt fallback)"
                        .to_string(),
                ))
            }
        };

        let object_store_url = env_or("OBJECT_STORE_URL", "file:///tmp/dbbackup-blobs");
        let notification_webhook_url = env::var("NOTIFICATION_WEBHOOK_URL").ok();

        let backup_temp_dir = env_or("BACKUP_TEMP_DIR", "/tmp/dbbackup");
        let max_concurrent_backups = env_parse_or("MAX_CONCURRENT_BACKUPS", 5)?;
        let backup_task_time_limit_secs = env_parse_or("BACKUP_TASK_TIME_LIMIT_SECS", 3600)?;
        let remote_exec_timeout_secs = env_parse_or("REMOTE_EXEC_TIMEOUT_SECS", 300)?;

        let scheduler_tick_interval = Duration::from_secs(env_parse_or("SCHEDULER_TICK_SECS", 60)?);
        let retention_tick_interval =
            Duration::from_secs(env_parse_or("RETENTION_TICK_SECS", 3600)?);
        let health_tick_interval = Duration::from_secs(env_parse_or("HEALTH_TICK_SECS", 60)?);

        let http_addr = env_or("HTTP_ADDR", "0.0.0.0:9090")
            .parse()
            .map_err(|e| Error::InvalidConfig(format!("invalid HTTP_ADDR: {e}")))?;

        Ok(Self {
            environment,
            database_url,
            database_pool_size,
            encryption_key,
            encryption_salt,
            object_store_url,
            notification_webhook_url,
            backup_temp_dir,
            max_concurrent_backups,
            backup_task_time_limit_secs,
            remote_exec_timeout_secs,
            scheduler_tick_interval,
            retention_tick_interval,
            health_tick_interval,
            http_addr,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn require_env(key: &str) -> Result<String> {
    env::var(key).map_err(|_| Error::InvalidConfig(format!("{key} is required")))
}

fn env_parse_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(v) => v
            .parse()
            .map_err(|_| Error::InvalidConfig(format!("{key} has an invalid value: {v}"))),
        Err(_) => Ok(default),
    }
}
