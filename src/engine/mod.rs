pub mod mongodb;
pub mod mysql;
pub mod postgresql;
pub mod redis;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::model::{BackupKind, DatabaseFamily, Server, ServerCredentials};

/// Connection details an engine needs to authenticate its dump/restore/list
/// commands against a Server, borrowed for the lifetime of one pipeline run.
pub struct ConnectionParams<'a> {
    pub host: &'a str,
    pub port: Option<i32>,
    pub username: Option<&'a str>,
    pub password: Option<&'a str>,
}

impl<'a> ConnectionParams<'a> {
    pub fn new(server: &'a Server, credentials: &'a ServerCredentials) -> Self {
        Self {
            host: &server.host,
            port: server.port,
            username: credentials.username.as_deref(),
            password: credentials.password.as_deref(),
        }
    }
}

/// Wraps a value in single quotes for interpolation into a shell command,
/// escaping any single quote it contains. Used for credential values that
/// can't be validated against an identifier grammar the way hostnames and
/// database names are.
pub(crate) fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

/// `-h/-p/-U` flags shared by every psql-family invocation (dump, restore,
/// list, and the restore pipeline's post-restore masking pass). Never
/// includes the password — that rides in `PGPASSWORD`, never on argv.
pub(crate) fn pg_connection_flags(conn: &ConnectionParams<'_>) -> String {
    let mut flags = format!("-h {}", conn.host);
    if let Some(port) = conn.port {
        flags.push_str(&format!(" -p {port}"));
    }
    if let Some(user) = conn.username {
        flags.push_str(&format!(" -U {user}"));
    }
    flags
}

pub(crate) fn with_pgpassword(conn: &ConnectionParams<'_>, command: String) -> String {
    match conn.password {
        Some(password) => format!("PGPASSWORD={} {command}", shell_quote(password)),
        None => command,
    }
}

/// `-h/-P/-u` flags shared by every mysql-family invocation (dump, restore,
/// list, and the restore pipeline's post-restore masking pass).
pub(crate) fn mysql_connection_flags(conn: &ConnectionParams<'_>) -> String {
    let mut flags = format!("-h {}", conn.host);
    if let Some(port) = conn.port {
        flags.push_str(&format!(" -P {port}"));
    }
    if let Some(user) = conn.username {
        flags.push_str(&format!(" -u {user}"));
    }
    flags
}

/// `MYSQL_PWD` keeps the password off argv, same rationale as postgres's
/// `PGPASSWORD` (mysql's own `-p<pass>` form puts it in `ps` output).
pub(crate) fn with_mysql_pwd(conn: &ConnectionParams<'_>, command: String) -> String {
    match conn.password {
        Some(password) => format!("MYSQL_PWD={} {command}", shell_quote(password)),
        None => command,
    }
}

/// Database-specific dump/restore/list commands, run through an `Executor`.
/// Each implementation only knows how to build and parse command lines —
/// it never opens a transport itself.
#[async_trait]
pub trait BackupEngine: Send + Sync {
    /// Runs a dump of `database_name` through `executor`, writing the raw
    /// (uncompressed, unencrypted) dump bytes to `remote_dump_path`.
    async fn create_backup(
        &self,
        executor: &dyn Executor,
        conn: &ConnectionParams<'_>,
        database_name: &str,
        kind: BackupKind,
        remote_dump_path: &str,
        timeout_secs: u64,
    ) -> Result<()>;

    /// Restores a previously produced dump file at `remote_dump_path` into
    /// `database_name`.
    async fn restore_backup(
        &self,
        executor: &dyn Executor,
        conn: &ConnectionParams<'_>,
        database_name: &str,
        remote_dump_path: &str,
        timeout_secs: u64,
    ) -> Result<()>;

    /// Lists databases visible on the server, for discovery/validation.
    async fn list_databases(
        &self,
        executor: &dyn Executor,
        conn: &ConnectionParams<'_>,
        timeout_secs: u64,
    ) -> Result<Vec<String>>;
}

pub fn build_engine(family: DatabaseFamily) -> Box<dyn BackupEngine> {
    match family {
        DatabaseFamily::Postgresql => Box::new(postgresql::PostgresEngine),
        DatabaseFamily::Mysql => Box::new(mysql::MysqlEngine),
        DatabaseFamily::Mongodb => Box::new(mongodb::MongodbEngine),
        DatabaseFamily::Redis => Box::new(redis::RedisEngine),
    }
}

pub(crate) fn reject_unsupported(family: &str, kind: BackupKind) -> Error {
    Error::UnsupportedCombination {
        family: family.to_string(),
        kind: format!("{kind:?}"),
    }
}
