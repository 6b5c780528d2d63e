use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Transport used to reach a Server. Dispatches which `Executor` variant is constructed.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Shell,
    Container,
    Pod,
}

/// Database family a Server speaks. Dispatches which `BackupEngine` variant is constructed.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DatabaseFamily {
    Postgresql,
    Mysql,
    Mongodb,
    Redis,
}

impl DatabaseFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseFamily::Postgresql => "postgresql",
            DatabaseFamily::Mysql => "mysql",
            DatabaseFamily::Mongodb => "mongodb",
            DatabaseFamily::Redis => "redis",
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
    Unknown,
}

/// A remote database host the orchestrator can reach over one of the three transports.
///
/// Credentials are stored envelope-encrypted (§4.6) and are decrypted lazily by the
/// executor factory; they are never logged or included in `Debug` output for the row.
#[derive(Clone, Debug, Deserialize, Serialize, sqlx::FromRow)]
pub struct Server {
    pub id: Uuid,
    pub name: String,
    pub transport_kind: TransportKind,
    pub host: String,
    pub port: Option<i32>,
    /// Envelope-encrypted credentials blob (AES-256-GCM, see crypto::cipher).
    pub credentials_ciphertext: Vec<u8>,
    pub database_family: DatabaseFamily,
    pub environment: String,
    pub health_state: HealthState,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Decrypted connection credentials for a Server, held only in memory for the
/// lifetime of an executor construction. Never serialized, never logged.
#[derive(Clone)]
pub struct ServerCredentials {
    pub username: Option<String>,
    pub password: Option<String>,
    pub private_key: Option<String>,
}

impl std::fmt::Debug for ServerCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerCredentials").field("username", &self.username).finish_non_exhaustive()
    }
}
