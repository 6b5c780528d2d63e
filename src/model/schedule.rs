use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::backup::{BackupKind, CompressionKind};
use super::retention::RetentionPolicy;

/// A cron-driven recurring backup job bound to one Server/database pair.
///
/// The scheduler tick evaluates `cron_expression` in `timezone` against the
/// wall clock once per tick and fires at most one Backup per Schedule per tick,
/// regardless of how many cron boundaries were missed since the last tick.
#[derive(Clone, Debug, Deserialize, Serialize, sqlx::FromRow)]
pub struct Schedule {
    pub id: Uuid,
    pub server_id: Uuid,
    pub database_name: String,
    pub cron_expression: String,
    pub timezone: String,
    pub kind: BackupKind,
    pub compression: CompressionKind,
    pub encrypted: bool,
    pub retention: sqlx::types::Json<RetentionPolicy>,
    pub enabled: bool,
    pub last_fired_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
