use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BackupKind {
    Full,
    Incremental,
    Logical,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BackupStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelling,
    Cancelled,
    Deleted,
}

impl BackupStatus {
    /// Valid forward transitions. Anything not listed here is rejected by the
    /// catalog's compare-and-set update.
    pub fn can_transition_to(&self, next: BackupStatus) -> bool {
        use BackupStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress)
                | (Pending, Cancelling)
                | (InProgress, Completed)
                | (InProgress, Failed)
                | (InProgress, Cancelling)
                | (Cancelling, Cancelled)
                | (Cancelling, Completed)
                | (Cancelling, Failed)
                | (Completed, Deleted)
                | (Failed, Deleted)
                | (Cancelled, Deleted)
        )
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CompressionKind {
    None,
    Gzip,
    Lz4,
    Zstd,
}

/// One backup run: a single row moving through the pending/in_progress/completed
/// (or failed/cancelled) lifecycle, tracked end to end by the catalog.
#[derive(Clone, Debug, Deserialize, Serialize, sqlx::FromRow)]
pub struct Backup {
    pub id: Uuid,
    pub server_id: Uuid,
    pub schedule_id: Option<Uuid>,
    /// The backup this one is incremental against, if any. Anchors the
    /// restore chain independently of anything the engine itself tracks.
    pub parent_backup_id: Option<Uuid>,
    pub database_name: String,
    pub kind: BackupKind,
    pub status: BackupStatus,
    pub compression: CompressionKind,
    pub encrypted: bool,
    pub storage_path: Option<String>,
    pub size_bytes: Option<i64>,
    pub checksum_sha256: Option<String>,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Backup {
    pub fn duration_seconds(&self) -> Option<i64> {
        match (self.started_at, self.finished_at) {
            (Some(s), Some(f)) => Some((f - s).num_seconds()),
            _ => None,
        }
    }
}
