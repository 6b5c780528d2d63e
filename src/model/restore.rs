use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::masking::MaskingRule;

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RestoreJobStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl RestoreJobStatus {
    pub fn can_transition_to(&self, next: RestoreJobStatus) -> bool {
        use RestoreJobStatus::*;
        matches!((self, next), (Pending, InProgress) | (InProgress, Completed) | (InProgress, Failed))
    }
}

/// A restore operation against a previously completed Backup. Unlike a
/// Backup, a RestoreJob doesn't itself produce durable state in the blob
/// store — it drives the backup pipeline's inverse against the target
/// database and, optionally, a masking pass.
#[derive(Clone, Debug, Deserialize, Serialize, sqlx::FromRow)]
pub struct RestoreJob {
    pub id: Uuid,
    pub backup_id: Uuid,
    pub server_id: Uuid,
    pub target_database_name: String,
    pub status: RestoreJobStatus,
    pub masking_rules: sqlx::types::Json<Vec<MaskingRule>>,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
