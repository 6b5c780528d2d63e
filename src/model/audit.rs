use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Grounded in the original platform's `AuditAction` enum (models/audit.py):
/// kept as a flat action tag rather than a closed Rust enum so new action
/// names can be added by callers without a catalog migration.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Server,
    Backup,
    Schedule,
    Command,
    User,
}

/// One append-only audit trail entry. Every mutating catalog operation writes
/// one of these in the same transaction as the mutation it describes.
/// `actor` is `None` for system-initiated actions (scheduler, worker, reaper,
/// health prober) that have no human or API caller behind them.
#[derive(Clone, Debug, Deserialize, Serialize, sqlx::FromRow)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub actor: Option<String>,
    pub action: String,
    pub resource_type: ResourceType,
    pub resource_id: Option<Uuid>,
    pub details: Option<sqlx::types::Json<serde_json::Value>>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
}
