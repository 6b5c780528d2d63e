use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::HealthState;

/// One of the fixed broadcast channels the fan-out bus maintains. `All`
/// receives every event regardless of its own tag; the other three are
/// scoped to one concern so a dashboard can subscribe to only what it needs.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ChannelTag {
    All,
    Backups,
    Servers,
    Logs,
}

impl ChannelTag {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "all" => Some(ChannelTag::All),
            "backups" => Some(ChannelTag::Backups),
            "servers" => Some(ChannelTag::Servers),
            "logs" => Some(ChannelTag::Logs),
            _ => None,
        }
    }
}

/// A point-in-time update published on the fan-out bus and pushed to
/// subscribed WebSocket clients. `event` on the wire carries one of the
/// seven kinds named in the external interface (`backup_progress` and
/// `restore_progress` both serialize through the progress-stage variants
/// below, distinguished by their `stage`/`kind` field).
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum ProgressEvent {
    Started {
        backup_id: Uuid,
        server_id: Uuid,
        at: DateTime<Utc>,
    },
    Stage {
        backup_id: Uuid,
        stage: String,
        detail: Option<String>,
        at: DateTime<Utc>,
    },
    BytesTransferred {
        backup_id: Uuid,
        bytes: u64,
        at: DateTime<Utc>,
    },
    Completed {
        backup_id: Uuid,
        size_bytes: u64,
        duration_seconds: i64,
        at: DateTime<Utc>,
    },
    Failed {
        backup_id: Uuid,
        reason: String,
        at: DateTime<Utc>,
    },
    ServerHealth {
        server_id: Uuid,
        state: HealthState,
        message: String,
        at: DateTime<Utc>,
    },
    Log {
        level: String,
        message: String,
        at: DateTime<Utc>,
    },
    Notification {
        message: String,
        at: DateTime<Utc>,
    },
    TaskUpdate {
        task: String,
        detail: String,
        at: DateTime<Utc>,
    },
    CommandOutput {
        execution_id: Uuid,
        chunk: String,
        at: DateTime<Utc>,
    },
}

impl ProgressEvent {
    /// The channel tag this event is published on. `Backups`/`Servers`/`Logs`
    /// are the scoped concerns; `Notification`, `TaskUpdate`, and
    /// `CommandOutput` carry no natural per-concern home so they go out only
    /// on `All`.
    pub fn channel_tag(&self) -> ChannelTag {
        match self {
            ProgressEvent::Started { .. }
            | ProgressEvent::Stage { .. }
            | ProgressEvent::BytesTransferred { .. }
            | ProgressEvent::Completed { .. }
            | ProgressEvent::Failed { .. } => ChannelTag::Backups,
            ProgressEvent::ServerHealth { .. } => ChannelTag::Servers,
            ProgressEvent::Log { .. } => ChannelTag::Logs,
            ProgressEvent::Notification { .. }
            | ProgressEvent::TaskUpdate { .. }
            | ProgressEvent::CommandOutput { .. } => ChannelTag::All,
        }
    }
}
