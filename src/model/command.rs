use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Timeout,
}

/// A saved, reusable command template an operator can run against a Server
/// through the same Executor used by the backup pipeline. Subject to the
/// same allow-list and grammar validation as every other remote command.
#[derive(Clone, Debug, Deserialize, Serialize, sqlx::FromRow)]
pub struct Command {
    pub id: Uuid,
    pub name: String,
    pub template: String,
    pub tags: Vec<String>,
    pub favorite: bool,
    pub created_at: DateTime<Utc>,
}

/// One execution of a Command (or of an ad-hoc validated command string)
/// against a specific Server.
#[derive(Clone, Debug, Deserialize, Serialize, sqlx::FromRow)]
pub struct CommandExecution {
    pub id: Uuid,
    pub command_id: Option<Uuid>,
    pub server_id: Uuid,
    pub command_text: String,
    pub status: CommandStatus,
    pub exit_code: Option<i32>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}
