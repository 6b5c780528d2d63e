pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::model::{
    AuditLogEntry, Backup, BackupStatus, Command, CommandExecution, ResourceType, RestoreJob,
    RestoreJobStatus, Schedule, Server,
};

pub use postgres::PostgresCatalog;

/// Durable state for everything the orchestrator tracks: servers, schedules,
/// backups, command executions, and the audit trail. Every mutation that
/// changes externally-visible state is paired with an audit log row in the
/// same transaction.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn get_server(&self, id: Uuid) -> Result<Server>;
    async fn get_server_by_name(&self, name: &str) -> Result<Server>;
    async fn list_active_servers(&self) -> Result<Vec<Server>>;

    /// The only fields a health prober is allowed to mutate on a Server.
    async fn update_server_health(
        &self,
        id: Uuid,
        health_state: crate::model::HealthState,
        last_heartbeat: Option<DateTime<Utc>>,
    ) -> Result<()>;

    async fn list_enabled_schedules(&self) -> Result<Vec<Schedule>>;
    async fn mark_schedule_fired(&self, id: Uuid, fired_at: DateTime<Utc>) -> Result<()>;

    async fn insert_backup(&self, backup: &Backup) -> Result<()>;
    async fn get_backup(&self, id: Uuid) -> Result<Backup>;
    async fn list_backups_for_server(&self, server_id: Uuid) -> Result<Vec<Backup>>;
    async fn list_pending_backups(&self, limit: i64) -> Result<Vec<Backup>>;

    /// Compare-and-set status transition: succeeds only if the row's current
    /// status still matches `expected_status`. Returns `Error::CasLost` on a
    /// race, so callers can decide whether to retry or abandon the job.
    async fn transition_backup_status(
        &self,
        id: Uuid,
        expected_status: BackupStatus,
        next_status: BackupStatus,
    ) -> Result<()>;

    async fn complete_backup(
        &self,
        id: Uuid,
        storage_path: &str,
        size_bytes: i64,
        checksum_sha256: &str,
    ) -> Result<()>;

    async fn fail_backup(&self, id: Uuid, error_message: &str) -> Result<()>;

    async fn soft_delete_backup(&self, id: Uuid) -> Result<()>;

    async fn increment_backup_retry_count(&self, id: Uuid) -> Result<()>;

    async fn insert_command_execution(&self, execution: &CommandExecution) -> Result<()>;
    async fn update_command_execution(&self, execution: &CommandExecution) -> Result<()>;
    async fn list_commands(&self) -> Result<Vec<Command>>;

    async fn insert_restore_job(&self, job: &RestoreJob) -> Result<()>;
    async fn get_restore_job(&self, id: Uuid) -> Result<RestoreJob>;
    async fn list_pending_restore_jobs(&self, limit: i64) -> Result<Vec<RestoreJob>>;
    async fn transition_restore_job_status(
        &self,
        id: Uuid,
        expected_status: RestoreJobStatus,
        next_status: RestoreJobStatus,
    ) -> Result<()>;
    async fn complete_restore_job(&self, id: Uuid) -> Result<()>;
    async fn fail_restore_job(&self, id: Uuid, error_message: &str) -> Result<()>;

    /// `actor` is `None` for system-initiated mutations (scheduler, worker,
    /// reaper, health prober) that have no human or API caller behind them.
    async fn insert_audit_log(
        &self,
        actor: Option<&str>,
        action: &str,
        resource_type: ResourceType,
        resource_id: Option<Uuid>,
        details: Option<serde_json::Value>,
    ) -> Result<()>;

    async fn list_audit_log(&self, limit: i64) -> Result<Vec<AuditLogEntry>>;
}
