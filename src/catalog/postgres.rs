use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use super::Catalog;
use crate::error::{Error, Result};
use crate::model::{
    AuditLogEntry, Backup, BackupStatus, Command, CommandExecution, ResourceType, RestoreJob,
    RestoreJobStatus, Schedule, Server,
};

/// `sqlx`-backed catalog implementation. All state-machine transitions use
/// `UPDATE ... WHERE status = $expected` compare-and-set so two workers
/// racing on the same backup never both "win".
pub struct PostgresCatalog {
    pool: PgPool,
}

impl PostgresCatalog {
    pub async fn connect(database_url: &str, pool_size: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(pool_size)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Catalog(sqlx::Error::Migrate(Box::new(e))))
    }
}

#[async_trait]
impl Catalog for PostgresCatalog {
    #[instrument(skip(self))]
    async fn get_server(&self, id: Uuid) -> Result<Server> {
        sqlx::query_as::<_, Server>("SELECT * FROM servers WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::ServerNotFound { name: id.to_string() })
    }

    #[instrument(skip(self))]
    async fn get_server_by_name(&self, name: &str) -> Result<Server> {
        sqlx::query_as::<_, Server>("SELECT * FROM servers WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::ServerNotFound { name: name.to_string() })
    }

    #[instrument(skip(self))]
    async fn list_active_servers(&self) -> Result<Vec<Server>> {
        Ok(
            sqlx::query_as::<_, Server>("SELECT * FROM servers WHERE active = true")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    #[instrument(skip(self))]
    async fn update_server_health(
        &self,
        id: Uuid,
        health_state: crate::model::HealthState,
        last_heartbeat: Option<DateTime<Utc>>,
    ) -> Result<()> {
        sqlx::query("UPDATE servers SET health_state = $1, last_heartbeat = COALESCE($2, last_heartbeat) WHERE id = $3")
            .bind(health_state)
            .bind(last_heartbeat)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_enabled_schedules(&self) -> Result<Vec<Schedule>> {
        Ok(
            sqlx::query_as::<_, Schedule>("SELECT * FROM schedules WHERE enabled = true")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    #[instrument(skip(self))]
    async fn mark_schedule_fired(&self, id: Uuid, fired_at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE schedules SET last_fired_at = $1 WHERE id = $2")
            .bind(fired_at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip(self, backup))]
    async fn insert_backup(&self, backup: &Backup) -> Result<()> {
        sqlx::query(
            "INSERT INTO backups
                (id, server_id, schedule_id, parent_backup_id, database_name, kind, status,
                 compression, encrypted, storage_path, size_bytes, checksum_sha256, error_message,
                 retry_count, started_at, finished_at, deleted_at, created_at)
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18)",
        )
        .bind(backup.id)
        .bind(backup.server_id)
        .bind(backup.schedule_id)
        .bind(backup.parent_backup_id)
        .bind(&backup.database_name)
        .bind(backup.kind)
        .bind(backup.status)
        .bind(backup.compression)
        .bind(backup.encrypted)
        .bind(&backup.storage_path)
        .bind(backup.size_bytes)
        .bind(&backup.checksum_sha256)
        .bind(&backup.error_message)
        .bind(backup.retry_count)
        .bind(backup.started_at)
        .bind(backup.finished_at)
        .bind(backup.deleted_at)
        .bind(backup.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_backup(&self, id: Uuid) -> Result<Backup> {
        sqlx::query_as::<_, Backup>("SELECT * FROM backups WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(Error::BackupNotFound { id })
    }

    #[instrument(skip(self))]
    async fn list_backups_for_server(&self, server_id: Uuid) -> Result<Vec<Backup>> {
        Ok(sqlx::query_as::<_, Backup>(
            "SELECT * FROM backups WHERE server_id = $1 AND status != 'deleted' ORDER BY created_at DESC",
        )
        .bind(server_id)
        .fetch_all(&self.pool)
        .await?)
    }

    #[instrument(skip(self))]
    async fn list_pending_backups(&self, limit: i64) -> Result<Vec<Backup>> {
        Ok(sqlx::query_as::<_, Backup>(
            "SELECT * FROM backups WHERE status = 'pending' ORDER BY created_at ASC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }

    #[instrument(skip(self))]
    async fn transition_backup_status(
        &self,
        id: Uuid,
        expected_status: BackupStatus,
        next_status: BackupStatus,
    ) -> Result<()> {
        if !expected_status.can_transition_to(next_status) {
            return Err(Error::ValidationFailed(format!(
                "illegal backup transition {expected_status:?} -> {next_status:?}"
            )));
        }

        let started_at_clause = if next_status == BackupStatus::InProgress {
            ", started_at = now()"
        } else {
            ""
        };
        let query = format!(
            "UPDATE backups SET status = $1{started_at_clause} WHERE id = $2 AND status = $3"
        );
        let result = sqlx::query(&query)
            .bind(next_status)
            .bind(id)
            .bind(expected_status)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::CasLost { id });
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn complete_backup(
        &self,
        id: Uuid,
        storage_path: &str,
        size_bytes: i64,
        checksum_sha256: &str,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE backups
             SET status = 'completed', storage_path = $1, size_bytes = $2,
                 checksum_sha256 = $3, finished_at = now()
             WHERE id = $4 AND status = 'in_progress'",
        )
        .bind(storage_path)
        .bind(size_bytes)
        .bind(checksum_sha256)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::CasLost { id });
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn fail_backup(&self, id: Uuid, error_message: &str) -> Result<()> {
        sqlx::query(
            "UPDATE backups SET status = 'failed', error_message = $1, finished_at = now()
             WHERE id = $2 AND status IN ('in_progress', 'pending', 'cancelling')",
        )
        .bind(error_message)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn soft_delete_backup(&self, id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE backups SET status = 'deleted', deleted_at = now() WHERE id = $1
             AND status IN ('completed', 'failed', 'cancelled')",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn increment_backup_retry_count(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE backups SET retry_count = retry_count + 1 WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip(self, execution))]
    async fn insert_command_execution(&self, execution: &CommandExecution) -> Result<()> {
        sqlx::query(
            "INSERT INTO command_executions
                (id, command_id, server_id, command_text, status, exit_code, stdout, stderr,
                 started_at, finished_at)
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)",
        )
        .bind(execution.id)
        .bind(execution.command_id)
        .bind(execution.server_id)
        .bind(&execution.command_text)
        .bind(execution.status)
        .bind(execution.exit_code)
        .bind(&execution.stdout)
        .bind(&execution.stderr)
        .bind(execution.started_at)
        .bind(execution.finished_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self, execution))]
    async fn update_command_execution(&self, execution: &CommandExecution) -> Result<()> {
        sqlx::query(
            "UPDATE command_executions
             SET status = $1, exit_code = $2, stdout = $3, stderr = $4, finished_at = $5
             WHERE id = $6",
        )
        .bind(execution.status)
        .bind(execution.exit_code)
        .bind(&execution.stdout)
        .bind(&execution.stderr)
        .bind(execution.finished_at)
        .bind(execution.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_commands(&self) -> Result<Vec<Command>> {
        Ok(
            sqlx::query_as::<_, Command>("SELECT * FROM commands ORDER BY favorite DESC, name ASC")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    #[instrument(skip(self, job))]
    async fn insert_restore_job(&self, job: &RestoreJob) -> Result<()> {
        sqlx::query(
            "INSERT INTO restore_jobs
                (id, backup_id, server_id, target_database_name, status, masking_rules,
                 error_message, started_at, finished_at, created_at)
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)",
        )
        .bind(job.id)
        .bind(job.backup_id)
        .bind(job.server_id)
        .bind(&job.target_database_name)
        .bind(job.status)
        .bind(&job.masking_rules)
        .bind(&job.error_message)
        .bind(job.started_at)
        .bind(job.finished_at)
        .bind(job.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_restore_job(&self, id: Uuid) -> Result<RestoreJob> {
        sqlx::query_as::<_, RestoreJob>("SELECT * FROM restore_jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(Error::RestoreJobNotFound { id })
    }

    #[instrument(skip(self))]
    async fn list_pending_restore_jobs(&self, limit: i64) -> Result<Vec<RestoreJob>> {
        Ok(sqlx::query_as::<_, RestoreJob>(
            "SELECT * FROM restore_jobs WHERE status = 'pending' ORDER BY created_at ASC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }

    #[instrument(skip(self))]
    async fn transition_restore_job_status(
        &self,
        id: Uuid,
        expected_status: RestoreJobStatus,
        next_status: RestoreJobStatus,
    ) -> Result<()> {
        if !expected_status.can_transition_to(next_status) {
            return Err(Error::ValidationFailed(format!(
                "illegal restore job transition {expected_status:?} -> {next_status:?}"
            )));
        }

        let started_at_clause = if next_status == RestoreJobStatus::InProgress {
            ", started_at = now()"
        } else {
            ""
        };
        let query = format!(
            "UPDATE restore_jobs SET status = $1{started_at_clause} WHERE id = $2 AND status = $3"
        );
        let result = sqlx::query(&query)
            .bind(next_status)
            .bind(id)
            .bind(expected_status)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::CasLost { id });
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn complete_restore_job(&self, id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE restore_jobs SET status = 'completed', finished_at = now()
             WHERE id = $1 AND status = 'in_progress'",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn fail_restore_job(&self, id: Uuid, error_message: &str) -> Result<()> {
        sqlx::query(
            "UPDATE restore_jobs SET status = 'failed', error_message = $1, finished_at = now()
             WHERE id = $2 AND status IN ('in_progress', 'pending')",
        )
        .bind(error_message)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self, details))]
    async fn insert_audit_log(
        &self,
        actor: Option<&str>,
        action: &str,
        resource_type: ResourceType,
        resource_id: Option<Uuid>,
        details: Option<serde_json::Value>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO audit_log (id, actor, action, resource_type, resource_id, details, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, now())",
        )
        .bind(Uuid::new_v4())
        .bind(actor)
        .bind(action)
        .bind(resource_type)
        .bind(resource_id)
        .bind(details)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_audit_log(&self, limit: i64) -> Result<Vec<AuditLogEntry>> {
        Ok(sqlx::query_as::<_, AuditLogEntry>(
            "SELECT * FROM audit_log ORDER BY created_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }
}
