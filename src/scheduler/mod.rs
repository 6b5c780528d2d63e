use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use chrono_tz::Tz;
use cron::Schedule as CronSchedule;
use tokio_util::sync::CancellationToken;
use tracing::{error, instrument, warn};
use uuid::Uuid;

use crate::catalog::Catalog;
use crate::config::Config;
use crate::error::Result;
use crate::metrics::MetricsState;
use crate::model::{Backup, BackupStatus, ResourceType, Schedule};

/// Evaluates every enabled Schedule once per tick and enqueues at most one
/// Backup per Schedule per tick, regardless of how many cron boundaries
/// were missed since the previous tick (at-most-one-per-tick policy).
pub struct SchedulerLoop {
    catalog: Arc<dyn Catalog>,
    metrics: Arc<MetricsState>,
    config: Arc<Config>,
}

impl SchedulerLoop {
    pub fn new(catalog: Arc<dyn Catalog>, metrics: Arc<MetricsState>, config: Arc<Config>) -> Self {
        Self { catalog, metrics, config }
    }

    pub async fn run(&self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.scheduler_tick_interval);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = interval.tick() => {
                    let tick_start = Instant::now();
                    if let Err(err) = self.tick().await {
                        error!(error = %err, "scheduler tick failed");
                    }
                    self.metrics
                        .scheduler_tick_lag_seconds
                        .with_label_values(&[])
                        .set(tick_start.elapsed().as_secs_f64());
                }
            }
        }
    }

    #[instrument(skip(self))]
    async fn tick(&self) -> Result<()> {
        let schedules = self.catalog.list_enabled_schedules().await?;
        let now = Utc::now();

        for schedule in schedules {
            if let Err(err) = self.evaluate_schedule(&schedule, now).await {
                warn!(schedule_id = %schedule.id, error = %err, "failed to evaluate schedule");
            }
        }
        Ok(())
    }

    async fn evaluate_schedule(&self, schedule: &Schedule, now: chrono::DateTime<Utc>) -> Result<()> {
        if !should_fire(schedule, now)? {
            return Ok(());
        }

        let backup = Backup {
            id: Uuid::new_v4(),
            server_id: schedule.server_id,
            schedule_id: Some(schedule.id),
            parent_backup_id: None,
            database_name: schedule.database_name.clone(),
            kind: schedule.kind,
            status: BackupStatus::Pending,
            compression: schedule.compression,
            encrypted: schedule.encrypted,
            storage_path: None,
            size_bytes: None,
            checksum_sha256: None,
            error_message: None,
            retry_count: 0,
            started_at: None,
            finished_at: None,
            deleted_at: None,
            created_at: now,
        };

        self.catalog.insert_backup(&backup).await?;
        self.catalog.mark_schedule_fired(schedule.id, now).await?;
        self.metrics.record_schedule_fire(&schedule.id.to_string());
        let _ = self
            .catalog
            .insert_audit_log(None, "backup.scheduled", ResourceType::Backup, Some(backup.id), None)
            .await;
        Ok(())
    }
}

/// A schedule fires this tick if the most recent cron boundary at-or-before
/// `now` is strictly after `schedule.last_fired_at` (or `last_fired_at` is
/// unset). This collapses any number of missed boundaries into a single fire.
fn should_fire(schedule: &Schedule, now: chrono::DateTime<Utc>) -> Result<bool> {
    let tz: Tz = schedule
        .timezone
        .parse()
        .map_err(|_| crate::error::Error::Timezone(schedule.timezone.clone()))?;

    let cron_schedule: CronSchedule = schedule
        .cron_expression
        .parse()
        .map_err(|e| crate::error::Error::Cron(format!("{e}")))?;

    let now_local = now.with_timezone(&tz);
    let Some(last_boundary) = cron_schedule
        .after(&(now_local - chrono::Duration::days(1)))
        .take_while(|t| *t <= now_local)
        .last()
    else {
        return Ok(false);
    };

    let last_boundary_utc = last_boundary.with_timezone(&Utc);
    Ok(match schedule.last_fired_at {
        Some(last_fired) => last_boundary_utc > last_fired,
        None => true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BackupKind, CompressionKind, RetentionPolicy};

    fn schedule_with(cron_expression: &str, last_fired_at: Option<chrono::DateTime<Utc>>) -> Schedule {
        Schedule {
            id: Uuid::new_v4(),
            server_id: Uuid::new_v4(),
            database_name: "orders".to_string(),
            cron_expression: cron_expression.to_string(),
            timezone: "UTC".to_string(),
            kind: BackupKind::Full,
            compression: CompressionKind::Zstd,
            encrypted: true,
            retention: sqlx::types::Json(RetentionPolicy::default()),
            enabled: true,
            last_fired_at,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn fires_when_never_fired_and_boundary_passed() {
        let schedule = schedule_with("0 * * * * *", None);
        assert!(should_fire(&schedule, Utc::now()).unwrap());
    }

    #[test]
    fn does_not_fire_twice_for_same_boundary() {
        let now = Utc::now();
        let schedule = schedule_with("0 * * * * *", Some(now));
        assert!(!should_fire(&schedule, now).unwrap());
    }

    #[test]
    fn rejects_invalid_cron_expression() {
        let schedule = schedule_with("not a cron", None);
        assert!(should_fire(&schedule, Utc::now()).is_err());
    }
}
