use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::catalog::Catalog;
use crate::config::Config;
use crate::error::Result;
use crate::metrics::MetricsState;
use crate::model::{Backup, ResourceType, RetentionPolicy, Schedule};
use crate::storage::BlobStore;

/// Periodically prunes completed backups that no retention rule keeps.
///
/// Unlike a single max-age/max-count check, a backup survives if it is kept
/// by ANY configured rule (union keep-set): it might be outside keep_days
/// but still be this month's keep_monthly representative.
pub struct RetentionReaper {
    catalog: Arc<dyn Catalog>,
    blob_store: BlobStore,
    metrics: Arc<MetricsState>,
    config: Arc<Config>,
}

impl RetentionReaper {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        blob_store: BlobStore,
        metrics: Arc<MetricsState>,
        config: Arc<Config>,
    ) -> Self {
        Self { catalog, blob_store, metrics, config }
    }

    pub async fn run(&self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.retention_tick_interval);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = interval.tick() => {
                    if let Err(err) = self.tick().await {
                        error!(error = %err, "retention tick failed");
                    }
                }
            }
        }
    }

    #[instrument(skip(self))]
    async fn tick(&self) -> Result<()> {
        for schedule in self.catalog.list_enabled_schedules().await? {
            if let Err(err) = self.reap_for_schedule(&schedule).await {
                error!(schedule_id = %schedule.id, error = %err, "retention reap failed for schedule");
            }
        }
        Ok(())
    }

    async fn reap_for_schedule(&self, schedule: &Schedule) -> Result<()> {
        if schedule.retention.is_empty() {
            return Ok(());
        }

        let backups = self.catalog.list_backups_for_server(schedule.server_id).await?;
        let completed: Vec<&Backup> = backups
            .iter()
            .filter(|b| {
                b.schedule_id == Some(schedule.id)
                    && b.status == crate::model::BackupStatus::Completed
            })
            .collect();

        let to_prune = backups_to_prune(&completed, &schedule.retention, Utc::now());
        if to_prune.is_empty() {
            return Ok(());
        }

        let mut pruned = 0u64;
        for backup in &completed {
            if !to_prune.contains(&backup.id) {
                continue;
            }
            if let Some(storage_path) = &backup.storage_path {
                self.blob_store.delete(storage_path).await?;
            }
            self.catalog.soft_delete_backup(backup.id).await?;
            let _ = self
                .catalog
                .insert_audit_log(None, "backup.pruned", ResourceType::Backup, Some(backup.id), None)
                .await;
            pruned += 1;
            info!(backup_id = %backup.id, "pruned by retention policy");
        }

        if pruned > 0 {
            if let Ok(server) = self.catalog.get_server(schedule.server_id).await {
                self.metrics.record_reaper_pruned(&server.name, pruned);
            }
        }
        Ok(())
    }
}

/// Computes the union keep-set across all configured rules and returns the
/// ids of every completed backup NOT in that set.
pub fn backups_to_prune(backups: &[&Backup], policy: &RetentionPolicy, now: DateTime<Utc>) -> HashSet<Uuid> {
    let mut sorted: Vec<&&Backup> = backups.iter().collect();
    sorted.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let mut keep: HashSet<Uuid> = HashSet::new();

    if let Some(n) = policy.keep_last_n {
        for backup in sorted.iter().take(n as usize) {
            keep.insert(backup.id);
        }
    }

    if let Some(days) = policy.keep_days {
        let cutoff = now - Duration::days(days as i64);
        for backup in &sorted {
            if backup.created_at >= cutoff {
                keep.insert(backup.id);
            }
        }
    }

    keep_one_per_bucket(&sorted, policy.keep_daily, &mut keep, |t| t.format("%Y-%m-%d").to_string());
    keep_one_per_bucket(&sorted, policy.keep_weekly, &mut keep, |t| {
        format!("{}-W{}", t.iso_week().year(), t.iso_week().week())
    });
    keep_one_per_bucket(&sorted, policy.keep_monthly, &mut keep, |t| t.format("%Y-%m").to_string());

    sorted
        .iter()
        .filter(|b| !keep.contains(&b.id))
        .map(|b| b.id)
        .collect()
}

/// Keeps the newest backup in each of the most recent `limit` distinct time
/// buckets (as produced by `bucket_key`), e.g. one per calendar day for
/// keep_daily.
fn keep_one_per_bucket(
    sorted_newest_first: &[&&Backup],
    limit: Option<u32>,
    keep: &mut HashSet<Uuid>,
    bucket_key: impl Fn(DateTime<Utc>) -> String,
) {
    let Some(limit) = limit else { return };
    let mut seen_buckets: Vec<String> = Vec::new();

    for backup in sorted_newest_first {
        let key = bucket_key(backup.created_at);
        if seen_buckets.contains(&key) {
            continue;
        }
        if seen_buckets.len() >= limit as usize {
            break;
        }
        seen_buckets.push(key);
        keep.insert(backup.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BackupKind, BackupStatus, CompressionKind};

    fn backup_at(days_ago: i64) -> Backup {
        Backup {
            id: Uuid::new_v4(),
            server_id: Uuid::new_v4(),
            schedule_id: None,
            parent_backup_id: None,
            database_name: "orders".to_string(),
            kind: BackupKind::Full,
            status: BackupStatus::Completed,
            compression: CompressionKind::Zstd,
            encrypted: true,
            storage_path: Some("s3://bucket/backup".to_string()),
            size_bytes: Some(1024),
            checksum_sha256: Some("deadbeef".to_string()),
            error_message: None,
            retry_count: 0,
            started_at: None,
            finished_at: None,
            deleted_at: None,
            created_at: Utc::now() - Duration::days(days_ago),
        }
    }

    #[test]
    fn keep_last_n_prunes_the_rest() {
        let backups: Vec<Backup> = (0..5).map(backup_at).collect();
        let refs: Vec<&Backup> = backups.iter().collect();
        let policy = RetentionPolicy {
            keep_last_n: Some(2),
            ..Default::default()
        };
        let pruned = backups_to_prune(&refs, &policy, Utc::now());
        assert_eq!(pruned.len(), 3);
        assert!(pruned.contains(&backups[2].id));
        assert!(!pruned.contains(&backups[0].id));
    }

    #[test]
    fn union_keep_set_spares_monthly_representative_outside_keep_days() {
        let backups = vec![backup_at(0), backup_at(45)];
        let refs: Vec<&Backup> = backups.iter().collect();
        let policy = RetentionPolicy {
            keep_days: Some(7),
            keep_monthly: Some(3),
            ..Default::default()
        };
        let pruned = backups_to_prune(&refs, &policy, Utc::now());
        assert!(pruned.is_empty(), "45-day-old backup should survive as its month's representative");
    }

    #[test]
    fn empty_policy_keeps_nothing_explicitly_so_everything_is_pruned() {
        let backups: Vec<Backup> = (0..3).map(backup_at).collect();
        let refs: Vec<&Backup> = backups.iter().collect();
        let policy = RetentionPolicy::default();
        let pruned = backups_to_prune(&refs, &policy, Utc::now());
        assert_eq!(pruned.len(), 3);
    }
}
