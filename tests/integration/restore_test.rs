use dbbackup_orchestrator::masking::{generate_masking_statement, MaskStrategy, MaskingRule};
use dbbackup_orchestrator::model::DatabaseFamily;
use dbbackup_orchestrator::reaper::backups_to_prune;

#[test]
fn masking_statement_targets_configured_column() {
    let rule = MaskingRule {
        table: "customers".to_string(),
        column: "email".to_string(),
        strategy: MaskStrategy::Email,
    };

    let statement = generate_masking_statement(&rule, DatabaseFamily::Postgresql.as_str());
    assert!(statement.contains("customers"));
    assert!(statement.contains("email"));
    assert!(statement.to_uppercase().contains("UPDATE"));
}

#[test]
fn masking_statement_for_redis_is_a_noop_comment() {
    let rule = MaskingRule {
        table: "ignored".to_string(),
        column: "ignored".to_string(),
        strategy: MaskStrategy::Hash,
    };

    let statement = generate_masking_statement(&rule, DatabaseFamily::Redis.as_str());
    assert!(statement.trim_start().starts_with("--"));
}

#[test]
fn restore_candidate_selection_respects_retention_union() {
    use chrono::Utc;
    use dbbackup_orchestrator::model::{Backup, BackupKind, BackupStatus, CompressionKind, RetentionPolicy};
    use uuid::Uuid;

    let make = |days_ago: i64| Backup {
        id: Uuid::new_v4(),
        server_id: Uuid::new_v4(),
        schedule_id: None,
        parent_backup_id: None,
        database_name: "orders".to_string(),
        kind: BackupKind::Full,
        status: BackupStatus::Completed,
        compression: CompressionKind::Zstd,
        encrypted: true,
        storage_path: Some("s3://bucket/orders.bak".to_string()),
        size_bytes: Some(2048),
        checksum_sha256: Some("abc123".to_string()),
        error_message: None,
        retry_count: 0,
        started_at: None,
        finished_at: None,
        deleted_at: None,
        created_at: Utc::now() - chrono::Duration::days(days_ago),
    };

    let backups = vec![make(0), make(1), make(400)];
    let refs: Vec<&Backup> = backups.iter().collect();
    let policy = RetentionPolicy {
        keep_last_n: Some(1),
        ..Default::default()
    };

    let pruned = backups_to_prune(&refs, &policy, Utc::now());
    assert_eq!(pruned.len(), 2);
    assert!(!pruned.contains(&backups[0].id));
}
