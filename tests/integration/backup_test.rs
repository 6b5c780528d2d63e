use chrono::Utc;
use dbbackup_orchestrator::crypto::{compress, decompress, AesGcmCipher, Sha256Checksum};
use dbbackup_orchestrator::executor::validation::validate_command;
use dbbackup_orchestrator::model::{Backup, BackupKind, BackupStatus, CompressionKind};
use uuid::Uuid;

fn sample_backup() -> Backup {
    Backup {
        id: Uuid::new_v4(),
        server_id: Uuid::new_v4(),
        schedule_id: None,
        parent_backup_id: None,
        database_name: "orders".to_string(),
        kind: BackupKind::Full,
        status: BackupStatus::Pending,
        compression: CompressionKind::Zstd,
        encrypted: true,
        storage_path: None,
        size_bytes: None,
        checksum_sha256: None,
        error_message: None,
        retry_count: 0,
        started_at: None,
        finished_at: None,
        deleted_at: None,
        created_at: Utc::now(),
    }
}

#[test]
fn backup_lifecycle_transitions_are_legal() {
    let backup = sample_backup();
    assert!(backup.status.can_transition_to(BackupStatus::InProgress));
    assert!(!backup.status.can_transition_to(BackupStatus::Completed));
}

#[test]
fn full_pipeline_roundtrip_compress_encrypt_checksum() {
    let raw = b"pg_dump --format=custom output goes here".repeat(64);

    let compressed = compress(CompressionKind::Zstd, &raw).unwrap();
    assert!(compressed.len() < raw.len());

    let cipher = AesGcmCipher::new("correct horse battery staple", "deterministic-test-salt").unwrap();
    let encrypted = cipher.encrypt(&compressed).unwrap();

    let checksum = Sha256Checksum::digest(&encrypted);
    Sha256Checksum::verify(&encrypted, &checksum).unwrap();

    let decrypted = cipher.decrypt(&encrypted).unwrap();
    let decompressed = decompress(CompressionKind::Zstd, &decrypted).unwrap();
    assert_eq!(decompressed, raw);
}

#[test]
fn pg_dump_command_passes_validation() {
    let command = "pg_dump --format=custom --no-owner --file=/tmp/orders.dump orders";
    assert!(validate_command(command).is_ok());
}

#[test]
fn backup_command_with_injection_attempt_is_rejected() {
    let command = "pg_dump orders; rm -rf /";
    assert!(validate_command(command).is_err());
}
