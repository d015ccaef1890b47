//! Retention against a real destination directory

mod common;

use bridge_desktop::TokioFileSystem;
use common::{write_artifact, FaultyFs};
use core_backup::RetentionManager;
use std::sync::Arc;
use tempfile::TempDir;

fn manager(dir: &TempDir, max_copies: u32) -> RetentionManager {
    RetentionManager::new(Arc::new(TokioFileSystem::new()), dir.path(), max_copies)
}

#[tokio::test]
async fn test_six_artifacts_with_cap_five_deletes_only_the_oldest() {
    let dst = TempDir::new().unwrap();
    for i in 0..6 {
        write_artifact(dst.path(), &format!("backup_{}.tar", i), 100, i * 60);
    }

    let report = manager(&dst, 5).apply(false).await.unwrap();

    assert_eq!(report.deleted, vec!["backup_0.tar"]);
    assert_eq!(report.kept, 5);
    assert_eq!(report.freed_bytes, 100);
    assert!(report.failures.is_empty());
    assert!(!dst.path().join("backup_0.tar").exists());
    for i in 1..6 {
        assert!(dst.path().join(format!("backup_{}.tar", i)).exists());
    }
}

#[tokio::test]
async fn test_exactly_at_cap_deletes_nothing() {
    let dst = TempDir::new().unwrap();
    for i in 0..5 {
        write_artifact(dst.path(), &format!("b{}.tar.gz", i), 10, i);
    }

    let manager = manager(&dst, 5);
    assert!(!manager.needs_cleanup().await.unwrap());
    let report = manager.apply(false).await.unwrap();

    assert!(report.deleted.is_empty());
    assert_eq!(std::fs::read_dir(dst.path()).unwrap().count(), 5);
}

#[tokio::test]
async fn test_unrelated_files_are_never_counted_or_deleted() {
    let dst = TempDir::new().unwrap();
    for i in 0..3 {
        write_artifact(dst.path(), &format!("b{}.tar", i), 10, i);
    }
    write_artifact(dst.path(), "notes.txt", 10, -1000);
    std::fs::create_dir(dst.path().join("nested.tar")).unwrap();

    let manager = manager(&dst, 1);
    let stats = manager.stats().await.unwrap();
    assert_eq!(stats.count, 3);

    let report = manager.apply(false).await.unwrap();
    assert_eq!(report.deleted, vec!["b0.tar", "b1.tar"]);
    assert!(dst.path().join("notes.txt").exists());
    assert!(dst.path().join("nested.tar").is_dir());
}

#[tokio::test]
async fn test_zero_cap_requires_force() {
    let dst = TempDir::new().unwrap();
    write_artifact(dst.path(), "only.tar", 10, 0);
    let manager = manager(&dst, 0);

    assert!(manager.apply(false).await.is_err());
    assert!(dst.path().join("only.tar").exists());

    let report = manager.apply(true).await.unwrap();
    assert_eq!(report.deleted, vec!["only.tar"]);
}

#[tokio::test]
async fn test_missing_destination_is_empty_inventory() {
    let dst = TempDir::new().unwrap();
    let manager = RetentionManager::new(
        Arc::new(TokioFileSystem::new()),
        dst.path().join("unmounted"),
        5,
    );

    assert!(manager.inventory().await.unwrap().is_empty());
    assert!(manager.apply(false).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_specific_stays_inside_destination() {
    let outer = TempDir::new().unwrap();
    let dst = outer.path().join("dest");
    std::fs::create_dir(&dst).unwrap();
    write_artifact(outer.path(), "outside.tar", 10, 0);
    write_artifact(&dst, "inside.tar", 10, 0);

    let manager = RetentionManager::new(Arc::new(TokioFileSystem::new()), &dst, 5);

    assert!(manager.delete_specific("../outside.tar").await.is_err());
    assert!(outer.path().join("outside.tar").exists());
    assert!(!manager.delete_specific("absent.tar").await.unwrap());
    assert!(manager.delete_specific("inside.tar").await.unwrap());
    assert!(!dst.join("inside.tar").exists());
}

#[tokio::test]
async fn test_integrity_report_hashes_every_artifact() {
    let dst = TempDir::new().unwrap();
    write_artifact(dst.path(), "one.tar", 64, 0);
    write_artifact(dst.path(), "two.tar", 64, 1);

    let report = manager(&dst, 5).verify_integrity(true).await.unwrap();

    assert_eq!(report.total, 2);
    assert_eq!(report.valid, 2);
    assert_eq!(report.invalid, 0);
    let one = &report.details[0];
    let two = &report.details[1];
    assert_eq!(one.checksum, two.checksum);
    assert_eq!(one.checksum.as_ref().unwrap().len(), 64);
}

#[tokio::test]
async fn test_undeletable_artifact_does_not_block_the_rest() {
    let dst = TempDir::new().unwrap();
    for i in 0..5 {
        write_artifact(dst.path(), &format!("backup_{}.tar", i), 100, i * 60);
    }

    let manager = RetentionManager::new(
        Arc::new(FaultyFs::refusing_delete("backup_1.tar")),
        dst.path(),
        2,
    );
    let report = manager.apply(false).await.unwrap();

    assert_eq!(report.deleted, vec!["backup_0.tar", "backup_2.tar"]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].name, "backup_1.tar");
    assert!(report.failures[0].error.contains("permission denied"));
    assert_eq!(report.kept, 3);
    assert!(dst.path().join("backup_1.tar").exists());
    assert!(!dst.path().join("backup_2.tar").exists());
}

#[tokio::test]
async fn test_staging_files_are_not_artifacts() {
    let dst = TempDir::new().unwrap();
    write_artifact(dst.path(), "b0.tar", 10, 0);
    write_artifact(dst.path(), "b1.tar", 10, 10);
    write_artifact(dst.path(), ".b2.tar.partial", 5, 20);

    let manager = manager(&dst, 1);
    assert_eq!(manager.stats().await.unwrap().count, 2);

    let report = manager.apply(false).await.unwrap();
    assert_eq!(report.deleted, vec!["b0.tar"]);
    assert!(dst.path().join(".b2.tar.partial").exists());
}
