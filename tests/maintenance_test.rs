//! Integration tests for the maintenance jobs against a real store and cache.

mod common;

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use assert_matches::assert_matches;
use chrono::Utc;
use common::TestHarness;
use imgrelay::maintenance::{
    MaintenanceJob, OrphanSweepJob, RunResult, LOG_RETENTION, ORPHAN_SWEEP, STORAGE_COMPACTION,
};
use imgrelay_core::Error;
use imgrelay_db::models::RequestInfo;
use imgrelay_db::pool::get_conn;
use imgrelay_db::queries::access_logs;

fn age_file(path: &std::path::Path, by: Duration) {
    let file = std::fs::OpenOptions::new().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() - by).unwrap();
}

#[tokio::test]
async fn default_jobs_are_registered() {
    let h = TestHarness::new();
    assert_eq!(
        h.ctx.scheduler.job_names(),
        vec![LOG_RETENTION, ORPHAN_SWEEP, STORAGE_COMPACTION]
    );
    assert_matches!(
        h.ctx.scheduler.trigger("reindex").await,
        Err(Error::NotFound { .. })
    );
}

#[tokio::test]
async fn log_retention_purges_old_entries_only() {
    let h = TestHarness::with_config(|c| c.maintenance.log_retention_days = 30);
    let up = h
        .ctx
        .images
        .upload_image(h.staged("a.png", b"png"))
        .await
        .unwrap();

    {
        let conn = get_conn(h.ctx.store.pool()).unwrap();
        let now = Utc::now();
        for days in [45, 31, 2] {
            access_logs::record_access(
                &conn,
                up.id,
                &RequestInfo::default(),
                now - chrono::Duration::days(days),
            )
            .unwrap();
        }
    }

    let result = h.ctx.scheduler.trigger(LOG_RETENTION).await.unwrap();
    assert_matches!(result, RunResult::Succeeded(ref o) if o.affected == 2);
    assert_eq!(h.ctx.store.access_log_count(up.id).await.unwrap(), 1);

    // Entries exactly at the cutoff survive; one millisecond earlier does not.
    let cutoff = Utc::now() - chrono::Duration::days(30);
    {
        let conn = get_conn(h.ctx.store.pool()).unwrap();
        access_logs::record_access(&conn, up.id, &RequestInfo::default(), cutoff).unwrap();
        access_logs::record_access(
            &conn,
            up.id,
            &RequestInfo::default(),
            cutoff - chrono::Duration::milliseconds(1),
        )
        .unwrap();
    }
    let purged = h.ctx.store.purge_access_logs_older_than(cutoff).await.unwrap();
    assert_eq!(purged, 1);
    assert_eq!(h.ctx.store.access_log_count(up.id).await.unwrap(), 2);

    // Idempotent.
    let again = h.ctx.scheduler.trigger(LOG_RETENTION).await.unwrap();
    assert_matches!(again, RunResult::Succeeded(ref o) if o.affected == 0);
}

#[tokio::test]
async fn orphan_sweep_keeps_live_files_and_young_files() {
    let h = TestHarness::with_config(|c| c.maintenance.orphan_grace_secs = 60);
    let live = h
        .ctx
        .images
        .upload_image(h.staged("live.png", b"png"))
        .await
        .unwrap();
    let cache = h.cache_dir();

    std::fs::write(cache.join("stale.png"), b"old").unwrap();
    std::fs::write(cache.join("fresh.png"), b"new").unwrap();
    std::fs::create_dir_all(cache.join("subdir")).unwrap();
    age_file(&cache.join("stale.png"), Duration::from_secs(3600));
    age_file(&cache.join(&live.internal_filename), Duration::from_secs(3600));

    // The live file survives even when the remote store is down.
    h.backend.set_unavailable(true);

    let result = h.ctx.scheduler.trigger(ORPHAN_SWEEP).await.unwrap();
    assert_matches!(result, RunResult::Succeeded(ref o) if o.affected == 1);

    let mut expected = vec!["fresh.png".to_string(), live.internal_filename.clone()];
    expected.sort();
    assert_eq!(h.cached_files(), expected);
    assert!(cache.join("subdir").is_dir());
}

#[tokio::test]
async fn orphan_sweep_collects_files_of_deleted_records() {
    let h = TestHarness::with_config(|c| c.maintenance.orphan_grace_secs = 0);
    let up = h
        .ctx
        .images
        .upload_image(h.staged("gone.png", b"png"))
        .await
        .unwrap();

    // Soft delete through the store only, leaving the cached copy behind.
    h.ctx.store.soft_delete(up.id).await.unwrap();
    assert_eq!(h.cached_files().len(), 1);

    let job = OrphanSweepJob::new(
        h.ctx.store.clone(),
        h.ctx.images.cache().clone(),
        Duration::ZERO,
    );
    let outcome = job.run().await.unwrap();
    assert_eq!(outcome.affected, 1);
    assert!(h.cached_files().is_empty());
}

#[tokio::test]
async fn orphan_sweep_without_cache_dir_is_noop() {
    let h = TestHarness::new();
    std::fs::remove_dir_all(h.cache_dir()).ok();
    let result = h.ctx.scheduler.trigger(ORPHAN_SWEEP).await.unwrap();
    assert_matches!(result, RunResult::Succeeded(ref o) if o.affected == 0);
}

#[tokio::test]
async fn compaction_runs_and_reports() {
    let h = TestHarness::new();
    for i in 0..5 {
        let up = h
            .ctx
            .images
            .upload_image(h.staged(&format!("{i}.png"), b"png"))
            .await
            .unwrap();
        h.ctx.images.purge_image(up.id).await.unwrap();
    }

    let result = h.ctx.scheduler.trigger(STORAGE_COMPACTION).await.unwrap();
    assert!(result.is_success());

    let status = h.ctx.scheduler.status();
    let compaction = status
        .iter()
        .find(|s| s.name == STORAGE_COMPACTION)
        .unwrap();
    assert!(compaction.last_run.is_some());
    assert!(compaction.last_outcome.as_ref().unwrap().is_success());
}

#[tokio::test]
async fn job_failure_does_not_stop_other_jobs() {
    let h = TestHarness::new();
    // Replace the cache directory with a file so the sweep cannot read it.
    let cache = h.cache_dir();
    std::fs::remove_dir_all(&cache).ok();
    std::fs::write(&cache, b"not a directory").unwrap();

    let sweep = h.ctx.scheduler.trigger(ORPHAN_SWEEP).await.unwrap();
    assert_matches!(sweep, RunResult::Failed { .. });

    let retention = h.ctx.scheduler.trigger(LOG_RETENTION).await.unwrap();
    assert!(retention.is_success());
}

#[tokio::test]
async fn scheduler_shutdown_is_clean() {
    let h = TestHarness::with_config(|c| {
        c.maintenance.log_retention_interval_secs = 1;
        c.maintenance.orphan_sweep_interval_secs = 0;
    });
    let scheduler = Arc::clone(&h.ctx.scheduler);
    scheduler.start();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    scheduler.shutdown().await;

    let status = scheduler.status();
    let retention = status.iter().find(|s| s.name == LOG_RETENTION).unwrap();
    assert!(retention.last_run.is_some());
    let sweep = status.iter().find(|s| s.name == ORPHAN_SWEEP).unwrap();
    assert!(sweep.last_run.is_none());
}
