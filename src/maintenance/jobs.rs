use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use chrono::Utc;
use imgrelay_core::Result;

use super::{JobOutcome, MaintenanceJob};
use crate::images::LocalCache;
use crate::store::MetadataStore;

pub const LOG_RETENTION: &str = "log_retention";
pub const ORPHAN_SWEEP: &str = "orphan_sweep";
pub const STORAGE_COMPACTION: &str = "storage_compaction";

/// Drops access log entries older than the retention window.
pub struct LogRetentionJob {
    store: MetadataStore,
    retention_days: u32,
}

impl LogRetentionJob {
    pub fn new(store: MetadataStore, retention_days: u32) -> Self {
        Self {
            store,
            retention_days,
        }
    }
}

#[async_trait]
impl MaintenanceJob for LogRetentionJob {
    fn name(&self) -> &'static str {
        LOG_RETENTION
    }

    async fn run(&self) -> Result<JobOutcome> {
        let cutoff = Utc::now() - chrono::Duration::days(i64::from(self.retention_days));
        let purged = self.store.purge_access_logs_older_than(cutoff).await?;
        Ok(JobOutcome::new(
            purged,
            format!("purged access logs before {}", cutoff.to_rfc3339()),
        ))
    }
}

/// Removes cached files no live record refers to.
///
/// Files belonging to a non-deleted record are always kept, whatever the
/// state of the remote copy. Files modified within the grace period are
/// kept too, since an upload may still be between caching and recording.
pub struct OrphanSweepJob {
    store: MetadataStore,
    cache: LocalCache,
    grace: Duration,
}

impl OrphanSweepJob {
    pub fn new(store: MetadataStore, cache: LocalCache, grace: Duration) -> Self {
        Self {
            store,
            cache,
            grace,
        }
    }
}

#[async_trait]
impl MaintenanceJob for OrphanSweepJob {
    fn name(&self) -> &'static str {
        ORPHAN_SWEEP
    }

    async fn run(&self) -> Result<JobOutcome> {
        let mut entries = match tokio::fs::read_dir(self.cache.dir()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(JobOutcome::new(0, "cache directory does not exist"));
            }
            Err(e) => return Err(e.into()),
        };

        let active = self.store.active_filenames().await?;
        let now = SystemTime::now();
        let (mut removed, mut kept) = (0u64, 0u64);

        while let Some(entry) = entries.next_entry().await? {
            let meta = entry.metadata().await?;
            if meta.is_dir() {
                continue;
            }

            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                kept += 1;
                continue;
            };
            if active.contains(name) {
                kept += 1;
                continue;
            }

            let age = meta
                .modified()
                .ok()
                .and_then(|m| now.duration_since(m).ok())
                .unwrap_or_default();
            if age < self.grace {
                kept += 1;
                continue;
            }

            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => {
                    tracing::debug!(file = name, "removed orphaned cache file");
                    removed += 1;
                }
                Err(e) => tracing::warn!(file = name, error = %e, "failed to remove orphaned file"),
            }
        }

        Ok(JobOutcome::new(
            removed,
            format!("removed {removed} orphaned files, kept {kept}"),
        ))
    }
}

/// Rebuilds the database file and refreshes statistics.
pub struct StorageCompactionJob {
    store: MetadataStore,
}

impl StorageCompactionJob {
    pub fn new(store: MetadataStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl MaintenanceJob for StorageCompactionJob {
    fn name(&self) -> &'static str {
        STORAGE_COMPACTION
    }

    async fn run(&self) -> Result<JobOutcome> {
        let report = self.store.compact().await?;
        Ok(JobOutcome::new(
            report.reclaimed(),
            format!(
                "database {} -> {} bytes",
                report.bytes_before, report.bytes_after
            ),
        ))
    }
}
