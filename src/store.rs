//! Async facade over the SQLite metadata store.
//!
//! Queries run on the blocking pool against pooled connections. Reads use
//! any free connection and proceed concurrently under WAL. Writes pass
//! through a single process-wide gate so there is exactly one writer at a
//! time, and a write that still hits `SQLITE_BUSY`/`SQLITE_LOCKED` is
//! retried with linear backoff before the error surfaces.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use imgrelay_core::{Error, ImageId, Result};
use imgrelay_db::models::{CompactionReport, ImageRecord, ListQuery, NewImage, RequestInfo};
use imgrelay_db::pool::{get_conn, DbPool};
use imgrelay_db::queries::{access_logs, images, maintenance};
use parking_lot::Mutex;
use rusqlite::Connection;

const RETRY_BACKOFF: Duration = Duration::from_millis(50);

/// Cloneable handle to the metadata store.
#[derive(Clone)]
pub struct MetadataStore {
    pool: DbPool,
    write_gate: Arc<Mutex<()>>,
    write_retries: u32,
}

impl MetadataStore {
    pub fn new(pool: DbPool, write_retries: u32) -> Self {
        Self {
            pool,
            write_gate: Arc::new(Mutex::new(())),
            write_retries,
        }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    async fn read<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: Fn(&Connection) -> Result<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        let retries = self.write_retries;
        tokio::task::spawn_blocking(move || {
            with_retry(retries, || {
                let conn = get_conn(&pool)?;
                f(&conn)
            })
        })
        .await
        .map_err(|e| Error::Internal(format!("store task failed: {e}")))?
    }

    async fn write<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: Fn(&Connection) -> Result<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        let gate = self.write_gate.clone();
        let retries = self.write_retries;
        tokio::task::spawn_blocking(move || {
            let _writer = gate.lock();
            with_retry(retries, || {
                let conn = get_conn(&pool)?;
                f(&conn)
            })
        })
        .await
        .map_err(|e| Error::Internal(format!("store task failed: {e}")))?
    }

    /// Insert a new record. Name collisions are [`Error::Conflict`].
    pub async fn create(&self, new: NewImage) -> Result<ImageRecord> {
        self.write(move |conn| images::create(conn, &new)).await
    }

    pub async fn get_by_id(&self, id: ImageId) -> Result<Option<ImageRecord>> {
        self.read(move |conn| images::get_by_id(conn, id)).await
    }

    pub async fn get_by_internal_name(&self, name: &str) -> Result<Option<ImageRecord>> {
        let name = name.to_string();
        self.read(move |conn| images::get_by_internal_name(conn, &name))
            .await
    }

    pub async fn get_by_public_token(&self, token: &str) -> Result<Option<ImageRecord>> {
        let token = token.to_string();
        self.read(move |conn| images::get_by_public_token(conn, &token))
            .await
    }

    /// Whether either name was ever issued, including soft-deleted records.
    pub async fn name_in_use(&self, internal_filename: &str, public_token: &str) -> Result<bool> {
        let name = internal_filename.to_string();
        let token = public_token.to_string();
        self.read(move |conn| images::name_in_use(conn, &name, &token))
            .await
    }

    /// Count one access and log it. `false` when the record is absent or
    /// soft-deleted.
    pub async fn record_access(&self, id: ImageId, info: RequestInfo) -> Result<bool> {
        self.write(move |conn| access_logs::record_access(conn, id, &info, Utc::now()))
            .await
    }

    pub async fn soft_delete(&self, id: ImageId) -> Result<bool> {
        self.write(move |conn| images::soft_delete(conn, id)).await
    }

    /// Remove the record and its access logs in one transaction.
    pub async fn hard_delete(&self, id: ImageId) -> Result<bool> {
        self.write(move |conn| images::hard_delete(conn, id)).await
    }

    pub async fn list(&self, query: ListQuery) -> Result<Vec<ImageRecord>> {
        self.read(move |conn| images::list(conn, &query)).await
    }

    pub async fn count(&self, include_deleted: bool) -> Result<u64> {
        self.read(move |conn| images::count(conn, include_deleted))
            .await
    }

    pub async fn purge_access_logs_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        self.write(move |conn| access_logs::purge_older_than(conn, cutoff))
            .await
    }

    pub async fn access_log_count(&self, id: ImageId) -> Result<u64> {
        self.read(move |conn| access_logs::count_for_image(conn, id))
            .await
    }

    pub async fn active_filenames(&self) -> Result<HashSet<String>> {
        self.read(images::active_filenames).await
    }

    /// VACUUM, ANALYZE and checkpoint. Holds the write gate throughout.
    pub async fn compact(&self) -> Result<CompactionReport> {
        self.write(maintenance::compact).await
    }
}

/// Run `op`, retrying lock contention up to `retries` extra times.
fn with_retry<T>(retries: u32, mut op: impl FnMut() -> Result<T>) -> Result<T> {
    let mut attempt = 0;
    loop {
        match op() {
            Err(e) if imgrelay_db::is_busy(&e) && attempt < retries => {
                attempt += 1;
                tracing::debug!(attempt, error = %e, "database busy, retrying");
                std::thread::sleep(RETRY_BACKOFF * attempt);
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imgrelay_db::pool::init_memory_pool;
    use rusqlite::ffi;
    use std::cell::Cell;

    fn busy() -> Error {
        Error::database(rusqlite::Error::SqliteFailure(
            ffi::Error::new(ffi::SQLITE_BUSY),
            None,
        ))
    }

    #[test]
    fn retry_gives_up_after_budget() {
        let calls = Cell::new(0);
        let res: Result<()> = with_retry(2, || {
            calls.set(calls.get() + 1);
            Err(busy())
        });
        assert!(matches!(res, Err(Error::Database { .. })));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn retry_recovers_from_transient_busy() {
        let calls = Cell::new(0);
        let res = with_retry(3, || {
            calls.set(calls.get() + 1);
            if calls.get() < 2 {
                Err(busy())
            } else {
                Ok(7)
            }
        });
        assert_eq!(res.unwrap(), 7);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn non_busy_errors_are_not_retried() {
        let calls = Cell::new(0);
        let res: Result<()> = with_retry(5, || {
            calls.set(calls.get() + 1);
            Err(Error::Conflict("taken".into()))
        });
        assert!(matches!(res, Err(Error::Conflict(_))));
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test]
    async fn create_then_fetch() {
        let store = MetadataStore::new(init_memory_pool().unwrap(), 3);
        let rec = store
            .create(NewImage {
                internal_filename: "c0ffee00.gif".into(),
                original_name: "party.gif".into(),
                public_token: "tok".into(),
                size_bytes: 3,
                mime_type: "image/gif".into(),
                remote_path: "/images/c0ffee00.gif".into(),
                public_url: "https://dav.example.com/images/c0ffee00.gif".into(),
            })
            .await
            .unwrap();

        assert_eq!(store.get_by_public_token("tok").await.unwrap(), Some(rec.clone()));
        assert!(store.record_access(rec.id, RequestInfo::default()).await.unwrap());
        assert_eq!(store.access_log_count(rec.id).await.unwrap(), 1);
        assert_eq!(store.count(false).await.unwrap(), 1);
        assert!(store.active_filenames().await.unwrap().contains("c0ffee00.gif"));
    }
}
