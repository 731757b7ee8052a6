//! Database housekeeping.

use imgrelay_core::Result;
use rusqlite::Connection;

use crate::error::db_err;
use crate::models::CompactionReport;

fn database_size(conn: &Connection) -> Result<u64> {
    let pages: i64 = conn
        .query_row("PRAGMA page_count", [], |row| row.get(0))
        .map_err(db_err)?;
    let page_size: i64 = conn
        .query_row("PRAGMA page_size", [], |row| row.get(0))
        .map_err(db_err)?;
    Ok((pages * page_size).max(0) as u64)
}

/// Rebuild the database file, refresh planner statistics and truncate the
/// write-ahead log.
///
/// Must not be called inside a transaction.
pub fn compact(conn: &Connection) -> Result<CompactionReport> {
    let bytes_before = database_size(conn)?;

    conn.execute_batch("VACUUM; ANALYZE;").map_err(db_err)?;
    // Returns (busy, log pages, checkpointed pages); only the side effect matters.
    conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))
        .map_err(db_err)?;

    let bytes_after = database_size(conn)?;
    Ok(CompactionReport {
        bytes_before,
        bytes_after,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{get_conn, init_pool};

    #[test]
    fn compaction_reclaims_deleted_pages() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("compact.db");
        let pool = init_pool(path.to_str().unwrap(), 1).unwrap();
        let conn = get_conn(&pool).unwrap();

        let blob = "x".repeat(4096);
        for i in 0..200 {
            conn.execute(
                "INSERT INTO images (internal_filename, original_name, public_token, size_bytes,
                     mime_type, remote_path, public_url, created_at)
                 VALUES (?1, ?2, ?3, 1, 'image/png', '/images/x', 'u', 0)",
                rusqlite::params![format!("{i}.png"), blob, format!("t{i}")],
            )
            .unwrap();
        }
        conn.execute("DELETE FROM images", []).unwrap();

        let report = compact(&conn).unwrap();
        assert!(report.bytes_before > report.bytes_after);
        assert!(report.reclaimed() > 0);
    }

    #[test]
    fn compaction_is_repeatable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("again.db");
        let pool = init_pool(path.to_str().unwrap(), 1).unwrap();
        let conn = get_conn(&pool).unwrap();

        compact(&conn).unwrap();
        let second = compact(&conn).unwrap();
        assert!(second.bytes_after > 0);
        assert!(second.bytes_before > 0);
    }
}
