//! Access counters and the access history log.

use chrono::{DateTime, Utc};
use imgrelay_core::{ImageId, Result};
use rusqlite::{params, Connection};

use crate::error::db_err;
use crate::models::{to_millis, AccessLogEntry, RequestInfo, ACCESS_LOG_COLS};

/// Record one access: bump the counter and append a log entry atomically.
///
/// Returns `false` without writing anything when no non-deleted image with
/// `id` exists.
pub fn record_access(
    conn: &Connection,
    id: ImageId,
    info: &RequestInfo,
    at: DateTime<Utc>,
) -> Result<bool> {
    let tx = conn.unchecked_transaction().map_err(db_err)?;
    let at = to_millis(at);

    let n = tx
        .execute(
            "UPDATE images SET access_count = access_count + 1, last_accessed_at = ?2
             WHERE id = ?1 AND deleted = 0",
            params![id.get(), at],
        )
        .map_err(db_err)?;
    if n == 0 {
        return Ok(false);
    }

    tx.execute(
        "INSERT INTO access_logs (image_id, client_ip, user_agent, referer, accessed_at)
         VALUES (?1,?2,?3,?4,?5)",
        params![
            id.get(),
            info.client_ip,
            info.user_agent,
            info.referer,
            at
        ],
    )
    .map_err(db_err)?;

    tx.commit().map_err(db_err)?;
    Ok(true)
}

/// Delete every log entry strictly older than `cutoff`.
pub fn purge_older_than(conn: &Connection, cutoff: DateTime<Utc>) -> Result<u64> {
    let n = conn
        .execute(
            "DELETE FROM access_logs WHERE accessed_at < ?1",
            [to_millis(cutoff)],
        )
        .map_err(db_err)?;
    Ok(n as u64)
}

/// Number of log entries for one image.
pub fn count_for_image(conn: &Connection, id: ImageId) -> Result<u64> {
    let n: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM access_logs WHERE image_id = ?1",
            [id.get()],
            |row| row.get(0),
        )
        .map_err(db_err)?;
    Ok(n as u64)
}

/// Most recent log entries for one image, newest first.
pub fn list_for_image(conn: &Connection, id: ImageId, limit: u32) -> Result<Vec<AccessLogEntry>> {
    let q = format!(
        "SELECT {ACCESS_LOG_COLS} FROM access_logs WHERE image_id = ?1
         ORDER BY accessed_at DESC, id DESC LIMIT ?2"
    );
    let mut stmt = conn.prepare(&q).map_err(db_err)?;
    let rows = stmt
        .query_map(params![id.get(), i64::from(limit)], AccessLogEntry::from_row)
        .map_err(db_err)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(db_err)?;
    Ok(rows)
}
