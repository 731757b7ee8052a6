//! Image record CRUD operations.

use std::collections::HashSet;

use chrono::Utc;
use imgrelay_core::{ImageId, Result};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::db_err;
use crate::models::{to_millis, ImageRecord, ListQuery, NewImage, IMAGE_COLS};

/// Insert a new image record.
///
/// A duplicate `internal_filename` or `public_token` surfaces as
/// [`imgrelay_core::Error::Conflict`].
pub fn create(conn: &Connection, new: &NewImage) -> Result<ImageRecord> {
    let created_at = Utc::now();

    conn.execute(
        "INSERT INTO images (internal_filename, original_name, public_token, size_bytes,
             mime_type, remote_path, public_url, created_at)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8)",
        params![
            new.internal_filename,
            new.original_name,
            new.public_token,
            new.size_bytes as i64,
            new.mime_type,
            new.remote_path,
            new.public_url,
            to_millis(created_at),
        ],
    )
    .map_err(db_err)?;

    let id = ImageId::from(conn.last_insert_rowid());

    // Re-read so the returned timestamp has the stored (millisecond) precision.
    get_any_by_id(conn, id)?.ok_or_else(|| imgrelay_core::Error::not_found("image", id))
}

fn get_where(conn: &Connection, clause: &str, value: &dyn rusqlite::ToSql) -> Result<Option<ImageRecord>> {
    let q = format!("SELECT {IMAGE_COLS} FROM images WHERE {clause}");
    conn.query_row(&q, [value], ImageRecord::from_row)
        .optional()
        .map_err(db_err)
}

/// Get a non-deleted image by id.
pub fn get_by_id(conn: &Connection, id: ImageId) -> Result<Option<ImageRecord>> {
    get_where(conn, "id = ?1 AND deleted = 0", &id.get())
}

/// Get an image by id regardless of its deleted flag.
pub fn get_any_by_id(conn: &Connection, id: ImageId) -> Result<Option<ImageRecord>> {
    get_where(conn, "id = ?1", &id.get())
}

/// Get a non-deleted image by its internal filename.
pub fn get_by_internal_name(conn: &Connection, name: &str) -> Result<Option<ImageRecord>> {
    get_where(conn, "internal_filename = ?1 AND deleted = 0", &name)
}

/// Get a non-deleted image by its public token.
pub fn get_by_public_token(conn: &Connection, token: &str) -> Result<Option<ImageRecord>> {
    get_where(conn, "public_token = ?1 AND deleted = 0", &token)
}

/// Whether either name is already taken, soft-deleted rows included.
pub fn name_in_use(conn: &Connection, internal_filename: &str, public_token: &str) -> Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM images WHERE internal_filename = ?1 OR public_token = ?2)",
        params![internal_filename, public_token],
        |row| row.get(0),
    )
    .map_err(db_err)
}

/// Mark an image as deleted. Returns `false` if it was already deleted or
/// never existed.
pub fn soft_delete(conn: &Connection, id: ImageId) -> Result<bool> {
    let n = conn
        .execute(
            "UPDATE images SET deleted = 1 WHERE id = ?1 AND deleted = 0",
            [id.get()],
        )
        .map_err(db_err)?;
    Ok(n > 0)
}

/// Delete an image and its access logs in one transaction.
pub fn hard_delete(conn: &Connection, id: ImageId) -> Result<bool> {
    let tx = conn.unchecked_transaction().map_err(db_err)?;

    tx.execute("DELETE FROM access_logs WHERE image_id = ?1", [id.get()])
        .map_err(db_err)?;
    let n = tx
        .execute("DELETE FROM images WHERE id = ?1", [id.get()])
        .map_err(db_err)?;

    tx.commit().map_err(db_err)?;
    Ok(n > 0)
}

/// Paginated, ordered listing.
pub fn list(conn: &Connection, query: &ListQuery) -> Result<Vec<ImageRecord>> {
    let query = query.clone().normalized();
    let filter = if query.include_deleted {
        ""
    } else {
        "WHERE deleted = 0"
    };
    let dir = query.sort_order.as_sql();
    let q = format!(
        "SELECT {IMAGE_COLS} FROM images {filter}
         ORDER BY {col} {dir}, id {dir}
         LIMIT ?1 OFFSET ?2",
        col = query.sort_by.as_sql(),
    );

    let mut stmt = conn.prepare(&q).map_err(db_err)?;
    let rows = stmt
        .query_map(
            params![i64::from(query.limit), query.offset() as i64],
            ImageRecord::from_row,
        )
        .map_err(db_err)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(db_err)?;
    Ok(rows)
}

/// Count images, optionally including soft-deleted ones.
pub fn count(conn: &Connection, include_deleted: bool) -> Result<u64> {
    let q = if include_deleted {
        "SELECT COUNT(*) FROM images"
    } else {
        "SELECT COUNT(*) FROM images WHERE deleted = 0"
    };
    let n: i64 = conn.query_row(q, [], |row| row.get(0)).map_err(db_err)?;
    Ok(n as u64)
}

/// Internal filenames of every non-deleted image.
pub fn active_filenames(conn: &Connection) -> Result<HashSet<String>> {
    let mut stmt = conn
        .prepare("SELECT internal_filename FROM images WHERE deleted = 0")
        .map_err(db_err)?;
    let names = stmt
        .query_map([], |row| row.get(0))
        .map_err(db_err)?
        .collect::<std::result::Result<HashSet<String>, _>>()
        .map_err(db_err)?;
    Ok(names)
}
