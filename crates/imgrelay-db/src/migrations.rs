//! Embedded SQL migrations and runner.
//!
//! Migrations are stored as `&str` constants and executed in order.  A
//! `schema_migrations` table tracks which versions have been applied.

use rusqlite::Connection;
use imgrelay_core::{Error, Result};

/// V1: image records and their access history.
const V1_INITIAL: &str = r#"
CREATE TABLE images (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    internal_filename TEXT NOT NULL UNIQUE,
    original_name     TEXT NOT NULL,
    public_token      TEXT NOT NULL UNIQUE,
    size_bytes        INTEGER NOT NULL,
    mime_type         TEXT NOT NULL,
    remote_path       TEXT NOT NULL,
    public_url        TEXT NOT NULL,
    created_at        INTEGER NOT NULL,
    last_accessed_at  INTEGER,
    access_count      INTEGER NOT NULL DEFAULT 0 CHECK (access_count >= 0),
    deleted           INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX idx_images_internal_filename ON images(internal_filename);
CREATE INDEX idx_images_public_token ON images(public_token);
CREATE INDEX idx_images_created_at ON images(created_at);
CREATE INDEX idx_images_deleted ON images(deleted);

CREATE TABLE access_logs (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    image_id    INTEGER NOT NULL REFERENCES images(id),
    client_ip   TEXT,
    user_agent  TEXT,
    referer     TEXT,
    accessed_at INTEGER NOT NULL
);
CREATE INDEX idx_access_logs_image_id ON access_logs(image_id);
CREATE INDEX idx_access_logs_accessed_at ON access_logs(accessed_at);
"#;

/// Ordered list of (version, sql) pairs.
const MIGRATIONS: &[(i64, &str)] = &[(1, V1_INITIAL)];

/// Run all pending migrations on `conn`.
///
/// Creates the `schema_migrations` tracking table if it does not exist,
/// then applies each outstanding migration inside a transaction.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version    INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
    )
    .map_err(|e| Error::database(format!("Failed to create schema_migrations: {e}")))?;

    for &(version, sql) in MIGRATIONS {
        let already: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM schema_migrations WHERE version = ?1",
                [version],
                |row| row.get(0),
            )
            .map_err(Error::database)?;

        if already {
            continue;
        }

        let tx = conn.unchecked_transaction().map_err(Error::database)?;

        tx.execute_batch(sql)
            .map_err(|e| Error::database(format!("Migration V{version} failed: {e}")))?;

        tx.execute(
            "INSERT INTO schema_migrations (version) VALUES (?1)",
            [version],
        )
        .map_err(Error::database)?;

        tx.commit().map_err(Error::database)?;
    }

    Ok(())
}

/// Latest schema version known to this build.
pub fn latest_version() -> i64 {
    MIGRATIONS.last().map(|&(v, _)| v).unwrap_or(0)
}
