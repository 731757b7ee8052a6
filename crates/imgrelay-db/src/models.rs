//! Rust structs mapping to database tables.
//!
//! Each model implements `from_row` for constructing itself from a
//! `rusqlite::Row`. Timestamps are stored as unix milliseconds.

use chrono::{DateTime, Utc};
use imgrelay_core::{AccessLogId, ImageId};
use serde::Serialize;

// ---------------------------------------------------------------------------
// helpers
// ---------------------------------------------------------------------------

/// Convert a timestamp to the stored representation.
pub fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn parse_ts(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let ms: i64 = row.get(idx)?;
    DateTime::from_timestamp_millis(ms).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Integer,
            format!("timestamp out of range: {ms}").into(),
        )
    })
}

fn parse_opt_ts(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let ms: Option<i64> = row.get(idx)?;
    match ms {
        Some(_) => parse_ts(row, idx).map(Some),
        None => Ok(None),
    }
}

// ---------------------------------------------------------------------------
// ImageRecord
// ---------------------------------------------------------------------------

/// Column list matching [`ImageRecord::from_row`].
pub(crate) const IMAGE_COLS: &str = "id, internal_filename, original_name, public_token, \
     size_bytes, mime_type, remote_path, public_url, created_at, last_accessed_at, \
     access_count, deleted";

/// Metadata for one relayed image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageRecord {
    pub id: ImageId,
    pub internal_filename: String,
    pub original_name: String,
    pub public_token: String,
    pub size_bytes: u64,
    pub mime_type: String,
    pub remote_path: String,
    pub public_url: String,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub access_count: u64,
    pub deleted: bool,
}

impl ImageRecord {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: ImageId::from(row.get::<_, i64>(0)?),
            internal_filename: row.get(1)?,
            original_name: row.get(2)?,
            public_token: row.get(3)?,
            size_bytes: row.get::<_, i64>(4)?.max(0) as u64,
            mime_type: row.get(5)?,
            remote_path: row.get(6)?,
            public_url: row.get(7)?,
            created_at: parse_ts(row, 8)?,
            last_accessed_at: parse_opt_ts(row, 9)?,
            access_count: row.get::<_, i64>(10)?.max(0) as u64,
            deleted: row.get(11)?,
        })
    }
}

/// Fields supplied by the caller when creating a record; the store assigns
/// the id, the counters and the flags.
#[derive(Debug, Clone)]
pub struct NewImage {
    pub internal_filename: String,
    pub original_name: String,
    pub public_token: String,
    pub size_bytes: u64,
    pub mime_type: String,
    pub remote_path: String,
    pub public_url: String,
}

// ---------------------------------------------------------------------------
// AccessLogEntry
// ---------------------------------------------------------------------------

pub(crate) const ACCESS_LOG_COLS: &str =
    "id, image_id, client_ip, user_agent, referer, accessed_at";

/// One recorded fetch of an image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccessLogEntry {
    pub id: AccessLogId,
    pub image_id: ImageId,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
    pub accessed_at: DateTime<Utc>,
}

impl AccessLogEntry {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: AccessLogId::from(row.get::<_, i64>(0)?),
            image_id: ImageId::from(row.get::<_, i64>(1)?),
            client_ip: row.get(2)?,
            user_agent: row.get(3)?,
            referer: row.get(4)?,
            accessed_at: parse_ts(row, 5)?,
        })
    }
}

/// Client metadata attached to an access.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestInfo {
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

/// Upper bound on the page size of a listing.
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Default page size of a listing.
pub const DEFAULT_PAGE_LIMIT: u32 = 20;

/// Allow-listed sort columns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortColumn {
    Id,
    InternalFilename,
    SizeBytes,
    #[default]
    CreatedAt,
    LastAccessedAt,
    AccessCount,
}

impl SortColumn {
    /// Parse a user-supplied column name. Unknown names fall back to
    /// [`SortColumn::CreatedAt`] so malformed input never reaches SQL.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "id" => Self::Id,
            "internal_filename" | "filename" => Self::InternalFilename,
            "size_bytes" | "size" | "file_size" => Self::SizeBytes,
            "created_at" => Self::CreatedAt,
            "last_accessed_at" => Self::LastAccessedAt,
            "access_count" => Self::AccessCount,
            _ => Self::default(),
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::InternalFilename => "internal_filename",
            Self::SizeBytes => "size_bytes",
            Self::CreatedAt => "created_at",
            Self::LastAccessedAt => "last_accessed_at",
            Self::AccessCount => "access_count",
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    /// Parse `asc`/`desc` case-insensitively, falling back to descending.
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("asc") {
            Self::Asc
        } else {
            Self::Desc
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// A paginated, ordered listing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    /// 1-based page number.
    pub page: u32,
    pub limit: u32,
    pub sort_by: SortColumn,
    pub sort_order: SortOrder,
    pub include_deleted: bool,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
            sort_by: SortColumn::default(),
            sort_order: SortOrder::default(),
            include_deleted: false,
        }
    }
}

impl ListQuery {
    /// Build a query from raw parameters as an HTTP layer would receive them.
    pub fn from_params(page: u32, limit: u32, sort_by: &str, sort_order: &str) -> Self {
        Self {
            page,
            limit,
            sort_by: SortColumn::parse(sort_by),
            sort_order: SortOrder::parse(sort_order),
            include_deleted: false,
        }
        .normalized()
    }

    /// Clamp page to at least 1 and limit to `1..=MAX_PAGE_LIMIT`.
    pub fn normalized(mut self) -> Self {
        self.page = self.page.max(1);
        self.limit = self.limit.clamp(1, MAX_PAGE_LIMIT);
        self
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }
}

// ---------------------------------------------------------------------------
// Maintenance
// ---------------------------------------------------------------------------

/// Result of a storage compaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CompactionReport {
    pub bytes_before: u64,
    pub bytes_after: u64,
}

impl CompactionReport {
    pub fn reclaimed(&self) -> u64 {
        self.bytes_before.saturating_sub(self.bytes_after)
    }
}
