//! Mapping from rusqlite failures to the shared [`Error`] type.

use imgrelay_core::Error;
use rusqlite::ffi;
use rusqlite::ErrorCode;

/// Convert a rusqlite error, turning unique-constraint violations into
/// [`Error::Conflict`] and keeping everything else as [`Error::Database`]
/// with the original error as source so [`is_busy`] can inspect it.
pub(crate) fn db_err(e: rusqlite::Error) -> Error {
    if let rusqlite::Error::SqliteFailure(failure, msg) = &e {
        if failure.code == ErrorCode::ConstraintViolation
            && matches!(
                failure.extended_code,
                ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY
            )
        {
            return Error::Conflict(
                msg.clone()
                    .unwrap_or_else(|| "unique constraint violated".to_string()),
            );
        }
    }
    Error::database(e)
}

/// Whether an error is transient lock contention (`SQLITE_BUSY` or
/// `SQLITE_LOCKED`) and the operation may be retried.
pub fn is_busy(err: &Error) -> bool {
    let Error::Database { source } = err else {
        return false;
    };
    matches!(
        source.downcast_ref::<rusqlite::Error>(),
        Some(rusqlite::Error::SqliteFailure(failure, _))
            if matches!(failure.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}
