//! Unified error type for imgrelay.
//!
//! Every component funnels its failures into [`Error`]. The variants follow
//! the failure modes of the relay: malformed tokens, missing records, drift
//! between metadata and the remote store, name collisions, remote outages,
//! local storage failures and missing configuration. An HTTP layer can derive
//! a status code via [`Error::http_status`].

use std::fmt;

/// Unified error type covering all failure modes in imgrelay.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A public token or request input failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The requested entity could not be found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "image", "task").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// Metadata says an object exists but the remote store does not have it.
    #[error("Remote object missing: {path}")]
    RemoteDrift {
        /// Remote path recorded in the metadata.
        path: String,
    },

    /// A generated name or token collided with an existing record.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The remote object store could not be reached or refused the request.
    #[error("Remote storage unavailable: {0}")]
    RemoteUnavailable(String),

    /// A database operation failed.
    #[error("Database error: {source}")]
    Database {
        /// The underlying database error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A local filesystem operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Required configuration (secrets, credentials) is missing or malformed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error to an appropriate HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::Validation(_) => 400,
            Error::NotFound { .. } => 404,
            Error::Conflict(_) => 409,
            Error::RemoteDrift { .. } => 502,
            Error::RemoteUnavailable(_) => 503,
            Error::Database { .. } => 500,
            Error::Io { .. } => 500,
            Error::Config(_) => 500,
            Error::Internal(_) => 500,
        }
    }

    /// Whether this is a local storage failure (disk or database).
    pub fn is_storage_io(&self) -> bool {
        matches!(self, Error::Database { .. } | Error::Io { .. })
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Database`].
    pub fn database(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Error::Database {
            source: source.into(),
        }
    }

    /// Convenience constructor for [`Error::RemoteDrift`].
    pub fn remote_drift(path: impl Into<String>) -> Self {
        Error::RemoteDrift { path: path.into() }
    }

    /// Convenience constructor for [`Error::RemoteUnavailable`].
    pub fn remote(message: impl fmt::Display) -> Self {
        Error::RemoteUnavailable(message.to_string())
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
