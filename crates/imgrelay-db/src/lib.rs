//! imgrelay-db: database access and persistence layer.
//!
//! This crate provides SQLite-backed storage for image metadata and access
//! logs with r2d2 connection pooling, embedded migrations, typed models,
//! and query modules. All functions are synchronous and take a borrowed
//! [`rusqlite::Connection`]; async callers run them on the blocking pool.
//!
//! # Example
//!
//! ```no_run
//! use imgrelay_db::pool::{get_conn, init_pool};
//! use imgrelay_db::queries::images;
//!
//! let pool = init_pool("/var/lib/imgrelay/imgrelay.db", 4).unwrap();
//! let conn = get_conn(&pool).unwrap();
//! println!("{} images", images::count(&conn, false).unwrap());
//! ```

pub mod error;
pub mod migrations;
pub mod models;
pub mod pool;
pub mod queries;

pub use error::is_busy;
