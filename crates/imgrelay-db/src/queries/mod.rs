//! Database query modules.

pub mod access_logs;
pub mod images;
pub mod maintenance;
