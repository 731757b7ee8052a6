//! imgrelay - relays uploaded images to a WebDAV store behind opaque tokens
//!
//! This library crate exposes the core functionality for the binary and for
//! integration testing.

pub mod config;
pub mod context;
pub mod images;
pub mod maintenance;
pub mod remote;
pub mod store;
pub mod token;
