//! imgrelay-core: shared types, IDs, errors, and configuration.
//!
//! This crate is the foundational dependency for the other imgrelay crates,
//! providing typed row identifiers, the unified error taxonomy, and the
//! application configuration tree.

pub mod config;
pub mod error;
pub mod ids;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, Result};
pub use ids::*;
