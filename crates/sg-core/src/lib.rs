//! sg-core: shared error type and configuration.
//!
//! This crate is the foundational dependency for the other sg-* crates,
//! providing the unified error taxonomy for stream supervision and the
//! TOML-backed application configuration.

pub mod config;
pub mod error;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, Result};
