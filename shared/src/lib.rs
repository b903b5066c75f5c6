//! Shared types and utilities for packetlog
//!
//! This crate contains the data model passed between the producer API, the
//! aggregation worker and the storage layer, plus small time and parsing helpers.

pub mod types;
pub mod utils;

// Re-export commonly used types
pub use types::{aggregate::*, category::*};
