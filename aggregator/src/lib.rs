//! Packet aggregation service
//!
//! Counts packets per category in memory and periodically persists each
//! window to SQLite in one transaction per flush.

pub mod config;
pub mod counter;
pub mod direction;
pub mod error;
pub mod metrics;
pub mod persister;
pub mod scheduler;
pub mod service;
pub mod storage;

pub use config::{AggregatorConfig, StorageLayout};
pub use error::{ServiceError, StoreError};
pub use persister::FlushReport;
pub use scheduler::FlushState;
pub use service::AggregationService;
