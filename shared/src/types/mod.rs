//! Data model for aggregated packet counts

pub mod aggregate;
pub mod category;
