//! Aggregator configuration
//!
//! Values come from built-in defaults, then an optional TOML file, then
//! `PACKETLOG_*` environment variables (e.g. `PACKETLOG_FLUSH_SECONDS=3`).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Rows per INSERT statement inside a flush transaction.
pub const DEFAULT_CHUNK_SIZE: usize = 15;

/// Upper bound keeps a chunk well under SQLite's bound-parameter limit.
pub const MAX_CHUNK_SIZE: usize = 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Root directory holding the per-day storage directories
    pub data_dir: PathBuf,

    /// Seconds between periodic flushes
    #[serde(alias = "flush-seconds")]
    pub flush_seconds: u64,

    /// Storage file placement
    pub layout: StorageLayout,

    /// Accumulate packet byte sizes next to counts
    #[serde(alias = "track-sizes")]
    pub track_sizes: bool,

    /// Rows per INSERT statement within one flush transaction
    #[serde(alias = "chunk-size")]
    pub chunk_size: usize,
}

/// Where aggregate rows are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageLayout {
    /// One file for the whole process run: `<day>/packets_<startup ms>.sqlite`
    Session,
    /// One file per calendar day: `<day>/packets.sqlite`, rotated at midnight
    Daily,
}

impl std::str::FromStr for StorageLayout {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "session" => Ok(StorageLayout::Session),
            "daily" => Ok(StorageLayout::Daily),
            _ => anyhow::bail!("Invalid storage layout: {}", s),
        }
    }
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./packetlog-data"),
            flush_seconds: 5,
            layout: StorageLayout::Session,
            track_sizes: true,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl AggregatorConfig {
    /// Load defaults, then `path` (if any), then the `PACKETLOG_` environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(config::Environment::with_prefix("PACKETLOG"));

        let config: AggregatorConfig = builder
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration values")?;
        config.validate()?;
        Ok(config)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_seconds)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.flush_seconds == 0 {
            anyhow::bail!("flush_seconds must be greater than 0");
        }

        if self.chunk_size == 0 {
            anyhow::bail!("chunk_size must be greater than 0");
        }

        if self.chunk_size > MAX_CHUNK_SIZE {
            anyhow::bail!("chunk_size too large (max {})", MAX_CHUNK_SIZE);
        }

        Ok(())
    }
}
