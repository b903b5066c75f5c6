//! Subcommands

pub mod init;
pub mod run;

use anyhow::Result;
use clap::Args;
use packetlog_aggregator::{AggregatorConfig, StorageLayout};
use std::path::PathBuf;

/// Options shared by every command that touches storage
#[derive(Args, Debug, Clone)]
pub struct StorageArgs {
    /// TOML configuration file
    #[arg(short, long, env = "PACKETLOG_CONFIG")]
    pub config: Option<PathBuf>,

    /// Root directory for the per-day storage directories
    #[arg(short, long)]
    pub data_dir: Option<PathBuf>,

    /// Storage layout: session (one file per run) or daily (one file per day)
    #[arg(short, long)]
    pub layout: Option<StorageLayout>,
}

impl StorageArgs {
    /// Configuration file and environment, overridden by explicit flags.
    pub fn resolve(&self) -> Result<AggregatorConfig> {
        let mut config = AggregatorConfig::load(self.config.as_deref())?;
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(layout) = self.layout {
            config.layout = layout;
        }
        Ok(config)
    }
}
