//! Init command implementation

use super::StorageArgs;
use crate::output;
use anyhow::{Context, Result};
use clap::Args;
use packetlog_aggregator::storage::{AggregateStore, SqliteStore};

#[derive(Args, Debug)]
pub struct InitArgs {
    #[command(flatten)]
    pub storage: StorageArgs,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

pub fn run(args: InitArgs) -> Result<()> {
    let config = args.storage.resolve()?;
    let store = SqliteStore::from_config(&config);
    let prepared = store
        .prepare()
        .with_context(|| format!("Failed to prepare storage under {}", config.data_dir.display()))?;
    output::storage_ready(&prepared.path);
    Ok(())
}
