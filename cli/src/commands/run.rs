//! Run command implementation
//!
//! Stands in for the packet-interception layer: each stdin line is one packet.

use super::StorageArgs;
use crate::output;
use anyhow::{Context, Result};
use clap::Args;
use packetlog_aggregator::{metrics, AggregationService};
use packetlog_shared::utils::parse_duration;
use packetlog_shared::Direction;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, trace};

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub storage: StorageArgs,

    /// Flush period (e.g., "5s", "1m"); overrides flush_seconds
    #[arg(short, long)]
    pub flush: Option<String>,

    /// Count packets only, without byte sizes
    #[arg(long)]
    pub no_sizes: bool,

    /// Print Prometheus metrics to stdout on exit
    #[arg(long)]
    pub print_metrics: bool,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// One parsed input line
#[derive(Debug, PartialEq, Eq)]
pub struct EventLine<'a> {
    pub category: &'a str,
    pub direction: Direction,
    pub size_bytes: u64,
}

/// Parse `<category> <direction> [bytes]`. Blank lines, `#` comments and
/// anything else that does not fit return `None`.
pub fn parse_event_line(line: &str) -> Option<EventLine<'_>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let mut parts = line.split_whitespace();
    let category = parts.next()?;
    let direction = parts.next()?.parse().ok()?;
    let size_bytes = match parts.next() {
        Some(size) => size.parse().ok()?,
        None => 0,
    };
    if parts.next().is_some() {
        return None;
    }

    Some(EventLine {
        category,
        direction,
        size_bytes,
    })
}

/// Parse a `--flush` value. Storage windows are whole seconds, so zero and
/// fractional periods are rejected rather than rounded.
pub fn flush_seconds(raw: &str) -> Result<u64> {
    let period = parse_duration(raw).context("Failed to parse flush period")?;
    if period.subsec_nanos() != 0 {
        anyhow::bail!("Flush period must be a whole number of seconds: {}", raw);
    }
    if period.as_secs() == 0 {
        anyhow::bail!("Flush period must be at least one second: {}", raw);
    }
    Ok(period.as_secs())
}

pub async fn run(args: RunArgs) -> Result<()> {
    let mut config = args.storage.resolve()?;
    if let Some(flush) = &args.flush {
        config.flush_seconds = flush_seconds(flush)?;
    }
    if args.no_sizes {
        config.track_sizes = false;
    }
    config.validate().context("Invalid configuration")?;

    let service = AggregationService::open(&config)
        .await
        .context("Failed to start aggregation service")?;
    output::collecting(&config.data_dir, config.flush_seconds);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut ingested = 0u64;
    let mut rejected = 0u64;
    loop {
        tokio::select! {
            line = lines.next_line() => match line.context("Failed to read input")? {
                Some(line) => match parse_event_line(&line) {
                    Some(event) => {
                        trace!(
                            category = event.category,
                            direction = %event.direction,
                            bytes = event.size_bytes,
                            "Event"
                        );
                        service.record(event.category, event.direction.is_outgoing(), event.size_bytes);
                        ingested += 1;
                    }
                    None if line.trim().is_empty() || line.trim_start().starts_with('#') => {}
                    None => {
                        rejected += 1;
                        debug!(line = %line, "Skipping malformed event line");
                    }
                },
                None => break,
            },
            _ = &mut ctrl_c => {
                info!("Interrupted, shutting down");
                break;
            }
        }
    }

    let last = service.shutdown().await.context("Final flush failed")?;
    output::summary(ingested, rejected, &last);
    if args.print_metrics {
        print!("{}", metrics::encode_metrics());
    }
    Ok(())
}
