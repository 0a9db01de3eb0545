use std::fs::File;
use std::io::{self, BufReader};

use anyhow::Context;
use chrono::{TimeZone, Utc};
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tweetfeed::app::AppContext;
use tweetfeed::cli::commands::{self, PrintSink, RunOptions};
use tweetfeed::cli::{read_handles, Cli};
use tweetfeed::config::{Config, PollConfig};
use tweetfeed::notify::{ConsoleNotifier, Notifier};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing; RUST_LOG wins over the verbosity flag
    let default_level = if cli.verbose { "info" } else { "warn" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    let mut config = Config::load()?;
    if let Some(protocol) = cli.protocol {
        config.upstream.protocol = protocol;
    }
    if let Some(timeout) = cli.timeout {
        config.fetch.timeout_secs = timeout;
    }
    if let Some(interval) = &cli.interval {
        config.poll.interval_secs =
            PollConfig::parse_interval(interval).map_err(anyhow::Error::msg)?;
    }

    let handles = match &cli.users {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("Could not open users file {}", path.display()))?;
            read_handles(BufReader::new(file))?
        }
        None => read_handles(io::stdin().lock())?,
    };
    tracing::info!(count = handles.len(), "Loaded accounts");

    let age_floor = match cli.max_epoch {
        Some(epoch) => Some(
            Utc.timestamp_opt(epoch as i64, 0)
                .single()
                .context("max-epoch is out of range")?,
        ),
        None => None,
    };

    let options = RunOptions {
        max_count: cli.max_count as usize,
        age_floor,
        strip: !cli.raw,
        interval: config.poll.interval(),
    };

    let watch_sink = if cli.watch || cli.notify {
        let notifier: Option<Box<dyn Notifier>> = if cli.notify {
            Some(Box::new(ConsoleNotifier::stderr()))
        } else {
            None
        };
        Some(PrintSink::new(options.strip, notifier))
    } else {
        None
    };

    let ctx = AppContext::new(config)?;
    commands::run(&ctx, &handles, &options, watch_sink).await?;

    Ok(())
}
