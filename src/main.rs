use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Instant;

use feedpool::{Aggregator, Cancellation, Config};

/// Default config location (~/.config/feedpool/config.toml)
fn default_config_path() -> Option<PathBuf> {
    let home = std::env::var("HOME").ok()?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("feedpool")
            .join("config.toml"),
    )
}

#[derive(Parser, Debug)]
#[command(name = "feedpool", about = "Fetch RSS feeds concurrently and print their items")]
struct Args {
    /// Feed URLs to fetch
    #[arg(required = true, value_name = "URL")]
    urls: Vec<String>,

    /// Config file (defaults to ~/.config/feedpool/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Abort the whole batch after this many seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Number of concurrent workers (0 = one per URL)
    #[arg(long, value_name = "N")]
    workers: Option<usize>,

    /// Print items as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing for debug logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = match args.config.clone().or_else(default_config_path) {
        Some(path) => Config::load(&path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(timeout) = args.timeout {
        config.timeout_secs = timeout;
    }

    let cancel = match config.batch_timeout() {
        Some(timeout) => Cancellation::with_timeout(timeout),
        None => Cancellation::new(),
    };

    // Ctrl+C cancels in-flight fetches instead of killing the process mid-batch
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received SIGINT, cancelling batch");
            on_interrupt.cancel();
        }
    });

    let aggregator = Aggregator::from_config(config.pool(), &config.fetcher())?;
    let started = Instant::now();
    let items = aggregator
        .run(args.urls, &cancel)
        .await
        .context("Failed to fetch feeds")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else {
        for item in &items {
            println!(
                "{}  [{}] {}\n    {}",
                item.publish_date.format("%Y-%m-%d %H:%M"),
                item.source,
                item.title,
                item.link
            );
        }
    }

    tracing::debug!(items = items.len(), elapsed = ?started.elapsed(), "Done");
    Ok(())
}
