//! Block relay binary
//!
//! Follows the chain head and publishes every transaction touching a watched
//! address to the configured broker (or stdout when none is given).

use anyhow::{Context, Result};
use blockrelay::address_index::{AddressIndex, IndexSizing};
use blockrelay::checkpoint::FileCheckpointStore;
use blockrelay::config::{load_address_book, synthetic_address_book, PipelineConfig};
use blockrelay::publisher::{Publisher, StdoutPublisher};
use blockrelay::rpc::RpcClient;
use blockrelay::watcher::Watcher;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Ethereum transaction relay for watched addresses
#[derive(Parser)]
#[command(name = "blockrelay")]
#[command(about = "Relay transactions touching watched addresses to a message broker")]
struct Args {
    /// RPC endpoint URL (e.g., https://eth.llamarpc.com)
    #[arg(short, long, default_value = "http://127.0.0.1:8545")]
    rpc_url: String,

    /// Address book file (one `<address> <user-id>` pair per line)
    #[arg(short, long, conflicts_with = "synthetic_addresses")]
    addresses: Option<PathBuf>,

    /// Generate this many synthetic addresses instead of reading a file
    #[arg(long)]
    synthetic_addresses: Option<usize>,

    /// Checkpoint file
    #[arg(short, long, default_value = "checkpoint.txt")]
    checkpoint: PathBuf,

    /// Number of concurrent block workers
    #[arg(short, long, default_value_t = 4)]
    workers: usize,

    /// Per-request RPC timeout in milliseconds
    #[arg(long, default_value_t = 10_000)]
    rpc_timeout_ms: u64,

    /// Head polling interval in milliseconds
    #[arg(long, default_value_t = 1000)]
    poll_interval_ms: u64,

    /// Capacity of each internal queue
    #[arg(long, default_value_t = 1000)]
    queue_capacity: usize,

    /// Expected number of watched addresses (size the filter above the real count)
    #[arg(long, default_value_t = 600_000)]
    bloom_expected: usize,

    /// Target bloom filter false positive rate
    #[arg(long, default_value_t = 0.0001)]
    bloom_fp_rate: f64,

    /// Kafka bootstrap servers; messages go to stdout when omitted
    #[arg(short, long)]
    broker: Option<String>,

    /// Kafka topic
    #[arg(short, long, default_value = "eth-transactions")]
    topic: String,
}

fn make_publisher(args: &Args) -> Result<Arc<dyn Publisher>> {
    match &args.broker {
        None => {
            info!("No broker configured, writing messages to stdout");
            Ok(Arc::new(StdoutPublisher))
        }
        #[cfg(feature = "kafka")]
        Some(broker) => {
            info!("Publishing to Kafka {} topic {}", broker, args.topic);
            Ok(Arc::new(blockrelay::publisher::KafkaPublisher::new(
                broker,
                &args.topic,
            )?))
        }
        #[cfg(not(feature = "kafka"))]
        Some(broker) => {
            anyhow::bail!(
                "Broker {} requested but blockrelay was built without the `kafka` feature",
                broker
            )
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    info!("Starting block relay");
    info!("RPC URL: {}", args.rpc_url);
    info!("Checkpoint: {:?}", args.checkpoint);
    if let Some(broker) = &args.broker {
        info!("Broker: {} (topic {})", broker, args.topic);
    }

    let config = PipelineConfig {
        poll_interval: Duration::from_millis(args.poll_interval_ms),
        worker_count: args.workers,
        queue_capacity: args.queue_capacity,
        checkpoint_path: args.checkpoint.clone(),
        index_sizing: IndexSizing {
            expected_addresses: args.bloom_expected,
            false_positive_rate: args.bloom_fp_rate,
        },
        ..PipelineConfig::default()
    };
    config.validate().context("Invalid configuration")?;

    let book = match (&args.addresses, args.synthetic_addresses) {
        (Some(path), _) => load_address_book(path)
            .with_context(|| format!("Failed to load address book {:?}", path))?,
        (None, Some(count)) => synthetic_address_book(count),
        (None, None) => anyhow::bail!("Provide --addresses <file> or --synthetic-addresses <n>"),
    };
    let index = AddressIndex::build(config.index_sizing, book);
    if index.is_empty() {
        warn!("Address book is empty, no transactions will be relayed");
    } else {
        info!("Loaded {} addresses", index.len());
    }

    let publisher = make_publisher(&args)?;
    let checkpoints = FileCheckpointStore::new(config.checkpoint_path.clone());
    let rpc = RpcClient::with_timeout(
        args.rpc_url.clone(),
        Duration::from_millis(args.rpc_timeout_ms),
    )?;

    let watcher = Watcher::new(
        config,
        Arc::new(rpc),
        Arc::new(index),
        publisher,
        Arc::new(checkpoints),
    );

    // Handle Ctrl+C / SIGTERM gracefully
    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Received shutdown signal, stopping...");
        signal_token.cancel();
    });

    watcher.run(shutdown).await.context("Relay error")?;

    let stats = watcher.metrics().snapshot();
    info!(
        "Relay stopped: {} blocks completed, {} messages published, {} fetch failures",
        stats.blocks_completed, stats.messages_published, stats.fetch_failures
    );
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(_) => {
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
