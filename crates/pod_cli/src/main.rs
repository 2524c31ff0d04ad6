//! podsync CLI - peer-to-peer document synchronization for a pod
//!
//! Usage: podsync <command> [options]

use anyhow::Context;
use clap::{Parser, Subcommand};
use pod_config::Config;
use pod_store::{MemoryStore, SqliteWatermarkStore};
use pod_sync::events::UserEventBus;
use pod_sync::peers::StaticPeerRegistry;
use pod_sync::scheduler::AlwaysReady;
use pod_sync::{catalog, HttpRemoteSource, PeerSelector, SyncContext, SyncScheduler, TimeWindow};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "podsync",
    version = "0.1.0",
    about = "Peer-to-peer document synchronization for pods"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Data directory holding podsync.toml and the watermark database
    #[arg(long, global = true, default_value = ".")]
    data_dir: PathBuf,

    /// Enable verbose/debug logging
    #[arg(long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single sync pass and exit
    Sync,

    /// Run the sync scheduler until interrupted
    Daemon,

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    pod_common::telemetry::init_tracing(cli.verbose, cli.json_logs);

    let config = Config::load(&cli.data_dir).context("failed to load configuration")?;

    match cli.command {
        Commands::Config => {
            let rendered = toml::to_string_pretty(&config)?;
            println!("{}", rendered);
            Ok(())
        }
        Commands::Sync => {
            let scheduler = build_scheduler(&config)?;
            let report = scheduler.run_pass().await;
            print!("{}", report.summary());
            Ok(())
        }
        Commands::Daemon => {
            let scheduler = build_scheduler(&config)?;
            let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("interrupt received, shutting down");
                    let _ = shutdown_tx.send(true);
                }
            });

            scheduler.run(shutdown_rx).await;
            Ok(())
        }
    }
}

fn build_scheduler(config: &Config) -> anyhow::Result<SyncScheduler> {
    let watermarks = SqliteWatermarkStore::open(&config.data_dir.join("watermarks.db"))
        .context("failed to open watermark database")?;

    let ctx = Arc::new(SyncContext {
        store: Arc::new(MemoryStore::new()),
        crypto: Arc::new(pod_common::crypto::Ed25519CryptoService),
        watermarks: Arc::new(watermarks),
        events: UserEventBus::default(),
        time_window: TimeWindow::from_config(&config.sync),
        page_size: config.sync.page_size,
    });

    let source =
        HttpRemoteSource::new(&config.sync).context("failed to build peer HTTP client")?;

    Ok(SyncScheduler::new(
        Arc::new(catalog::standard_registry()),
        Arc::new(StaticPeerRegistry::new(vec![])),
        PeerSelector::new(&config.network.currency, &config.peers),
        Arc::new(source),
        ctx,
        Arc::new(AlwaysReady),
        config.sync.clone(),
    ))
}
