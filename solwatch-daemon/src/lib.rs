pub mod cli;
pub mod config;
pub mod decoders;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use config::{load_config, DaemonConfig};
use solana_client::nonblocking::rpc_client::RpcClient;
use solwatch_connector::{
    storage::{MemoryStore, TransactionStore},
    workers::Tracker,
};
use std::{fs::File, str::FromStr, sync::Arc};
use tokio::signal;
use tracing::Level;
use tracing_subscriber::{
    filter::LevelFilter,
    fmt::{self, writer::MakeWriterExt},
    prelude::*,
    Registry,
};

/// The main entry point for running the tracking daemon.
/// This function handles CLI parsing, configuration, and service startup.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    let Commands::Run(run_cmd) = cli.command;
    let config = load_config_from_cli(run_cmd)?;
    init_logging(&config)?;
    tracing::info!("Configuration loaded: {:#?}", &config);
    run_tracker(config).await?;

    Ok(())
}

/// Loads the daemon configuration based on the provided CLI command.
fn load_config_from_cli(run_cmd: cli::RunCmd) -> Result<DaemonConfig> {
    if let Some(config_path) = run_cmd.config {
        println!("Loading configuration from '{}'", &config_path);
        load_config(&config_path)
    } else {
        println!("No config file provided, using default settings.");
        Ok(DaemonConfig::default())
    }
}

/// Initializes the logging system based on the provided configuration.
fn init_logging(config: &DaemonConfig) -> Result<()> {
    let log_level = Level::from_str(&config.daemon.log.level).unwrap_or(Level::INFO);
    let level_filter = LevelFilter::from_level(log_level);
    let subscriber = Registry::default().with(level_filter);

    match config.daemon.log.output {
        config::LogOutput::File => {
            let file_path = config.daemon.log.file_path.as_deref().ok_or_else(|| {
                anyhow::anyhow!("Log output is 'file' but 'file_path' is not specified")
            })?;
            let log_file = File::create(file_path)?;
            let file_writer = log_file.with_max_level(log_level);

            match config.daemon.log.format {
                config::LogFormat::Json => {
                    subscriber.with(fmt::layer().with_writer(file_writer).json()).init()
                }
                config::LogFormat::Plain => subscriber
                    .with(fmt::layer().with_writer(file_writer).pretty())
                    .init(),
            }
        }
        config::LogOutput::Stdout => {
            let stdout_writer = std::io::stdout.with_max_level(log_level);
            match config.daemon.log.format {
                config::LogFormat::Json => {
                    subscriber.with(fmt::layer().with_writer(stdout_writer).json()).init()
                }
                config::LogFormat::Plain => {
                    subscriber.with(fmt::layer().with_writer(stdout_writer).pretty()).init()
                }
            }
        }
    };

    Ok(())
}

/// Starts the tracker and handles graceful shutdown.
async fn run_tracker(config: DaemonConfig) -> Result<()> {
    if config.tracker.wallets.is_empty() {
        anyhow::bail!("No wallets configured; nothing to track");
    }

    let tracker_config = Arc::new(config.tracker);
    let rpc = Arc::new(RpcClient::new(tracker_config.solana.rpc_url.clone()));
    let store = Arc::new(MemoryStore::new(tracker_config.store.capacity));
    let decoders = Arc::new(decoders::LoggingDecoders);

    for wallet in &tracker_config.wallets {
        tracing::info!(wallet = %wallet.name, address = %wallet.address, "Tracking wallet");
    }

    let (tracker, handle) = Tracker::new(tracker_config, rpc, store.clone(), decoders);
    let tracker_task = tokio::spawn(tracker.run());

    match signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
            handle.stop().await;
            if let Err(e) = tracker_task.await {
                tracing::error!("Tracker task failed: {e}");
            }
            let recorded = store.count().await.unwrap_or(0);
            tracing::info!(recorded, "Shutdown complete.");
        }
        Err(err) => {
            tracing::error!(error = %err, "Failed to listen for shutdown signal.");
        }
    }
    Ok(())
}
