use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use optdesk_broker::{BrokerGateway, PaperBroker};
use optdesk_core::{AppConfig, ConfigLoader, MemoryStore};
use optdesk_order_engine::{sink_from_config, Collaborators, PositionLedger, Service};

#[derive(Parser)]
#[command(name = "optdesk")]
#[command(about = "Signal-driven options order desk", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the order engine against the in-process store and paper broker
    Run {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
        /// Account id whose intents are processed (overrides engine.owner)
        #[arg(long, env = "OPTDESK_OWNER")]
        owner: Option<String>,
        /// Optional log file path (logs to file instead of stderr)
        #[arg(long)]
        log_file: Option<String>,
    },
    /// Load the configuration and print the effective values
    CheckConfig {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };
    match &cli.command {
        Commands::Run {
            log_file: Some(path),
            ..
        } => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {path}"))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter())
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        _ => {
            tracing_subscriber::fmt().with_env_filter(filter()).init();
        }
    }

    match cli.command {
        Commands::Run { config, owner, .. } => {
            let mut config = ConfigLoader::load_from(&config)
                .with_context(|| format!("Failed to load config from {config}"))?;
            if let Some(owner) = owner {
                config.engine.owner = owner;
            }
            run_engine(config).await?;
        }
        Commands::CheckConfig { config } => {
            let config = ConfigLoader::load_from(&config)
                .with_context(|| format!("Failed to load config from {config}"))?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

async fn run_engine(config: AppConfig) -> anyhow::Result<()> {
    let notifier = sink_from_config(&config.notifier).context("Failed to build notifier")?;
    let parts = Collaborators {
        store: Arc::new(MemoryStore::new()),
        broker: Arc::new(PaperBroker::new()),
        notifier,
        ledger: Arc::new(PositionLedger::open(config.ledger.path.clone())),
    };

    tracing::warn!("Using the in-process store and paper broker; no live orders will be sent");
    tracing::info!(
        owner = %config.engine.owner,
        ledger = %config.ledger.path.display(),
        profiles = config.crossover.len(),
        "Starting order desk"
    );

    match parts.broker.limits().await {
        Ok(limits) => tracing::info!(%limits, "Broker limits"),
        Err(e) => tracing::warn!(error = %e, "Could not read broker limits"),
    }

    let service = Service::spawn(&config, &parts);
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    tracing::info!("Received Ctrl+C, shutting down");
    service.shutdown().await;

    Ok(())
}
