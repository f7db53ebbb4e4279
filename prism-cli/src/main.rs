use anyhow::Result;
use clap::{Parser, Subcommand};
use prism_client::{Client, ClientConfig};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "prism")]
#[command(about = "Prism CLI - search cluster tools")]
#[command(version)]
struct Cli {
    /// Client config file (TOML)
    #[arg(short, long, env = "PRISM_CLIENT_CONFIG")]
    config: Option<PathBuf>,

    /// Node URL, overrides the config file
    #[arg(long, env = "PRISM_NODE")]
    node: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Verify that the node runs a supported distribution
    Check,

    /// Print cluster root info
    Info,

    /// Check that the cluster is reachable
    Ping,

    /// Search an index
    Search {
        /// Index to search
        #[arg(short, long)]
        index: String,

        /// Request body as JSON (default: match_all)
        #[arg(short, long)]
        query: Option<String>,

        /// Maximum number of hits to return
        #[arg(short, long)]
        size: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ClientConfig::load(path)?,
        None => ClientConfig::default(),
    };
    if let Some(node) = cli.node {
        config.node = node;
    }

    if matches!(cli.command, Commands::Check) && !config.product_check.enabled {
        tracing::info!("Enabling product check for the check command");
        config.product_check.enabled = true;
    }

    tracing::debug!("Using node {}", config.node);
    let client = Client::new(config)?;

    match cli.command {
        Commands::Check => commands::run_check(&client).await?,
        Commands::Info => commands::run_info(&client).await?,
        Commands::Ping => commands::run_ping(&client).await?,
        Commands::Search { index, query, size } => {
            commands::run_search(&client, &index, query.as_deref(), size).await?
        }
    }

    Ok(())
}
