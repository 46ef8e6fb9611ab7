//! gpslink control - lifecycle CLI for the GPS data-bridge service.
//!
//! Deploys, updates, and restarts the service on the gateway. The hidden
//! `run` subcommand is the supervised entry point the run script execs.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use gpslink_common::release::Channel;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "gpslinkctl")]
#[command(about = "gpslink - GPS data-bridge lifecycle controller", long_about = None)]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Installation directory (defaults to /data/gpslink)
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a release and install or update it
    Install {
        /// Release channel: stable or prerelease
        #[arg(long, default_value = "stable")]
        channel: Channel,
    },

    /// Update to the latest stable release (alias for install --channel stable)
    Update,

    /// Hand the service to the supervisor after first configuration
    Activate,

    /// Remove the service from the supervisor's watch
    Deactivate,

    /// Reset the log stream and force-terminate the running process set
    Restart,

    /// Show installation state and discovered service processes
    Status,

    /// Stop the service and remove the installation (config backup kept)
    Uninstall,

    /// Supervised entry point: run the bridge in the foreground (hidden)
    #[command(hide = true)]
    Run,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    let install_dir = cli
        .dir
        .unwrap_or_else(|| PathBuf::from(gpslink_common::paths::DEFAULT_INSTALL_DIR));

    match cli.command {
        Commands::Install { channel } => commands::install::install(channel, &install_dir).await,
        Commands::Update => commands::install::install(Channel::Stable, &install_dir).await,
        Commands::Activate => commands::activate::activate(&install_dir),
        Commands::Deactivate => commands::activate::deactivate(),
        Commands::Restart => commands::restart::restart(),
        Commands::Status => commands::status::status(&install_dir),
        Commands::Uninstall => commands::uninstall::uninstall(&install_dir),
        Commands::Run => commands::run::run(&install_dir).await,
    }
}
