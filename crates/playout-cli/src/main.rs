//! Playout CLI - Offline inspection of player decisions
//!
//! Features:
//! - Protocol / DRM negotiation against a saved playout matrix
//! - Backend selection for a given set of runtime capabilities
//! - Offering selection
//! - Effective player configuration after merging overrides

use clap::{Parser, Subcommand};
use playout_core::{Drm, Protocol};
use std::path::PathBuf;

mod commands;
mod output;

/// Playout CLI - Player session toolkit
#[derive(Parser)]
#[command(name = "playout-cli")]
#[command(author = "Purple Squirrel Media")]
#[command(version)]
#[command(about = "Inspect playout negotiation and player configuration", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Negotiate protocol and DRM from a playout options file
    Negotiate {
        /// JSON file holding the playout matrix
        matrix: PathBuf,

        /// Protocol preference, most preferred first
        #[arg(short, long, value_delimiter = ',', default_value = "hls,dash")]
        protocols: Vec<Protocol>,

        /// DRM preference, most preferred first
        #[arg(short, long, value_delimiter = ',', default_value = "fairplay,widevine,clear,aes-128,sample-aes")]
        drms: Vec<Drm>,

        /// DRMs the client supports (defaults to the preference list)
        #[arg(short, long, value_delimiter = ',')]
        available: Option<Vec<Drm>>,

        /// Assume hls.js cannot run
        #[arg(long)]
        no_hlsjs: bool,

        /// Assume the media element plays HLS natively
        #[arg(long)]
        native_hls: bool,
    },

    /// Pick an offering from an availability file
    Offering {
        /// JSON file mapping offering ids to offerings
        available: PathBuf,

        /// Explicit offering id
        #[arg(short, long)]
        offering: Option<String>,

        /// Preference list, most preferred first
        #[arg(short, long, value_delimiter = ',')]
        prefer: Vec<String>,
    },

    /// Print the effective configuration for a set of overrides
    Config {
        /// JSON file with configuration overrides
        overrides: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(level)
        .init();

    match cli.command {
        Commands::Negotiate { matrix, protocols, drms, available, no_hlsjs, native_hls } => {
            let available = available.unwrap_or_else(|| drms.clone());
            let platform = commands::Capabilities {
                hlsjs: !no_hlsjs,
                native_hls,
            };
            commands::negotiate(&matrix, &protocols, &drms, &available, &platform, &cli.format).await?;
        }
        Commands::Offering { available, offering, prefer } => {
            commands::offering(&available, offering.as_deref(), &prefer, &cli.format).await?;
        }
        Commands::Config { overrides } => {
            commands::config(overrides.as_deref(), &cli.format).await?;
        }
    }

    Ok(())
}
