//! Reelcap CLI
//!
//! Record a screen region to MP4 or animated GIF.
//!
//! # Usage
//!
//! ```bash
//! # List monitors and loopback devices
//! reelcap list
//!
//! # Record the primary monitor until Ctrl+C
//! reelcap record -o demo.mp4
//!
//! # Record a region as a GIF for ten seconds
//! reelcap record --region 800x600+100+100 --format gif --duration 10
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Reelcap - screen region recorder
#[derive(Parser)]
#[command(name = "reelcap")]
#[command(version)]
#[command(about = "Record a screen region to MP4 or animated GIF", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a screen region
    #[command(alias = "rec")]
    Record(commands::RecordArgs),

    /// List monitors and loopback audio devices
    #[command(alias = "ls")]
    List(commands::ListArgs),

    /// Show encoder and device status
    Info,

    /// Manage the configuration file
    Config(commands::ConfigArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(format!("reelcap_core={}", level).parse()?)
                .add_directive(format!("reelcap={}", level).parse()?),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Record(args) => commands::record(args).await?,
        Commands::List(args) => commands::list(args).await?,
        Commands::Info => commands::info().await?,
        Commands::Config(args) => commands::config(args).await?,
    }

    Ok(())
}
