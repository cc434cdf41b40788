//! Config command - manage the configuration file

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use reelcap_core::config::{sample_config, ConfigFile};

/// Arguments for the config command
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show the path to the config file
    Path,

    /// Show the config file and the settings it resolves to
    Show,

    /// Write a commented default config file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Print a sample configuration to stdout
    Sample,
}

/// Run config subcommand
pub async fn config(args: ConfigArgs) -> Result<()> {
    match args.command {
        ConfigCommand::Path => {
            let path = ConfigFile::default_path();
            println!("{}", path.display());
            if path.exists() {
                println!("(file exists)");
            } else {
                println!("(file does not exist)");
            }
        }
        ConfigCommand::Show => {
            let path = ConfigFile::default_path();
            let file = if path.exists() {
                let content = std::fs::read_to_string(&path).context("Failed to read config file")?;
                println!("Configuration file: {}\n", path.display());
                println!("{}", content);
                ConfigFile::load_from(path).context("Failed to parse config file")?
            } else {
                println!("No configuration file found at: {}", path.display());
                println!("Using defaults. Create a config file with:");
                println!("  reelcap config init\n");
                ConfigFile::default()
            };

            let settings = file
                .recording_settings()
                .context("Config file has invalid values")?;
            println!("Effective settings:");
            println!("  Format:     {}", settings.format);
            println!("  Quality:    {}", settings.quality);
            println!("  Frame rate: {} fps", settings.frame_rate);
            println!("  Cursor:     {}", if settings.show_cursor { "shown" } else { "hidden" });
            println!(
                "  Audio:      {}",
                if settings.record_audio {
                    format!("loopback, gain {:.1}", settings.audio_gain)
                } else {
                    "off".to_string()
                }
            );
            println!("  Encoder:    {:?}", settings.encoder);
            println!("  Output dir: {}", file.output_directory().display());
        }
        ConfigCommand::Init { force } => {
            let path = ConfigFile::default_path();

            if path.exists() && !force {
                println!("Configuration file already exists: {}", path.display());
                println!();
                println!("Use --force to overwrite, or edit the existing file.");
                return Ok(());
            }

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).context("Failed to create config directory")?;
            }
            std::fs::write(&path, sample_config()).context("Failed to write config file")?;

            println!("Created configuration file: {}", path.display());
        }
        ConfigCommand::Sample => {
            print!("{}", sample_config());
        }
    }

    Ok(())
}
