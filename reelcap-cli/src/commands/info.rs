//! Info command - show encoder and device status

use anyhow::Result;
use reelcap_core::capture::{list_audio_devices, list_monitors};
use reelcap_core::config::ConfigFile;
use reelcap_core::encode::{locate_encoder, FFMPEG_ENV};
use reelcap_core::EncoderChoice;
use std::path::Path;
use std::process::Command;

/// Show encoder availability and capture devices
pub async fn info() -> Result<()> {
    println!("Reelcap - System Information\n");

    let file = ConfigFile::load_or_default();
    let settings = file.recording_settings().unwrap_or_default();

    println!("Encoder:");
    match &settings.encoder {
        EncoderChoice::Disabled => println!("  Disabled in config"),
        EncoderChoice::Path(path) => println!("  Configured: {}", path.display()),
        EncoderChoice::Auto => println!("  Search: ${}, app directory, data directory, PATH", FFMPEG_ENV),
    }
    match locate_encoder(&settings.encoder) {
        Some(path) => {
            println!("  Found:   {}", path.display());
            if let Some(version) = encoder_version(&path) {
                println!("  Version: {}", version);
            }
            println!("  MP4 recordings stream to ffmpeg; GIFs use its two-pass palette filter.");
        }
        None => {
            println!("  [!!] No ffmpeg found");
            println!("  MP4 recordings will be saved as GIF with the built-in encoder.");
        }
    }

    println!();
    println!("Displays:");
    match list_monitors() {
        Ok(monitors) => {
            for m in monitors {
                let primary = if m.is_primary { " (primary)" } else { "" };
                println!("  {} {}{}", m.name, m.rect(), primary);
            }
        }
        Err(e) => println!("  [!!] {}", e),
    }

    println!();
    println!("Loopback audio:");
    match list_audio_devices() {
        Ok(devices) => {
            let loopback: Vec<_> = devices.into_iter().filter(|d| d.loopback).collect();
            if loopback.is_empty() {
                println!("  [!!] No loopback source; audio recording will be skipped");
            }
            for device in loopback {
                println!("  [OK] {}", device.name);
            }
        }
        Err(e) => println!("  [!!] {}", e),
    }

    println!();
    println!("Config: {}", ConfigFile::default_path().display());
    println!("Output: {}", file.output_directory().display());

    Ok(())
}

/// First line of `ffmpeg -version`
fn encoder_version(encoder: &Path) -> Option<String> {
    let output = Command::new(encoder).arg("-version").output().ok()?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    stdout.lines().next().map(|line| line.trim().to_string())
}
