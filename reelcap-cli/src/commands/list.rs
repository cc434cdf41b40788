//! List command - monitors and loopback audio devices

use anyhow::{Context, Result};
use clap::Args;
use reelcap_core::capture::{list_audio_devices, list_monitors, AudioDeviceInfo};
use reelcap_core::MonitorInfo;
use serde::Serialize;
use tracing::warn;

/// Arguments for the list command
#[derive(Args)]
pub struct ListArgs {
    /// Print machine-readable JSON
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct Listing {
    monitors: Vec<MonitorInfo>,
    audio_devices: Vec<AudioDeviceInfo>,
}

/// List capture sources
pub async fn list(args: ListArgs) -> Result<()> {
    let monitors = list_monitors().context("Failed to enumerate monitors")?;
    let audio_devices = list_audio_devices().unwrap_or_else(|e| {
        warn!("Failed to enumerate audio devices: {}", e);
        Vec::new()
    });

    if args.json {
        let listing = Listing {
            monitors,
            audio_devices,
        };
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    println!("Monitors:\n");
    if monitors.is_empty() {
        println!("  No monitors found.");
    } else {
        println!("  {:<6} {:<28} {:<22}", "ID", "Name", "Region");
        println!("  {}", "-".repeat(62));
        for monitor in &monitors {
            println!(
                "  {:<6} {:<28} {:<22} {}",
                monitor.id,
                truncate(&monitor.name, 26),
                monitor.rect().to_string(),
                if monitor.is_primary { "(primary)" } else { "" }
            );
        }
    }

    println!("\nLoopback audio:\n");
    let loopback: Vec<_> = audio_devices.iter().filter(|d| d.loopback).collect();
    if loopback.is_empty() {
        println!("  No loopback devices found. Recordings will be video-only.");
    } else {
        for device in loopback {
            let marker = if device.is_default { " (default)" } else { "" };
            println!("  {}{}", device.name, marker);
        }
    }

    println!("\nPass a region to 'reelcap record --region WxH+X+Y' or a monitor ID with '--monitor'.");
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max - 3).collect();
        format!("{}...", head)
    }
}
