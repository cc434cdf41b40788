//! Record command - capture a region until stopped, then save

use anyhow::{Context, Result};
use clap::Args;
use reelcap_core::capture::{list_monitors, primary_monitor};
use reelcap_core::config::ConfigFile;
use reelcap_core::{
    format_bytes, CaptureRect, OutputFormat, Quality, RecordingSession, SessionEvent, Status,
};
use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{info, warn};

/// Arguments for the record command
#[derive(Args)]
pub struct RecordArgs {
    /// Region to capture, as WxH+X+Y or X,Y,W,H
    #[arg(short, long, conflicts_with = "monitor")]
    region: Option<CaptureRect>,

    /// Monitor ID to capture whole (see `reelcap list`)
    #[arg(short, long)]
    monitor: Option<u32>,

    /// Output file (default: output directory from config, timestamped)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format (mp4, gif)
    #[arg(short, long)]
    format: Option<OutputFormat>,

    /// Quality (high, medium, low)
    #[arg(short, long)]
    quality: Option<Quality>,

    /// Capture frame rate
    #[arg(long)]
    fps: Option<u32>,

    /// Record loopback system audio (MP4 only)
    #[arg(short, long)]
    audio: bool,

    /// Leave the cursor out of the recording
    #[arg(long)]
    no_cursor: bool,

    /// Use the built-in GIF encoder even if ffmpeg is available
    #[arg(long)]
    builtin_gif: bool,

    /// Stop after this many seconds of recorded time
    #[arg(short, long)]
    duration: Option<u64>,
}

/// Record until Ctrl+C (or --duration), then save
pub async fn record(args: RecordArgs) -> Result<()> {
    let file = ConfigFile::load_or_default();
    let mut settings = file
        .recording_settings()
        .context("Config file has invalid values")?;

    if let Some(format) = args.format {
        settings = settings.with_format(format);
    }
    if let Some(quality) = args.quality {
        settings = settings.with_quality(quality);
    }
    if let Some(fps) = args.fps {
        settings = settings.with_frame_rate(fps);
    }
    if args.audio {
        settings = settings.with_audio(true);
    }
    if args.no_cursor {
        settings = settings.with_cursor(false);
    }
    if args.builtin_gif {
        settings = settings.with_builtin_gif(true);
    }
    if args.audio && settings.format == OutputFormat::Gif {
        warn!("Audio is only recorded for MP4 output");
    }

    let rect = match (args.region, args.monitor) {
        (Some(rect), _) => rect,
        (None, Some(id)) => list_monitors()?
            .into_iter()
            .find(|m| m.id == id)
            .map(|m| m.rect())
            .ok_or_else(|| anyhow::anyhow!("No monitor with ID {}. See 'reelcap list'.", id))?,
        (None, None) => primary_monitor().context("Failed to find a monitor")?.rect(),
    };

    let output = match args.output {
        Some(path) => path,
        None => default_output(&file, settings.format),
    };

    println!("Reelcap - Recording\n");
    println!("  Region:   {}", rect);
    println!("  Format:   {} ({})", settings.format, settings.quality);
    println!("  Rate:     {} fps", settings.frame_rate);
    println!("  Output:   {}", output.display());

    let mut session = RecordingSession::new(settings).context("Invalid recording settings")?;
    let mut events = session.subscribe();

    session.start(rect).map_err(|e| {
        let hint = e.user_hint().map(|h| format!("\n  hint: {}", h)).unwrap_or_default();
        anyhow::anyhow!("Failed to start recording: {}{}", e, hint)
    })?;

    match session.encoder() {
        Some(path) => println!("  Encoder:  {}", path.display()),
        None => println!("  Encoder:  built-in (frames buffered in memory)"),
    }
    println!("  Audio:    {}", if session.has_audio() { "loopback" } else { "off" });
    println!();
    println!("Press Enter to pause/resume, Ctrl+C to stop.\n");

    let limit = args.duration.map(Duration::from_secs);
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut tick = tokio::time::interval(Duration::from_millis(100));

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                println!();
                info!("Interrupted, stopping");
                break;
            }
            line = stdin.next_line(), if stdin_open => {
                match line {
                    Ok(Some(_)) => match session.toggle_pause() {
                        Ok(Status::Paused) => print_line("Paused. Enter resumes."),
                        Ok(_) => print_line("Recording."),
                        Err(e) => warn!("{}", e),
                    },
                    _ => stdin_open = false,
                }
            }
            event = events.recv() => {
                match event {
                    Ok(SessionEvent::Progress(stats)) => print_line(&format!(
                        "{}  {} frames  {:.1} fps  ~{}",
                        stats.formatted_duration(),
                        stats.frame_count,
                        stats.current_fps,
                        stats.formatted_size()
                    )),
                    Ok(SessionEvent::Error(message)) => {
                        println!();
                        warn!("{}", message);
                    }
                    _ => {}
                }
            }
            _ = tick.tick() => {
                if limit.is_some_and(|limit| session.stats().duration >= limit) {
                    println!();
                    info!("Duration reached, stopping");
                    break;
                }
            }
        }
    }

    println!("Stopping...");
    session.stop().await.context("Failed to stop recording")?;
    let stats = session.stats();
    println!(
        "Captured {} frames ({} dropped) over {}",
        stats.frame_count,
        stats.frames_dropped,
        stats.formatted_duration()
    );

    println!("Saving...");
    let saved = session.save(&output).await.map_err(|e| {
        let hint = e.user_hint().map(|h| format!("\n  hint: {}", h)).unwrap_or_default();
        anyhow::anyhow!("Failed to save recording: {}{}", e, hint)
    })?;

    let size = std::fs::metadata(&saved).map(|m| m.len()).unwrap_or(0);
    if saved != output {
        println!("No encoder produced {}; saved a GIF instead.", output.display());
    }
    println!("Saved {} ({})", saved.display(), format_bytes(size));

    Ok(())
}

/// `<output dir>/reelcap-<unix time>.<ext>`
fn default_output(file: &ConfigFile, format: OutputFormat) -> PathBuf {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    file.output_directory()
        .join(format!("reelcap-{}.{}", stamp, format.extension()))
}

fn print_line(text: &str) {
    print!("\r\x1b[2K{}", text);
    let _ = std::io::stdout().flush();
}
