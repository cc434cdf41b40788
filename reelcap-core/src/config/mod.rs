//! Configuration types for reelcap
//!
//! Output format, quality tiers and the per-recording settings. Every
//! encoder and codec parameter that depends on quality is derived here so
//! the sinks and the finalizer never hard-code them.

mod file;

pub use file::{sample_config, ConfigFile};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ReelcapError, Result};

/// Final artifact kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// H.264 in an MP4 container, with optional AAC audio
    #[default]
    Mp4,
    /// Looping animated GIF, never carries audio
    Gif,
}

impl OutputFormat {
    /// File extension without the dot
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Gif => "gif",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.extension())
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mp4" | "video" | "h264" => Ok(Self::Mp4),
            "gif" => Ok(Self::Gif),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

/// Quality tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    High,
    #[default]
    Medium,
    Low,
}

/// Dithering applied when mapping video frames onto a GIF palette
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dither {
    /// Error diffusion, least banding
    Sierra2_4a,
    /// Ordered dither with the given bayer scale
    Bayer(u8),
    None,
}

impl Dither {
    /// Value for the `dither=` option of the palette application filter
    pub fn filter_value(&self) -> String {
        match self {
            Self::Sierra2_4a => "sierra2_4a".to_string(),
            Self::Bayer(scale) => format!("bayer:bayer_scale={}", scale),
            Self::None => "none".to_string(),
        }
    }
}

impl Quality {
    /// Constant rate factor for libx264. Lower is better.
    pub fn crf(&self) -> u8 {
        match self {
            Self::High => 18,
            Self::Medium => 23,
            Self::Low => 28,
        }
    }

    /// Nominal video bitrate in bits per second, used for size estimates
    pub fn nominal_bitrate(&self) -> u64 {
        match self {
            Self::High => 8_000_000,
            Self::Medium => 4_000_000,
            Self::Low => 2_000_000,
        }
    }

    /// Neural quantizer sampling factor (1 = every pixel, 30 = sparsest)
    pub fn gif_sample_factor(&self) -> u32 {
        match self {
            Self::High => 5,
            Self::Medium => 10,
            Self::Low => 20,
        }
    }

    /// Frame scale applied before built-in GIF encoding
    pub fn gif_scale(&self) -> f32 {
        match self {
            Self::High => 1.0,
            Self::Medium => 0.75,
            Self::Low => 0.5,
        }
    }

    /// Upper bound on GIF frame rate for the two-pass filter
    pub fn gif_max_fps(&self) -> u32 {
        match self {
            Self::High => 30,
            Self::Medium => 15,
            Self::Low => 10,
        }
    }

    /// Palette size cap for the two-pass filter
    pub fn gif_max_colors(&self) -> u16 {
        match self {
            Self::High => 256,
            Self::Medium => 192,
            Self::Low => 128,
        }
    }

    pub fn gif_dither(&self) -> Dither {
        match self {
            Self::High => Dither::Sierra2_4a,
            Self::Medium => Dither::Bayer(3),
            Self::Low => Dither::None,
        }
    }
}

impl std::fmt::Display for Quality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::High => write!(f, "high"),
            Self::Medium => write!(f, "medium"),
            Self::Low => write!(f, "low"),
        }
    }
}

impl std::str::FromStr for Quality {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "high" | "best" => Ok(Self::High),
            "medium" | "normal" => Ok(Self::Medium),
            "low" | "small" => Ok(Self::Low),
            _ => Err(format!("Unknown quality: {}", s)),
        }
    }
}

/// Where to find the external encoder binary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EncoderChoice {
    /// Search the environment, app and data directories, then PATH
    #[default]
    Auto,
    /// Use exactly this binary; a missing file means no encoder
    Path(PathBuf),
    /// Never use an external encoder
    Disabled,
}

/// Settings for one recording
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingSettings {
    pub format: OutputFormat,
    pub quality: Quality,
    /// Capture rate in frames per second
    pub frame_rate: u32,
    /// Draw the cursor into captured frames
    pub show_cursor: bool,
    /// Capture loopback system audio (MP4 only)
    pub record_audio: bool,
    /// Linear gain applied to loopback samples before clipping
    pub audio_gain: f32,
    pub encoder: EncoderChoice,
    /// Encode GIFs in-process even when an external encoder exists
    pub builtin_gif: bool,
    /// Bound on each shutdown wait (queue drain, encoder exit, audio close)
    pub shutdown_timeout_secs: u64,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self {
            format: OutputFormat::Mp4,
            quality: Quality::Medium,
            frame_rate: 30,
            show_cursor: true,
            record_audio: false,
            audio_gain: 1.5,
            encoder: EncoderChoice::Auto,
            builtin_gif: false,
            shutdown_timeout_secs: 10,
        }
    }
}

impl RecordingSettings {
    pub const MAX_FRAME_RATE: u32 = 120;
    pub const MAX_AUDIO_GAIN: f32 = 8.0;

    /// Settings for an MP4 recording
    pub fn mp4() -> Self {
        Self::default()
    }

    /// Settings for a GIF recording (audio is never captured)
    pub fn gif() -> Self {
        Self {
            format: OutputFormat::Gif,
            frame_rate: 15,
            ..Self::default()
        }
    }

    /// Set the output format
    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the quality tier
    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = quality;
        self
    }

    /// Set the capture frame rate
    pub fn with_frame_rate(mut self, fps: u32) -> Self {
        self.frame_rate = fps;
        self
    }

    /// Enable or disable cursor overlay
    pub fn with_cursor(mut self, show: bool) -> Self {
        self.show_cursor = show;
        self
    }

    /// Enable or disable loopback audio
    pub fn with_audio(mut self, enabled: bool) -> Self {
        self.record_audio = enabled;
        self
    }

    /// Choose the external encoder
    pub fn with_encoder(mut self, encoder: EncoderChoice) -> Self {
        self.encoder = encoder;
        self
    }

    /// Force the built-in GIF codec
    pub fn with_builtin_gif(mut self, builtin: bool) -> Self {
        self.builtin_gif = builtin;
        self
    }

    /// Set the shutdown wait bound
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// Time between captured frames
    pub fn frame_interval(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / self.frame_rate.max(1) as u64)
    }

    /// Nominal per-frame delay in milliseconds
    pub fn frame_delay_ms(&self) -> u32 {
        (1000 / self.frame_rate.max(1)).max(1)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Whether audio will actually be captured
    pub fn wants_audio(&self) -> bool {
        self.record_audio && self.format == OutputFormat::Mp4
    }

    /// Check values before a recording starts
    pub fn validate(&self) -> Result<()> {
        if self.frame_rate == 0 || self.frame_rate > Self::MAX_FRAME_RATE {
            return Err(ReelcapError::config(format!(
                "frame rate must be between 1 and {}, got {}",
                Self::MAX_FRAME_RATE,
                self.frame_rate
            )));
        }
        if !(self.audio_gain.is_finite() && self.audio_gain > 0.0 && self.audio_gain <= Self::MAX_AUDIO_GAIN) {
            return Err(ReelcapError::config(format!(
                "audio gain must be in (0, {}], got {}",
                Self::MAX_AUDIO_GAIN,
                self.audio_gain
            )));
        }
        if self.shutdown_timeout_secs == 0 {
            return Err(ReelcapError::config("shutdown timeout must be at least 1 second"));
        }
        Ok(())
    }
}
