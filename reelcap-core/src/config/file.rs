//! Configuration file loading
//!
//! Loads user configuration from `~/.config/reelcap/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use super::{EncoderChoice, OutputFormat, Quality, RecordingSettings};
use crate::error::{ReelcapError, Result};

/// Configuration file structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Default recording settings
    #[serde(default)]
    pub defaults: DefaultSettings,

    /// External encoder settings
    #[serde(default)]
    pub encoder: EncoderSettings,

    /// Loopback audio settings
    #[serde(default)]
    pub audio: AudioSettings,

    /// Output location
    #[serde(default)]
    pub output: OutputSettings,
}

/// Default recording settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultSettings {
    /// Output format (mp4, gif)
    #[serde(default = "default_format")]
    pub format: String,

    /// Quality tier (high, medium, low)
    #[serde(default = "default_quality")]
    pub quality: String,

    /// Capture frame rate
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,

    /// Draw the cursor into frames
    #[serde(default = "default_true")]
    pub show_cursor: bool,
}

/// External encoder settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderSettings {
    /// Explicit ffmpeg path (empty = search)
    #[serde(default)]
    pub path: String,

    /// Never launch ffmpeg, buffer frames and write GIFs in-process
    #[serde(default)]
    pub disabled: bool,

    /// Always use the built-in GIF codec
    #[serde(default)]
    pub builtin_gif: bool,

    /// Seconds to wait for each shutdown step before giving up
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,
}

/// Loopback audio settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioSettings {
    /// Record system audio with MP4 output
    #[serde(default)]
    pub enabled: bool,

    /// Linear gain before clipping
    #[serde(default = "default_gain")]
    pub gain: f32,
}

/// Output location settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputSettings {
    /// Directory for recordings (empty = videos directory)
    #[serde(default)]
    pub directory: String,
}

// Default value functions
fn default_format() -> String {
    "mp4".to_string()
}

fn default_quality() -> String {
    "medium".to_string()
}

fn default_frame_rate() -> u32 {
    30
}

fn default_true() -> bool {
    true
}

fn default_shutdown_timeout() -> u64 {
    10
}

fn default_gain() -> f32 {
    1.5
}

impl Default for DefaultSettings {
    fn default() -> Self {
        Self {
            format: default_format(),
            quality: default_quality(),
            frame_rate: default_frame_rate(),
            show_cursor: true,
        }
    }
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            path: String::new(),
            disabled: false,
            builtin_gif: false,
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            gain: default_gain(),
        }
    }
}

impl ConfigFile {
    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("reelcap").join("config.toml")
        } else if let Some(home) = dirs::home_dir() {
            home.join(".config").join("reelcap").join("config.toml")
        } else {
            PathBuf::from("reelcap.toml")
        }
    }

    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        Self::load_from(Self::default_path())
    }

    /// Load configuration from a specific path
    pub fn load_from(path: PathBuf) -> Result<Self> {
        if !path.exists() {
            debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .map_err(|e| ReelcapError::Config(format!("Failed to read config file: {}", e)))?;

        let config: ConfigFile = toml::from_str(&content)
            .map_err(|e| ReelcapError::Config(format!("Failed to parse config file: {}", e)))?;

        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Load configuration, logging warnings but returning defaults on error
    pub fn load_or_default() -> Self {
        match Self::load() {
            Ok(config) => config,
            Err(e) => {
                warn!("Failed to load config file: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the default path
    pub fn save(&self) -> Result<()> {
        self.save_to(Self::default_path())
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ReelcapError::Config(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| ReelcapError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(&path, content)
            .map_err(|e| ReelcapError::Config(format!("Failed to write config file: {}", e)))?;

        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Create a default config file if it doesn't exist
    pub fn create_default_if_missing() -> Result<bool> {
        let path = Self::default_path();
        if path.exists() {
            return Ok(false);
        }

        Self::default().save_to(path)?;
        Ok(true)
    }

    /// Build recording settings from this file
    pub fn recording_settings(&self) -> Result<RecordingSettings> {
        let format: OutputFormat = self.defaults.format.parse().map_err(ReelcapError::Config)?;
        let quality: Quality = self.defaults.quality.parse().map_err(ReelcapError::Config)?;

        let encoder = if self.encoder.disabled {
            EncoderChoice::Disabled
        } else if self.encoder.path.trim().is_empty() {
            EncoderChoice::Auto
        } else {
            EncoderChoice::Path(PathBuf::from(self.encoder.path.trim()))
        };

        let settings = RecordingSettings {
            format,
            quality,
            frame_rate: self.defaults.frame_rate,
            show_cursor: self.defaults.show_cursor,
            record_audio: self.audio.enabled,
            audio_gain: self.audio.gain,
            encoder,
            builtin_gif: self.encoder.builtin_gif,
            shutdown_timeout_secs: self.encoder.shutdown_timeout,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Directory new recordings are written to
    pub fn output_directory(&self) -> PathBuf {
        if !self.output.directory.trim().is_empty() {
            return PathBuf::from(self.output.directory.trim());
        }
        dirs::video_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Generate a sample configuration file
pub fn sample_config() -> String {
    r#"# reelcap configuration

[defaults]
# Output format: mp4, gif
format = "mp4"

# Quality: high, medium, low
#   mp4: x264 crf 18 / 23 / 28
#   gif: palette sampling, frame scale, fps cap, colors and dithering
quality = "medium"

# Capture rate in frames per second (1-120)
frame_rate = 30

# Draw the mouse cursor into the recording
show_cursor = true

[encoder]
# Path to ffmpeg. Empty searches REELCAP_FFMPEG, the app directory,
# the per-user data directory and PATH.
path = ""

# Never use ffmpeg. MP4 requests then fall back to an animated GIF.
disabled = false

# Encode GIFs in-process instead of with ffmpeg's two-pass palette filter
builtin_gif = false

# Seconds to wait for each shutdown step (queue drain, encoder exit, audio)
shutdown_timeout = 10

[audio]
# Record system (loopback) audio with MP4 output
enabled = false

# Linear gain applied before clipping
gain = 1.5

[output]
# Directory for recordings. Empty uses the system videos directory.
directory = ""
"#
    .to_string()
}
