//! Error types for reelcap

use thiserror::Error;

/// Result type alias using ReelcapError
pub type Result<T> = std::result::Result<T, ReelcapError>;

/// Main error type for reelcap operations
#[derive(Debug, Error)]
pub enum ReelcapError {
    /// Screen capture failed
    #[error("Capture error: {0}")]
    Capture(String),

    /// Capture rectangle unusable
    #[error("Invalid capture region: {0}")]
    InvalidRegion(String),

    /// Loopback audio error
    #[error("Audio error: {0}")]
    Audio(String),

    /// External encoder error
    #[error("Encoder error: {0}")]
    Encoder(String),

    /// Built-in GIF codec error
    #[error("GIF error: {0}")]
    Gif(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Finalization could not produce any output file
    #[error("No artifact produced: {0}")]
    NoArtifact(String),

    /// Recording session not active
    #[error("No active recording session")]
    NoActiveSession,

    /// Session already running
    #[error("Recording session already running")]
    SessionAlreadyRunning,

    /// Operation not allowed in the current session state
    #[error("Invalid session state: {0}")]
    InvalidState(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<ReelcapError>,
    },
}

impl ReelcapError {
    /// Create a capture error
    pub fn capture(msg: impl Into<String>) -> Self {
        Self::Capture(msg.into())
    }

    /// Create an audio error
    pub fn audio(msg: impl Into<String>) -> Self {
        Self::Audio(msg.into())
    }

    /// Create an encoder error
    pub fn encoder(msg: impl Into<String>) -> Self {
        Self::Encoder(msg.into())
    }

    /// Create a GIF codec error
    pub fn gif(msg: impl Into<String>) -> Self {
        Self::Gif(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid-state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Innermost error, skipping context wrappers
    pub fn root(&self) -> &ReelcapError {
        match self {
            Self::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// Short suggestion for the user, if one applies
    pub fn user_hint(&self) -> Option<&'static str> {
        match self.root() {
            Self::Capture(_) => Some("Check that a display is available and screen capture is permitted"),
            Self::InvalidRegion(_) => Some("Pick a region of at least 2x2 pixels that lies on one monitor"),
            Self::Audio(_) => Some("Check that an audio output device is active, or record without --audio"),
            Self::Encoder(_) => Some("Install ffmpeg or set [encoder] path in config.toml"),
            Self::Config(_) => Some("Check ~/.config/reelcap/config.toml for typos"),
            Self::NoArtifact(_) => Some("Raw capture files were kept next to the requested output"),
            _ => None,
        }
    }

    /// Whether the user can fix this without changing code
    pub fn is_user_recoverable(&self) -> bool {
        matches!(
            self.root(),
            Self::InvalidRegion(_)
                | Self::Audio(_)
                | Self::Config(_)
                | Self::NoActiveSession
                | Self::SessionAlreadyRunning
                | Self::InvalidState(_)
        )
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

// Conversions from external error types

impl From<xcap::XCapError> for ReelcapError {
    fn from(err: xcap::XCapError) -> Self {
        Self::Capture(err.to_string())
    }
}

impl From<hound::Error> for ReelcapError {
    fn from(err: hound::Error) -> Self {
        Self::Audio(format!("WAV error: {}", err))
    }
}

impl From<cpal::DevicesError> for ReelcapError {
    fn from(err: cpal::DevicesError) -> Self {
        Self::Audio(err.to_string())
    }
}

impl From<cpal::DefaultStreamConfigError> for ReelcapError {
    fn from(err: cpal::DefaultStreamConfigError) -> Self {
        Self::Audio(err.to_string())
    }
}

impl From<cpal::BuildStreamError> for ReelcapError {
    fn from(err: cpal::BuildStreamError) -> Self {
        Self::Audio(err.to_string())
    }
}

impl From<cpal::PlayStreamError> for ReelcapError {
    fn from(err: cpal::PlayStreamError) -> Self {
        Self::Audio(err.to_string())
    }
}

impl From<image::ImageError> for ReelcapError {
    fn from(err: image::ImageError) -> Self {
        Self::Capture(format!("Image error: {}", err))
    }
}
