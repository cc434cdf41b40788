//! Reelcap Core Library
//!
//! Paced screen recording to MP4 or animated GIF.
//!
//! This library provides:
//! - Fixed-rate capture of a screen rectangle, with cursor overlay
//! - Streaming of raw frames into an external ffmpeg process
//! - Loopback system audio kept in sync across device silence gaps
//! - A built-in GIF codec for when no encoder is installed
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐    ┌─────────────┐    ┌────────────────┐    ┌──────────┐
//! │ Pixel Source │───▶│ Frame Timer │───▶│ Frame Sink     │───▶│ Finalize │
//! │ (xcap)       │    │ (thread)    │    │ (ffmpeg / mem) │    │ (mux)    │
//! └──────────────┘    └─────────────┘    └────────────────┘    └──────────┘
//!                                                                    ▲
//! ┌──────────────┐    ┌─────────────┐                                │
//! │ Loopback     │───▶│ WAV writer  │────────────────────────────────┘
//! │ (cpal)       │    │ (gap sync)  │
//! └──────────────┘    └─────────────┘
//! ```

pub mod capture;
pub mod clock;
pub mod config;
pub mod encode;
pub mod error;
pub mod finalize;
pub mod gif;
pub mod session;
pub mod sink;
pub mod stats;
pub mod timer;
pub mod types;

pub use config::{ConfigFile, EncoderChoice, OutputFormat, Quality, RecordingSettings};
pub use error::{ReelcapError, Result};
pub use session::{RecordingSession, SessionEvent};
pub use stats::{format_bytes, RecordingStats};
pub use types::{CaptureRect, Frame, Handle, MonitorInfo, Status};
