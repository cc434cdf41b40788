//! Core types for reelcap
//!
//! These types represent the data that moves between the capture thread,
//! the frame sinks and the audio writer.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::error::{ReelcapError, Result};

/// Bytes per pixel of a captured frame (B, G, R)
pub const BYTES_PER_PIXEL: usize = 3;

/// Global handle counter for unique session IDs
static HANDLE_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Opaque handle for a recording session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(u64);

impl Handle {
    /// Create a new unique handle
    pub fn new() -> Self {
        Self(HANDLE_COUNTER.fetch_add(1, Ordering::SeqCst))
    }

    /// Get the raw handle value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for Handle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Handle({})", self.0)
    }
}

/// Screen rectangle in virtual desktop coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaptureRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl CaptureRect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Round width and height down to even numbers.
    ///
    /// H.264 with 4:2:0 chroma rejects odd dimensions, so every session
    /// records an even-sized region. Fails if nothing is left.
    pub fn clamp_even(self) -> Result<Self> {
        let width = self.width & !1;
        let height = self.height & !1;
        if width < 2 || height < 2 {
            return Err(ReelcapError::InvalidRegion(format!(
                "{}x{} is too small to record",
                self.width, self.height
            )));
        }
        Ok(Self {
            width,
            height,
            ..self
        })
    }

    /// Size in bytes of one BGR frame of this rectangle
    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * BYTES_PER_PIXEL
    }

    /// Whether the point lies inside the rectangle
    pub fn contains(&self, px: i32, py: i32) -> bool {
        px >= self.x
            && py >= self.y
            && (px as i64) < self.x as i64 + self.width as i64
            && (py as i64) < self.y as i64 + self.height as i64
    }
}

impl std::fmt::Display for CaptureRect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

impl std::str::FromStr for CaptureRect {
    type Err = String;

    /// Parses `WxH+X+Y` (geometry style) or `X,Y,W,H`
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let bad = || format!("Invalid region '{}'. Use WxH+X+Y or X,Y,W,H", s);

        if let Some((size, offset)) = s.split_once('+') {
            let (w, h) = size.split_once('x').ok_or_else(bad)?;
            let (x, y) = offset.split_once('+').ok_or_else(bad)?;
            return Ok(Self::new(
                x.trim().parse().map_err(|_| bad())?,
                y.trim().parse().map_err(|_| bad())?,
                w.trim().parse().map_err(|_| bad())?,
                h.trim().parse().map_err(|_| bad())?,
            ));
        }

        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(bad());
        }
        Ok(Self::new(
            parts[0].parse().map_err(|_| bad())?,
            parts[1].parse().map_err(|_| bad())?,
            parts[2].parse().map_err(|_| bad())?,
            parts[3].parse().map_err(|_| bad())?,
        ))
    }
}

/// One captured frame: tightly packed B, G, R rows, top to bottom
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Frame {
    /// Wrap a BGR buffer, checking its length against the dimensions
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * BYTES_PER_PIXEL;
        if data.len() != expected {
            return Err(ReelcapError::capture(format!(
                "frame buffer is {} bytes, expected {} for {}x{}",
                data.len(),
                expected,
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// A frame filled with one color
    pub fn solid(width: u32, height: u32, bgr: [u8; 3]) -> Self {
        let pixels = width as usize * height as usize;
        let mut data = Vec::with_capacity(pixels * BYTES_PER_PIXEL);
        for _ in 0..pixels {
            data.extend_from_slice(&bgr);
        }
        Self {
            width,
            height,
            data,
        }
    }

    /// Size of the pixel buffer in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// B, G, R of the pixel at (x, y)
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        Some([self.data[i], self.data[i + 1], self.data[i + 2]])
    }
}

/// Recording session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Created, nothing captured yet
    #[default]
    Idle,
    /// Frame timer running
    Recording,
    /// Frame timer alive but not capturing
    Paused,
    /// Stop in progress: timer, sink and audio are shutting down
    Stopping,
    /// Capture finished, ready to save
    Stopped,
}

impl Status {
    /// Whether capture resources are live
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Recording | Self::Paused)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Recording => write!(f, "recording"),
            Self::Paused => write!(f, "paused"),
            Self::Stopping => write!(f, "stopping"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// PCM layout of the loopback waveform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFormat {
    /// Waveforms are always written as 16-bit signed PCM
    pub const BYTES_PER_SAMPLE: u32 = 2;

    /// Bytes per interleaved sample frame
    pub fn block_align(&self) -> u32 {
        self.channels as u32 * Self::BYTES_PER_SAMPLE
    }

    pub fn bytes_per_second(&self) -> u32 {
        self.sample_rate * self.block_align()
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
        }
    }
}

/// Samples delivered by the audio device in one callback
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Interleaved samples in -1.0..=1.0
    pub samples: Vec<f32>,
    /// When the callback fired
    pub arrived: Instant,
}

impl AudioChunk {
    pub fn new(samples: Vec<f32>, arrived: Instant) -> Self {
        Self { samples, arrived }
    }

    /// Size in bytes once written as 16-bit PCM
    pub fn pcm_len(&self) -> u64 {
        self.samples.len() as u64 * AudioFormat::BYTES_PER_SAMPLE as u64
    }
}

/// Monitor as seen by the capture backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorInfo {
    pub id: u32,
    pub name: String,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub is_primary: bool,
}

impl MonitorInfo {
    /// The whole monitor as a capture rectangle
    pub fn rect(&self) -> CaptureRect {
        CaptureRect::new(self.x, self.y, self.width, self.height)
    }
}
