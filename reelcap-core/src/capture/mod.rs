//! Frame and audio sources
//!
//! This module handles:
//! - Grabbing BGR frames from a screen rectangle (xcap)
//! - Compositing the cursor into captured frames
//! - Loopback system audio with silence-gap correction (cpal)

pub mod audio;
pub mod cursor;
pub mod screen;

pub use audio::{list_audio_devices, AudioCapture, AudioDeviceInfo, Waveform, WaveformWriter};
pub use screen::{list_monitors, primary_monitor, ScreenSource};

use crate::error::Result;
use crate::types::{CaptureRect, Frame};

/// Something that can produce one frame of a screen rectangle on demand.
///
/// Called from the frame timer thread once per tick. An `Err` means no frame
/// this tick; the timer counts it as dropped and keeps going.
pub trait PixelSource: Send {
    fn capture(&mut self, rect: &CaptureRect) -> Result<Frame>;
}

impl<S: PixelSource + ?Sized> PixelSource for Box<S> {
    fn capture(&mut self, rect: &CaptureRect) -> Result<Frame> {
        (**self).capture(rect)
    }
}
