//! Mock infrastructure for testing
//!
//! Pixel sources that need no display, and frame builders.

#![allow(dead_code)]

use reelcap_core::capture::PixelSource;
use reelcap_core::error::{ReelcapError, Result};
use reelcap_core::types::{CaptureRect, Frame};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Create a frame filled with one BGR color
pub fn create_test_frame(width: u32, height: u32, bgr: [u8; 3]) -> Frame {
    Frame::solid(width, height, bgr)
}

/// Create a frame with a diagonal gradient (well over 256 colors at
/// moderate sizes)
pub fn create_gradient_frame(width: u32, height: u32, shift: u8) -> Frame {
    let mut data = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height {
        for x in 0..width {
            let r = ((x as f32 / width as f32) * 255.0) as u8;
            let g = ((y as f32 / height as f32) * 255.0) as u8;
            let b = (((x + y) as f32 / (width + height) as f32) * 255.0) as u8;
            data.extend_from_slice(&[b.wrapping_add(shift), g, r]);
        }
    }
    Frame::new(width, height, data).expect("gradient buffer matches dimensions")
}

/// Always returns the same solid color, counting calls
pub struct SolidSource {
    pub bgr: [u8; 3],
    pub calls: Arc<AtomicU64>,
}

impl SolidSource {
    pub fn new(bgr: [u8; 3]) -> Self {
        Self {
            bgr,
            calls: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl PixelSource for SolidSource {
    fn capture(&mut self, rect: &CaptureRect) -> Result<Frame> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(Frame::solid(rect.width, rect.height, self.bgr))
    }
}

/// Gradient that shifts every frame
pub struct GradientSource {
    frame: u8,
}

impl GradientSource {
    pub fn new() -> Self {
        Self { frame: 0 }
    }
}

impl PixelSource for GradientSource {
    fn capture(&mut self, rect: &CaptureRect) -> Result<Frame> {
        self.frame = self.frame.wrapping_add(1);
        Ok(create_gradient_frame(rect.width, rect.height, self.frame))
    }
}

/// Fails every `fail_every`-th capture, like an off-screen rectangle would
pub struct FlakySource {
    count: u64,
    fail_every: u64,
}

impl FlakySource {
    pub fn new(fail_every: u64) -> Self {
        Self {
            count: 0,
            fail_every: fail_every.max(1),
        }
    }
}

impl PixelSource for FlakySource {
    fn capture(&mut self, rect: &CaptureRect) -> Result<Frame> {
        self.count += 1;
        if self.count % self.fail_every == 0 {
            return Err(ReelcapError::capture("rectangle is off screen"));
        }
        Ok(Frame::solid(rect.width, rect.height, [0, 0, 0]))
    }
}

/// Takes `delay` per capture, simulating a slow screen grab
pub struct SlowSource {
    pub delay: Duration,
}

impl PixelSource for SlowSource {
    fn capture(&mut self, rect: &CaptureRect) -> Result<Frame> {
        std::thread::sleep(self.delay);
        Ok(Frame::solid(rect.width, rect.height, [9, 9, 9]))
    }
}
