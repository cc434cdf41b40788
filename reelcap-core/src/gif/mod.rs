//! Built-in animated GIF codec
//!
//! Used when no external encoder is available, or when the built-in path
//! is forced. One palette is learned up front from a sample of the
//! recording and every frame is mapped onto it.

pub mod lzw;
pub mod quant;
pub mod writer;

pub use quant::Palette;
pub use writer::{delay_cs, GifWriter, IndexedFrame};

use std::borrow::Cow;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Instant;

use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgb};
use tracing::{debug, info};

use crate::config::Quality;
use crate::error::{ReelcapError, Result};
use crate::types::Frame;

/// What an encode produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GifSummary {
    pub frames: usize,
    pub width: u16,
    pub height: u16,
    pub colors: usize,
}

/// Frames in, looping GIF out
#[derive(Debug, Clone)]
pub struct GifEncoder {
    sample_factor: u32,
    scale: f32,
    /// `Some(0)` loops forever
    repeat: Option<u16>,
}

impl GifEncoder {
    pub fn new(quality: Quality) -> Self {
        Self {
            sample_factor: quality.gif_sample_factor(),
            scale: quality.gif_scale(),
            repeat: Some(0),
        }
    }

    /// Output dimensions for a `width` x `height` source
    pub fn output_size(&self, width: u32, height: u32) -> (u16, u16) {
        let scale = |v: u32| ((v as f32 * self.scale).round() as u32).clamp(1, u16::MAX as u32) as u16;
        (scale(width), scale(height))
    }

    /// Encode `frames` (with matching per-frame delays) into `out`
    pub fn encode<W: Write>(&self, frames: &[Frame], delays_ms: &[u32], out: W) -> Result<GifSummary> {
        let first = frames
            .first()
            .ok_or_else(|| ReelcapError::gif("no frames to encode"))?;
        let started = Instant::now();
        let (width, height) = self.output_size(first.width, first.height);

        let sample = self.palette_sample(frames, width, height);
        let palette = Palette::learn(&sample, self.sample_factor);
        let colors = palette.len();
        debug!("Palette of {} colors from {} sample bytes", colors, sample.len());

        let mut writer = GifWriter::new(out, width, height, Some(palette.clone()), self.repeat)?;
        let mut cache: HashMap<[u8; 3], u8> = HashMap::new();
        let mut indices = Vec::with_capacity(width as usize * height as usize);

        for (i, frame) in frames.iter().enumerate() {
            let pixels = scaled(frame, width, height)?;
            indices.clear();
            indices.extend(pixels.chunks_exact(3).map(|px| {
                *cache
                    .entry([px[0], px[1], px[2]])
                    .or_insert_with(|| palette.index_of(px[0], px[1], px[2]))
            }));

            let delay = delays_ms.get(i).copied().unwrap_or(100);
            writer.write_frame(&IndexedFrame::new(width, height, &indices, delay_cs(delay)))?;
        }

        writer.finish()?;
        info!(
            "Encoded {} frames at {}x{} with {} colors in {:?}",
            frames.len(),
            width,
            height,
            colors,
            started.elapsed()
        );

        Ok(GifSummary {
            frames: frames.len(),
            width,
            height,
            colors,
        })
    }

    /// Encode straight to a file
    pub fn encode_to_file(&self, frames: &[Frame], delays_ms: &[u32], path: &Path) -> Result<GifSummary> {
        let file = File::create(path)
            .map_err(|e| ReelcapError::gif(format!("Failed to create {:?}: {}", path, e)))?;
        self.encode(frames, delays_ms, BufWriter::new(file))
    }

    /// Pixels of the first, middle and last frames, at output size
    fn palette_sample(&self, frames: &[Frame], width: u16, height: u16) -> Vec<u8> {
        let mut picks = vec![0, frames.len() / 2, frames.len() - 1];
        picks.dedup();

        let mut sample = Vec::new();
        for i in picks {
            if let Ok(pixels) = scaled(&frames[i], width, height) {
                sample.extend_from_slice(&pixels);
            }
        }
        sample
    }
}

/// Frame pixels at `width` x `height`, resampled when the size differs
fn scaled(frame: &Frame, width: u16, height: u16) -> Result<Cow<'_, [u8]>> {
    if frame.width == width as u32 && frame.height == height as u32 {
        return Ok(Cow::Borrowed(&frame.data));
    }

    // Channel order is irrelevant to resampling, so BGR rides in an Rgb buffer
    let buffer: ImageBuffer<Rgb<u8>, &[u8]> = ImageBuffer::from_raw(frame.width, frame.height, &frame.data[..])
        .ok_or_else(|| ReelcapError::gif("frame buffer does not match its dimensions"))?;
    let resized = imageops::resize(&buffer, width as u32, height as u32, FilterType::Triangle);
    Ok(Cow::Owned(resized.into_raw()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_size_by_quality() {
        assert_eq!(GifEncoder::new(Quality::High).output_size(640, 480), (640, 480));
        assert_eq!(GifEncoder::new(Quality::Low).output_size(640, 480), (320, 240));
        assert_eq!(GifEncoder::new(Quality::Low).output_size(1, 1), (1, 1));
    }

    #[test]
    fn test_no_frames() {
        let result = GifEncoder::new(Quality::High).encode(&[], &[], Vec::new());
        assert!(matches!(result, Err(ReelcapError::Gif(_))));
    }

    #[test]
    fn test_encode_solid_frames() {
        let frames: Vec<Frame> = (0..3).map(|_| Frame::solid(16, 8, [40, 80, 160])).collect();
        let mut out = Vec::new();
        let summary = GifEncoder::new(Quality::High)
            .encode(&frames, &[100, 100, 100], &mut out)
            .unwrap();

        assert_eq!(summary.frames, 3);
        assert_eq!(summary.colors, 1);
        assert_eq!((summary.width, summary.height), (16, 8));
        assert_eq!(&out[..6], b"GIF89a");
        assert_eq!(*out.last().unwrap(), 0x3B);
    }

    #[test]
    fn test_scaled_halves_dimensions() {
        let frame = Frame::solid(8, 4, [1, 2, 3]);
        let pixels = scaled(&frame, 4, 2).unwrap();
        assert_eq!(pixels.len(), 4 * 2 * 3);
        assert_eq!(&pixels[..3], &[1, 2, 3]);
        assert!(matches!(scaled(&frame, 8, 4).unwrap(), Cow::Borrowed(_)));
    }
}
