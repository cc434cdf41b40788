//! GIF89a container
//!
//! Layout: signature, logical screen descriptor, global color table,
//! optional NETSCAPE2.0 loop extension, then per frame a graphic control
//! extension, image descriptor, optional local color table and LZW data
//! sub-blocks. A single 0x3B byte ends the file.

use std::io::Write;

use super::lzw;
use super::quant::Palette;
use crate::error::{ReelcapError, Result};

const SIGNATURE: &[u8; 6] = b"GIF89a";
const EXTENSION: u8 = 0x21;
const GRAPHIC_CONTROL: u8 = 0xF9;
const APPLICATION: u8 = 0xFF;
const IMAGE_SEPARATOR: u8 = 0x2C;
const TRAILER: u8 = 0x3B;

/// Color table flag in descriptor packed fields
const TABLE_PRESENT: u8 = 0x80;
/// 8 bits per primary in the source
const COLOR_RESOLUTION: u8 = 0x70;

/// Bits needed to index `len` colors, at least 1
pub fn table_depth(len: usize) -> u8 {
    let mut depth = 1u8;
    while (1usize << depth) < len && depth < 8 {
        depth += 1;
    }
    depth
}

/// One frame's palette indices and display parameters
#[derive(Debug, Clone, Copy)]
pub struct IndexedFrame<'a> {
    pub width: u16,
    pub height: u16,
    pub left: u16,
    pub top: u16,
    pub indices: &'a [u8],
    /// Display time in hundredths of a second
    pub delay_cs: u16,
    pub transparent: Option<u8>,
    /// Local table overriding the global one for this frame
    pub palette: Option<&'a Palette>,
}

impl<'a> IndexedFrame<'a> {
    /// Full-canvas frame using the global palette
    pub fn new(width: u16, height: u16, indices: &'a [u8], delay_cs: u16) -> Self {
        Self {
            width,
            height,
            left: 0,
            top: 0,
            indices,
            delay_cs,
            transparent: None,
            palette: None,
        }
    }

    pub fn with_transparent(mut self, index: u8) -> Self {
        self.transparent = Some(index);
        self
    }

    pub fn with_palette(mut self, palette: &'a Palette) -> Self {
        self.palette = Some(palette);
        self
    }
}

/// Milliseconds to GIF centiseconds, rounded
pub fn delay_cs(delay_ms: u32) -> u16 {
    ((delay_ms + 5) / 10).min(u16::MAX as u32) as u16
}

/// Streaming GIF writer
pub struct GifWriter<W: Write> {
    inner: W,
    width: u16,
    height: u16,
    global: Option<Palette>,
    frames: u32,
}

impl<W: Write> GifWriter<W> {
    /// Write the header. `repeat` of `Some(0)` loops forever, `None` omits
    /// the loop extension.
    pub fn new(
        mut inner: W,
        width: u16,
        height: u16,
        global: Option<Palette>,
        repeat: Option<u16>,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(ReelcapError::gif(format!("invalid canvas {}x{}", width, height)));
        }

        inner.write_all(SIGNATURE)?;
        inner.write_all(&width.to_le_bytes())?;
        inner.write_all(&height.to_le_bytes())?;
        match &global {
            Some(palette) => {
                let depth = table_depth(palette.len());
                inner.write_all(&[TABLE_PRESENT | COLOR_RESOLUTION | (depth - 1), 0, 0])?;
                write_color_table(&mut inner, palette, depth)?;
            }
            None => inner.write_all(&[COLOR_RESOLUTION, 0, 0])?,
        }

        if let Some(count) = repeat {
            inner.write_all(&[EXTENSION, APPLICATION, 11])?;
            inner.write_all(b"NETSCAPE2.0")?;
            inner.write_all(&[3, 1])?;
            inner.write_all(&count.to_le_bytes())?;
            inner.write_all(&[0])?;
        }

        Ok(Self {
            inner,
            width,
            height,
            global,
            frames: 0,
        })
    }

    pub fn frames_written(&self) -> u32 {
        self.frames
    }

    pub fn write_frame(&mut self, frame: &IndexedFrame<'_>) -> Result<()> {
        let expected = frame.width as usize * frame.height as usize;
        if frame.indices.len() != expected {
            return Err(ReelcapError::gif(format!(
                "frame has {} indices, expected {}",
                frame.indices.len(),
                expected
            )));
        }
        if frame.left as u32 + frame.width as u32 > self.width as u32
            || frame.top as u32 + frame.height as u32 > self.height as u32
        {
            return Err(ReelcapError::gif("frame extends past the canvas"));
        }

        let palette = frame
            .palette
            .or(self.global.as_ref())
            .ok_or_else(|| ReelcapError::gif("frame has no color table"))?;
        let depth = table_depth(palette.len());

        // Graphic control extension
        let (disposal, transparent_flag, transparent_index) = match frame.transparent {
            Some(index) => (2u8, 1u8, index),
            None => (0, 0, 0),
        };
        self.inner.write_all(&[EXTENSION, GRAPHIC_CONTROL, 4, (disposal << 2) | transparent_flag])?;
        self.inner.write_all(&frame.delay_cs.to_le_bytes())?;
        self.inner.write_all(&[transparent_index, 0])?;

        // Image descriptor
        self.inner.write_all(&[IMAGE_SEPARATOR])?;
        for value in [frame.left, frame.top, frame.width, frame.height] {
            self.inner.write_all(&value.to_le_bytes())?;
        }
        match frame.palette {
            Some(local) => {
                self.inner.write_all(&[TABLE_PRESENT | (depth - 1)])?;
                write_color_table(&mut self.inner, local, depth)?;
            }
            None => self.inner.write_all(&[0])?,
        }

        let code_size = lzw::min_code_size(depth);
        self.inner.write_all(&[code_size])?;
        let data = lzw::compress(frame.indices, code_size);
        lzw::write_sub_blocks(&mut self.inner, &data)?;

        self.frames += 1;
        Ok(())
    }

    /// Write the trailer and hand back the sink
    pub fn finish(mut self) -> Result<W> {
        self.inner.write_all(&[TRAILER])?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

/// Color table padded with black to `2^depth` entries
fn write_color_table<W: Write>(out: &mut W, palette: &Palette, depth: u8) -> Result<()> {
    let mut table = palette.rgb_table();
    table.resize(3 << depth, 0);
    out.write_all(&table)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_colors() -> Palette {
        let mut pixels = vec![0u8; 30];
        pixels.extend_from_slice(&[255, 255, 255]);
        Palette::learn(&pixels, 1)
    }

    #[test]
    fn test_table_depth() {
        assert_eq!(table_depth(1), 1);
        assert_eq!(table_depth(2), 1);
        assert_eq!(table_depth(3), 2);
        assert_eq!(table_depth(129), 8);
        assert_eq!(table_depth(256), 8);
    }

    #[test]
    fn test_delay_rounding() {
        assert_eq!(delay_cs(33), 3);
        assert_eq!(delay_cs(66), 7);
        assert_eq!(delay_cs(100), 10);
    }

    #[test]
    fn test_header_layout() {
        let writer = GifWriter::new(Vec::new(), 4, 2, Some(two_colors()), Some(0)).unwrap();
        let bytes = writer.finish().unwrap();

        assert_eq!(&bytes[..6], b"GIF89a");
        assert_eq!(&bytes[6..10], &[4, 0, 2, 0]);
        assert_eq!(bytes[10], 0x80 | 0x70);
        // Two-entry table, then the 19-byte loop extension and trailer
        assert_eq!(&bytes[13..19], &[0, 0, 0, 255, 255, 255]);
        assert_eq!(&bytes[19..22], &[0x21, 0xFF, 11]);
        assert_eq!(&bytes[22..33], b"NETSCAPE2.0");
        assert_eq!(bytes.len(), 13 + 6 + 19 + 1);
        assert_eq!(*bytes.last().unwrap(), 0x3B);
    }

    #[test]
    fn test_frame_blocks() {
        let palette = two_colors();
        let indices = [0u8, 1, 1, 0, 1, 0, 0, 1];
        let mut writer = GifWriter::new(Vec::new(), 4, 2, Some(palette), None).unwrap();
        writer
            .write_frame(&IndexedFrame::new(4, 2, &indices, 5).with_transparent(1))
            .unwrap();
        assert_eq!(writer.frames_written(), 1);
        let bytes = writer.finish().unwrap();

        let gce = 13 + 6;
        assert_eq!(&bytes[gce..gce + 8], &[0x21, 0xF9, 4, 0x09, 5, 0, 1, 0]);
        let desc = gce + 8;
        assert_eq!(bytes[desc], 0x2C);
        assert_eq!(&bytes[desc + 5..desc + 9], &[4, 0, 2, 0]);
        assert_eq!(bytes[desc + 9], 0);
        let code_size = bytes[desc + 10];
        assert_eq!(code_size, 2);

        let (data, _) = lzw::read_sub_blocks(&bytes[desc + 11..]).unwrap();
        assert_eq!(lzw::decompress(&data, code_size).unwrap(), indices);
    }

    #[test]
    fn test_rejects_wrong_index_count() {
        let mut writer = GifWriter::new(Vec::new(), 4, 2, Some(two_colors()), None).unwrap();
        let result = writer.write_frame(&IndexedFrame::new(4, 2, &[0, 1], 5));
        assert!(matches!(result, Err(ReelcapError::Gif(_))));
    }

    #[test]
    fn test_frame_without_any_palette() {
        let mut writer = GifWriter::new(Vec::new(), 2, 2, None, None).unwrap();
        let indices = [0u8; 4];
        assert!(writer.write_frame(&IndexedFrame::new(2, 2, &indices, 1)).is_err());

        let local = two_colors();
        writer
            .write_frame(&IndexedFrame::new(2, 2, &indices, 1).with_palette(&local))
            .unwrap();
        let bytes = writer.finish().unwrap();
        // No global table: descriptor right after the 13-byte header
        assert_eq!(bytes[13 + 8], 0x2C);
        assert_eq!(bytes[13 + 8 + 9], 0x80);
    }
}
