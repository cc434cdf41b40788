//! Cursor overlay
//!
//! The pointer is not part of screen grabs on most platforms, so the capture
//! path asks for its position and paints a standard arrow glyph itself.
//! Only the position is tracked: the glyph is always the same arrow, whatever
//! shape the system cursor currently has (I-beam, hand, resize and so on).

use device_query::{DeviceQuery, DeviceState};
use std::fmt;
use tracing::{trace, warn};

use crate::types::{CaptureRect, Frame, BYTES_PER_PIXEL};

/// Arrow glyph. `B` outline, `W` fill, anything else transparent.
/// The hotspot is the top-left pixel.
const ARROW: [&str; 19] = [
    "B...........",
    "BB..........",
    "BWB.........",
    "BWWB........",
    "BWWWB.......",
    "BWWWWB......",
    "BWWWWWB.....",
    "BWWWWWWB....",
    "BWWWWWWWB...",
    "BWWWWWWWWB..",
    "BWWWWWWWWWB.",
    "BWWWWWWBBBBB",
    "BWWWBWWB....",
    "BWWB.BWWB...",
    "BWB..BWWB...",
    "BB....BWWB..",
    "B.....BWWB..",
    ".......BWWB.",
    ".......BBB..",
];

/// Pointer tracker opened once per capture source
pub struct CursorOverlay {
    device: DeviceState,
}

impl CursorOverlay {
    /// Connect to the input backend. `None` when it is unavailable, such as
    /// a Linux session without a reachable X display.
    pub fn open() -> Option<Self> {
        match DeviceState::checked_new() {
            Some(device) => Some(Self { device }),
            None => {
                warn!("Pointer position unavailable, recording without the cursor");
                None
            }
        }
    }

    /// Current pointer position in virtual desktop coordinates
    pub fn position(&self) -> (i32, i32) {
        self.device.get_mouse().coords
    }

    /// Paint the pointer into a frame grabbed from `rect`
    pub fn paint(&self, frame: &mut Frame, rect: &CaptureRect) {
        paint_at(frame, rect, self.position());
    }
}

impl fmt::Debug for CursorOverlay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CursorOverlay").finish_non_exhaustive()
    }
}

/// Draw the arrow for a pointer at desktop position `at`, if it lies inside
/// `rect`
pub fn paint_at(frame: &mut Frame, rect: &CaptureRect, at: (i32, i32)) {
    let (cx, cy) = at;
    if rect.contains(cx, cy) {
        trace!("Cursor at ({}, {})", cx, cy);
        draw_cursor(frame, cx - rect.x, cy - rect.y);
    }
}

/// Paint the arrow with its hotspot at (x, y) in frame coordinates.
///
/// Parts of the glyph outside the frame are clipped.
pub fn draw_cursor(frame: &mut Frame, x: i32, y: i32) {
    let width = frame.width as i64;
    let height = frame.height as i64;

    for (dy, row) in ARROW.iter().enumerate() {
        let py = y as i64 + dy as i64;
        if py < 0 || py >= height {
            continue;
        }
        for (dx, cell) in row.bytes().enumerate() {
            let px = x as i64 + dx as i64;
            if px < 0 || px >= width {
                continue;
            }
            let color = match cell {
                b'B' => [0u8, 0, 0],
                b'W' => [255u8, 255, 255],
                _ => continue,
            };
            let i = (py as usize * frame.width as usize + px as usize) * BYTES_PER_PIXEL;
            frame.data[i..i + BYTES_PER_PIXEL].copy_from_slice(&color);
        }
    }
}
