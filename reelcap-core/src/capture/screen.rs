//! Screen rectangle capture via xcap

use tracing::debug;
use xcap::Monitor;

use super::cursor::CursorOverlay;
use super::PixelSource;
use crate::error::{ReelcapError, Result};
use crate::types::{CaptureRect, Frame, MonitorInfo, BYTES_PER_PIXEL};

/// Grabs frames from the monitor that holds the rectangle's top-left corner
#[derive(Debug)]
pub struct ScreenSource {
    cursor: Option<CursorOverlay>,
}

impl ScreenSource {
    /// The pointer tracker is opened here, once, so capture ticks never pay
    /// for a backend connection. If it cannot be opened the overlay is off.
    pub fn new(show_cursor: bool) -> Self {
        let cursor = if show_cursor { CursorOverlay::open() } else { None };
        Self { cursor }
    }

    /// Whether frames get the cursor painted in
    pub fn draws_cursor(&self) -> bool {
        self.cursor.is_some()
    }

    /// Check once, before recording starts, that the rectangle fits on a
    /// single monitor.
    pub fn validate(rect: &CaptureRect) -> Result<()> {
        let monitor = Monitor::from_point(rect.x, rect.y).map_err(|e| {
            ReelcapError::InvalidRegion(format!("no monitor at ({}, {}): {}", rect.x, rect.y, e))
        })?;
        let bounds = monitor_rect(&monitor)?;
        let right = rect.x as i64 + rect.width as i64;
        let bottom = rect.y as i64 + rect.height as i64;
        if right > bounds.x as i64 + bounds.width as i64
            || bottom > bounds.y as i64 + bounds.height as i64
        {
            return Err(ReelcapError::InvalidRegion(format!(
                "{} extends past monitor bounds {}",
                rect, bounds
            )));
        }
        Ok(())
    }
}

impl PixelSource for ScreenSource {
    fn capture(&mut self, rect: &CaptureRect) -> Result<Frame> {
        let monitor = Monitor::from_point(rect.x, rect.y)?;
        let bounds = monitor_rect(&monitor)?;
        let image = monitor.capture_image()?;

        let rel_x = (rect.x - bounds.x) as i64;
        let rel_y = (rect.y - bounds.y) as i64;
        if rel_x < 0
            || rel_y < 0
            || rel_x + rect.width as i64 > image.width() as i64
            || rel_y + rect.height as i64 > image.height() as i64
        {
            return Err(ReelcapError::capture(format!(
                "{} is outside the {}x{} grab",
                rect,
                image.width(),
                image.height()
            )));
        }

        // RGBA rows -> tightly packed BGR rows
        let stride = image.width() as usize * 4;
        let raw = image.as_raw();
        let mut data = Vec::with_capacity(rect.frame_len());
        for row in 0..rect.height as usize {
            let start = (rel_y as usize + row) * stride + rel_x as usize * 4;
            let end = start + rect.width as usize * 4;
            for px in raw[start..end].chunks_exact(4) {
                data.extend_from_slice(&[px[2], px[1], px[0]]);
            }
        }
        debug_assert_eq!(data.len(), rect.width as usize * rect.height as usize * BYTES_PER_PIXEL);

        let mut frame = Frame::new(rect.width, rect.height, data)?;
        if let Some(cursor) = &self.cursor {
            cursor.paint(&mut frame, rect);
        }
        Ok(frame)
    }
}

fn monitor_rect(monitor: &Monitor) -> Result<CaptureRect> {
    Ok(CaptureRect::new(
        monitor.x()?,
        monitor.y()?,
        monitor.width()?,
        monitor.height()?,
    ))
}

/// List monitors known to the capture backend
pub fn list_monitors() -> Result<Vec<MonitorInfo>> {
    let monitors = Monitor::all()?;
    debug!("Found {} monitors", monitors.len());

    monitors
        .iter()
        .map(|m| {
            let rect = monitor_rect(m)?;
            Ok(MonitorInfo {
                id: m.id()?,
                name: m.name().unwrap_or_else(|_| "Unknown".to_string()),
                x: rect.x,
                y: rect.y,
                width: rect.width,
                height: rect.height,
                is_primary: m.is_primary().unwrap_or(false),
            })
        })
        .collect()
}

/// Whole primary monitor, or the first one
pub fn primary_monitor() -> Result<MonitorInfo> {
    let monitors = list_monitors()?;
    monitors
        .iter()
        .find(|m| m.is_primary)
        .or_else(|| monitors.first())
        .cloned()
        .ok_or_else(|| ReelcapError::capture("no monitors found"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_overlay_is_optional() {
        assert!(!ScreenSource::new(false).draws_cursor());
        // Without an input backend this degrades instead of panicking
        let source = ScreenSource::new(true);
        let _ = source.draws_cursor();
    }
}
