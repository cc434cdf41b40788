//! Recording counters and progress snapshots
//!
//! The frame timer is the only writer of the capture counters; the session
//! and progress subscribers only read them.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::config::{OutputFormat, Quality};

/// Live counters shared between the timer thread and the session
#[derive(Debug, Default)]
pub struct CaptureCounters {
    frames_captured: AtomicU64,
    frames_dropped: AtomicU64,
    bytes_captured: AtomicU64,
}

impl CaptureCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one frame handed to a sink
    pub fn record_frame(&self, bytes: usize) {
        self.frames_captured.fetch_add(1, Ordering::Relaxed);
        self.bytes_captured.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Count one tick that produced no frame
    pub fn record_drop(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frames_captured(&self) -> u64 {
        self.frames_captured.load(Ordering::Relaxed)
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped.load(Ordering::Relaxed)
    }

    pub fn bytes_captured(&self) -> u64 {
        self.bytes_captured.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.frames_captured.store(0, Ordering::Relaxed);
        self.frames_dropped.store(0, Ordering::Relaxed);
        self.bytes_captured.store(0, Ordering::Relaxed);
    }

    /// Build a progress snapshot
    pub fn snapshot(&self, elapsed: Duration, format: OutputFormat, quality: Quality) -> RecordingStats {
        let frame_count = self.frames_captured();
        let secs = elapsed.as_secs_f64();
        let current_fps = if secs > 0.0 {
            frame_count as f64 / secs
        } else {
            0.0
        };
        let estimated_size = match format {
            // Indexed pixels plus LZW land near one byte per source pixel
            OutputFormat::Gif => self.bytes_captured() / 3,
            OutputFormat::Mp4 => (quality.nominal_bitrate() as f64 * secs / 8.0) as u64,
        };

        RecordingStats {
            frame_count,
            frames_dropped: self.frames_dropped(),
            duration: elapsed,
            current_fps,
            estimated_size,
        }
    }
}

/// Progress snapshot sent to subscribers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordingStats {
    pub frame_count: u64,
    pub frames_dropped: u64,
    /// Recorded time, pauses excluded
    pub duration: Duration,
    pub current_fps: f64,
    /// Rough size of the final file in bytes
    pub estimated_size: u64,
}

impl RecordingStats {
    /// Duration as `mm:ss`
    pub fn formatted_duration(&self) -> String {
        let total = self.duration.as_secs();
        format!("{:02}:{:02}", total / 60, total % 60)
    }

    pub fn formatted_size(&self) -> String {
        format_bytes(self.estimated_size)
    }
}

/// Human-readable byte count: `B`, `KB` or `MB` with one decimal
pub fn format_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = 1024.0 * 1024.0;

    let b = bytes as f64;
    if b < KB {
        format!("{} B", bytes)
    } else if b < MB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{:.1} MB", b / MB)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_formatted_duration() {
        let stats = RecordingStats {
            duration: Duration::from_secs(125),
            ..Default::default()
        };
        assert_eq!(stats.formatted_duration(), "02:05");
    }

    #[test]
    fn test_snapshot_estimates() {
        let counters = CaptureCounters::new();
        for _ in 0..30 {
            counters.record_frame(300);
        }
        counters.record_drop();

        let gif = counters.snapshot(Duration::from_secs(2), OutputFormat::Gif, Quality::Medium);
        assert_eq!(gif.frame_count, 30);
        assert_eq!(gif.frames_dropped, 1);
        assert_eq!(gif.estimated_size, 3000);
        assert!((gif.current_fps - 15.0).abs() < f64::EPSILON);

        let mp4 = counters.snapshot(Duration::from_secs(2), OutputFormat::Mp4, Quality::Low);
        assert_eq!(mp4.estimated_size, 500_000);
    }
}
