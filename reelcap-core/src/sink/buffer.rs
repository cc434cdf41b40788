//! In-memory frame sink

use super::FrameSink;
use crate::types::Frame;

/// Keeps every frame and its delay, in capture order.
///
/// Memory grows with duration x resolution x frame rate; nothing is
/// evicted.
#[derive(Debug, Default)]
pub struct BufferingSink {
    frames: Vec<Frame>,
    delays_ms: Vec<u32>,
    bytes: u64,
}

impl BufferingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Total pixel bytes held
    pub fn total_bytes(&self) -> u64 {
        self.bytes
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn delays_ms(&self) -> &[u32] {
        &self.delays_ms
    }

    /// Total playing time of the buffered frames in milliseconds
    pub fn duration_ms(&self) -> u64 {
        self.delays_ms.iter().map(|&d| d as u64).sum()
    }

    pub fn into_parts(self) -> (Vec<Frame>, Vec<u32>) {
        (self.frames, self.delays_ms)
    }
}

impl FrameSink for BufferingSink {
    fn push(&mut self, frame: Frame, delay_ms: u32) {
        self.bytes += frame.len() as u64;
        self.frames.push(frame);
        self.delays_ms.push(delay_ms);
    }

    fn frames_accepted(&self) -> u64 {
        self.frames.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_order_and_delays() {
        let mut sink = BufferingSink::new();
        for i in 0..5u8 {
            sink.push(Frame::solid(4, 2, [i, i, i]), 40 + i as u32);
        }

        assert_eq!(sink.len(), 5);
        assert_eq!(sink.total_bytes(), 5 * 4 * 2 * 3);
        assert_eq!(sink.duration_ms(), 40 + 41 + 42 + 43 + 44);

        let (frames, delays) = sink.into_parts();
        assert_eq!(frames[3].pixel(0, 0), Some([3, 3, 3]));
        assert_eq!(delays, vec![40, 41, 42, 43, 44]);
    }
}
