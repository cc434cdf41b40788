//! Frame sinks
//!
//! The frame timer hands every captured frame to exactly one sink:
//! - [`StreamingSink`] pipes raw frames into an external encoder process
//! - [`BufferingSink`] keeps frames in memory for the built-in GIF codec
//!
//! [`ActiveSink`] is what a session actually records into. It starts as
//! either kind and switches to buffering if the encoder goes away.

mod buffer;
mod streaming;

pub use buffer::BufferingSink;
pub use streaming::{EncodedVideo, StreamingSink};

use std::time::Duration;
use tracing::warn;

use crate::types::Frame;

/// Destination for captured frames
pub trait FrameSink: Send {
    /// Take ownership of one frame and its nominal display time
    fn push(&mut self, frame: Frame, delay_ms: u32);

    /// Frames accepted so far
    fn frames_accepted(&self) -> u64;
}

/// Everything a session captured, ready for finalization
#[derive(Debug)]
pub struct SinkOutput {
    /// Encoder result, if an encoder was ever launched
    pub video: Option<EncodedVideo>,
    /// Frames that went to memory (all of them without an encoder, or the
    /// unwritten backlog plus the tail after an encoder failure)
    pub frames: BufferingSink,
}

/// Sink used by a recording session
pub struct ActiveSink {
    streaming: Option<StreamingSink>,
    buffer: BufferingSink,
    accepted: u64,
    switched: bool,
    /// Delay of the most recent frame, applied to recovered backlog frames
    delay_ms: u32,
}

impl ActiveSink {
    /// Record through an external encoder
    pub fn streaming(sink: StreamingSink) -> Self {
        Self {
            streaming: Some(sink),
            buffer: BufferingSink::new(),
            accepted: 0,
            switched: false,
            delay_ms: 0,
        }
    }

    /// Record into memory
    pub fn buffering() -> Self {
        Self {
            streaming: None,
            buffer: BufferingSink::new(),
            accepted: 0,
            switched: false,
            delay_ms: 0,
        }
    }

    /// Whether frames currently go to the encoder
    pub fn is_streaming(&self) -> bool {
        !self.switched && self.streaming.as_ref().is_some_and(|s| s.is_healthy())
    }

    /// Frames waiting for the encoder writer
    pub fn queued(&self) -> usize {
        self.streaming.as_ref().map(|s| s.queued()).unwrap_or(0)
    }

    /// Drain and close the encoder (bounded by `timeout`) and hand back
    /// everything captured.
    ///
    /// Frames the encoder never consumed come back ahead of the frames that
    /// were buffered after the switch, so capture order is preserved.
    pub fn finish(self, timeout: Duration) -> SinkOutput {
        let Some(streaming) = self.streaming else {
            return SinkOutput {
                video: None,
                frames: self.buffer,
            };
        };

        let (video, backlog) = streaming.finish_with_backlog(timeout);
        if backlog.is_empty() {
            return SinkOutput {
                video: Some(video),
                frames: self.buffer,
            };
        }

        let mut frames = BufferingSink::new();
        for frame in backlog {
            frames.push(frame, self.delay_ms);
        }
        let (tail, delays) = self.buffer.into_parts();
        for (frame, delay_ms) in tail.into_iter().zip(delays) {
            frames.push(frame, delay_ms);
        }
        SinkOutput {
            video: Some(video),
            frames,
        }
    }

    fn switch_to_buffer(&mut self) {
        if !self.switched {
            warn!(
                "Encoder stopped accepting frames after {} frames, buffering the rest in memory",
                self.accepted
            );
            self.switched = true;
        }
    }
}

impl FrameSink for ActiveSink {
    fn push(&mut self, frame: Frame, delay_ms: u32) {
        self.accepted += 1;
        self.delay_ms = delay_ms;

        if !self.switched {
            if let Some(stream) = self.streaming.as_mut() {
                if stream.is_healthy() {
                    match stream.push(frame) {
                        Ok(()) => return,
                        Err(frame) => {
                            self.switch_to_buffer();
                            self.buffer.push(frame, delay_ms);
                            return;
                        }
                    }
                }
                self.switch_to_buffer();
            }
        }

        self.buffer.push(frame, delay_ms);
    }

    fn frames_accepted(&self) -> u64 {
        self.accepted
    }
}
