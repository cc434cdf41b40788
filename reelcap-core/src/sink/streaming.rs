//! Streaming sink: raw frames into an encoder's stdin
//!
//! Capture never waits on the encoder. Frames go onto an unbounded queue and
//! a writer thread copies them into the child's stdin. A slow encoder makes
//! the queue grow instead of stalling the frame timer.

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::encode::{artifact_size, wait_with_timeout, MIN_ARTIFACT_BYTES};
use crate::error::{ReelcapError, Result};
use crate::types::Frame;

/// How long the writer idles on an empty queue before re-checking abort
const WRITER_IDLE: Duration = Duration::from_millis(5);

#[derive(Debug, Default)]
struct WriterState {
    frames_written: AtomicU64,
    bytes_written: AtomicU64,
    /// Encoder stdin broke; nothing more will be written
    failed: AtomicBool,
    /// Drop whatever is still queued and exit
    abort: AtomicBool,
}

/// Result of closing an encoder
#[derive(Debug, Clone)]
pub struct EncodedVideo {
    pub path: PathBuf,
    /// Encoder exited with status zero
    pub exit_ok: bool,
    /// Encoder had to be force-terminated
    pub killed: bool,
    pub frames_written: u64,
}

impl EncodedVideo {
    /// Zero exit code and a file above the sanity threshold
    pub fn is_valid(&self) -> bool {
        self.exit_ok && artifact_size(&self.path) >= MIN_ARTIFACT_BYTES
    }
}

/// Live encoder process fed from a queue
pub struct StreamingSink {
    child: Child,
    frame_tx: Option<Sender<Frame>>,
    /// Second handle on the queue, used to recover frames the writer never took
    backlog_rx: Receiver<Frame>,
    writer: Option<JoinHandle<()>>,
    done_rx: Receiver<()>,
    output: PathBuf,
    state: Arc<WriterState>,
}

impl StreamingSink {
    /// Launch `command` with a piped stdin and start the writer thread.
    ///
    /// `output` is the file the command is expected to produce.
    pub fn spawn(mut command: Command, output: impl Into<PathBuf>) -> Result<Self> {
        let output = output.into();
        command.stdin(Stdio::piped()).stdout(Stdio::null());

        let mut child = command
            .spawn()
            .map_err(|e| ReelcapError::encoder(format!("Failed to launch encoder: {}", e)))?;
        let stdin = match child.stdin.take() {
            Some(stdin) => stdin,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ReelcapError::encoder("Encoder stdin was not captured"));
            }
        };

        let (frame_tx, frame_rx) = unbounded::<Frame>();
        let (done_tx, done_rx) = bounded::<()>(1);
        let state = Arc::new(WriterState::default());

        let backlog_rx = frame_rx.clone();
        let writer_state = state.clone();
        let writer = std::thread::Builder::new()
            .name("reelcap-encode".to_string())
            .spawn(move || {
                run_writer(stdin, frame_rx, &writer_state);
                let _ = done_tx.send(());
            });
        let writer = match writer {
            Ok(handle) => handle,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ReelcapError::encoder(format!("Failed to spawn encoder writer: {}", e)));
            }
        };

        info!("Encoder started (pid {}) -> {:?}", child.id(), output);

        Ok(Self {
            child,
            frame_tx: Some(frame_tx),
            backlog_rx,
            writer: Some(writer),
            done_rx,
            output,
            state,
        })
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Frames waiting to be written
    pub fn queued(&self) -> usize {
        self.frame_tx.as_ref().map(|tx| tx.len()).unwrap_or(0)
    }

    pub fn frames_written(&self) -> u64 {
        self.state.frames_written.load(Ordering::Relaxed)
    }

    /// False once the encoder stopped taking input
    pub fn is_healthy(&self) -> bool {
        !self.state.failed.load(Ordering::Acquire)
    }

    /// Queue one frame. Never blocks.
    ///
    /// Gives the frame back once the encoder stopped taking input.
    pub fn push(&mut self, frame: Frame) -> std::result::Result<(), Frame> {
        if !self.is_healthy() {
            return Err(frame);
        }
        match self.frame_tx.as_ref() {
            Some(tx) => tx.send(frame).map_err(|e| e.into_inner()),
            None => Err(frame),
        }
    }

    /// Drain the queue, close stdin and wait for the encoder.
    ///
    /// Each wait is bounded by `timeout`; past it the process is killed and
    /// any still-queued frames are discarded. Use
    /// [`finish_with_backlog`](Self::finish_with_backlog) to keep them.
    pub fn finish(self, timeout: Duration) -> EncodedVideo {
        self.finish_with_backlog(timeout).0
    }

    /// Like [`finish`](Self::finish), but also returns the frames that were
    /// still queued when the encoder was killed or stopped reading, in
    /// capture order.
    pub fn finish_with_backlog(mut self, timeout: Duration) -> (EncodedVideo, Vec<Frame>) {
        let queued = self.queued();
        debug!("Draining encoder queue ({} frames)", queued);

        // Dropping the sender lets the writer exit once the queue is empty
        drop(self.frame_tx.take());

        let mut killed = false;
        match self.done_rx.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {}
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "Encoder queue not drained within {:?} ({} frames written), terminating",
                    timeout,
                    self.frames_written()
                );
                self.state.abort.store(true, Ordering::Release);
                let _ = self.child.kill();
                killed = true;
            }
        }

        if let Some(writer) = self.writer.take() {
            let _ = writer.join();
        }

        let status = match wait_with_timeout(&mut self.child, timeout) {
            Ok(Some(status)) => Some(status),
            Ok(None) => {
                warn!("Encoder did not exit within {:?}, terminating", timeout);
                let _ = self.child.kill();
                killed = true;
                self.child.wait().ok()
            }
            Err(e) => {
                error!("Failed waiting for encoder: {}", e);
                None
            }
        };

        let backlog: Vec<Frame> = self.backlog_rx.try_iter().collect();
        if !backlog.is_empty() {
            warn!("{} frames never reached the encoder", backlog.len());
        }

        let exit_ok = !killed && status.is_some_and(|s| s.success());
        let frames_written = self.frames_written();
        info!(
            "Encoder finished: {} frames, {} bytes written, status {:?}",
            frames_written,
            self.state.bytes_written.load(Ordering::Relaxed),
            status
        );

        let video = EncodedVideo {
            path: self.output.clone(),
            exit_ok,
            killed,
            frames_written,
        };
        (video, backlog)
    }
}

impl Drop for StreamingSink {
    fn drop(&mut self) {
        if self.writer.is_some() {
            // Never finished: don't leave an orphaned encoder behind
            self.state.abort.store(true, Ordering::Release);
            drop(self.frame_tx.take());
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

fn run_writer(mut stdin: ChildStdin, frame_rx: Receiver<Frame>, state: &WriterState) {
    loop {
        if state.abort.load(Ordering::Acquire) {
            debug!("Encoder writer aborted with {} frames queued", frame_rx.len());
            break;
        }
        match frame_rx.recv_timeout(WRITER_IDLE) {
            Ok(frame) => {
                if let Err(e) = stdin.write_all(&frame.data) {
                    if !state.abort.load(Ordering::Acquire) {
                        warn!("Encoder stdin closed: {}", e);
                    }
                    state.failed.store(true, Ordering::Release);
                    break;
                }
                state.frames_written.fetch_add(1, Ordering::Relaxed);
                state
                    .bytes_written
                    .fetch_add(frame.data.len() as u64, Ordering::Relaxed);
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    let _ = stdin.flush();
    // Dropping stdin is the encoder's end-of-stream
    drop(stdin);
}
