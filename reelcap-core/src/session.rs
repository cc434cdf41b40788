//! Recording session
//!
//! Owns one recording from start to saved file:
//!
//! ```text
//! Idle -> Recording <-> Paused -> Stopping -> Stopped
//! ```
//!
//! Start brings up audio, then the frame sink, then the frame timer. Stop
//! tears them down in the reverse dependency order (timer, sink, audio),
//! every wait bounded by the shutdown timeout. Save runs finalization on
//! whatever was captured.

use image::imageops::{self, FilterType};
use image::RgbImage;
use parking_lot::Mutex;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::capture::{AudioCapture, PixelSource, ScreenSource, Waveform};
use crate::clock::SessionClock;
use crate::config::{OutputFormat, RecordingSettings};
use crate::encode::{locate_encoder, stream_command, EncodeParams};
use crate::error::{ReelcapError, Result};
use crate::finalize::{Captured, Finalizer};
use crate::sink::{ActiveSink, SinkOutput, StreamingSink};
use crate::stats::{CaptureCounters, RecordingStats};
use crate::timer::{FrameCallback, FrameTimer, TimerHandle, TimerReport, TimerResolution};
use crate::types::{CaptureRect, Frame, Handle, Status};

/// Notifications for whoever drives the session
#[derive(Debug, Clone)]
pub enum SessionEvent {
    StatusChanged(Status),
    /// Sent about once per second of recording, and once at stop
    Progress(RecordingStats),
    /// Something failed; the session may have degraded rather than stopped
    Error(String),
}

/// Pixel source wrapper that keeps the first frame for thumbnails
struct FirstFrameTap<S> {
    inner: S,
    slot: Arc<Mutex<Option<Frame>>>,
    taken: bool,
}

impl<S: PixelSource> PixelSource for FirstFrameTap<S> {
    fn capture(&mut self, rect: &CaptureRect) -> Result<Frame> {
        let frame = self.inner.capture(rect)?;
        if !self.taken {
            *self.slot.lock() = Some(frame.clone());
            self.taken = true;
        }
        Ok(frame)
    }
}

/// One screen recording
pub struct RecordingSession {
    handle: Handle,
    settings: RecordingSettings,
    status: Status,
    events: broadcast::Sender<SessionEvent>,
    counters: Arc<CaptureCounters>,
    clock: Option<SessionClock>,
    rect: Option<CaptureRect>,
    encoder: Option<PathBuf>,
    timer: Option<TimerHandle<ActiveSink>>,
    audio: Option<AudioCapture>,
    scratch: Option<TempDir>,
    captured: Option<Captured>,
    first_frame: Arc<Mutex<Option<Frame>>>,
    resolution: Option<TimerResolution>,
    report: Option<TimerReport>,
    recorded: Duration,
}

impl RecordingSession {
    pub fn new(settings: RecordingSettings) -> Result<Self> {
        settings.validate()?;
        let (events, _) = broadcast::channel(64);
        Ok(Self {
            handle: Handle::new(),
            settings,
            status: Status::Idle,
            events,
            counters: Arc::new(CaptureCounters::new()),
            clock: None,
            rect: None,
            encoder: None,
            timer: None,
            audio: None,
            scratch: None,
            captured: None,
            first_frame: Arc::new(Mutex::new(None)),
            resolution: None,
            report: None,
            recorded: Duration::ZERO,
        })
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn settings(&self) -> &RecordingSettings {
        &self.settings
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// Rectangle actually being captured (after even clamping)
    pub fn rect(&self) -> Option<CaptureRect> {
        self.rect
    }

    /// Encoder binary in use, if any
    pub fn encoder(&self) -> Option<&Path> {
        self.encoder.as_deref()
    }

    /// Whether loopback audio is being captured
    pub fn has_audio(&self) -> bool {
        self.audio.is_some() || self.captured.as_ref().is_some_and(|c| c.waveform.is_some())
    }

    /// Timer summary of the last stopped recording
    pub fn timer_report(&self) -> Option<TimerReport> {
        self.report
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Progress so far, or the final numbers once stopped
    pub fn stats(&self) -> RecordingStats {
        let elapsed = match (&self.clock, self.status.is_active()) {
            (Some(clock), true) => clock.elapsed(),
            _ => self.recorded,
        };
        self.counters
            .snapshot(elapsed, self.settings.format, self.settings.quality)
    }

    /// Record `rect` of the screen
    pub fn start(&mut self, rect: CaptureRect) -> Result<()> {
        let rect = rect.clamp_even()?;
        ScreenSource::validate(&rect)?;
        self.start_with_source(ScreenSource::new(self.settings.show_cursor), rect)
    }

    /// Record `rect` from any pixel source
    pub fn start_with_source<S: PixelSource + 'static>(&mut self, source: S, rect: CaptureRect) -> Result<()> {
        match self.status {
            Status::Idle => {}
            Status::Stopped => {
                if self.captured.take().is_some() {
                    warn!("Discarding unsaved recording from session {}", self.handle);
                }
                self.scratch = None;
            }
            Status::Recording | Status::Paused => return Err(ReelcapError::SessionAlreadyRunning),
            Status::Stopping => return Err(ReelcapError::invalid_state("session is stopping")),
        }

        let rect = rect.clamp_even()?;
        info!("Starting session {}: {} at {} fps as {}", self.handle, rect, self.settings.frame_rate, self.settings.format);

        self.counters.reset();
        *self.first_frame.lock() = None;
        self.report = None;
        self.recorded = Duration::ZERO;

        let scratch = tempfile::Builder::new().prefix("reelcap-").tempdir()?;
        debug!("Scratch directory {:?}", scratch.path());

        // Held paused until the timer starts, so device and encoder
        // start-up time is not counted as recorded time
        let clock = SessionClock::start();
        clock.pause();

        let needs_encoder = self.settings.format == OutputFormat::Mp4 || !self.settings.builtin_gif;
        self.encoder = if needs_encoder {
            locate_encoder(&self.settings.encoder)
        } else {
            None
        };

        self.audio = if self.settings.wants_audio() {
            match AudioCapture::start(scratch.path().join("audio.wav"), self.settings.audio_gain, clock.clone()) {
                Ok(audio) => Some(audio),
                Err(e) => {
                    warn!("Recording without audio: {}", e);
                    self.emit(SessionEvent::Error(format!("Audio unavailable, recording video only: {}", e)));
                    None
                }
            }
        } else {
            None
        };

        let sink = self.open_sink(&rect, scratch.path());

        self.resolution = Some(TimerResolution::acquire(1));
        let timer = FrameTimer::new(self.settings.frame_rate, clock.clone(), self.counters.clone());
        let source = FirstFrameTap {
            inner: source,
            slot: self.first_frame.clone(),
            taken: false,
        };
        let progress = self.progress_callback(clock.clone());

        clock.resume();
        let timer = match timer.spawn(source, sink, rect, Some(progress)) {
            Ok(timer) => timer,
            Err(e) => {
                if let Some(mut audio) = self.audio.take() {
                    audio.stop(self.settings.shutdown_timeout());
                }
                self.resolution = None;
                return Err(e);
            }
        };

        self.timer = Some(timer);
        self.clock = Some(clock);
        self.rect = Some(rect);
        self.scratch = Some(scratch);
        self.set_status(Status::Recording);
        Ok(())
    }

    /// Streaming sink when an encoder is usable, buffering otherwise
    fn open_sink(&self, rect: &CaptureRect, scratch: &Path) -> ActiveSink {
        let Some(encoder) = self.encoder.as_ref() else {
            info!("Buffering frames in memory");
            return ActiveSink::buffering();
        };

        let params = EncodeParams::new(rect.width, rect.height, self.settings.frame_rate, self.settings.quality);
        let output = scratch.join("capture.mp4");
        let log = File::create(scratch.join("encoder.log"))
            .map_err(|e| debug!("No encoder log: {}", e))
            .ok();

        match StreamingSink::spawn(stream_command(encoder, &params, &output, log), &output) {
            Ok(sink) => ActiveSink::streaming(sink),
            Err(e) => {
                warn!("Encoder failed to start, buffering frames in memory: {}", e);
                self.emit(SessionEvent::Error(format!("Encoder failed to start: {}", e)));
                ActiveSink::buffering()
            }
        }
    }

    fn progress_callback(&self, clock: SessionClock) -> FrameCallback {
        let events = self.events.clone();
        let counters = self.counters.clone();
        let format = self.settings.format;
        let quality = self.settings.quality;
        let every = self.settings.frame_rate.max(1) as u64;

        Box::new(move |frames| {
            if frames % every == 0 {
                let stats = counters.snapshot(clock.elapsed(), format, quality);
                let _ = events.send(SessionEvent::Progress(stats));
            }
        })
    }

    pub fn pause(&mut self) -> Result<()> {
        if self.status != Status::Recording {
            return Err(ReelcapError::invalid_state(format!("cannot pause while {}", self.status)));
        }
        if let Some(clock) = &self.clock {
            clock.pause();
        }
        info!("Session {} paused", self.handle);
        self.set_status(Status::Paused);
        Ok(())
    }

    pub fn resume(&mut self) -> Result<()> {
        if self.status != Status::Paused {
            return Err(ReelcapError::invalid_state(format!("cannot resume while {}", self.status)));
        }
        if let Some(clock) = &self.clock {
            clock.resume();
        }
        info!("Session {} resumed", self.handle);
        self.set_status(Status::Recording);
        Ok(())
    }

    /// Pause if recording, resume if paused. Returns the new status.
    pub fn toggle_pause(&mut self) -> Result<Status> {
        match self.status {
            Status::Recording => self.pause()?,
            Status::Paused => self.resume()?,
            _ => return Err(ReelcapError::NoActiveSession),
        }
        Ok(self.status)
    }

    /// Stop capturing: timer, then sink drain, then audio
    pub async fn stop(&mut self) -> Result<()> {
        match self.status {
            Status::Recording | Status::Paused => {}
            Status::Stopped => return Ok(()),
            _ => return Err(ReelcapError::NoActiveSession),
        }

        if let Some(clock) = &self.clock {
            self.recorded = clock.elapsed();
        }
        self.set_status(Status::Stopping);
        info!("Stopping session {}", self.handle);

        let timeout = self.settings.shutdown_timeout();
        let timer = self.timer.take();
        let audio = self.audio.take();

        let joined = tokio::task::spawn_blocking(move || shut_down(timer, audio, timeout))
            .await
            .map_err(|e| ReelcapError::invalid_state(format!("shutdown task failed: {}", e)));

        self.resolution = None;
        let result = match joined {
            Ok((Ok((output, report)), waveform)) => {
                info!(
                    "Session {} stopped: {} frames, {} dropped, {:?} recorded",
                    self.handle, report.frames, report.dropped, self.recorded
                );
                self.report = Some(report);
                self.captured = Some(Captured::new(output, waveform));
                Ok(())
            }
            Ok((Err(e), _)) | Err(e) => {
                error!("Session {} stop failed: {}", self.handle, e);
                self.emit(SessionEvent::Error(e.to_string()));
                Err(e)
            }
        };

        self.set_status(Status::Stopped);
        self.emit(SessionEvent::Progress(self.stats()));
        result
    }

    /// Write the recording to `output`, stopping first if needed.
    ///
    /// Returns the path written, which is a `.gif` beside `output` when an
    /// MP4 could not be encoded.
    pub async fn save(&mut self, output: impl AsRef<Path>) -> Result<PathBuf> {
        if self.status.is_active() {
            self.stop().await?;
        }
        let captured = self.captured.take().ok_or(ReelcapError::NoActiveSession)?;
        let scratch = self
            .scratch
            .take()
            .ok_or_else(|| ReelcapError::invalid_state("scratch directory missing"))?;

        let finalizer = Finalizer::new(&self.settings, self.encoder.clone(), scratch.path());
        let output = output.as_ref().to_path_buf();
        info!("Saving session {} to {:?}", self.handle, output);

        let result = tokio::task::spawn_blocking(move || {
            let result = finalizer.finalize(&captured, &output);
            if let Err(e) = scratch.close() {
                debug!("Scratch cleanup failed: {}", e);
            }
            result
        })
        .await
        .map_err(|e| ReelcapError::invalid_state(format!("save task failed: {}", e)))
        .and_then(|r| r);

        match &result {
            Ok(path) => info!("Session {} saved to {:?}", self.handle, path),
            Err(e) => self.emit(SessionEvent::Error(e.to_string())),
        }
        result
    }

    /// First captured frame as RGB, at most `max_width` wide
    pub fn thumbnail(&self, max_width: u32) -> Option<RgbImage> {
        let slot = self.first_frame.lock();
        let frame = slot.as_ref()?;
        let rgb: Vec<u8> = frame.data.chunks_exact(3).flat_map(|px| [px[2], px[1], px[0]]).collect();
        let image = RgbImage::from_raw(frame.width, frame.height, rgb)?;

        if max_width == 0 || frame.width <= max_width {
            return Some(image);
        }
        let height = ((frame.height as u64 * max_width as u64) / frame.width as u64).max(1) as u32;
        Some(imageops::resize(&image, max_width, height, FilterType::Triangle))
    }

    fn set_status(&mut self, status: Status) {
        if self.status != status {
            debug!("Session {}: {} -> {}", self.handle, self.status, status);
            self.status = status;
            self.emit(SessionEvent::StatusChanged(status));
        }
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            debug!("Session {} dropped while recording", self.handle);
            timer.cancel();
        }
    }
}

type ShutDown = (Result<(SinkOutput, TimerReport)>, Option<Waveform>);

/// Blocking half of stop. Audio is stopped even if the timer thread died.
fn shut_down(timer: Option<TimerHandle<ActiveSink>>, audio: Option<AudioCapture>, timeout: Duration) -> ShutDown {
    let sink = match timer {
        Some(timer) => timer.join().map(|(sink, report)| {
            debug!("Timer joined, {} frames queued for the encoder", sink.queued());
            (sink.finish(timeout), report)
        }),
        None => Err(ReelcapError::invalid_state("no frame timer running")),
    };
    let waveform = audio.and_then(|mut audio| audio.stop(timeout));
    (sink, waveform)
}
