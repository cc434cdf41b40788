//! Frame timer
//!
//! Paces capture at a fixed interval on a dedicated thread. When capture or
//! the sink falls behind, the schedule resets to "now": late frames are
//! skipped rather than captured back-to-back to catch up.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

use crate::capture::PixelSource;
use crate::clock::SessionClock;
use crate::error::{ReelcapError, Result};
use crate::sink::FrameSink;
use crate::stats::CaptureCounters;
use crate::types::CaptureRect;

/// Below this much slack the timer spins instead of sleeping
pub const SPIN_THRESHOLD: Duration = Duration::from_millis(2);

/// Longest single sleep, so cancellation is noticed promptly
const MAX_SLEEP: Duration = Duration::from_millis(50);

/// Poll interval while paused
const PAUSE_POLL: Duration = Duration::from_millis(10);

/// Called after each captured frame with the running frame count
pub type FrameCallback = Box<dyn FnMut(u64) + Send>;

/// What one run of the timer did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimerReport {
    pub frames: u64,
    pub dropped: u64,
    /// Ticks where the schedule had already passed and was reset
    pub late_ticks: u64,
}

/// Fixed-rate capture loop
pub struct FrameTimer {
    interval: Duration,
    delay_ms: u32,
    clock: SessionClock,
    counters: Arc<CaptureCounters>,
    cancel: Arc<AtomicBool>,
}

impl FrameTimer {
    pub fn new(frame_rate: u32, clock: SessionClock, counters: Arc<CaptureCounters>) -> Self {
        let frame_rate = frame_rate.max(1);
        Self {
            interval: Duration::from_nanos(1_000_000_000 / frame_rate as u64),
            delay_ms: (1000 / frame_rate).max(1),
            clock,
            counters,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Flag that stops the loop at its next tick
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// Run on the current thread until cancelled
    pub fn run<S, K>(
        &self,
        source: &mut S,
        sink: &mut K,
        rect: &CaptureRect,
        mut on_frame: Option<&mut FrameCallback>,
    ) -> TimerReport
    where
        S: PixelSource + ?Sized,
        K: FrameSink + ?Sized,
    {
        let mut report = TimerReport::default();
        let mut next_due = Instant::now();

        while !self.cancel.load(Ordering::Acquire) {
            if self.clock.is_paused() {
                std::thread::sleep(PAUSE_POLL);
                next_due = Instant::now();
                continue;
            }

            match source.capture(rect) {
                Ok(frame) => {
                    let len = frame.len();
                    sink.push(frame, self.delay_ms);
                    self.counters.record_frame(len);
                    report.frames += 1;
                    if let Some(callback) = on_frame.as_mut() {
                        callback(report.frames);
                    }
                }
                Err(e) => {
                    self.counters.record_drop();
                    report.dropped += 1;
                    if report.dropped == 1 || report.dropped % 100 == 0 {
                        warn!("Frame capture failed ({} dropped so far): {}", report.dropped, e);
                    } else {
                        debug!("Frame capture failed: {}", e);
                    }
                }
            }

            next_due += self.interval;
            let now = Instant::now();
            if next_due <= now {
                report.late_ticks += 1;
                trace!("Frame timer behind by {:?}, skipping", now - next_due);
                next_due = now;
                continue;
            }

            wait_until(next_due, &self.cancel);
        }

        report
    }

    /// Run on a dedicated thread. The thread owns the source and sink and
    /// hands the sink back on join.
    pub fn spawn<S, K>(
        self,
        mut source: S,
        mut sink: K,
        rect: CaptureRect,
        mut on_frame: Option<FrameCallback>,
    ) -> Result<TimerHandle<K>>
    where
        S: PixelSource + 'static,
        K: FrameSink + 'static,
    {
        let cancel = self.cancel.clone();
        let thread = std::thread::Builder::new()
            .name("reelcap-timer".to_string())
            .spawn(move || {
                info!("Frame timer started: {} every {:?}", rect, self.interval);
                let report = self.run(&mut source, &mut sink, &rect, on_frame.as_mut());
                info!(
                    "Frame timer stopped: {} frames, {} dropped, {} late ticks",
                    report.frames, report.dropped, report.late_ticks
                );
                (sink, report)
            })
            .map_err(|e| ReelcapError::capture(format!("Failed to spawn timer thread: {}", e)))?;

        Ok(TimerHandle {
            cancel,
            thread: Some(thread),
        })
    }
}

/// Handle to a running timer thread
pub struct TimerHandle<K> {
    cancel: Arc<AtomicBool>,
    thread: Option<JoinHandle<(K, TimerReport)>>,
}

impl<K> TimerHandle<K> {
    /// Ask the loop to stop at its next tick
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map(|t| t.is_finished()).unwrap_or(true)
    }

    /// Cancel and wait for the thread, returning the sink it owned
    pub fn join(mut self) -> Result<(K, TimerReport)> {
        self.cancel();
        let thread = self
            .thread
            .take()
            .ok_or_else(|| ReelcapError::invalid_state("timer already joined"))?;
        thread
            .join()
            .map_err(|_| ReelcapError::capture("frame timer thread panicked"))
    }
}

impl<K> Drop for TimerHandle<K> {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Coarse sleep down to the spin threshold, then spin to the deadline
fn wait_until(deadline: Instant, cancel: &AtomicBool) {
    loop {
        let now = Instant::now();
        if now >= deadline || cancel.load(Ordering::Acquire) {
            return;
        }
        let remaining = deadline - now;
        if remaining > SPIN_THRESHOLD {
            std::thread::sleep((remaining - SPIN_THRESHOLD).min(MAX_SLEEP));
        } else {
            std::hint::spin_loop();
        }
    }
}

/// Process-wide 1ms scheduler resolution while held.
///
/// Windows rounds sleeps up to the system timer period (15.6ms by default),
/// which is coarser than a 30fps frame budget. Elsewhere this is a no-op.
#[derive(Debug)]
pub struct TimerResolution {
    period_ms: u32,
    active: bool,
}

impl TimerResolution {
    pub fn acquire(period_ms: u32) -> Self {
        let active = request_period(period_ms);
        if active {
            debug!("Timer resolution set to {}ms", period_ms);
        }
        Self { period_ms, active }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl Drop for TimerResolution {
    fn drop(&mut self) {
        if self.active {
            release_period(self.period_ms);
            debug!("Timer resolution released");
        }
    }
}

#[cfg(windows)]
fn request_period(period_ms: u32) -> bool {
    // SAFETY: plain Win32 call, balanced by timeEndPeriod in Drop
    unsafe { windows::Win32::Media::timeBeginPeriod(period_ms) == 0 }
}

#[cfg(windows)]
fn release_period(period_ms: u32) {
    // SAFETY: matches the successful timeBeginPeriod above
    unsafe {
        windows::Win32::Media::timeEndPeriod(period_ms);
    }
}

#[cfg(not(windows))]
fn request_period(_period_ms: u32) -> bool {
    false
}

#[cfg(not(windows))]
fn release_period(_period_ms: u32) {}
