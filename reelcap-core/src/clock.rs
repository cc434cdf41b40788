//! Pause-aware session clock
//!
//! One clock is shared by the frame timer and the audio writer. Both measure
//! "recorded time" through it, so a pause shifts both references by exactly
//! the same amount.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared recording clock.
///
/// Cloning is cheap; every clone observes the same pause state.
#[derive(Debug, Clone)]
pub struct SessionClock {
    inner: Arc<ClockInner>,
}

#[derive(Debug)]
struct ClockInner {
    /// Wall-clock origin of the recording
    origin: Instant,
    /// Pause history, read and updated under one lock so readers never see
    /// a pause that has ended but not yet been accounted for
    pauses: Mutex<PauseLog>,
}

#[derive(Debug, Default)]
struct PauseLog {
    /// Completed pauses as (start, end)
    completed: Vec<(Instant, Instant)>,
    /// Start of the pause in progress
    current: Option<Instant>,
}

impl PauseLog {
    /// Paused time before `at`, counting only the parts of each pause that
    /// precede it
    fn paused_before(&self, at: Instant) -> Duration {
        let closed: Duration = self
            .completed
            .iter()
            .filter(|(start, _)| *start < at)
            .map(|(start, end)| (*end).min(at).saturating_duration_since(*start))
            .sum();
        let open = self
            .current
            .map(|start| at.saturating_duration_since(start))
            .unwrap_or_default();
        closed + open
    }

    fn covers(&self, at: Instant) -> bool {
        self.current.is_some_and(|start| start <= at)
            || self
                .completed
                .iter()
                .any(|(start, end)| *start <= at && at < *end)
    }
}

impl SessionClock {
    /// Start a clock at the current instant
    pub fn start() -> Self {
        Self::starting_at(Instant::now())
    }

    /// Start a clock at a given origin
    pub fn starting_at(origin: Instant) -> Self {
        Self {
            inner: Arc::new(ClockInner {
                origin,
                pauses: Mutex::new(PauseLog::default()),
            }),
        }
    }

    pub fn origin(&self) -> Instant {
        self.inner.origin
    }

    /// Freeze recorded time. Returns false if already paused.
    pub fn pause(&self) -> bool {
        let mut log = self.inner.pauses.lock();
        if log.current.is_some() {
            return false;
        }
        log.current = Some(Instant::now());
        true
    }

    /// Continue recorded time. Returns false if not paused.
    pub fn resume(&self) -> bool {
        let mut log = self.inner.pauses.lock();
        match log.current.take() {
            Some(start) => {
                let end = Instant::now().max(start);
                log.completed.push((start, end));
                true
            }
            None => false,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.inner.pauses.lock().current.is_some()
    }

    /// Whether `at` fell inside a pause, past or current
    pub fn was_paused_at(&self, at: Instant) -> bool {
        self.inner.pauses.lock().covers(at)
    }

    /// Total time spent paused so far, including a pause in progress
    pub fn paused_total(&self) -> Duration {
        self.inner.pauses.lock().paused_before(Instant::now())
    }

    /// Recorded time at `at`, excluding pauses that began before it
    pub fn elapsed_at(&self, at: Instant) -> Duration {
        let offset = at.saturating_duration_since(self.inner.origin);
        let paused = self.inner.pauses.lock().paused_before(at);
        offset.saturating_sub(paused)
    }

    /// Recorded time now, excluding pauses
    pub fn elapsed(&self) -> Duration {
        let log = self.inner.pauses.lock();
        let now = Instant::now();
        now.saturating_duration_since(self.inner.origin)
            .saturating_sub(log.paused_before(now))
    }
}
