//! Streaming sink against stand-in encoder processes

#![cfg(unix)]

mod mocks;

use mocks::{create_test_frame, SolidSource};
use reelcap_core::clock::SessionClock;
use reelcap_core::sink::{ActiveSink, FrameSink, StreamingSink};
use reelcap_core::stats::CaptureCounters;
use reelcap_core::timer::FrameTimer;
use reelcap_core::types::CaptureRect;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Shell command that copies stdin to `output`, like an encoder would
fn cat_into(output: &Path) -> Command {
    let mut command = Command::new("sh");
    command.arg("-c").arg(format!("cat > '{}'", output.display()));
    command
}

/// Encoder that never reads its input
fn stalled_encoder() -> Command {
    let mut command = Command::new("sleep");
    command.arg("30");
    command
}

fn wait_for(mut condition: impl FnMut() -> bool, limit: Duration) -> bool {
    let started = Instant::now();
    while started.elapsed() < limit {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

#[test]
fn test_frames_reach_the_encoder_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("capture.raw");
    let mut sink = StreamingSink::spawn(cat_into(&output), &output).unwrap();

    for i in 0..10u8 {
        sink.push(create_test_frame(32, 32, [i, i, i])).unwrap();
    }
    let video = sink.finish(Duration::from_secs(5));

    assert!(video.exit_ok);
    assert!(!video.killed);
    assert_eq!(video.frames_written, 10);
    assert!(video.is_valid());

    let bytes = std::fs::read(&output).unwrap();
    assert_eq!(bytes.len(), 10 * 32 * 32 * 3);
    for (i, frame) in bytes.chunks_exact(32 * 32 * 3).enumerate() {
        assert!(frame.iter().all(|&b| b == i as u8));
    }
}

#[test]
fn test_push_never_blocks_on_a_stalled_encoder() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("never.mp4");
    let mut sink = StreamingSink::spawn(stalled_encoder(), &output).unwrap();

    // Far more than a pipe buffer holds
    let started = Instant::now();
    for _ in 0..40 {
        sink.push(create_test_frame(256, 256, [7, 7, 7])).unwrap();
    }
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(sink.queued() > 0);

    let started = Instant::now();
    let video = sink.finish(Duration::from_millis(500));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(video.killed);
    assert!(!video.exit_ok);
    assert!(!video.is_valid());
}

#[test]
fn test_encoder_that_exits_early_is_unhealthy() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("missing.mp4");
    let mut sink = StreamingSink::spawn(Command::new("true"), &output).unwrap();

    assert!(wait_for(
        || {
            let _ = sink.push(create_test_frame(64, 64, [1, 1, 1]));
            !sink.is_healthy()
        },
        Duration::from_secs(5)
    ));

    let video = sink.finish(Duration::from_secs(2));
    assert!(!video.is_valid());
}

#[test]
fn test_active_sink_buffers_after_encoder_failure() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("missing.mp4");
    let stream = StreamingSink::spawn(Command::new("true"), &output).unwrap();
    let mut sink = ActiveSink::streaming(stream);

    assert!(wait_for(
        || {
            sink.push(create_test_frame(64, 64, [2, 2, 2]), 33);
            !sink.is_streaming()
        },
        Duration::from_secs(5)
    ));

    for _ in 0..3 {
        sink.push(create_test_frame(64, 64, [3, 3, 3]), 33);
    }

    let accepted = sink.frames_accepted();
    let result = sink.finish(Duration::from_secs(2));
    assert!(result.frames.len() >= 3);
    assert!(result.frames.len() as u64 <= accepted);
    assert!(result.video.is_some_and(|v| !v.is_valid()));
}

#[test]
fn test_missing_program_is_an_encoder_error() {
    let result = StreamingSink::spawn(Command::new("/nonexistent/reelcap-encoder"), "/tmp/out.mp4");
    assert!(matches!(result, Err(reelcap_core::ReelcapError::Encoder(_))));
}

#[test]
fn test_killed_encoder_returns_its_backlog_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("never.mp4");
    let mut sink = StreamingSink::spawn(stalled_encoder(), &output).unwrap();

    for i in 0..20u8 {
        sink.push(create_test_frame(256, 256, [i, i, i])).unwrap();
    }
    let (video, backlog) = sink.finish_with_backlog(Duration::from_millis(300));

    assert!(video.killed);
    // At most the frame stuck in the pipe write is lost
    assert!(backlog.len() >= 19, "{} frames recovered", backlog.len());
    let first = 20 - backlog.len() as u8;
    for (offset, frame) in backlog.iter().enumerate() {
        assert!(frame.data.iter().all(|&b| b == first + offset as u8));
    }
}

#[test]
fn test_stalled_encoder_does_not_slow_capture() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("never.mp4");
    let stream = StreamingSink::spawn(stalled_encoder(), &output).unwrap();
    let counters = Arc::new(CaptureCounters::new());
    let timer = FrameTimer::new(20, SessionClock::start(), counters.clone());

    let started = Instant::now();
    let handle = timer
        .spawn(
            SolidSource::new([9, 9, 9]),
            ActiveSink::streaming(stream),
            CaptureRect::new(0, 0, 256, 256),
            None,
        )
        .unwrap();
    thread::sleep(Duration::from_millis(1000));
    let (sink, report) = handle.join().unwrap();
    let elapsed = started.elapsed();

    let expected = elapsed.as_secs_f64() * 20.0;
    assert!(
        (report.frames as f64 - expected).abs() <= 2.0,
        "{} frames in {:?} with a stalled encoder, expected about {:.1}",
        report.frames,
        elapsed,
        expected
    );
    assert_eq!(report.dropped, 0);
    assert!(sink.is_streaming());
    assert!(sink.queued() > 0);

    // Killing the encoder hands the queued frames back for a fallback
    let result = sink.finish(Duration::from_millis(300));
    assert!(result.video.as_ref().is_some_and(|v| v.killed));
    assert!(result.frames.len() as u64 + 1 >= report.frames);
    assert!(result.frames.len() as u64 <= report.frames);
    assert!(result.frames.delays_ms().iter().all(|&d| d == 50));
}
