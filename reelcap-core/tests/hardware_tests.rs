//! Tests against a real display, audio device or ffmpeg binary.
//!
//! Run with `cargo test -- --ignored` on a desktop session.

mod mocks;

use mocks::GradientSource;
use reelcap_core::capture::{list_monitors, primary_monitor, AudioCapture, PixelSource, ScreenSource};
use reelcap_core::clock::SessionClock;
use reelcap_core::config::EncoderChoice;
use reelcap_core::encode::locate_encoder;
use reelcap_core::types::CaptureRect;
use reelcap_core::{OutputFormat, RecordingSession, RecordingSettings};
use std::time::Duration;

#[test]
#[ignore = "needs a display"]
fn test_screen_capture_primary_monitor() {
    let monitors = list_monitors().unwrap();
    assert!(!monitors.is_empty());

    let monitor = primary_monitor().unwrap();
    let rect = CaptureRect::new(monitor.x, monitor.y, 64, 48);
    ScreenSource::validate(&rect).unwrap();

    let frame = ScreenSource::new(true).capture(&rect).unwrap();
    assert_eq!((frame.width, frame.height), (64, 48));
    assert_eq!(frame.len(), rect.frame_len());
}

#[test]
#[ignore = "needs a display"]
fn test_region_past_monitor_edge_is_rejected() {
    let monitor = primary_monitor().unwrap();
    let rect = CaptureRect::new(monitor.x, monitor.y, monitor.width + 64, monitor.height);
    assert!(ScreenSource::validate(&rect).is_err());
}

#[test]
#[ignore = "needs a loopback audio device"]
fn test_loopback_capture_writes_waveform() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audio.wav");
    let mut audio = AudioCapture::start(&path, 1.0, SessionClock::start()).unwrap();

    std::thread::sleep(Duration::from_millis(1500));
    let waveform = audio.stop(Duration::from_secs(5)).unwrap();

    // Silence insertion keeps the waveform in step with wall time even
    // when nothing is playing
    assert!(waveform.duration() >= Duration::from_millis(1000));
    assert!(waveform.is_substantial());
    assert!(hound::WavReader::open(&path).is_ok());
}

#[tokio::test]
#[ignore = "needs ffmpeg"]
async fn test_mp4_through_ffmpeg() {
    assert!(locate_encoder(&EncoderChoice::Auto).is_some());
    let dir = tempfile::tempdir().unwrap();

    let settings = RecordingSettings::mp4().with_frame_rate(30).with_audio(false);
    let mut session = RecordingSession::new(settings).unwrap();
    session
        .start_with_source(GradientSource::new(), CaptureRect::new(0, 0, 320, 240))
        .unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    let output = dir.path().join("clip.mp4");
    let saved = session.save(&output).await.unwrap();
    assert_eq!(saved, output);
    assert!(std::fs::metadata(&saved).unwrap().len() > 1024);
}

#[tokio::test]
#[ignore = "needs ffmpeg"]
async fn test_two_pass_gif_through_ffmpeg() {
    let dir = tempfile::tempdir().unwrap();

    let settings = RecordingSettings::gif().with_frame_rate(15);
    assert_eq!(settings.format, OutputFormat::Gif);
    let mut session = RecordingSession::new(settings).unwrap();
    session
        .start_with_source(GradientSource::new(), CaptureRect::new(0, 0, 160, 120))
        .unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    let output = dir.path().join("clip.gif");
    let saved = session.save(&output).await.unwrap();
    let bytes = std::fs::read(&saved).unwrap();
    assert_eq!(&bytes[..6], b"GIF89a");
}
