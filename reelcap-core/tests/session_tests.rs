//! Recording sessions end to end, with stand-in pixel sources

mod mocks;

use image::codecs::gif::GifDecoder;
use image::AnimationDecoder;
use mocks::{FlakySource, GradientSource, SolidSource};
use reelcap_core::config::EncoderChoice;
use reelcap_core::types::CaptureRect;
use reelcap_core::{OutputFormat, RecordingSession, RecordingSettings, ReelcapError, SessionEvent, Status};
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok, block_on};

fn gif_frame_count(path: &Path) -> usize {
    let file = BufReader::new(std::fs::File::open(path).unwrap());
    GifDecoder::new(file)
        .unwrap()
        .into_frames()
        .collect_frames()
        .unwrap()
        .len()
}

fn builtin_gif_settings(fps: u32) -> RecordingSettings {
    RecordingSettings::gif()
        .with_frame_rate(fps)
        .with_builtin_gif(true)
        .with_encoder(EncoderChoice::Disabled)
}

#[test]
fn test_mp4_without_encoder_saves_a_gif() {
    block_on(async {
        let dir = tempfile::tempdir().unwrap();
        let settings = RecordingSettings::mp4()
            .with_frame_rate(20)
            .with_audio(false)
            .with_encoder(EncoderChoice::Path("/nonexistent/ffmpeg".into()));
        let mut session = RecordingSession::new(settings).unwrap();

        assert_ok!(session.start_with_source(SolidSource::new([0, 128, 255]), CaptureRect::new(0, 0, 32, 24)));
        assert!(session.encoder().is_none());
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_ok!(session.stop().await);

        let frames = session.timer_report().unwrap().frames;
        assert!(frames > 0);

        let requested = dir.path().join("clip.mp4");
        let saved = assert_ok!(session.save(&requested).await);
        assert_eq!(saved, dir.path().join("clip.gif"));
        assert!(!requested.exists());
        assert_eq!(gif_frame_count(&saved) as u64, frames);
    });
}

#[test]
fn test_save_stops_a_running_session() {
    block_on(async {
        let dir = tempfile::tempdir().unwrap();
        let mut session = RecordingSession::new(builtin_gif_settings(15)).unwrap();

        assert_ok!(session.start_with_source(GradientSource::new(), CaptureRect::new(0, 0, 48, 32)));
        tokio::time::sleep(Duration::from_millis(300)).await;

        let output = dir.path().join("nested").join("anim.gif");
        let saved = assert_ok!(session.save(&output).await);
        assert_eq!(saved, output);
        assert_eq!(session.status(), Status::Stopped);
        assert!(gif_frame_count(&saved) > 0);

        // Nothing left to save
        assert!(matches!(session.save(&output).await, Err(ReelcapError::NoActiveSession)));
    });
}

#[test]
fn test_paused_time_is_not_recorded() {
    block_on(async {
        let mut session = RecordingSession::new(builtin_gif_settings(20)).unwrap();
        assert_ok!(session.start_with_source(SolidSource::new([1, 1, 1]), CaptureRect::new(0, 0, 16, 16)));

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_ok!(session.pause());
        let paused_at = session.stats().frame_count;
        tokio::time::sleep(Duration::from_millis(500)).await;
        // At most one capture was already in flight when the pause landed
        assert!(session.stats().frame_count <= paused_at + 1);
        assert_ok!(session.resume());
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_ok!(session.stop().await);

        let stats = session.stats();
        assert!(stats.duration < Duration::from_millis(800), "recorded {:?}", stats.duration);
        assert!(stats.duration >= Duration::from_millis(400), "recorded {:?}", stats.duration);
        let expected = stats.duration.as_secs_f64() * 20.0;
        assert!((stats.frame_count as f64 - expected).abs() <= 3.0);
    });
}

#[test]
fn test_progress_events_while_recording() {
    block_on(async {
        let mut session = RecordingSession::new(builtin_gif_settings(20)).unwrap();
        let mut events = session.subscribe();

        assert_ok!(session.start_with_source(SolidSource::new([9, 9, 9]), CaptureRect::new(0, 0, 16, 16)));
        tokio::time::sleep(Duration::from_millis(1300)).await;
        assert_ok!(session.stop().await);

        let mut progress = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let SessionEvent::Progress(stats) = event {
                progress.push(stats);
            }
        }
        // One at frame 20, one at stop
        assert!(progress.len() >= 2);
        assert_eq!(progress.first().unwrap().frame_count, 20);
        assert_eq!(progress.last().unwrap(), &session.stats());
    });
}

#[test]
fn test_failed_captures_show_up_as_dropped() {
    block_on(async {
        let mut session = RecordingSession::new(builtin_gif_settings(30)).unwrap();
        assert_ok!(session.start_with_source(FlakySource::new(2), CaptureRect::new(0, 0, 16, 16)));
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_ok!(session.stop().await);

        let stats = session.stats();
        assert!(stats.frames_dropped > 0);
        let report = session.timer_report().unwrap();
        assert_eq!(report.dropped, stats.frames_dropped);
        assert_eq!(report.frames, stats.frame_count);
    });
}

#[test]
fn test_restart_after_stop_discards_unsaved_capture() {
    block_on(async {
        let dir = tempfile::tempdir().unwrap();
        let mut session = RecordingSession::new(builtin_gif_settings(20)).unwrap();

        assert_ok!(session.start_with_source(SolidSource::new([1, 2, 3]), CaptureRect::new(0, 0, 16, 16)));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_ok!(session.stop().await);

        assert_ok!(session.start_with_source(SolidSource::new([4, 5, 6]), CaptureRect::new(0, 0, 24, 24)));
        assert_eq!(session.status(), Status::Recording);
        tokio::time::sleep(Duration::from_millis(200)).await;
        let saved = assert_ok!(session.save(dir.path().join("second.gif")).await);

        let first = session.thumbnail(0).unwrap();
        assert_eq!(first.dimensions(), (24, 24));
        assert_eq!(first.get_pixel(0, 0).0, [6, 5, 4]);
        assert!(saved.is_file());
    });
}

#[test]
fn test_zero_sized_region_is_rejected() {
    let mut session = RecordingSession::new(builtin_gif_settings(10)).unwrap();
    assert_err!(session.start_with_source(SolidSource::new([0, 0, 0]), CaptureRect::new(0, 0, 1, 1)));
    assert_eq!(session.status(), Status::Idle);
    assert_eq!(session.settings().format, OutputFormat::Gif);
}
