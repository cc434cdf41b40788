//! Integration tests for error handling

use reelcap_core::error::{ReelcapError, ResultExt};

#[test]
fn test_error_context_chaining() {
    let base_error = ReelcapError::encoder("ffmpeg exited with status 1");
    let with_context = base_error.with_context("Failed to mux audio");

    let msg = format!("{}", with_context);
    assert!(msg.contains("Failed to mux audio"));
    assert!(msg.contains("ffmpeg exited with status 1"));
}

#[test]
fn test_error_context_preserves_hint() {
    let base_error = ReelcapError::audio("no loopback device");
    let hint_before = base_error.user_hint();

    let with_context = base_error.with_context("Starting session");
    let hint_after = with_context.user_hint();

    assert_eq!(hint_before, hint_after);
    assert!(matches!(with_context.root(), ReelcapError::Audio(_)));
}

#[test]
fn test_result_ext_context() {
    let result: Result<(), ReelcapError> = Err(ReelcapError::capture("monitor disconnected"));
    let with_context = result.context("Capturing frame");

    let err = with_context.unwrap_err();
    let msg = format!("{}", err);
    assert!(msg.contains("Capturing frame"));
    assert!(msg.contains("monitor disconnected"));
}

#[test]
fn test_user_hints() {
    let err = ReelcapError::encoder("test");
    assert!(err.user_hint().unwrap().contains("ffmpeg"));

    let err = ReelcapError::config("test");
    assert!(err.user_hint().unwrap().contains("config.toml"));

    let err = ReelcapError::InvalidRegion("0x0".to_string());
    assert!(err.user_hint().unwrap().contains("2x2"));

    assert!(ReelcapError::NoActiveSession.user_hint().is_none());
}

#[test]
fn test_user_recoverable() {
    assert!(ReelcapError::audio("test").is_user_recoverable());
    assert!(ReelcapError::config("test").is_user_recoverable());
    assert!(ReelcapError::InvalidRegion("test".to_string()).is_user_recoverable());
    assert!(ReelcapError::NoActiveSession.is_user_recoverable());
    assert!(ReelcapError::SessionAlreadyRunning.is_user_recoverable());

    assert!(!ReelcapError::encoder("test").is_user_recoverable());
    assert!(!ReelcapError::gif("test").is_user_recoverable());
    assert!(!ReelcapError::NoArtifact("test".to_string()).is_user_recoverable());
}

#[test]
fn test_error_display_format() {
    let err = ReelcapError::capture("display closed");
    assert_eq!(format!("{}", err), "Capture error: display closed");

    let err = ReelcapError::encoder("pipe broken");
    assert_eq!(format!("{}", err), "Encoder error: pipe broken");

    let err = ReelcapError::NoActiveSession;
    assert_eq!(format!("{}", err), "No active recording session");

    let err = ReelcapError::SessionAlreadyRunning;
    assert_eq!(format!("{}", err), "Recording session already running");
}

#[test]
fn test_nested_context() {
    let err = ReelcapError::gif("no frames to encode")
        .with_context("Writing fallback GIF")
        .with_context("Saving recording");

    let msg = format!("{}", err);
    assert!(msg.contains("Saving recording"));
    assert!(matches!(err.root(), ReelcapError::Gif(_)));
}

#[test]
fn test_io_error_conversion() {
    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
    let err: ReelcapError = io_err.into();

    let msg = format!("{}", err);
    assert!(msg.contains("I/O error"));
    assert!(msg.contains("File not found"));
}

#[test]
fn test_image_error_conversion() {
    let result = image::load_from_memory(b"not an image");
    let err: ReelcapError = result.unwrap_err().into();
    assert!(matches!(err, ReelcapError::Capture(_)));
    assert!(err.to_string().contains("Image error"));
}
