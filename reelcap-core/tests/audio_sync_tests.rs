//! Waveform writer keeps audio aligned with recorded time

use reelcap_core::capture::audio::{silence_threshold_bytes, WaveformWriter};
use reelcap_core::clock::SessionClock;
use reelcap_core::types::{AudioChunk, AudioFormat};
use std::thread;
use std::time::{Duration, Instant};

const FORMAT: AudioFormat = AudioFormat {
    sample_rate: 48000,
    channels: 2,
};

/// 10ms of interleaved stereo at a constant level
fn chunk(level: f32, arrived: Instant) -> AudioChunk {
    AudioChunk::new(vec![level; 960], arrived)
}

fn read_samples(path: &std::path::Path) -> Vec<i16> {
    let mut reader = hound::WavReader::open(path).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.channels, 2);
    assert_eq!(spec.sample_rate, 48000);
    assert_eq!(spec.bits_per_sample, 16);
    reader.samples::<i16>().map(|s| s.unwrap()).collect()
}

#[test]
fn test_late_first_chunk_is_preceded_by_silence() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audio.wav");
    let origin = Instant::now();
    let clock = SessionClock::starting_at(origin);

    let mut writer = WaveformWriter::create(&path, FORMAT, 1.0, clock).unwrap();
    writer.write_chunk(&chunk(0.5, origin + Duration::from_secs(2))).unwrap();
    let (bytes, silence) = writer.finalize().unwrap();

    // Two seconds of stereo 16-bit, the chunk included
    assert_eq!(bytes, 2 * 192_000);
    assert_eq!(silence, 2 * 192_000 - 1920);

    let samples = read_samples(&path);
    assert_eq!(samples.len() as u64, bytes / 2);
    let zeros = (silence / 2) as usize;
    assert!(samples[..zeros].iter().all(|&s| s == 0));
    assert!(samples[zeros..].iter().all(|&s| s == 16383));
}

#[test]
fn test_steady_chunks_need_no_silence() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audio.wav");
    let origin = Instant::now();

    let mut writer = WaveformWriter::create(&path, FORMAT, 1.0, SessionClock::starting_at(origin)).unwrap();
    for k in 1..=100u64 {
        writer
            .write_chunk(&chunk(0.25, origin + Duration::from_millis(k * 10)))
            .unwrap();
    }
    assert_eq!(writer.silence_bytes(), 0);
    let (bytes, _) = writer.finalize().unwrap();
    assert_eq!(bytes, 100 * 1920);
    assert_eq!(read_samples(&path).len(), 100 * 960);
}

#[test]
fn test_short_gap_is_left_alone() {
    let origin = Instant::now();
    let mut writer = WaveformWriter::new(
        std::io::Cursor::new(Vec::new()),
        FORMAT,
        1.0,
        SessionClock::starting_at(origin),
    )
    .unwrap();

    writer.write_chunk(&chunk(0.1, origin + Duration::from_millis(10))).unwrap();
    // 60ms late, under the threshold
    writer.write_chunk(&chunk(0.1, origin + Duration::from_millis(80))).unwrap();
    assert_eq!(writer.silence_bytes(), 0);

    // 300ms late, filled
    writer.write_chunk(&chunk(0.1, origin + Duration::from_millis(400))).unwrap();
    let silence = writer.silence_bytes();
    assert!(silence > silence_threshold_bytes(&FORMAT));
    assert_eq!(silence % FORMAT.block_align() as u64, 0);
    assert_eq!(writer.bytes_written(), 400 * 192);
}

#[test]
fn test_pause_drops_chunks_and_inserts_no_gap() {
    let origin = Instant::now();
    let clock = SessionClock::starting_at(origin);
    let mut writer =
        WaveformWriter::new(std::io::Cursor::new(Vec::new()), FORMAT, 1.0, clock.clone()).unwrap();

    writer.write_chunk(&chunk(0.3, Instant::now())).unwrap();
    let before = writer.bytes_written();
    assert_eq!(before, 1920);

    clock.pause();
    writer.write_chunk(&chunk(0.3, Instant::now())).unwrap();
    assert_eq!(writer.bytes_written(), before);

    thread::sleep(Duration::from_millis(300));
    clock.resume();

    // Paused time is not recorded time, so the waveform is not behind
    writer.write_chunk(&chunk(0.3, Instant::now())).unwrap();
    assert_eq!(writer.silence_bytes(), 0);
    assert_eq!(writer.bytes_written(), 2 * 1920);
}

#[test]
fn test_gain_clips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("loud.wav");
    let origin = Instant::now();

    let mut writer = WaveformWriter::create(&path, FORMAT, 2.0, SessionClock::starting_at(origin)).unwrap();
    writer.write_chunk(&chunk(0.75, origin)).unwrap();
    writer.write_chunk(&chunk(-0.75, origin + Duration::from_millis(10))).unwrap();
    writer.finalize().unwrap();

    let samples = read_samples(&path);
    assert!(samples[..960].iter().all(|&s| s == i16::MAX));
    assert!(samples[960..].iter().all(|&s| s == -i16::MAX));
}

#[test]
fn test_pause_is_judged_by_arrival_time() {
    let origin = Instant::now();
    let clock = SessionClock::starting_at(origin);
    let mut writer =
        WaveformWriter::new(std::io::Cursor::new(Vec::new()), FORMAT, 1.0, clock.clone()).unwrap();

    let before_pause = Instant::now();
    clock.pause();
    thread::sleep(Duration::from_millis(5));
    let during_pause = Instant::now();

    // Captured before the pause, written while paused: kept
    writer.write_chunk(&chunk(0.2, before_pause)).unwrap();
    assert_eq!(writer.bytes_written(), 1920);

    thread::sleep(Duration::from_millis(50));
    clock.resume();

    // Captured during the pause, written after resume: dropped
    writer.write_chunk(&chunk(0.2, during_pause)).unwrap();
    assert_eq!(writer.bytes_written(), 1920);

    writer.write_chunk(&chunk(0.2, Instant::now())).unwrap();
    assert_eq!(writer.bytes_written(), 2 * 1920);
    assert_eq!(writer.silence_bytes(), 0);
}
