//! Loopback system audio capture
//!
//! The platform audio thread only stamps and forwards sample chunks; a
//! dedicated writer thread owns the WAV file and keeps it aligned with
//! recorded wall time by inserting silence when the device went quiet.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample};
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

use crate::clock::SessionClock;
use crate::error::{ReelcapError, Result};
use crate::types::{AudioChunk, AudioFormat};

/// Gaps shorter than this are treated as callback jitter, not silence
pub const SILENCE_THRESHOLD: Duration = Duration::from_millis(100);

/// How long `start` waits for the device thread to open the stream
const OPEN_TIMEOUT: Duration = Duration::from_secs(3);

/// Scale a normalized sample and clip it to 16-bit PCM
pub fn apply_gain(sample: f32, gain: f32) -> i16 {
    let scaled = (sample * gain).clamp(-1.0, 1.0);
    (scaled * i16::MAX as f32) as i16
}

/// Silence threshold expressed in waveform bytes
pub fn silence_threshold_bytes(format: &AudioFormat) -> u64 {
    format.bytes_per_second() as u64 * SILENCE_THRESHOLD.as_millis() as u64 / 1000
}

/// Finished waveform on disk
#[derive(Debug, Clone)]
pub struct Waveform {
    pub path: PathBuf,
    pub format: AudioFormat,
    /// PCM bytes after the header, silence included
    pub data_bytes: u64,
    /// Bytes of silence inserted to cover device gaps
    pub silence_bytes: u64,
}

impl Waveform {
    /// Playing time of the waveform
    pub fn duration(&self) -> Duration {
        let bps = self.format.bytes_per_second() as f64;
        Duration::from_secs_f64(self.data_bytes as f64 / bps)
    }

    /// Worth muxing: at least one silence threshold of audio
    pub fn is_substantial(&self) -> bool {
        self.data_bytes >= silence_threshold_bytes(&self.format)
    }
}

/// 16-bit PCM writer that keeps the waveform in step with the session clock
pub struct WaveformWriter<W: Write + Seek> {
    wav: hound::WavWriter<W>,
    format: AudioFormat,
    gain: f32,
    clock: SessionClock,
    bytes_written: u64,
    silence_bytes: u64,
}

impl WaveformWriter<BufWriter<File>> {
    /// Create a WAV file at `path`
    pub fn create(
        path: impl AsRef<Path>,
        format: AudioFormat,
        gain: f32,
        clock: SessionClock,
    ) -> Result<Self> {
        let wav = hound::WavWriter::create(path, wav_spec(&format))?;
        Ok(Self::from_wav(wav, format, gain, clock))
    }
}

impl<W: Write + Seek> WaveformWriter<W> {
    /// Write a WAV stream into any seekable sink
    pub fn new(inner: W, format: AudioFormat, gain: f32, clock: SessionClock) -> Result<Self> {
        let wav = hound::WavWriter::new(inner, wav_spec(&format))?;
        Ok(Self::from_wav(wav, format, gain, clock))
    }

    fn from_wav(wav: hound::WavWriter<W>, format: AudioFormat, gain: f32, clock: SessionClock) -> Self {
        Self {
            wav,
            format,
            gain,
            clock,
            bytes_written: 0,
            silence_bytes: 0,
        }
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn silence_bytes(&self) -> u64 {
        self.silence_bytes
    }

    /// Append one device chunk.
    ///
    /// If the waveform trails the recorded time at the chunk's arrival by
    /// more than the silence threshold, block-aligned zeros are written
    /// first. Chunks that arrived during a pause are discarded, whenever
    /// they reach the writer.
    pub fn write_chunk(&mut self, chunk: &AudioChunk) -> Result<()> {
        if self.clock.was_paused_at(chunk.arrived) {
            trace!("Dropping {} samples while paused", chunk.samples.len());
            return Ok(());
        }

        let bytes_per_second = self.format.bytes_per_second() as f64;
        let elapsed = self.clock.elapsed_at(chunk.arrived);
        let expected = (elapsed.as_secs_f64() * bytes_per_second) as u64;
        let chunk_bytes = chunk.pcm_len();
        let gap = expected.saturating_sub(self.bytes_written + chunk_bytes);

        if gap > silence_threshold_bytes(&self.format) {
            let align = self.format.block_align() as u64;
            let gap = gap - gap % align;
            let samples = gap / AudioFormat::BYTES_PER_SAMPLE as u64;
            debug!(
                "Audio trailing by {:.0}ms, inserting silence",
                gap as f64 * 1000.0 / bytes_per_second
            );
            for _ in 0..samples {
                self.wav.write_sample(0i16)?;
            }
            self.bytes_written += gap;
            self.silence_bytes += gap;
        }

        for &sample in &chunk.samples {
            self.wav.write_sample(apply_gain(sample, self.gain))?;
        }
        self.bytes_written += chunk_bytes;
        Ok(())
    }

    /// Patch the header and close the stream
    pub fn finalize(self) -> Result<(u64, u64)> {
        self.wav.finalize()?;
        Ok((self.bytes_written, self.silence_bytes))
    }
}

fn wav_spec(format: &AudioFormat) -> hound::WavSpec {
    hound::WavSpec {
        channels: format.channels,
        sample_rate: format.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

/// Counters shared with the audio threads
#[derive(Debug, Default)]
struct AudioShared {
    chunks_received: AtomicU64,
    write_errors: AtomicU64,
}

/// Running loopback capture
pub struct AudioCapture {
    format: AudioFormat,
    device_name: String,
    path: PathBuf,
    shutdown_tx: Option<Sender<()>>,
    device_thread: Option<JoinHandle<()>>,
    writer_thread: Option<JoinHandle<()>>,
    done_rx: Receiver<Result<Waveform>>,
    shared: Arc<AudioShared>,
}

impl AudioCapture {
    /// Open the loopback device and start writing a waveform to `path`.
    ///
    /// Recorded time is measured on `clock`, the same clock that paces the
    /// frame timer.
    pub fn start(path: impl Into<PathBuf>, gain: f32, clock: SessionClock) -> Result<Self> {
        let path = path.into();
        let (chunk_tx, chunk_rx) = unbounded::<AudioChunk>();
        let (ready_tx, ready_rx) = bounded::<Result<(AudioFormat, String)>>(1);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let shared = Arc::new(AudioShared::default());

        let device_shared = shared.clone();
        let device_thread = std::thread::Builder::new()
            .name("reelcap-audio".to_string())
            .spawn(move || run_device(chunk_tx, ready_tx, shutdown_rx, device_shared))
            .map_err(|e| ReelcapError::audio(format!("Failed to spawn audio thread: {}", e)))?;

        let (format, device_name) = match ready_rx.recv_timeout(OPEN_TIMEOUT) {
            Ok(Ok(opened)) => opened,
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                drop(shutdown_tx);
                return Err(ReelcapError::audio("Timed out opening loopback device"));
            }
        };

        let writer = match WaveformWriter::create(&path, format, gain, clock) {
            Ok(writer) => writer,
            Err(e) => {
                drop(shutdown_tx);
                let _ = device_thread.join();
                return Err(e);
            }
        };

        let (done_tx, done_rx) = bounded(1);
        let writer_shared = shared.clone();
        let writer_path = path.clone();
        let writer_thread = std::thread::Builder::new()
            .name("reelcap-wav".to_string())
            .spawn(move || {
                let result = run_writer(writer, chunk_rx, writer_shared).map(|(data_bytes, silence_bytes)| {
                    Waveform {
                        path: writer_path,
                        format,
                        data_bytes,
                        silence_bytes,
                    }
                });
                let _ = done_tx.send(result);
            })
            .map_err(|e| ReelcapError::audio(format!("Failed to spawn WAV writer: {}", e)))?;

        info!(
            "Loopback audio started: {} ({}Hz, {}ch)",
            device_name, format.sample_rate, format.channels
        );

        Ok(Self {
            format,
            device_name,
            path,
            shutdown_tx: Some(shutdown_tx),
            device_thread: Some(device_thread),
            writer_thread: Some(writer_thread),
            done_rx,
            shared,
        })
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of device callbacks seen so far
    pub fn chunks_received(&self) -> u64 {
        self.shared.chunks_received.load(Ordering::Relaxed)
    }

    /// Close the device and wait, at most `timeout`, for the waveform.
    ///
    /// Returns `None` if the writer failed or did not finish in time; the
    /// session then carries on without audio.
    pub fn stop(&mut self, timeout: Duration) -> Option<Waveform> {
        let Some(shutdown_tx) = self.shutdown_tx.take() else {
            return None;
        };
        info!("Stopping loopback audio");
        drop(shutdown_tx);

        let waveform = match self.done_rx.recv_timeout(timeout) {
            Ok(Ok(waveform)) => Some(waveform),
            Ok(Err(e)) => {
                warn!("Audio waveform failed: {}", e);
                None
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!("Audio shutdown timed out after {:?}, continuing without audio", timeout);
                return None;
            }
            Err(RecvTimeoutError::Disconnected) => {
                warn!("Audio writer exited without a result");
                None
            }
        };

        if let Some(thread) = self.device_thread.take() {
            let _ = thread.join();
        }
        if let Some(thread) = self.writer_thread.take() {
            let _ = thread.join();
        }

        let errors = self.shared.write_errors.load(Ordering::Relaxed);
        if errors > 0 {
            warn!("{} audio chunks could not be written", errors);
        }
        if let Some(ref w) = waveform {
            info!(
                "Loopback audio stopped: {:.1}s written, {:.1}s of it inserted silence",
                w.duration().as_secs_f64(),
                w.silence_bytes as f64 / self.format.bytes_per_second() as f64
            );
        }
        waveform
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        // Never block teardown on a wedged device
        self.shutdown_tx.take();
    }
}

/// Device thread: owns the cpal stream until shutdown is signalled
fn run_device(
    chunk_tx: Sender<AudioChunk>,
    ready_tx: Sender<Result<(AudioFormat, String)>>,
    shutdown_rx: Receiver<()>,
    shared: Arc<AudioShared>,
) {
    let stream = match open_loopback(chunk_tx, shared) {
        Ok((stream, format, name)) => {
            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(e.into()));
                return;
            }
            let _ = ready_tx.send(Ok((format, name)));
            stream
        }
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    // Returns once the sender is dropped
    let _ = shutdown_rx.recv();
    drop(stream);
    debug!("Loopback device closed");
}

/// Writer thread: drains chunks into the waveform until the stream is gone
fn run_writer<W: Write + Seek>(
    mut writer: WaveformWriter<W>,
    chunk_rx: Receiver<AudioChunk>,
    shared: Arc<AudioShared>,
) -> Result<(u64, u64)> {
    for chunk in chunk_rx.iter() {
        if let Err(e) = writer.write_chunk(&chunk) {
            if shared.write_errors.fetch_add(1, Ordering::Relaxed) == 0 {
                error!("Failed to write audio chunk: {}", e);
            }
        }
    }
    writer.finalize()
}

fn open_loopback(
    chunk_tx: Sender<AudioChunk>,
    shared: Arc<AudioShared>,
) -> Result<(cpal::Stream, AudioFormat, String)> {
    let host = cpal::default_host();
    let (device, supported) = loopback_device(&host)?;
    let name = device.name().unwrap_or_else(|_| "Unknown".to_string());

    let config: cpal::StreamConfig = supported.config();
    let format = AudioFormat {
        sample_rate: config.sample_rate.0,
        channels: config.channels,
    };

    let stream = match supported.sample_format() {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, chunk_tx, shared)?,
        SampleFormat::F64 => build_stream::<f64>(&device, &config, chunk_tx, shared)?,
        SampleFormat::I16 => build_stream::<i16>(&device, &config, chunk_tx, shared)?,
        SampleFormat::I32 => build_stream::<i32>(&device, &config, chunk_tx, shared)?,
        SampleFormat::U16 => build_stream::<u16>(&device, &config, chunk_tx, shared)?,
        other => {
            return Err(ReelcapError::audio(format!(
                "Unsupported loopback sample format: {:?}",
                other
            )))
        }
    };

    Ok((stream, format, name))
}

/// WASAPI exposes loopback as an input stream on the render device
#[cfg(windows)]
fn loopback_device(host: &cpal::Host) -> Result<(cpal::Device, cpal::SupportedStreamConfig)> {
    let device = host
        .default_output_device()
        .ok_or_else(|| ReelcapError::audio("No default output device"))?;
    let config = device.default_output_config()?;
    Ok((device, config))
}

/// PulseAudio and PipeWire publish loopback as "Monitor of ..." inputs
#[cfg(not(windows))]
fn loopback_device(host: &cpal::Host) -> Result<(cpal::Device, cpal::SupportedStreamConfig)> {
    let device = host
        .input_devices()?
        .find(|d| is_monitor_name(&d.name().unwrap_or_default()))
        .ok_or_else(|| ReelcapError::audio("No loopback (monitor) input device found"))?;
    let config = device.default_input_config()?;
    Ok((device, config))
}

fn is_monitor_name(name: &str) -> bool {
    name.to_lowercase().contains("monitor")
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    chunk_tx: Sender<AudioChunk>,
    shared: Arc<AudioShared>,
) -> Result<cpal::Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            let arrived = Instant::now();
            let samples: Vec<f32> = data.iter().map(|&s| f32::from_sample(s)).collect();
            shared.chunks_received.fetch_add(1, Ordering::Relaxed);
            let _ = chunk_tx.send(AudioChunk::new(samples, arrived));
        },
        |err| warn!("Loopback stream error: {}", err),
        None,
    )?;
    Ok(stream)
}

/// Audio device as reported by the host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioDeviceInfo {
    pub name: String,
    /// Usable as a loopback source
    pub loopback: bool,
    pub is_default: bool,
}

/// List devices that can act as loopback sources
pub fn list_audio_devices() -> Result<Vec<AudioDeviceInfo>> {
    let host = cpal::default_host();
    let mut devices = Vec::new();

    let default_output = host
        .default_output_device()
        .and_then(|d| d.name().ok())
        .unwrap_or_default();

    if cfg!(windows) {
        for device in host.output_devices()? {
            let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
            devices.push(AudioDeviceInfo {
                is_default: name == default_output,
                name,
                loopback: true,
            });
        }
    } else {
        for device in host.input_devices()? {
            let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
            devices.push(AudioDeviceInfo {
                loopback: is_monitor_name(&name),
                is_default: false,
                name,
            });
        }
    }

    Ok(devices)
}
