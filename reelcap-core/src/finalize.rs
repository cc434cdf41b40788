//! Final assembly of a stopped recording
//!
//! Turns whatever a session captured (an encoded video, buffered frames,
//! a waveform) into the one file the caller asked for. Each step degrades
//! rather than fails where a lesser artifact is still possible:
//! - MP4 with audio: mux, else the bare video
//! - MP4 without a usable video: re-encode buffered frames, else a GIF
//!   next to the requested path
//! - GIF: two palette passes through the encoder, else the built-in codec
//!
//! When nothing usable is left, an unfinished encoder output is kept beside
//! the requested path as `<stem>.raw.mp4` instead of being discarded.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::capture::Waveform;
use crate::config::{OutputFormat, Quality, RecordingSettings};
use crate::encode::{
    artifact_size, log_tail, mux_args, palettegen_args, paletteuse_args, run_encoder, stream_command, EncodeParams,
    GifPassParams, MIN_ARTIFACT_BYTES,
};
use crate::error::{ReelcapError, Result};
use crate::gif::GifEncoder;
use crate::sink::{BufferingSink, EncodedVideo, SinkOutput, StreamingSink};

/// Bound on a single post-recording encoder run
pub const PASS_TIMEOUT: Duration = Duration::from_secs(300);

/// Everything a stopped session hands to finalization
#[derive(Debug)]
pub struct Captured {
    /// Streaming encoder result, if one ran
    pub video: Option<EncodedVideo>,
    /// Frames held in memory
    pub frames: BufferingSink,
    pub waveform: Option<Waveform>,
}

impl Captured {
    pub fn new(output: SinkOutput, waveform: Option<Waveform>) -> Self {
        Self {
            video: output.video,
            frames: output.frames,
            waveform,
        }
    }

    /// Whether any artifact could come out of this
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty() && !self.video.as_ref().is_some_and(|v| v.is_valid())
    }
}

/// Assembles output files for one recording
#[derive(Debug, Clone)]
pub struct Finalizer {
    format: OutputFormat,
    quality: Quality,
    frame_rate: u32,
    builtin_gif: bool,
    encoder: Option<PathBuf>,
    scratch: PathBuf,
}

impl Finalizer {
    /// `scratch` holds intermediates and encoder logs
    pub fn new(settings: &RecordingSettings, encoder: Option<PathBuf>, scratch: impl Into<PathBuf>) -> Self {
        Self {
            format: settings.format,
            quality: settings.quality,
            frame_rate: settings.frame_rate,
            builtin_gif: settings.builtin_gif,
            encoder,
            scratch: scratch.into(),
        }
    }

    /// Produce the final file. Returns the path actually written, which
    /// differs from `output` when an MP4 recording falls back to GIF.
    pub fn finalize(&self, captured: &Captured, output: &Path) -> Result<PathBuf> {
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        match self.format {
            OutputFormat::Mp4 => self.finalize_video(captured, output),
            OutputFormat::Gif => self.finalize_gif(captured, output),
        }
    }

    fn finalize_video(&self, captured: &Captured, output: &Path) -> Result<PathBuf> {
        let video = match captured.video.as_ref().filter(|v| v.is_valid()) {
            Some(video) => {
                if !captured.frames.is_empty() {
                    warn!(
                        "{} frames captured after the encoder failed are not in the video",
                        captured.frames.len()
                    );
                }
                Some(video.clone())
            }
            None => self.encode_buffered(&captured.frames),
        };

        let Some(video) = video else {
            if captured.frames.is_empty() {
                return Err(self.nothing_usable(captured, output));
            }
            let fallback = output.with_extension(OutputFormat::Gif.extension());
            warn!("No encoded video available, saving as GIF: {:?}", fallback);
            self.builtin_gif(&captured.frames, &fallback)?;
            return Ok(fallback);
        };

        if let (Some(waveform), Some(encoder)) = (captured.waveform.as_ref(), self.encoder.as_ref()) {
            if waveform.is_substantial() {
                let args = mux_args(&video.path, &waveform.path, output);
                let log = self.scratch.join("mux.log");
                match run_encoder(encoder, &args, output, MIN_ARTIFACT_BYTES, Some(&log), PASS_TIMEOUT) {
                    Ok(()) => {
                        info!("Muxed {:?} with {:?} audio -> {:?}", video.path, waveform.duration(), output);
                        return Ok(output.to_path_buf());
                    }
                    Err(e) => warn!("Mux failed, saving video without audio: {}", e),
                }
            } else {
                debug!("Waveform too short to mux ({} bytes)", waveform.data_bytes);
            }
        }

        move_file(&video.path, output)?;
        info!("Saved video to {:?}", output);
        Ok(output.to_path_buf())
    }

    fn finalize_gif(&self, captured: &Captured, output: &Path) -> Result<PathBuf> {
        let video = captured.video.as_ref().filter(|v| v.is_valid());

        if let (Some(video), Some(encoder), false) = (video, self.encoder.as_ref(), self.builtin_gif) {
            match self.two_pass_gif(encoder, &video.path, output) {
                Ok(()) => {
                    info!("Saved GIF to {:?}", output);
                    return Ok(output.to_path_buf());
                }
                Err(e) if captured.frames.is_empty() => {
                    let kept = raw_video_path(output);
                    warn!("GIF conversion failed, keeping the raw video at {:?}", kept);
                    move_file(&video.path, &kept)?;
                    return Err(ReelcapError::NoArtifact(format!(
                        "GIF conversion failed ({}); raw video kept at {}",
                        e,
                        kept.display()
                    )));
                }
                Err(e) => warn!("GIF conversion failed, using the built-in encoder: {}", e),
            }
        }

        if captured.frames.is_empty() {
            return Err(self.nothing_usable(captured, output));
        }
        self.builtin_gif(&captured.frames, output)?;
        Ok(output.to_path_buf())
    }

    /// Palette generation, then palette application
    fn two_pass_gif(&self, encoder: &Path, video: &Path, output: &Path) -> Result<()> {
        let params = GifPassParams::new(self.frame_rate, self.quality);
        let palette = self.scratch.join("palette.png");
        debug!("Two-pass GIF at {} fps, {} colors", params.fps, params.max_colors);

        // The palette is a 16x16 image, well under the usual size floor
        run_encoder(
            encoder,
            &palettegen_args(video, &palette, &params),
            &palette,
            1,
            Some(&self.scratch.join("palettegen.log")),
            PASS_TIMEOUT,
        )?;

        run_encoder(
            encoder,
            &paletteuse_args(video, &palette, output, &params),
            output,
            MIN_ARTIFACT_BYTES,
            Some(&self.scratch.join("paletteuse.log")),
            PASS_TIMEOUT,
        )
    }

    fn builtin_gif(&self, frames: &BufferingSink, output: &Path) -> Result<()> {
        GifEncoder::new(self.quality).encode_to_file(frames.frames(), frames.delays_ms(), output)?;
        Ok(())
    }

    /// Feed buffered frames through a fresh encoder process
    fn encode_buffered(&self, frames: &BufferingSink) -> Option<EncodedVideo> {
        let encoder = self.encoder.as_ref()?;
        let first = frames.frames().first()?;

        let params = EncodeParams::new(first.width, first.height, self.frame_rate, self.quality);
        let output = self.scratch.join("buffered.mp4");
        let log_path = self.scratch.join("buffered.log");
        let log = File::create(&log_path).ok();

        info!("Encoding {} buffered frames", frames.len());
        let mut sink = match StreamingSink::spawn(stream_command(encoder, &params, &output, log), &output) {
            Ok(sink) => sink,
            Err(e) => {
                warn!("Could not encode buffered frames: {}", e);
                return None;
            }
        };
        for frame in frames.frames() {
            if sink.push(frame.clone()).is_err() {
                break;
            }
        }

        let video = sink.finish(PASS_TIMEOUT);
        if video.is_valid() {
            Some(video)
        } else {
            warn!("Encoding buffered frames failed{}", log_tail(&log_path));
            None
        }
    }

    /// Error for a recording with no usable frames. A partial encoder output
    /// is moved out of the scratch directory first so it survives cleanup.
    fn nothing_usable(&self, captured: &Captured, output: &Path) -> ReelcapError {
        let Some(video) = captured.video.as_ref() else {
            return self.no_artifact("no frames were captured");
        };

        let how = if video.killed {
            "was terminated"
        } else if video.exit_ok {
            "produced too little output"
        } else {
            "exited with an error"
        };
        let reason = format!(
            "encoder {} after {} frames and no frames were buffered",
            how, video.frames_written
        );

        if artifact_size(&video.path) == 0 {
            return self.no_artifact(&reason);
        }
        let kept = raw_video_path(output);
        match move_file(&video.path, &kept) {
            Ok(()) => {
                warn!("Keeping the unfinished video at {:?}", kept);
                self.no_artifact(&format!("{}; raw video kept at {}", reason, kept.display()))
            }
            Err(e) => {
                warn!("Could not keep the unfinished video: {}", e);
                self.no_artifact(&reason)
            }
        }
    }

    fn no_artifact(&self, reason: &str) -> ReelcapError {
        let detail = log_tail(&self.scratch.join("encoder.log"));
        ReelcapError::NoArtifact(format!("{}{}", reason, detail))
    }
}

/// `<stem>.raw.mp4` next to `output`
fn raw_video_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "recording".to_string());
    output.with_file_name(format!("{}.raw.mp4", stem))
}

/// Rename, falling back to copy and delete across filesystems
pub fn move_file(from: &Path, to: &Path) -> Result<()> {
    if std::fs::rename(from, to).is_ok() {
        return Ok(());
    }
    std::fs::copy(from, to).map_err(|e| {
        ReelcapError::Io(e).with_context(format!("Failed to move {:?} to {:?}", from, to))
    })?;
    if let Err(e) = std::fs::remove_file(from) {
        debug!("Could not remove {:?} after copy: {}", from, e);
    }
    Ok(())
}
