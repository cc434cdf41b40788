//! ffmpeg location and command lines

use std::ffi::OsString;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info, warn};

use crate::config::{EncoderChoice, Quality};

/// Environment variable naming an ffmpeg binary
pub const FFMPEG_ENV: &str = "REELCAP_FFMPEG";

fn binary_name() -> &'static str {
    if cfg!(windows) {
        "ffmpeg.exe"
    } else {
        "ffmpeg"
    }
}

/// Resolve the encoder binary for `choice`.
///
/// `Auto` searches, in order: `$REELCAP_FFMPEG`, the directory of the
/// running executable (and its `ffmpeg/` subdirectory), the per-user data
/// directory `reelcap/ffmpeg/`, then `PATH`.
pub fn locate_encoder(choice: &EncoderChoice) -> Option<PathBuf> {
    let found = match choice {
        EncoderChoice::Disabled => {
            debug!("External encoder disabled");
            return None;
        }
        EncoderChoice::Path(path) => {
            if path.is_file() {
                Some(path.clone())
            } else {
                warn!("Configured encoder {:?} does not exist", path);
                None
            }
        }
        EncoderChoice::Auto => search_candidates().into_iter().find(|p| p.is_file()),
    };

    match &found {
        Some(path) => info!("Using encoder {:?}", path),
        None => info!("No external encoder found"),
    }
    found
}

fn search_candidates() -> Vec<PathBuf> {
    let name = binary_name();
    let mut candidates = Vec::new();

    if let Some(path) = std::env::var_os(FFMPEG_ENV) {
        candidates.push(PathBuf::from(path));
    }

    if let Some(dir) = std::env::current_exe().ok().and_then(|p| p.parent().map(Path::to_path_buf)) {
        candidates.push(dir.join(name));
        candidates.push(dir.join("ffmpeg").join(name));
    }

    if let Some(data) = dirs::data_local_dir() {
        candidates.push(data.join("reelcap").join("ffmpeg").join(name));
    }

    if let Some(path) = std::env::var_os("PATH") {
        candidates.extend(std::env::split_paths(&path).map(|dir| dir.join(name)));
    }

    candidates
}

/// Launch parameters for the streaming encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeParams {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    /// x264 constant rate factor
    pub crf: u8,
}

impl EncodeParams {
    pub fn new(width: u32, height: u32, frame_rate: u32, quality: Quality) -> Self {
        Self {
            width,
            height,
            frame_rate,
            crf: quality.crf(),
        }
    }
}

fn os(parts: &[&str]) -> Vec<OsString> {
    parts.iter().map(OsString::from).collect()
}

/// Raw BGR frames on stdin -> H.264 file
pub fn stream_args(params: &EncodeParams, output: &Path) -> Vec<OsString> {
    let mut args = os(&["-hide_banner", "-loglevel", "error", "-y"]);
    args.extend(os(&["-f", "rawvideo", "-pix_fmt", "bgr24"]));
    args.push("-s".into());
    args.push(format!("{}x{}", params.width, params.height).into());
    args.push("-r".into());
    args.push(params.frame_rate.to_string().into());
    args.extend(os(&["-i", "pipe:0"]));
    args.extend(os(&["-c:v", "libx264", "-preset", "ultrafast"]));
    args.push("-crf".into());
    args.push(params.crf.to_string().into());
    args.extend(os(&["-pix_fmt", "yuv420p", "-movflags", "+faststart"]));
    args.push(output.as_os_str().to_owned());
    args
}

/// Command for the streaming sink. stdin is set up by the sink.
pub fn stream_command(encoder: &Path, params: &EncodeParams, output: &Path, log: Option<File>) -> Command {
    let mut command = Command::new(encoder);
    command.args(stream_args(params, output));
    command.stderr(match log {
        Some(file) => Stdio::from(file),
        None => Stdio::null(),
    });
    command
}

/// Copy the video stream, encode audio to AAC, stop at the shorter stream
pub fn mux_args(video: &Path, audio: &Path, output: &Path) -> Vec<OsString> {
    let mut args = os(&["-hide_banner", "-loglevel", "error", "-y", "-i"]);
    args.push(video.as_os_str().to_owned());
    args.push("-i".into());
    args.push(audio.as_os_str().to_owned());
    args.extend(os(&[
        "-map", "0:v:0", "-map", "1:a:0", "-c:v", "copy", "-c:a", "aac", "-b:a", "192k",
        "-shortest",
    ]));
    args.push(output.as_os_str().to_owned());
    args
}

/// Per-quality parameters of the two-pass GIF conversion
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GifPassParams {
    pub fps: u32,
    pub scale: f32,
    pub max_colors: u16,
    pub quality: Quality,
}

impl GifPassParams {
    /// Decimate the capture rate down to the quality's cap
    pub fn new(capture_fps: u32, quality: Quality) -> Self {
        Self {
            fps: capture_fps.clamp(1, quality.gif_max_fps()),
            scale: quality.gif_scale(),
            max_colors: quality.gif_max_colors(),
            quality,
        }
    }

    /// Shared fps/scale prefix of both passes
    fn prefix_filter(&self) -> String {
        if self.scale < 1.0 {
            format!(
                "fps={},scale=trunc(iw*{s}/2)*2:trunc(ih*{s}/2)*2:flags=lanczos",
                self.fps,
                s = self.scale
            )
        } else {
            format!("fps={}", self.fps)
        }
    }
}

/// Pass one: build an optimal palette image from the video
pub fn palettegen_args(video: &Path, palette: &Path, params: &GifPassParams) -> Vec<OsString> {
    let mut args = os(&["-hide_banner", "-loglevel", "error", "-y", "-i"]);
    args.push(video.as_os_str().to_owned());
    args.push("-vf".into());
    args.push(
        format!(
            "{},palettegen=max_colors={}:stats_mode=diff",
            params.prefix_filter(),
            params.max_colors
        )
        .into(),
    );
    args.push(palette.as_os_str().to_owned());
    args
}

/// Pass two: map the video onto the palette and write a looping GIF
pub fn paletteuse_args(video: &Path, palette: &Path, output: &Path, params: &GifPassParams) -> Vec<OsString> {
    let mut args = os(&["-hide_banner", "-loglevel", "error", "-y", "-i"]);
    args.push(video.as_os_str().to_owned());
    args.push("-i".into());
    args.push(palette.as_os_str().to_owned());
    args.push("-lavfi".into());
    args.push(
        format!(
            "{} [x]; [x][1:v] paletteuse=dither={}:diff_mode=rectangle",
            params.prefix_filter(),
            params.quality.gif_dither().filter_value()
        )
        .into(),
    );
    args.extend(os(&["-loop", "0"]));
    args.push(output.as_os_str().to_owned());
    args
}
