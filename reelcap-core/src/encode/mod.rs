//! External encoder plumbing
//!
//! Locating the ffmpeg binary, building its command lines and running
//! one-shot invocations (mux, palette passes) with a bounded wait.

mod ffmpeg;

pub use ffmpeg::{
    locate_encoder, mux_args, palettegen_args, paletteuse_args, stream_args, stream_command,
    EncodeParams, GifPassParams, FFMPEG_ENV,
};

use std::fs::File;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::{ReelcapError, Result};

/// Output files smaller than this are treated as encoder failure even
/// with a zero exit status
pub const MIN_ARTIFACT_BYTES: u64 = 1024;

/// Poll interval while waiting for a child process
const WAIT_POLL: Duration = Duration::from_millis(20);

/// Size of a file, zero if it does not exist
pub fn artifact_size(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// Wait for `child` to exit, giving up after `timeout`.
///
/// `Ok(None)` means it is still running; the caller decides whether to kill.
pub fn wait_with_timeout(child: &mut Child, timeout: Duration) -> std::io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        std::thread::sleep(WAIT_POLL);
    }
}

/// Run the encoder once with `args` and check that it produced `output`
/// of at least `min_bytes`.
///
/// stderr goes to `log` when given, so a failure can be explained later.
pub fn run_encoder(
    encoder: &Path,
    args: &[std::ffi::OsString],
    output: &Path,
    min_bytes: u64,
    log: Option<&Path>,
    timeout: Duration,
) -> Result<()> {
    let stderr = match log.map(File::create).transpose()? {
        Some(file) => Stdio::from(file),
        None => Stdio::null(),
    };

    debug!("Running {:?} {:?}", encoder, args);
    let mut child = Command::new(encoder)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(stderr)
        .spawn()
        .map_err(|e| ReelcapError::encoder(format!("Failed to launch {:?}: {}", encoder, e)))?;

    let status = match wait_with_timeout(&mut child, timeout)? {
        Some(status) => status,
        None => {
            warn!("Encoder exceeded {:?}, terminating", timeout);
            let _ = child.kill();
            let _ = child.wait();
            return Err(ReelcapError::encoder(format!("timed out after {:?}", timeout)));
        }
    };

    if !status.success() {
        let detail = log.map(log_tail).unwrap_or_default();
        return Err(ReelcapError::encoder(format!("exited with {}{}", status, detail)));
    }

    let size = artifact_size(output);
    if size < min_bytes.max(1) {
        return Err(ReelcapError::encoder(format!(
            "{:?} is only {} bytes",
            output, size
        )));
    }
    Ok(())
}

/// Last lines of an encoder log, formatted for an error message
pub fn log_tail(path: &Path) -> String {
    let Ok(content) = std::fs::read_to_string(path) else {
        return String::new();
    };
    let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
    let tail = &lines[lines.len().saturating_sub(3)..];
    if tail.is_empty() {
        String::new()
    } else {
        format!(": {}", tail.join(" | "))
    }
}
