//! Frame decoding.
//!
//! [`FrameDecoder`] is the seam between the orchestrator and the program that
//! actually turns video into image files. It offers two submission styles:
//! one decode per frame, and one long-running ranged export whose progress
//! is observed through a [`RangeHandle`]. [`FfmpegDecoder`] implements both
//! by launching `ffmpeg`.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};

use crate::error::FrameGrabError;
use crate::naming::partial_file_name;

/// One frame to decode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTarget {
    /// Zero-based frame index.
    pub index: u64,
    /// Presentation time of the frame, used for seeking.
    pub timestamp: Duration,
}

/// A ranged export: every `stride`-th frame between two timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeRequest {
    /// Seek position of the first exported frame.
    pub start: Duration,
    /// Position after which decoding stops.
    pub end: Duration,
    /// Export one frame out of every `stride` decoded.
    pub stride: u64,
    /// Output path containing a `printf`-style sequence placeholder
    /// (`%06d`); sequence numbers start at 0.
    pub pattern: PathBuf,
}

/// A running ranged export.
pub trait RangeHandle: Send + 'static {
    /// Returns `true` while the export is still running.
    fn poll(&mut self) -> Result<bool, FrameGrabError>;

    /// Ask the export to stop. Must not wait for it to exit.
    fn terminate(&mut self);
}

/// Produces image files from video frames.
///
/// Implementations are shared between concurrently running decode tasks.
pub trait FrameDecoder: Send + Sync + 'static {
    /// Handle type returned by [`decode_range`](Self::decode_range).
    type Range: RangeHandle;

    /// Decode `target` of `video` into `destination`.
    ///
    /// Resolves to `Ok(true)` when the file was written and `Ok(false)` when
    /// the decoder ran but produced nothing.
    ///
    /// # Errors
    ///
    /// Returns an error when the decoder could not be run at all.
    fn decode_single_frame(
        &self,
        video: &Path,
        target: FrameTarget,
        destination: &Path,
    ) -> impl Future<Output = Result<bool, FrameGrabError>> + Send;

    /// Start a ranged export and return immediately.
    ///
    /// # Errors
    ///
    /// Returns an error when the export could not be started.
    fn decode_range(
        &self,
        video: &Path,
        request: &RangeRequest,
    ) -> Result<Self::Range, FrameGrabError>;
}

/// [`FrameDecoder`] backed by the `ffmpeg` command-line tool.
///
/// Each decode is a separate single-threaded `ffmpeg` process, so the job's
/// parallelism maps directly onto CPU cores. Processes are killed when their
/// task is dropped.
#[derive(Debug, Clone)]
pub struct FfmpegDecoder {
    binary: PathBuf,
}

impl Default for FfmpegDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegDecoder {
    /// Use `ffmpeg` from `PATH`.
    pub fn new() -> Self {
        Self {
            binary: PathBuf::from("ffmpeg"),
        }
    }

    /// Use a specific `ffmpeg` executable.
    #[must_use]
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.binary);
        command
            .args(["-hide_banner", "-loglevel", "error", "-nostdin", "-y"])
            .args(["-threads", "1"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .kill_on_drop(true);
        command
    }

    fn tool_failed(error: impl ToString) -> FrameGrabError {
        FrameGrabError::ToolFailed {
            tool: "ffmpeg".to_string(),
            reason: error.to_string(),
        }
    }
}

fn seconds_argument(timestamp: Duration) -> String {
    format!("{:.6}", timestamp.as_secs_f64())
}

impl FrameDecoder for FfmpegDecoder {
    type Range = FfmpegRangeHandle;

    async fn decode_single_frame(
        &self,
        video: &Path,
        target: FrameTarget,
        destination: &Path,
    ) -> Result<bool, FrameGrabError> {
        // Written under a hidden name first so an interrupted decode never
        // leaves a file that looks finished.
        let file_name = destination
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| Self::tool_failed("destination has no file name"))?;
        let partial = destination.with_file_name(partial_file_name(&file_name));

        let output = self
            .command()
            .arg("-ss")
            .arg(seconds_argument(target.timestamp))
            .arg("-i")
            .arg(video)
            .args(["-frames:v", "1"])
            .arg(&partial)
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(Self::tool_failed)?;

        if !output.status.success() || !partial.is_file() {
            log::debug!(
                "ffmpeg produced no frame {} for {} ({}): {}",
                target.index,
                video.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            let _ = std::fs::remove_file(&partial);
            return Ok(false);
        }

        std::fs::rename(&partial, destination)?;
        Ok(true)
    }

    fn decode_range(
        &self,
        video: &Path,
        request: &RangeRequest,
    ) -> Result<FfmpegRangeHandle, FrameGrabError> {
        let filter = format!("select=not(mod(n\\,{}))", request.stride.max(1));

        log::debug!(
            "Starting ranged export of {} ({:.3}s..{:.3}s, stride {})",
            video.display(),
            request.start.as_secs_f64(),
            request.end.as_secs_f64(),
            request.stride
        );

        let child = self
            .command()
            .arg("-ss")
            .arg(seconds_argument(request.start))
            .arg("-to")
            .arg(seconds_argument(request.end))
            .arg("-i")
            .arg(video)
            .args(["-vf", &filter])
            .args(["-fps_mode", "vfr", "-start_number", "0"])
            .arg(&request.pattern)
            .stderr(Stdio::null())
            .spawn()
            .map_err(Self::tool_failed)?;

        Ok(FfmpegRangeHandle { child })
    }
}

/// A running `ffmpeg` ranged export.
#[derive(Debug)]
pub struct FfmpegRangeHandle {
    child: Child,
}

impl RangeHandle for FfmpegRangeHandle {
    fn poll(&mut self) -> Result<bool, FrameGrabError> {
        match self.child.try_wait()? {
            Some(status) => {
                if !status.success() {
                    log::debug!("Ranged export exited with {status}");
                }
                Ok(false)
            }
            None => Ok(true),
        }
    }

    fn terminate(&mut self) {
        if let Err(error) = self.child.start_kill() {
            log::debug!("Could not kill ranged export: {error}");
        }
    }
}
