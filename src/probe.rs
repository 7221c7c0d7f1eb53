//! Media probing.
//!
//! [`MediaProber`] is the seam between the planner and whatever tool reads
//! video metadata. [`FfprobeProber`] shells out to `ffprobe`, and
//! [`MetadataCache`] memoizes results (including failures) so every video is
//! probed at most once per session.
//!
//! # Example
//!
//! ```no_run
//! use framegrab::{FfprobeProber, MediaProber};
//!
//! # async fn example() -> Result<(), framegrab::FrameGrabError> {
//! let prober = FfprobeProber::new();
//! let metadata = prober.probe_metadata("input.mp4".as_ref()).await?;
//! println!("{} frames @ {:.3} fps", metadata.frame_count, metadata.frames_per_second);
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::process::Command;
use tokio::sync::OnceCell;

use crate::error::FrameGrabError;
use crate::metadata::VideoMetadata;

/// Reads duration, frame rate, and frame count of a video.
///
/// Implementations must be cheap to share between tasks: the orchestrator
/// holds one prober for its whole lifetime and probes from its coordinator
/// task.
pub trait MediaProber: Send + Sync + 'static {
    /// Container duration.
    fn probe_duration(
        &self,
        video: &Path,
    ) -> impl Future<Output = Result<Duration, FrameGrabError>> + Send;

    /// Frames per second of the first video stream.
    fn probe_frame_rate(
        &self,
        video: &Path,
    ) -> impl Future<Output = Result<f64, FrameGrabError>> + Send;

    /// Frame count recorded by the container.
    fn probe_frame_count(
        &self,
        video: &Path,
    ) -> impl Future<Output = Result<u64, FrameGrabError>> + Send;

    /// Probe everything the planner needs.
    ///
    /// Duration and frame rate are mandatory. When the frame count cannot be
    /// read it is estimated from the other two.
    ///
    /// # Errors
    ///
    /// Returns [`FrameGrabError::MetadataUnavailable`] when any mandatory
    /// value is missing or not positive.
    fn probe_metadata(
        &self,
        video: &Path,
    ) -> impl Future<Output = Result<VideoMetadata, FrameGrabError>> + Send {
        async move {
            let duration = self
                .probe_duration(video)
                .await
                .map_err(|error| FrameGrabError::metadata(video, error))?;
            let frames_per_second = self
                .probe_frame_rate(video)
                .await
                .map_err(|error| FrameGrabError::metadata(video, error))?;

            let frame_count = match self.probe_frame_count(video).await {
                Ok(count) if count > 0 => count,
                Ok(_) | Err(_) => {
                    log::debug!(
                        "No frame count recorded for {}, estimating from duration",
                        video.display()
                    );
                    VideoMetadata::estimate_frame_count(duration, frames_per_second)
                }
            };

            VideoMetadata::new(duration, frames_per_second, frame_count).validate(video)
        }
    }
}

/// [`MediaProber`] backed by the `ffprobe` command-line tool.
///
/// Every probe runs `ffprobe -v error ... -of json` and parses the JSON
/// output. A non-zero exit status or unparsable output is an error.
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    binary: PathBuf,
}

impl Default for FfprobeProber {
    fn default() -> Self {
        Self::new()
    }
}

impl FfprobeProber {
    /// Use `ffprobe` from `PATH`.
    pub fn new() -> Self {
        Self {
            binary: PathBuf::from("ffprobe"),
        }
    }

    /// Use a specific `ffprobe` executable.
    #[must_use]
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    async fn run_json(&self, video: &Path, entries: &[&str]) -> Result<Value, FrameGrabError> {
        let output = Command::new(&self.binary)
            .args(["-v", "error"])
            .args(entries)
            .args(["-of", "json"])
            .arg(video)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|error| FrameGrabError::ToolFailed {
                tool: "ffprobe".to_string(),
                reason: error.to_string(),
            })?;

        if !output.status.success() {
            return Err(FrameGrabError::ToolFailed {
                tool: "ffprobe".to_string(),
                reason: format!(
                    "{} ({})",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|error| FrameGrabError::ProbeParse(error.to_string()))
    }

    async fn first_stream_field(&self, video: &Path, field: &str) -> Result<String, FrameGrabError> {
        let entries = format!("stream={field}");
        let json = self
            .run_json(video, &["-select_streams", "v:0", "-show_entries", &entries])
            .await?;
        json.get("streams")
            .and_then(Value::as_array)
            .and_then(|streams| streams.first())
            .and_then(|stream| json_string(stream.get(field)?))
            .ok_or_else(|| FrameGrabError::ProbeParse(format!("no {field} in ffprobe output")))
    }
}

impl MediaProber for FfprobeProber {
    async fn probe_duration(&self, video: &Path) -> Result<Duration, FrameGrabError> {
        let json = self
            .run_json(video, &["-show_entries", "format=duration"])
            .await?;
        let raw = json
            .get("format")
            .and_then(|format| json_string(format.get("duration")?))
            .ok_or_else(|| FrameGrabError::ProbeParse("no duration in ffprobe output".into()))?;
        parse_duration(&raw)
            .ok_or_else(|| FrameGrabError::ProbeParse(format!("invalid duration: {raw}")))
    }

    async fn probe_frame_rate(&self, video: &Path) -> Result<f64, FrameGrabError> {
        let raw = self.first_stream_field(video, "r_frame_rate").await?;
        parse_frame_rate(&raw)
            .ok_or_else(|| FrameGrabError::ProbeParse(format!("invalid frame rate: {raw}")))
    }

    async fn probe_frame_count(&self, video: &Path) -> Result<u64, FrameGrabError> {
        let raw = self.first_stream_field(video, "nb_frames").await?;
        raw.trim()
            .parse::<u64>()
            .map_err(|_| FrameGrabError::ProbeParse(format!("invalid frame count: {raw}")))
    }
}

/// ffprobe reports numbers as strings in JSON output; accept both.
fn json_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Parse a seconds value such as `"12.480000"`.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let seconds = raw.trim().parse::<f64>().ok()?;
    if !seconds.is_finite() || seconds <= 0.0 {
        return None;
    }
    Some(Duration::from_secs_f64(seconds))
}

/// Parse a rational frame rate such as `"30000/1001"` (or a plain number).
pub fn parse_frame_rate(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    let rate = match raw.split_once('/') {
        Some((numerator, denominator)) => {
            let numerator = numerator.trim().parse::<f64>().ok()?;
            let denominator = denominator.trim().parse::<f64>().ok()?;
            if denominator == 0.0 {
                return None;
            }
            numerator / denominator
        }
        None => raw.parse::<f64>().ok()?,
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}

type CacheSlot = Arc<OnceCell<Result<VideoMetadata, String>>>;

/// Session-wide memo of probe results, keyed by video path.
///
/// Failures are cached too, so an unreadable video is reported as skipped
/// without re-running the prober. Entries are never invalidated: a video is
/// assumed not to change while the process runs. Concurrent lookups of the
/// same path wait on a single probe.
#[derive(Debug, Clone, Default)]
pub struct MetadataCache {
    entries: Arc<Mutex<HashMap<PathBuf, CacheSlot>>>,
}

impl MetadataCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return cached metadata for `video`, probing it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`FrameGrabError::MetadataUnavailable`] if the probe failed,
    /// now or on an earlier call.
    pub async fn get_or_probe<P: MediaProber>(
        &self,
        prober: &P,
        video: &Path,
    ) -> Result<VideoMetadata, FrameGrabError> {
        let slot = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            entries.entry(video.to_path_buf()).or_default().clone()
        };

        let cached = slot
            .get_or_init(|| async {
                log::debug!("Probing {}", video.display());
                prober
                    .probe_metadata(video)
                    .await
                    .map_err(|error| match error {
                        FrameGrabError::MetadataUnavailable { reason, .. } => reason,
                        other => other.to_string(),
                    })
            })
            .await;

        cached
            .clone()
            .map_err(|reason| FrameGrabError::metadata(video, reason))
    }

    /// Look up a finished probe without triggering one.
    pub fn cached(&self, video: &Path) -> Option<Result<VideoMetadata, String>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get(video).and_then(|slot| slot.get().cloned())
    }

    /// Number of videos with a finished probe.
    pub fn len(&self) -> usize {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.values().filter(|slot| slot.initialized()).count()
    }

    /// Returns `true` if nothing has been probed yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_duration, parse_frame_rate};

    #[test]
    fn frame_rate_rationals() {
        assert_eq!(parse_frame_rate("25/1"), Some(25.0));
        let ntsc = parse_frame_rate("30000/1001").unwrap();
        assert!((ntsc - 29.97).abs() < 0.01);
        assert_eq!(parse_frame_rate("24"), Some(24.0));
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("N/A"), None);
        assert_eq!(parse_frame_rate(""), None);
    }

    #[test]
    fn duration_seconds() {
        assert_eq!(parse_duration("12.5").unwrap().as_millis(), 12_500);
        assert!(parse_duration("0.000000").is_none());
        assert!(parse_duration("-1").is_none());
        assert!(parse_duration("N/A").is_none());
    }
}
