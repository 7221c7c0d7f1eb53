//! Video metadata types.
//!
//! [`VideoMetadata`] is what the planner needs to know about a video before it
//! can compute targets: how long it is, how fast it plays, and how many frames
//! it holds. Values are produced by a [`MediaProber`](crate::MediaProber) and
//! cached by the orchestrator for the rest of the session.

use std::path::Path;
use std::time::Duration;

use crate::error::FrameGrabError;

/// Probed metadata for a single video.
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use framegrab::VideoMetadata;
///
/// let metadata = VideoMetadata::new(Duration::from_secs(4), 25.0, 100);
/// assert_eq!(metadata.frame_to_timestamp(50), Duration::from_secs(2));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[must_use]
pub struct VideoMetadata {
    /// Container duration.
    pub duration: Duration,
    /// Frames per second (may be approximate for variable-frame-rate content).
    pub frames_per_second: f64,
    /// Total number of frames. Estimated from duration and frame rate when
    /// the container does not record it.
    pub frame_count: u64,
}

impl VideoMetadata {
    /// Build metadata from already-known values.
    pub fn new(duration: Duration, frames_per_second: f64, frame_count: u64) -> Self {
        Self {
            duration,
            frames_per_second,
            frame_count,
        }
    }

    /// Estimate the frame count as `floor(duration * fps)`.
    pub fn estimate_frame_count(duration: Duration, frames_per_second: f64) -> u64 {
        (duration.as_secs_f64() * frames_per_second).floor().max(0.0) as u64
    }

    /// Presentation time of a zero-based frame index.
    pub fn frame_to_timestamp(&self, frame_index: u64) -> Duration {
        if self.frames_per_second <= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(frame_index as f64 / self.frames_per_second)
    }

    /// Reject metadata that cannot drive a plan.
    pub(crate) fn validate(self, path: &Path) -> Result<Self, FrameGrabError> {
        if self.duration.is_zero() {
            return Err(FrameGrabError::metadata(path, "duration is not positive"));
        }
        if !self.frames_per_second.is_finite() || self.frames_per_second <= 0.0 {
            return Err(FrameGrabError::metadata(
                path,
                format!("frame rate {} is not positive", self.frames_per_second),
            ));
        }
        if self.frame_count == 0 {
            return Err(FrameGrabError::metadata(path, "frame count is zero"));
        }
        Ok(self)
    }
}
