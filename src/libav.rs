//! In-process probing through libav.
//!
//! [`LibavProber`] reads the same three values as
//! [`FfprobeProber`](crate::FfprobeProber) but opens the container with
//! `ffmpeg-next` instead of spawning a process, which is noticeably faster
//! when a folder job holds many short clips. Demuxer work runs on
//! `tokio::task::spawn_blocking` so it never stalls the coordinator.
//!
//! Requires the `libav` feature and FFmpeg development libraries.

use std::path::Path;
use std::time::Duration;

use ffmpeg_next::{Rational, media::Type};
use tokio::task::JoinError;

use crate::error::FrameGrabError;
use crate::metadata::VideoMetadata;
use crate::probe::MediaProber;

/// Values read from one open of the container.
struct StreamFacts {
    duration: Duration,
    frames_per_second: f64,
    frame_count: u64,
}

/// [`MediaProber`] that opens the container in-process.
#[derive(Debug, Clone, Copy, Default)]
pub struct LibavProber;

impl LibavProber {
    /// Create a prober. FFmpeg is initialised lazily on first use.
    pub fn new() -> Self {
        Self
    }

    async fn facts(&self, video: &Path) -> Result<StreamFacts, FrameGrabError> {
        let path = video.to_path_buf();
        tokio::task::spawn_blocking(move || read_facts(&path))
            .await
            .map_err(blocking_task_failed)?
    }
}

fn blocking_task_failed(error: JoinError) -> FrameGrabError {
    FrameGrabError::ToolFailed {
        tool: "libav".to_string(),
        reason: error.to_string(),
    }
}

fn rational_to_f64(rational: Rational) -> Option<f64> {
    (rational.denominator() != 0 && rational.numerator() > 0)
        .then(|| rational.numerator() as f64 / rational.denominator() as f64)
}

fn read_facts(path: &Path) -> Result<StreamFacts, FrameGrabError> {
    // Safe to call multiple times.
    ffmpeg_next::init()?;

    let input_context = ffmpeg_next::format::input(path)
        .map_err(|error| FrameGrabError::metadata(path, error))?;

    let duration_microseconds = input_context.duration();
    let duration = if duration_microseconds > 0 {
        Duration::from_micros(duration_microseconds as u64)
    } else {
        Duration::ZERO
    };

    let stream = input_context
        .streams()
        .best(Type::Video)
        .ok_or_else(|| FrameGrabError::metadata(path, "no video stream"))?;

    let frames_per_second = rational_to_f64(stream.avg_frame_rate())
        .or_else(|| rational_to_f64(stream.rate()))
        .unwrap_or(0.0);

    Ok(StreamFacts {
        duration,
        frames_per_second,
        frame_count: stream.frames().max(0) as u64,
    })
}

impl MediaProber for LibavProber {
    async fn probe_duration(&self, video: &Path) -> Result<Duration, FrameGrabError> {
        Ok(self.facts(video).await?.duration)
    }

    async fn probe_frame_rate(&self, video: &Path) -> Result<f64, FrameGrabError> {
        Ok(self.facts(video).await?.frames_per_second)
    }

    async fn probe_frame_count(&self, video: &Path) -> Result<u64, FrameGrabError> {
        Ok(self.facts(video).await?.frame_count)
    }

    /// One container open for all three values.
    async fn probe_metadata(
        &self,
        video: &Path,
    ) -> Result<VideoMetadata, FrameGrabError> {
        let facts = self.facts(video).await?;
        let frame_count = if facts.frame_count > 0 {
            facts.frame_count
        } else {
            VideoMetadata::estimate_frame_count(facts.duration, facts.frames_per_second)
        };
        VideoMetadata::new(facts.duration, facts.frames_per_second, frame_count)
            .validate(video)
    }
}
