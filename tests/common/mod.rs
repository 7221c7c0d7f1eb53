//! Scripted prober and decoder shared by the integration tests.
//!
//! Neither touches ffmpeg: the prober answers from a table keyed by file
//! name, and the decoder writes a few bytes to each destination.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use framegrab::{
    ExtractionStream, ExtractionUpdate, FrameDecoder, FrameGrabError, FrameTarget, MediaProber,
    RangeHandle, RangeRequest, VideoMetadata,
};
use tokio_stream::StreamExt;

/// Metadata for a video of `frame_count` frames at 25 fps.
pub fn metadata(frame_count: u64) -> VideoMetadata {
    VideoMetadata::new(
        Duration::from_secs_f64(frame_count as f64 / 25.0),
        25.0,
        frame_count,
    )
}

/// Create an empty file standing in for a video.
pub fn touch(path: &Path) {
    std::fs::write(path, b"").expect("Failed to create placeholder video");
}

/// Sorted names of the non-hidden files in `directory`.
pub fn visible_files(directory: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(directory)
        .expect("Failed to list output directory")
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| !name.starts_with('.'))
        .collect();
    names.sort();
    names
}

/// Drain a stream to its end.
pub async fn collect(mut stream: ExtractionStream) -> Vec<ExtractionUpdate> {
    let mut updates = Vec::new();
    while let Some(update) = stream.next().await {
        updates.push(update);
    }
    updates
}

// ── Prober ─────────────────────────────────────────────────────────

/// Answers probes from a table keyed by file name.
#[derive(Default)]
pub struct ScriptedProber {
    videos: HashMap<String, VideoMetadata>,
    probes: AtomicUsize,
    delay: Duration,
}

impl ScriptedProber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_video(mut self, file_name: &str, metadata: VideoMetadata) -> Self {
        self.videos.insert(file_name.to_string(), metadata);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of full probes started.
    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    fn lookup(&self, video: &Path) -> Result<VideoMetadata, FrameGrabError> {
        let name = video
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.videos
            .get(&name)
            .copied()
            .ok_or_else(|| FrameGrabError::ToolFailed {
                tool: "ffprobe".to_string(),
                reason: format!("{name}: invalid data found when processing input"),
            })
    }
}

impl MediaProber for ScriptedProber {
    async fn probe_duration(&self, video: &Path) -> Result<Duration, FrameGrabError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.lookup(video).map(|metadata| metadata.duration)
    }

    async fn probe_frame_rate(&self, video: &Path) -> Result<f64, FrameGrabError> {
        self.lookup(video).map(|metadata| metadata.frames_per_second)
    }

    async fn probe_frame_count(&self, video: &Path) -> Result<u64, FrameGrabError> {
        self.lookup(video).map(|metadata| metadata.frame_count)
    }
}

// ── Decoder ────────────────────────────────────────────────────────

/// Writes a placeholder file per decode and records every call.
#[derive(Clone, Default)]
pub struct ScriptedDecoder {
    calls: Arc<Mutex<Vec<u64>>>,
    failing: Arc<HashSet<u64>>,
    panicking: Arc<HashSet<u64>>,
    block_after: Option<usize>,
    delay: Duration,
    staggered: bool,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    range_frames: u64,
    ranges: Arc<Mutex<Vec<RangeRequest>>>,
    range_terminated: Arc<AtomicBool>,
}

impl ScriptedDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames that decode without producing a file.
    pub fn failing(mut self, frames: impl IntoIterator<Item = u64>) -> Self {
        self.failing = Arc::new(frames.into_iter().collect());
        self
    }

    /// Frames whose decode panics.
    pub fn panicking(mut self, frames: impl IntoIterator<Item = u64>) -> Self {
        self.panicking = Arc::new(frames.into_iter().collect());
        self
    }

    /// Calls after the first `completed` never finish.
    pub fn blocking_after(mut self, completed: usize) -> Self {
        self.block_after = Some(completed);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Sleep 1 to 7 ms per frame, varying with the index, so decodes finish
    /// out of submission order.
    pub fn staggered(mut self) -> Self {
        self.staggered = true;
        self
    }

    /// Most decodes ever running at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Number of staged files a ranged export writes before exiting.
    pub fn with_range_frames(mut self, frames: u64) -> Self {
        self.range_frames = frames;
        self
    }

    /// Frame indices passed to `decode_single_frame`, in call order.
    pub fn calls(&self) -> Vec<u64> {
        self.calls.lock().unwrap().clone()
    }

    pub fn ranges(&self) -> Vec<RangeRequest> {
        self.ranges.lock().unwrap().clone()
    }

    pub fn range_terminated(&self) -> bool {
        self.range_terminated.load(Ordering::SeqCst)
    }
}

impl FrameDecoder for ScriptedDecoder {
    type Range = ScriptedRange;

    async fn decode_single_frame(
        &self,
        _video: &Path,
        target: FrameTarget,
        destination: &Path,
    ) -> Result<bool, FrameGrabError> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(target.index);
            calls.len()
        };
        let _active = ActiveDecode::enter(&self.active, &self.peak);

        if self.block_after.is_some_and(|limit| call > limit) {
            std::future::pending::<()>().await;
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.staggered {
            tokio::time::sleep(Duration::from_millis(1 + target.index * 5 % 7)).await;
        }
        if self.panicking.contains(&target.index) {
            panic!("decoder crashed on frame {}", target.index);
        }
        if self.failing.contains(&target.index) {
            return Ok(false);
        }

        std::fs::write(destination, target.index.to_le_bytes())?;
        Ok(true)
    }

    fn decode_range(
        &self,
        _video: &Path,
        request: &RangeRequest,
    ) -> Result<ScriptedRange, FrameGrabError> {
        self.ranges.lock().unwrap().push(request.clone());
        Ok(ScriptedRange {
            pattern: request.pattern.clone(),
            total: self.range_frames,
            written: 0,
            terminated: Arc::clone(&self.range_terminated),
        })
    }
}

/// Counts a running decode until dropped.
struct ActiveDecode<'a> {
    active: &'a AtomicUsize,
}

impl<'a> ActiveDecode<'a> {
    fn enter(active: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self { active }
    }
}

impl Drop for ActiveDecode<'_> {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Writes one staged file per poll until `total` are written.
pub struct ScriptedRange {
    pattern: PathBuf,
    total: u64,
    written: u64,
    terminated: Arc<AtomicBool>,
}

impl ScriptedRange {
    fn staged_path(&self, ordinal: u64) -> PathBuf {
        let pattern = self.pattern.to_string_lossy();
        PathBuf::from(pattern.replace("%06d", &format!("{ordinal:06}")))
    }
}

impl RangeHandle for ScriptedRange {
    fn poll(&mut self) -> Result<bool, FrameGrabError> {
        if self.terminated.load(Ordering::SeqCst) {
            return Ok(false);
        }
        if self.written < self.total {
            std::fs::write(self.staged_path(self.written), b"staged")?;
            self.written += 1;
        }
        Ok(self.written < self.total)
    }

    fn terminate(&mut self) {
        self.terminated.store(true, Ordering::SeqCst);
    }
}
