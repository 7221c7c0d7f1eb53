//! Job descriptions.
//!
//! An [`ExtractionJob`] says which videos to read, which frames to pull out
//! of them, and where to put the results. It is built with a small builder,
//! validated once by [`Orchestrator::run`](crate::Orchestrator::run), and
//! never changes afterwards.
//!
//! # Example
//!
//! ```
//! use framegrab::{ExtractionJob, VideoSelection};
//!
//! // Every 10th frame between 100 and 400 of one video.
//! let job = ExtractionJob::exhaustive(VideoSelection::Single("talk.mp4".into()))
//!     .with_stride(10)
//!     .with_bounds(Some(100), Some(400))
//!     .with_output_dir("frames");
//!
//! // 50 random frames from every video in a folder.
//! let job = ExtractionJob::random(VideoSelection::Folder("videos".into()), 50)
//!     .with_parallelism(4);
//! ```

use std::path::{Path, PathBuf};

use crate::configuration::ExtractOptions;
use crate::error::FrameGrabError;

/// Output directory used when a job does not name one.
pub const DEFAULT_OUTPUT_DIR: &str = "ExtractedFrames";

/// Upper bound of the default parallelism.
const DEFAULT_PARALLELISM_CAP: usize = 8;

/// Which videos a job reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoSelection {
    /// One video file.
    Single(PathBuf),
    /// Every file with a video extension directly inside a directory.
    Folder(PathBuf),
}

/// What to extract from each video.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionMode {
    /// Every `stride`-th frame in `[start, end]` (inclusive, zero-based).
    ///
    /// Bounds are honoured only for [`VideoSelection::Single`]; missing bounds
    /// default to the first and last frame.
    ExhaustiveRange {
        /// Spacing between targets. Zero is treated as 1.
        stride: u64,
        /// First frame, inclusive.
        start: Option<u64>,
        /// Last frame, inclusive.
        end: Option<u64>,
    },
    /// `count` distinct frames drawn uniformly from the whole video.
    RandomSample {
        /// Requested sample size.
        count: u64,
    },
}

/// How exhaustive work is handed to the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubmissionStyle {
    /// One decode per target frame, `parallelism` at a time.
    #[default]
    PerFrame,
    /// One ranged decode for the whole span (exhaustive mode only).
    Streaming,
}

/// A description of one extraction run.
#[derive(Debug, Clone)]
#[must_use]
pub struct ExtractionJob {
    selection: VideoSelection,
    mode: ExtractionMode,
    output_dir: Option<PathBuf>,
    parallelism: Option<usize>,
    submission: SubmissionStyle,
    seed: Option<u64>,
}

impl ExtractionJob {
    /// Extract every frame (stride 1) of the selected videos.
    pub fn exhaustive(selection: VideoSelection) -> Self {
        Self::new(
            selection,
            ExtractionMode::ExhaustiveRange {
                stride: 1,
                start: None,
                end: None,
            },
        )
    }

    /// Extract `count` random frames from each selected video.
    pub fn random(selection: VideoSelection, count: u64) -> Self {
        Self::new(selection, ExtractionMode::RandomSample { count })
    }

    /// Build a job from an explicit mode.
    pub fn new(selection: VideoSelection, mode: ExtractionMode) -> Self {
        Self {
            selection,
            mode,
            output_dir: None,
            parallelism: None,
            submission: SubmissionStyle::PerFrame,
            seed: None,
        }
    }

    /// Set the stride of an exhaustive job. Zero is treated as 1. Has no
    /// effect on random jobs.
    pub fn with_stride(mut self, stride: u64) -> Self {
        if let ExtractionMode::ExhaustiveRange { stride: current, .. } = &mut self.mode {
            *current = stride.max(1);
        }
        self
    }

    /// Set inclusive frame bounds of an exhaustive single-video job. Folder
    /// jobs ignore them and skip their validation.
    pub fn with_bounds(mut self, start: Option<u64>, end: Option<u64>) -> Self {
        if let ExtractionMode::ExhaustiveRange {
            start: current_start,
            end: current_end,
            ..
        } = &mut self.mode
        {
            *current_start = start;
            *current_end = end;
        }
        self
    }

    /// Write frames under `directory` (created if absent).
    pub fn with_output_dir(mut self, directory: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(directory.into());
        self
    }

    /// Run at most `parallelism` decodes at once. Values above the number of
    /// available cores are clamped; zero is rejected by
    /// [`Orchestrator::run`](crate::Orchestrator::run).
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = Some(parallelism);
        self
    }

    /// Choose between per-frame decodes and a single ranged decode.
    pub fn with_submission(mut self, submission: SubmissionStyle) -> Self {
        self.submission = submission;
        self
    }

    /// Seed the random sampler so a random job picks reproducible frames.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Selected videos.
    pub fn selection(&self) -> &VideoSelection {
        &self.selection
    }

    /// Extraction mode.
    pub fn mode(&self) -> ExtractionMode {
        self.mode
    }

    /// Submission style.
    pub fn submission(&self) -> SubmissionStyle {
        self.submission
    }

    /// Sampler seed, if any.
    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Validate the job and resolve every default.
    ///
    /// Creates the output directory and lists the selected folder.
    pub(crate) fn prepare(self, options: &ExtractOptions) -> Result<PreparedJob, FrameGrabError> {
        let invalid = |message: String| Err(FrameGrabError::InvalidJobParameters(message));

        match self.mode {
            ExtractionMode::RandomSample { count: 0 } => {
                return invalid("random sample count must be positive".into());
            }
            ExtractionMode::ExhaustiveRange {
                start: Some(start),
                end: Some(end),
                ..
            } if start > end && matches!(self.selection, VideoSelection::Single(_)) => {
                return invalid(format!("start frame {start} is after end frame {end}"));
            }
            ExtractionMode::RandomSample { .. } if self.submission == SubmissionStyle::Streaming => {
                return invalid("streaming submission only applies to exhaustive jobs".into());
            }
            _ => {}
        }

        let available = available_parallelism();
        let parallelism = match self.parallelism {
            Some(0) => return invalid("parallelism must be positive".into()),
            Some(requested) if requested > available => {
                log::warn!("Parallelism {requested} exceeds {available} available cores, clamping");
                available
            }
            Some(requested) => requested,
            None => default_parallelism(),
        };

        let (videos, bounded) = match &self.selection {
            VideoSelection::Single(path) => {
                if path.as_os_str().is_empty() {
                    return invalid("no video selected".into());
                }
                (vec![path.clone()], true)
            }
            VideoSelection::Folder(directory) => {
                if !directory.is_dir() {
                    return invalid(format!("{} is not a directory", directory.display()));
                }
                (list_videos(directory, options)?, false)
            }
        };

        let output_dir = self
            .output_dir
            .filter(|directory| !directory.to_string_lossy().trim().is_empty())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));
        std::fs::create_dir_all(&output_dir)?;

        Ok(PreparedJob {
            videos,
            mode: self.mode,
            bounded,
            output_dir,
            parallelism,
            submission: self.submission,
            seed: self.seed,
        })
    }
}

/// A validated job with every default resolved.
#[derive(Debug, Clone)]
pub(crate) struct PreparedJob {
    pub(crate) videos: Vec<PathBuf>,
    pub(crate) mode: ExtractionMode,
    /// Whether frame bounds apply (single-video jobs only).
    pub(crate) bounded: bool,
    pub(crate) output_dir: PathBuf,
    pub(crate) parallelism: usize,
    pub(crate) submission: SubmissionStyle,
    pub(crate) seed: Option<u64>,
}

/// Number of cores available to this process (at least 1).
pub fn available_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|count| count.get())
        .unwrap_or(1)
}

/// Parallelism used when a job does not set one.
pub fn default_parallelism() -> usize {
    available_parallelism().min(DEFAULT_PARALLELISM_CAP)
}

/// Video files directly inside `directory`, sorted by path.
fn list_videos(directory: &Path, options: &ExtractOptions) -> Result<Vec<PathBuf>, FrameGrabError> {
    let mut videos = Vec::new();
    for entry in std::fs::read_dir(directory)? {
        let path = entry?.path();
        if path.is_file() && options.is_video(&path) {
            videos.push(path);
        }
    }
    videos.sort();

    if videos.is_empty() {
        log::warn!("No videos found in {}", directory.display());
    }
    Ok(videos)
}
