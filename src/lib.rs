//! # framegrab
//!
//! Pull still frames out of video files, either every Nth frame of a range
//! or a random sample, by driving `ffmpeg` from a bounded pool of concurrent
//! decodes.
//!
//! `framegrab` plans which frames a job still needs (frames already on disk
//! are never decoded twice), runs the decodes with a fixed upper bound on
//! concurrency, and reports progress as a lazy stream of updates that the
//! caller consumes at its own pace. A [`CancellationController`] stops a job
//! between completions and terminates the decodes that are still running.
//!
//! ## Quick Start
//!
//! ### Every 30th Frame of One Video
//!
//! ```no_run
//! use tokio_stream::StreamExt;
//!
//! use framegrab::{ExtractionJob, Orchestrator, UpdateKind, VideoSelection};
//!
//! # async fn example() -> Result<(), framegrab::FrameGrabError> {
//! let orchestrator = Orchestrator::ffmpeg();
//! let job = ExtractionJob::exhaustive(VideoSelection::Single("talk.mp4".into()))
//!     .with_stride(30)
//!     .with_output_dir("frames");
//!
//! let mut updates = orchestrator.run(job)?;
//! while let Some(update) = updates.next().await {
//!     if let UpdateKind::Progress(info) = update.kind {
//!         println!("{}", info.line());
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### A Random Sample From a Folder, Without an Async Caller
//!
//! ```no_run
//! use framegrab::{ExtractionJob, Orchestrator, VideoSelection};
//!
//! let runtime = tokio::runtime::Runtime::new().unwrap();
//! let orchestrator = Orchestrator::ffmpeg();
//! let job = ExtractionJob::random(VideoSelection::Folder("clips".into()), 100).with_seed(7);
//!
//! let updates = {
//!     let _guard = runtime.enter();
//!     orchestrator.run(job).unwrap()
//! };
//! for update in updates.into_blocking_iter() {
//!     println!("{}", update.status);
//! }
//! ```
//!
//! ## Features
//!
//! - **Exhaustive ranges**: every `stride`-th frame between two bounds,
//!   decoded one frame per task or as a single streaming export
//! - **Random samples**: distinct frames drawn uniformly, reproducible with
//!   a seed; re-running a job tops the sample up instead of starting over
//! - **Deduplication**: output names are deterministic
//!   (`{video}_{frame:06}.{ext}`), and existing files are skipped
//! - **Bounded concurrency**: at most `parallelism` decodes run at once
//! - **Progress**: throughput, percentage, ETA, and a throttled preview path
//! - **Cancellation**: stops queued work at once and in-flight work after a
//!   short grace period
//! - **Metadata cache**: each video is probed once per session
//!
//! ### Optional Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `libav` | [`LibavProber`]: read metadata in-process through `ffmpeg-next` instead of running `ffprobe` |
//!
//! ## Requirements
//!
//! `ffmpeg` and `ffprobe` must be installed and on `PATH` (or configured via
//! [`FfmpegDecoder::with_binary`] and [`FfprobeProber::with_binary`]). The
//! `libav` feature additionally needs the FFmpeg development libraries.

pub mod cancellation;
pub mod configuration;
pub mod decoder;
pub mod error;
pub mod job;
#[cfg(feature = "libav")]
pub mod libav;
pub mod metadata;
pub mod naming;
pub mod orchestrator;
pub mod planner;
pub mod probe;
pub mod progress;
pub mod stream;

pub use cancellation::{CancellationController, Registration, Terminate};
pub use configuration::ExtractOptions;
pub use decoder::{
    FfmpegDecoder, FfmpegRangeHandle, FrameDecoder, FrameTarget, RangeHandle, RangeRequest,
};
pub use error::FrameGrabError;
pub use job::{ExtractionJob, ExtractionMode, SubmissionStyle, VideoSelection};
#[cfg(feature = "libav")]
pub use libav::LibavProber;
pub use metadata::VideoMetadata;
pub use orchestrator::Orchestrator;
pub use planner::{FramePlan, PlanRequest};
pub use probe::{FfprobeProber, MediaProber, MetadataCache};
pub use progress::{ProgressInfo, ProgressState};
pub use stream::{BlockingUpdates, ExtractionStream, ExtractionUpdate, UpdateKind};
