//! Work planning.
//!
//! The planner turns a job's mode and a video's metadata into the concrete
//! list of frame indices to decode. Targets whose output file already exists
//! are dropped before the plan is returned, so an interrupted job resumes
//! where it stopped instead of decoding everything again.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use framegrab::naming::ExistingOutputs;
//! use framegrab::planner::{PlanRequest, plan};
//! use framegrab::{ExtractionMode, VideoMetadata};
//!
//! let metadata = VideoMetadata::new(Duration::from_secs(4), 25.0, 100);
//! let existing = ExistingOutputs::empty();
//! let request = PlanRequest {
//!     mode: ExtractionMode::ExhaustiveRange { stride: 10, start: Some(0), end: Some(99) },
//!     bounded: true,
//!     stem: "clip",
//!     extension: "png",
//!     existing: &existing,
//! };
//!
//! let frame_plan = plan(&request, &metadata, &mut rand::thread_rng());
//! assert_eq!(frame_plan.indices(), &[0, 10, 20, 30, 40, 50, 60, 70, 80, 90]);
//! ```

use std::collections::HashSet;

use rand::Rng;
use rand::seq::index;

use crate::job::ExtractionMode;
use crate::metadata::VideoMetadata;
use crate::naming::{ExistingOutputs, frame_file_name};

/// The frames one video still needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[must_use]
pub struct FramePlan {
    indices: Vec<u64>,
    skipped_existing: u64,
}

impl FramePlan {
    /// Target frame indices, ascending and without duplicates.
    pub fn indices(&self) -> &[u64] {
        &self.indices
    }

    /// Number of targets still to decode.
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Returns `true` if nothing is left to decode.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Targets that were already on disk and therefore left out.
    pub fn skipped_existing(&self) -> u64 {
        self.skipped_existing
    }

    pub(crate) fn into_indices(self) -> Vec<u64> {
        self.indices
    }
}

/// Everything about a video the planner needs besides its metadata.
#[derive(Debug, Clone, Copy)]
pub struct PlanRequest<'a> {
    /// What to extract.
    pub mode: ExtractionMode,
    /// Whether explicit frame bounds apply. Folder jobs always cover the
    /// whole video.
    pub bounded: bool,
    /// Sanitized video stem used for output names.
    pub stem: &'a str,
    /// Output image extension.
    pub extension: &'a str,
    /// Files already present in the output directory.
    pub existing: &'a ExistingOutputs,
}

impl PlanRequest<'_> {
    fn exists(&self, frame_index: u64) -> bool {
        !self.existing.is_empty()
            && self
                .existing
                .contains(&frame_file_name(self.stem, frame_index, self.extension))
    }
}

/// Compute the plan for one video.
///
/// * Exhaustive: every `stride`-th index from `start` to `end`, clamped to
///   the video's frames, minus indices whose output exists.
/// * Random: `min(count, frame_count)` distinct indices drawn without
///   replacement. Indices already on disk count toward the sample, so only
///   the shortfall is drawn (from indices not yet extracted).
///
/// Outputs are recognised by name alone, so frames left by any earlier run
/// into the same directory count, whatever its mode. A random job pointed at
/// a directory that already holds `count` frames of the video from an
/// exhaustive run plans nothing; give it its own output directory to draw a
/// fresh sample.
pub fn plan<R: Rng + ?Sized>(
    request: &PlanRequest<'_>,
    metadata: &VideoMetadata,
    rng: &mut R,
) -> FramePlan {
    let frame_count = metadata.frame_count;

    match request.mode {
        ExtractionMode::ExhaustiveRange { stride, start, end } => {
            let (start, end) = if request.bounded {
                (start, end)
            } else {
                (None, None)
            };
            let targets = exhaustive_targets(frame_count, stride, start, end);
            let total = targets.len() as u64;
            let indices: Vec<u64> = targets
                .into_iter()
                .filter(|&frame_index| !request.exists(frame_index))
                .collect();

            FramePlan {
                skipped_existing: total - indices.len() as u64,
                indices,
            }
        }
        ExtractionMode::RandomSample { count } => {
            let wanted = count.min(frame_count);
            let present: HashSet<u64> = if request.existing.is_empty() {
                HashSet::new()
            } else {
                (0..frame_count)
                    .filter(|&frame_index| request.exists(frame_index))
                    .collect()
            };

            let satisfied = (present.len() as u64).min(wanted);
            let needed = wanted - satisfied;
            let indices = random_targets(rng, frame_count, needed, &present);

            FramePlan {
                indices,
                skipped_existing: satisfied,
            }
        }
    }
}

/// Arithmetic sequence `start, start + stride, ...` up to `end` inclusive.
///
/// A zero stride is treated as 1. Missing bounds default to the first and
/// last frame; `end` is clamped to the last frame. Returns an empty vector
/// when the clamped range is empty.
pub fn exhaustive_targets(
    frame_count: u64,
    stride: u64,
    start: Option<u64>,
    end: Option<u64>,
) -> Vec<u64> {
    if frame_count == 0 {
        return Vec::new();
    }

    let last = frame_count - 1;
    let start = start.unwrap_or(0);
    let end = end.unwrap_or(last).min(last);
    if start > end {
        return Vec::new();
    }

    let step = usize::try_from(stride.max(1)).unwrap_or(usize::MAX);
    (start..=end).step_by(step).collect()
}

/// Draw `amount` distinct indices from `[0, frame_count)` that are not in
/// `excluded`, returned ascending.
fn random_targets<R: Rng + ?Sized>(
    rng: &mut R,
    frame_count: u64,
    amount: u64,
    excluded: &HashSet<u64>,
) -> Vec<u64> {
    if amount == 0 {
        return Vec::new();
    }

    let mut indices: Vec<u64> = if excluded.is_empty() {
        index::sample(rng, frame_count as usize, amount as usize)
            .into_iter()
            .map(|frame_index| frame_index as u64)
            .collect()
    } else {
        let candidates: Vec<u64> = (0..frame_count)
            .filter(|frame_index| !excluded.contains(frame_index))
            .collect();
        let amount = (amount as usize).min(candidates.len());
        index::sample(rng, candidates.len(), amount)
            .into_iter()
            .map(|position| candidates[position])
            .collect()
    };

    indices.sort_unstable();
    indices
}
