//! Error types for the `framegrab` crate.
//!
//! This module defines [`FrameGrabError`], the unified error type returned by
//! all fallible operations in the crate. Only a handful of variants ever abort
//! a job: per-video and per-frame problems are reported through the update
//! stream instead (see [`crate::UpdateKind`]).

use std::{io::Error as IoError, path::PathBuf};

use thiserror::Error;

/// The unified error type for all `framegrab` operations.
///
/// Variants carry enough context to diagnose the problem without needing
/// additional logging at the call site.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FrameGrabError {
    /// Duration, frame rate, or frame count could not be read, or was not
    /// positive. The orchestrator skips the video and carries on.
    #[error("Unreadable metadata for {path}: {reason}")]
    MetadataUnavailable {
        /// Video whose probe failed.
        path: PathBuf,
        /// Why the probe was rejected.
        reason: String,
    },

    /// A single-frame decode finished without producing an output file.
    #[error("Decoding frame {frame} of {path} produced no output")]
    DecodeTaskFailed {
        /// Video the frame belongs to.
        path: PathBuf,
        /// Zero-based frame index.
        frame: u64,
    },

    /// The job description was rejected before any work started.
    #[error("Invalid job parameters: {0}")]
    InvalidJobParameters(String),

    /// The operation was stopped via a
    /// [`CancellationController`](crate::CancellationController).
    #[error("Operation cancelled")]
    Cancelled,

    /// An external tool could not be launched or exited unsuccessfully.
    #[error("{tool} failed: {reason}")]
    ToolFailed {
        /// Program name (e.g. `"ffprobe"`).
        tool: String,
        /// Exit status or launch error.
        reason: String,
    },

    /// Tool output could not be parsed.
    #[error("Failed to parse probe output: {0}")]
    ProbeParse(String),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    IoError(#[from] IoError),
}

impl FrameGrabError {
    /// Wrap any error as [`FrameGrabError::MetadataUnavailable`] for `path`.
    pub(crate) fn metadata(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        FrameGrabError::MetadataUnavailable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(feature = "libav")]
impl From<ffmpeg_next::Error> for FrameGrabError {
    fn from(error: ffmpeg_next::Error) -> Self {
        FrameGrabError::ToolFailed {
            tool: "libav".to_string(),
            reason: error.to_string(),
        }
    }
}
