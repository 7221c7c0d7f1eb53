//! Deterministic output naming.
//!
//! Every extracted frame lands at `{stem}_{index:06}.{ext}`, where `stem` is
//! the video's file stem with characters that are illegal in file names
//! replaced. Because the name depends only on the video and the frame index,
//! re-running a job writes to the same paths, and a plain existence check on
//! those names is enough to resume a partially completed job.

use std::collections::HashSet;
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::Path;

use crate::error::FrameGrabError;

/// Minimum number of digits used for the frame index in file names.
pub const FRAME_INDEX_WIDTH: usize = 6;

/// Replace characters that are not allowed in file names on common
/// platforms.
///
/// Reserved characters and control characters become `_`. Trailing dots and
/// spaces are trimmed (Windows rejects them), and an empty result becomes
/// `"video"`.
///
/// ```
/// use framegrab::naming::sanitize_stem;
///
/// assert_eq!(sanitize_stem("clip: take 2?"), "clip_ take 2_");
/// assert_eq!(sanitize_stem("..."), "video");
/// ```
pub fn sanitize_stem(stem: &str) -> String {
    let replaced: String = stem
        .chars()
        .map(|character| match character {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            character if character.is_control() => '_',
            character => character,
        })
        .collect();

    let trimmed = replaced.trim_end_matches(['.', ' ']);
    if trimmed.is_empty() {
        "video".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Sanitized file stem of a video path.
pub fn video_stem(video: &Path) -> String {
    let stem = video
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    sanitize_stem(&stem)
}

/// File name for a single extracted frame.
///
/// ```
/// use framegrab::naming::frame_file_name;
///
/// assert_eq!(frame_file_name("intro", 42, "png"), "intro_000042.png");
/// ```
pub fn frame_file_name(stem: &str, frame_index: u64, extension: &str) -> String {
    format!("{stem}_{frame_index:0width$}.{extension}", width = FRAME_INDEX_WIDTH)
}

/// `printf`-style pattern handed to the decoder for a ranged export.
///
/// Staged files are hidden and carry a sequence number rather than a frame
/// index; the orchestrator renames them to [`frame_file_name`] as they
/// complete.
pub fn staging_pattern(stem: &str, extension: &str) -> String {
    format!(".{stem}.range.%0{FRAME_INDEX_WIDTH}d.{extension}")
}

/// Concrete staged file name for sequence number `ordinal`.
///
/// Matches what the decoder produces for [`staging_pattern`].
pub fn staging_file_name(stem: &str, ordinal: u64, extension: &str) -> String {
    format!(".{stem}.range.{ordinal:0width$}.{extension}", width = FRAME_INDEX_WIDTH)
}

/// Temporary name a single-frame decode writes to before it is renamed into
/// place. Keeps the extension so the decoder can infer the image format.
pub fn partial_file_name(file_name: &str) -> String {
    format!(".partial-{file_name}")
}

/// Snapshot of the file names already present in an output directory.
///
/// Built once per video before planning; the planner drops every target whose
/// [`frame_file_name`] appears here.
#[derive(Debug, Clone, Default)]
pub struct ExistingOutputs {
    names: HashSet<OsString>,
}

impl ExistingOutputs {
    /// An index with no files in it.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Read the entries of `directory`. A missing directory yields an empty
    /// index.
    ///
    /// # Errors
    ///
    /// Returns [`FrameGrabError::IoError`] if the directory exists but cannot
    /// be listed.
    pub fn scan(directory: &Path) -> Result<Self, FrameGrabError> {
        let entries = match std::fs::read_dir(directory) {
            Ok(entries) => entries,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(Self::empty()),
            Err(error) => return Err(error.into()),
        };

        let mut names = HashSet::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_type().is_ok_and(|kind| kind.is_file()) {
                names.insert(entry.file_name());
            }
        }
        Ok(Self { names })
    }

    /// Returns `true` if a file called `file_name` exists.
    pub fn contains(&self, file_name: &str) -> bool {
        self.names.contains(std::ffi::OsStr::new(file_name))
    }

    /// Record a file name.
    pub fn insert(&mut self, file_name: impl Into<OsString>) {
        self.names.insert(file_name.into());
    }

    /// Number of files seen.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns `true` if the directory held no files.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
