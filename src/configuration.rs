//! Orchestrator configuration.
//!
//! [`ExtractOptions`] is a builder that carries the operational knobs of an
//! [`Orchestrator`](crate::Orchestrator) (preview throttling, stop grace
//! period, output image format, and so on) without polluting every
//! signature. Per-run choices such as stride or sample count live on
//! [`ExtractionJob`](crate::ExtractionJob) instead.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use framegrab::ExtractOptions;
//!
//! let options = ExtractOptions::new()
//!     .with_preview_interval(25)
//!     .with_grace_period(Duration::from_millis(500))
//!     .with_image_extension("jpg")
//!     .unwrap();
//! assert_eq!(options.image_extension(), "jpg");
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::path::Path;
use std::time::Duration;

use image::ImageFormat;

use crate::error::FrameGrabError;

/// Emit a new preview path every this many completions.
pub const DEFAULT_PREVIEW_INTERVAL: u64 = 10;

/// How long in-flight decodes may keep running after a stop request.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(2);

/// How often a ranged export is polled for new files.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Extensions picked up when a whole folder is selected.
pub const DEFAULT_VIDEO_EXTENSIONS: [&str; 3] = ["mp4", "mov", "mkv"];

/// Image formats the decoder is asked to write.
const SUPPORTED_FORMATS: [ImageFormat; 5] = [
    ImageFormat::Png,
    ImageFormat::Jpeg,
    ImageFormat::Bmp,
    ImageFormat::Tiff,
    ImageFormat::WebP,
];

/// Configuration shared by every run of an orchestrator.
///
/// All fields have sensible defaults; a default-constructed value matches
/// the constants in this module.
#[derive(Clone)]
pub struct ExtractOptions {
    pub(crate) preview_interval: u64,
    pub(crate) grace_period: Duration,
    pub(crate) image_format: ImageFormat,
    pub(crate) poll_interval: Duration,
    pub(crate) video_extensions: Vec<String>,
}

impl Debug for ExtractOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ExtractOptions")
            .field("preview_interval", &self.preview_interval)
            .field("grace_period", &self.grace_period)
            .field("poll_interval", &self.poll_interval)
            .field("image_extension", &self.image_extension())
            .field("video_extensions", &self.video_extensions)
            .finish()
    }
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractOptions {
    /// Create options with default settings.
    pub fn new() -> Self {
        Self {
            preview_interval: DEFAULT_PREVIEW_INTERVAL,
            grace_period: DEFAULT_GRACE_PERIOD,
            image_format: ImageFormat::Png,
            poll_interval: DEFAULT_POLL_INTERVAL,
            video_extensions: DEFAULT_VIDEO_EXTENSIONS
                .iter()
                .map(|extension| extension.to_string())
                .collect(),
        }
    }

    /// Surface a fresh preview path every `interval` completions.
    ///
    /// The final completion of a video always carries its own preview.
    /// Clamped to a minimum of 1.
    #[must_use]
    pub fn with_preview_interval(mut self, interval: u64) -> Self {
        self.preview_interval = interval.max(1);
        self
    }

    /// Time in-flight decodes get to finish after a stop before they are
    /// killed.
    #[must_use]
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Poll interval for ranged exports. Clamped to at least 1 ms.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// File extensions (case-insensitive, without the dot) that count as
    /// videos when a folder is selected.
    #[must_use]
    pub fn with_video_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.video_extensions = extensions
            .into_iter()
            .map(|extension| {
                extension
                    .as_ref()
                    .trim_start_matches('.')
                    .to_ascii_lowercase()
            })
            .collect();
        self
    }

    /// Write frames in `format`.
    ///
    /// # Errors
    ///
    /// Returns [`FrameGrabError::InvalidJobParameters`] for formats the
    /// decoder cannot produce.
    pub fn with_image_format(mut self, format: ImageFormat) -> Result<Self, FrameGrabError> {
        if !SUPPORTED_FORMATS.contains(&format) {
            return Err(FrameGrabError::InvalidJobParameters(format!(
                "unsupported image format: {format:?}"
            )));
        }
        self.image_format = format;
        Ok(self)
    }

    /// Write frames in the format implied by `extension` (`png`, `jpg`, ...).
    ///
    /// # Errors
    ///
    /// Returns [`FrameGrabError::InvalidJobParameters`] for unknown or
    /// unsupported extensions.
    pub fn with_image_extension(self, extension: &str) -> Result<Self, FrameGrabError> {
        let extension = extension.trim_start_matches('.');
        let format = ImageFormat::from_extension(extension).ok_or_else(|| {
            FrameGrabError::InvalidJobParameters(format!("unknown image extension: {extension}"))
        })?;
        self.with_image_format(format)
    }

    /// Extension used for output files.
    pub fn image_extension(&self) -> &'static str {
        self.image_format
            .extensions_str()
            .first()
            .copied()
            .unwrap_or("png")
    }

    /// Output image format.
    pub fn image_format(&self) -> ImageFormat {
        self.image_format
    }

    /// Preview throttle.
    pub fn preview_interval(&self) -> u64 {
        self.preview_interval
    }

    /// Stop grace period.
    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    /// Returns `true` if `path` has one of the configured video extensions.
    pub(crate) fn is_video(&self, path: &Path) -> bool {
        path.extension()
            .map(|extension| extension.to_string_lossy().to_ascii_lowercase())
            .is_some_and(|extension| self.video_extensions.contains(&extension))
    }
}
