//! Progress accounting and formatting.
//!
//! [`ProgressState`] holds the per-video counters the orchestrator updates as
//! decodes complete. [`ProgressInfo`] is a point-in-time snapshot with the
//! derived values (throughput, percentage, ETA) plus a few formatting
//! helpers. Nothing derived is ever stored.
//!
//! # Example
//!
//! ```
//! use std::time::{Duration, Instant};
//!
//! use framegrab::ProgressState;
//!
//! let started = Instant::now();
//! let mut state = ProgressState::started_at(10, started);
//! for _ in 0..4 {
//!     state.record(true);
//! }
//!
//! let info = state.snapshot_at(started + Duration::from_secs(2));
//! assert_eq!(info.rate, 2.0);
//! assert_eq!(info.percent, 40.0);
//! assert_eq!(info.eta, Duration::from_secs(3));
//! assert_eq!(info.status("clip"), "clip: 4/10");
//! ```

use std::time::{Duration, Instant};

/// Width of the bar rendered by [`ProgressInfo::line`].
pub const BAR_WIDTH: usize = 30;

/// Elapsed time is floored to this before computing rates.
pub const MIN_ELAPSED: Duration = Duration::from_millis(1);

/// Mutable per-video counters.
///
/// Completion order does not matter: only the count is tracked. The
/// completed count never decreases and never exceeds the planned total.
#[derive(Debug, Clone)]
pub struct ProgressState {
    planned: u64,
    completed: u64,
    failed: u64,
    started: Instant,
}

impl ProgressState {
    /// Start tracking `planned` units now.
    pub fn new(planned: u64) -> Self {
        Self::started_at(planned, Instant::now())
    }

    /// Start tracking `planned` units from a given instant.
    pub fn started_at(planned: u64, started: Instant) -> Self {
        Self {
            planned,
            completed: 0,
            failed: 0,
            started,
        }
    }

    /// Record one finished unit and return the new completed count.
    ///
    /// Units beyond the planned total are ignored.
    pub fn record(&mut self, produced_output: bool) -> u64 {
        if self.completed < self.planned {
            self.completed += 1;
            if !produced_output {
                self.failed += 1;
            }
        }
        self.completed
    }

    /// Units planned.
    pub fn planned(&self) -> u64 {
        self.planned
    }

    /// Units finished, successful or not.
    pub fn completed(&self) -> u64 {
        self.completed
    }

    /// Units that finished without output.
    pub fn failed(&self) -> u64 {
        self.failed
    }

    /// Units that produced output.
    pub fn succeeded(&self) -> u64 {
        self.completed - self.failed
    }

    /// Returns `true` once every planned unit has finished.
    pub fn is_done(&self) -> bool {
        self.completed >= self.planned
    }

    /// Snapshot using the current time.
    pub fn snapshot(&self) -> ProgressInfo {
        self.snapshot_at(Instant::now())
    }

    /// Snapshot as of `now`.
    pub fn snapshot_at(&self, now: Instant) -> ProgressInfo {
        let elapsed = now.saturating_duration_since(self.started).max(MIN_ELAPSED);
        let rate = self.completed as f64 / elapsed.as_secs_f64();

        let percent = if self.planned == 0 {
            100.0
        } else {
            100.0 * self.completed as f64 / self.planned as f64
        };

        let remaining = self.planned.saturating_sub(self.completed);
        let eta = if rate > 0.0 {
            Duration::from_secs_f64(remaining as f64 / rate)
        } else {
            Duration::ZERO
        };

        ProgressInfo {
            planned: self.planned,
            completed: self.completed,
            failed: self.failed,
            elapsed,
            rate,
            percent,
            eta,
        }
    }
}

/// A snapshot of one video's progress.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressInfo {
    /// Units planned for this video.
    pub planned: u64,
    /// Units finished so far.
    pub completed: u64,
    /// Finished units that produced no output.
    pub failed: u64,
    /// Time since the video started running (at least [`MIN_ELAPSED`]).
    pub elapsed: Duration,
    /// Completed units per second.
    pub rate: f64,
    /// Completion percentage (0.0 – 100.0).
    pub percent: f64,
    /// Estimated time remaining; zero while the rate is unknown.
    pub eta: Duration,
}

impl ProgressInfo {
    /// Fixed-width bar such as `[=======   ]`.
    pub fn bar(&self, width: usize) -> String {
        let filled = if self.planned == 0 {
            width
        } else {
            ((self.completed as f64 / self.planned as f64) * width as f64) as usize
        };
        format!("[{:<width$}]", "=".repeat(filled.min(width)))
    }

    /// Full progress line: bar, counts, rate, ETA, and percentage.
    pub fn line(&self) -> String {
        format!(
            "{} {:4}/{:<4} | {:5.1} fps | ETA: {:5.1}s | {:5.1}%",
            self.bar(BAR_WIDTH),
            self.completed,
            self.planned,
            self.rate,
            self.eta.as_secs_f64(),
            self.percent
        )
    }

    /// Short status such as `"intro: 3/10"`.
    pub fn status(&self, name: &str) -> String {
        format!("{name}: {}/{}", self.completed, self.planned)
    }
}
