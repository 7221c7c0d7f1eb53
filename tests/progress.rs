//! Progress accounting and formatting tests.

use std::time::{Duration, Instant};

use framegrab::ProgressState;
use framegrab::progress::BAR_WIDTH;

// ── ProgressState ──────────────────────────────────────────────────

#[test]
fn record_counts_successes_and_failures() {
    let mut state = ProgressState::new(5);
    assert_eq!(state.record(true), 1);
    assert_eq!(state.record(false), 2);
    assert_eq!(state.record(true), 3);

    assert_eq!(state.completed(), 3);
    assert_eq!(state.failed(), 1);
    assert_eq!(state.succeeded(), 2);
    assert!(!state.is_done());
}

#[test]
fn record_never_exceeds_the_plan() {
    let mut state = ProgressState::new(2);
    for _ in 0..5 {
        state.record(true);
    }
    assert_eq!(state.completed(), 2);
    assert!(state.is_done());
}

// ── ProgressInfo ───────────────────────────────────────────────────

#[test]
fn snapshot_derives_rate_percent_and_eta() {
    let started = Instant::now();
    let mut state = ProgressState::started_at(100, started);
    for _ in 0..25 {
        state.record(true);
    }

    let info = state.snapshot_at(started + Duration::from_secs(5));
    assert_eq!(info.completed, 25);
    assert_eq!(info.planned, 100);
    assert_eq!(info.rate, 5.0);
    assert_eq!(info.percent, 25.0);
    assert_eq!(info.eta, Duration::from_secs(15));
    assert_eq!(info.elapsed, Duration::from_secs(5));
}

#[test]
fn snapshot_before_any_completion_has_no_eta() {
    let started = Instant::now();
    let state = ProgressState::started_at(10, started);

    let info = state.snapshot_at(started + Duration::from_secs(3));
    assert_eq!(info.rate, 0.0);
    assert_eq!(info.percent, 0.0);
    assert_eq!(info.eta, Duration::ZERO);
}

#[test]
fn snapshot_at_the_start_uses_a_minimum_elapsed_time() {
    let started = Instant::now();
    let mut state = ProgressState::started_at(10, started);
    state.record(true);

    let info = state.snapshot_at(started);
    assert_eq!(info.elapsed, Duration::from_millis(1));
    assert!(info.rate.is_finite());
    assert_eq!(info.rate, 1000.0);
}

#[test]
fn empty_plan_reports_complete() {
    let state = ProgressState::new(0);
    let info = state.snapshot();
    assert_eq!(info.percent, 100.0);
    assert_eq!(info.bar(10), "[==========]");
    assert!(state.is_done());
}

#[test]
fn bar_fills_proportionally() {
    let mut state = ProgressState::new(4);
    state.record(true);
    let info = state.snapshot();

    assert_eq!(info.bar(8), "[==      ]");
    assert_eq!(info.bar(0), "[]");
}

#[test]
fn line_and_status_formatting() {
    let started = Instant::now();
    let mut state = ProgressState::started_at(10, started);
    for _ in 0..5 {
        state.record(true);
    }
    let info = state.snapshot_at(started + Duration::from_secs(2));

    assert_eq!(info.status("intro"), "intro: 5/10");

    let line = info.line();
    assert!(line.starts_with(&format!("[{}", "=".repeat(BAR_WIDTH / 2))));
    assert!(line.contains("   5/10   | "));
    assert!(line.contains("  2.5 fps"));
    assert!(line.contains("ETA:   2.0s"));
    assert!(line.ends_with(" 50.0%"));
}
