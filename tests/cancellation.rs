//! Cancellation controller tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use framegrab::{CancellationController, Terminate};

#[derive(Default)]
struct CountingHandle {
    terminations: AtomicUsize,
}

impl CountingHandle {
    fn terminations(&self) -> usize {
        self.terminations.load(Ordering::SeqCst)
    }
}

impl Terminate for CountingHandle {
    fn terminate(&self) {
        self.terminations.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Stop flag ──────────────────────────────────────────────────────

#[test]
fn controller_default_not_stopped() {
    let controller = CancellationController::new();
    assert!(!controller.is_stop_requested());
    assert!(!controller.has_active());
}

#[test]
fn request_stop_without_active_work_only_sets_the_flag() {
    let controller = CancellationController::default();
    controller.request_stop();
    controller.request_stop();
    assert!(controller.is_stop_requested());
}

#[test]
fn clones_share_state() {
    let controller = CancellationController::new();
    let clone = controller.clone();

    clone.request_stop();
    assert!(controller.is_stop_requested());

    controller.reset();
    assert!(!clone.is_stop_requested());
}

// ── Registration ───────────────────────────────────────────────────

#[test]
fn request_stop_terminates_the_registered_handle_once() {
    let controller = CancellationController::new();
    let handle = Arc::new(CountingHandle::default());
    let _registration = controller.register(&handle);
    assert!(controller.has_active());

    controller.request_stop();
    controller.request_stop();

    assert_eq!(handle.terminations(), 1);
    assert!(!controller.has_active());
}

#[test]
fn registering_after_a_stop_terminates_immediately() {
    let controller = CancellationController::new();
    controller.request_stop();

    let handle = Arc::new(CountingHandle::default());
    let _registration = controller.register(&handle);

    assert_eq!(handle.terminations(), 1);
    assert!(!controller.has_active());
}

#[test]
fn dropping_the_registration_deregisters() {
    let controller = CancellationController::new();
    let handle = Arc::new(CountingHandle::default());

    let registration = controller.register(&handle);
    drop(registration);
    assert!(!controller.has_active());

    controller.request_stop();
    assert_eq!(handle.terminations(), 0);
}

#[test]
fn stale_registration_does_not_clear_a_newer_one() {
    let controller = CancellationController::new();
    let first = Arc::new(CountingHandle::default());
    let second = Arc::new(CountingHandle::default());

    let stale = controller.register(&first);
    let _current = controller.register(&second);
    drop(stale);
    assert!(controller.has_active());

    controller.request_stop();
    assert_eq!(first.terminations(), 0);
    assert_eq!(second.terminations(), 1);
}

#[test]
fn controller_holds_no_strong_reference() {
    let controller = CancellationController::new();
    let handle = Arc::new(CountingHandle::default());
    let _registration = controller.register(&handle);

    assert_eq!(Arc::strong_count(&handle), 1);
    drop(handle);
    assert!(!controller.has_active());

    // Nothing left to terminate.
    controller.request_stop();
    assert!(controller.is_stop_requested());
}

#[test]
fn reset_forgets_the_registration() {
    let controller = CancellationController::new();
    let handle = Arc::new(CountingHandle::default());
    let _registration = controller.register(&handle);

    controller.reset();
    controller.request_stop();
    assert_eq!(handle.terminations(), 0);
}

#[test]
fn debug_shows_state() {
    let controller = CancellationController::new();
    let debug = format!("{controller:?}");
    assert!(debug.contains("CancellationController"));
    assert!(debug.contains("stop_requested: false"));
}
