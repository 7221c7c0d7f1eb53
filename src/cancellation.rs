//! Cooperative cancellation.
//!
//! A [`CancellationController`] is handed to an
//! [`Orchestrator`](crate::Orchestrator) and shared with whoever may want to
//! stop it (a UI button, a signal handler, a test). It combines a stop flag,
//! which the coordinator checks between completions, with a slot holding a
//! non-owning reference to the work that is currently running, so a stop
//! request can also terminate decodes that are already in flight.
//!
//! # Example
//!
//! ```
//! use framegrab::CancellationController;
//!
//! let controller = CancellationController::new();
//! assert!(!controller.is_stop_requested());
//!
//! // Safe even when nothing is running.
//! controller.request_stop();
//! assert!(controller.is_stop_requested());
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// Something running that a stop request can terminate.
///
/// `terminate` must not block: it signals the work (closes a pool, kills a
/// process) and returns.
pub trait Terminate: Send + Sync {
    /// Begin tearing the work down.
    fn terminate(&self);
}

#[derive(Default)]
struct ControllerState {
    stop: AtomicBool,
    active: Mutex<Option<Weak<dyn Terminate>>>,
}

/// Stop flag plus a registry of the active pool or process handle.
///
/// Cloning is cheap and every clone controls the same job. Give each
/// concurrently running orchestrator its own controller.
#[derive(Clone, Default)]
pub struct CancellationController {
    state: Arc<ControllerState>,
}

impl Debug for CancellationController {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("CancellationController")
            .field("stop_requested", &self.is_stop_requested())
            .field("has_active", &self.has_active())
            .finish()
    }
}

impl CancellationController {
    /// Create a controller with the flag cleared and nothing registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that the current job stop.
    ///
    /// Sets the flag, then terminates and deregisters the active handle, if
    /// any, without waiting for it to exit. Calling this while no job runs
    /// only sets the flag; the next [`Orchestrator::run`] clears it again.
    ///
    /// [`Orchestrator::run`]: crate::Orchestrator::run
    pub fn request_stop(&self) {
        self.state.stop.store(true, Ordering::Release);

        let active = self.lock_active().take();
        if let Some(handle) = active.and_then(|weak| weak.upgrade()) {
            log::debug!("Stop requested, terminating active work");
            handle.terminate();
        }
    }

    /// Returns `true` once [`request_stop`](Self::request_stop) has been
    /// called for the current job.
    pub fn is_stop_requested(&self) -> bool {
        self.state.stop.load(Ordering::Acquire)
    }

    /// Clear the flag and any stale registration. Called at the start of
    /// every job.
    pub fn reset(&self) {
        self.state.stop.store(false, Ordering::Release);
        *self.lock_active() = None;
    }

    /// Returns `true` while a pool or process handle is registered and alive.
    pub fn has_active(&self) -> bool {
        self.lock_active()
            .as_ref()
            .is_some_and(|weak| weak.strong_count() > 0)
    }

    /// Register `handle` as the active work until the returned guard drops.
    ///
    /// If a stop was already requested the handle is terminated right away.
    pub fn register<T: Terminate + 'static>(&self, handle: &Arc<T>) -> Registration {
        let weak: Weak<T> = Arc::downgrade(handle);
        let weak: Weak<dyn Terminate> = weak;
        *self.lock_active() = Some(weak.clone());

        if self.is_stop_requested() {
            self.lock_active().take();
            handle.terminate();
        }

        Registration {
            controller: self.clone(),
            handle: weak,
        }
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<Weak<dyn Terminate>>> {
        self.state
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Keeps a handle registered with a [`CancellationController`].
///
/// Dropping the guard clears the slot, but only if it still refers to this
/// guard's handle, so a guard that outlives its job never deregisters the
/// next one.
#[must_use = "the handle is deregistered when the registration is dropped"]
pub struct Registration {
    controller: CancellationController,
    handle: Weak<dyn Terminate>,
}

impl Drop for Registration {
    fn drop(&mut self) {
        let mut active = self.controller.lock_active();
        if active
            .as_ref()
            .is_some_and(|current| Weak::ptr_eq(current, &self.handle))
        {
            *active = None;
        }
    }
}
