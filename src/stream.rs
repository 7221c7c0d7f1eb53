//! The update stream returned by [`Orchestrator::run`](crate::Orchestrator::run).
//!
//! Updates are produced by a background coordinator task in lockstep with
//! the consumer: the coordinator records a completion only after the
//! consumer has asked for the next update. A stop requested right after
//! seeing completion `n` therefore leaves the count at `n`.
//! [`ExtractionStream`] can be consumed asynchronously (it implements
//! [`Stream`](futures_core::Stream)) or from a plain thread through
//! [`ExtractionStream::blocking_next`] and [`BlockingUpdates`].
//!
//! Dropping the stream before it ends is treated as a stop request: the
//! coordinator stops submitting work, terminates what is in flight, and
//! exits.
//!
//! # Example
//!
//! ```no_run
//! use tokio_stream::StreamExt;
//!
//! use framegrab::{ExtractionJob, Orchestrator, UpdateKind, VideoSelection};
//!
//! # async fn example() -> Result<(), framegrab::FrameGrabError> {
//! let orchestrator = Orchestrator::ffmpeg();
//! let job = ExtractionJob::random(VideoSelection::Single("talk.mp4".into()), 20);
//! let mut updates = orchestrator.run(job)?;
//!
//! while let Some(update) = updates.next().await {
//!     if let UpdateKind::Progress(info) = update.kind {
//!         println!("{} {}", update.status, info.line());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::mpsc::{self, Permit, Receiver, Sender};
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio::task::JoinHandle;

use crate::progress::ProgressInfo;

/// One item of the progress sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionUpdate {
    /// Most recent preview frame, if any has been chosen for this video.
    pub preview: Option<PathBuf>,
    /// Human-readable status line, e.g. `"intro: 30/120"`.
    pub status: String,
    /// What happened.
    pub kind: UpdateKind,
}

impl ExtractionUpdate {
    /// Returns `true` for the last update a stream yields.
    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, UpdateKind::Stopped { .. } | UpdateKind::Finished)
    }
}

/// The event carried by an [`ExtractionUpdate`].
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum UpdateKind {
    /// A video was planned and work on it is starting.
    Started {
        /// Video path.
        video: PathBuf,
        /// Frames that will be decoded.
        planned: u64,
        /// Frames left out because their output already exists.
        skipped_existing: u64,
    },
    /// A decode unit finished.
    Progress(ProgressInfo),
    /// A decode unit finished without producing a file. The job continues.
    TaskFailed {
        /// Video path.
        video: PathBuf,
        /// Zero-based frame index.
        frame: u64,
    },
    /// A video was skipped because its metadata could not be read.
    Skipped {
        /// Video path.
        video: PathBuf,
        /// Why the probe failed.
        reason: String,
    },
    /// Every planned frame of a video has been attempted.
    VideoCompleted {
        /// Video path.
        video: PathBuf,
        /// Frames written.
        extracted: u64,
        /// Frames attempted without output.
        failed: u64,
        /// Frames planned.
        planned: u64,
    },
    /// The job was stopped. Always the last update of a stopped run.
    Stopped {
        /// Completions counted for the video that was running when the stop
        /// was observed.
        completed: u64,
    },
    /// Every video was processed. Always the last update of a full run.
    Finished,
}

/// The consumer dropped the stream.
pub(crate) struct Abandoned;

/// Create the producer and consumer halves of an update channel.
pub(crate) fn update_channel() -> (UpdateSender, UpdateReceiver) {
    let (sender, receiver) = mpsc::channel(1);
    let demand = Arc::new(Semaphore::new(0));
    (
        UpdateSender {
            sender,
            demand: Arc::clone(&demand),
        },
        UpdateReceiver {
            receiver,
            demand,
            requested: false,
        },
    )
}

/// Coordinator side of the update channel.
pub(crate) struct UpdateSender {
    sender: Sender<ExtractionUpdate>,
    demand: Arc<Semaphore>,
}

impl UpdateSender {
    /// Wait until the consumer asks for an update.
    pub(crate) async fn slot(&self) -> Result<UpdateSlot<'_>, Abandoned> {
        let demand = self.demand.acquire().await.map_err(|_| Abandoned)?;
        let permit = self.sender.reserve().await.map_err(|_| Abandoned)?;
        Ok(UpdateSlot { demand, permit })
    }

    pub(crate) async fn send(&self, update: ExtractionUpdate) -> Result<(), Abandoned> {
        self.slot().await?.send(update);
        Ok(())
    }
}

/// Room for exactly one update the consumer is waiting for.
///
/// Dropping the slot unused hands the request back.
pub(crate) struct UpdateSlot<'a> {
    demand: SemaphorePermit<'a>,
    permit: Permit<'a, ExtractionUpdate>,
}

impl UpdateSlot<'_> {
    pub(crate) fn send(self, update: ExtractionUpdate) {
        let UpdateSlot { demand, permit } = self;
        demand.forget();
        permit.send(update);
    }
}

/// Consumer side of the update channel.
///
/// Every wait for an update first registers one unit of demand. Dropping the
/// receiver closes the demand, so a waiting coordinator sees the stream gone.
pub(crate) struct UpdateReceiver {
    receiver: Receiver<ExtractionUpdate>,
    demand: Arc<Semaphore>,
    requested: bool,
}

impl UpdateReceiver {
    fn request(&mut self) {
        if !self.requested {
            self.demand.add_permits(1);
            self.requested = true;
        }
    }

    fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<ExtractionUpdate>> {
        self.request();
        let polled = self.receiver.poll_recv(cx);
        if polled.is_ready() {
            self.requested = false;
        }
        polled
    }

    fn blocking_recv(&mut self) -> Option<ExtractionUpdate> {
        self.request();
        let update = self.receiver.blocking_recv();
        self.requested = false;
        update
    }
}

impl Drop for UpdateReceiver {
    fn drop(&mut self) {
        self.demand.close();
    }
}

/// Asynchronous sequence of [`ExtractionUpdate`]s.
///
/// Created by [`Orchestrator::run`](crate::Orchestrator::run). Ends after a
/// [`UpdateKind::Stopped`] or [`UpdateKind::Finished`] update.
pub struct ExtractionStream {
    updates: UpdateReceiver,
    handle: JoinHandle<()>,
}

impl ExtractionStream {
    pub(crate) fn new(updates: UpdateReceiver, handle: JoinHandle<()>) -> Self {
        Self { updates, handle }
    }

    /// Wait for the next update from synchronous code.
    ///
    /// # Panics
    ///
    /// Panics when called from within an asynchronous execution context.
    pub fn blocking_next(&mut self) -> Option<ExtractionUpdate> {
        self.updates.blocking_recv()
    }

    /// Turn the stream into a blocking [`Iterator`].
    pub fn into_blocking_iter(self) -> BlockingUpdates {
        BlockingUpdates { stream: self }
    }

    /// Returns `true` once the coordinator task has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Stream for ExtractionStream {
    type Item = ExtractionUpdate;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.updates.poll_recv(cx)
    }
}

/// Blocking iterator over an [`ExtractionStream`].
///
/// Must be driven from outside the runtime, e.g. from `main` after the run
/// was started inside [`Runtime::enter`](tokio::runtime::Runtime::enter).
pub struct BlockingUpdates {
    stream: ExtractionStream,
}

impl Iterator for BlockingUpdates {
    type Item = ExtractionUpdate;

    fn next(&mut self) -> Option<Self::Item> {
        self.stream.blocking_next()
    }
}
