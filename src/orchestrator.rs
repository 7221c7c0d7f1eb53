//! The extraction orchestrator.
//!
//! [`Orchestrator::run`] validates a job and hands it to a background
//! coordinator task. For each video the coordinator probes metadata (through
//! the shared [`MetadataCache`]), plans the frames that are still missing,
//! and executes the plan under a bounded pool of decode units, reporting
//! every completion on the returned [`ExtractionStream`].
//!
//! Per video the coordinator moves through `planning`, `running`, and then
//! one of `completed`, `stopped`, or `skipped`. A probe failure skips the
//! video; a decode that produces nothing is reported and the job carries on.
//! Only a stop request (or the consumer dropping the stream) ends a job
//! early.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::SmallRng;
use tokio::sync::Notify;
use tokio::task::{Id, JoinSet};
use tokio::time::MissedTickBehavior;

use crate::cancellation::{CancellationController, Terminate};
use crate::configuration::ExtractOptions;
use crate::decoder::{FfmpegDecoder, FrameDecoder, FrameTarget, RangeHandle, RangeRequest};
use crate::error::FrameGrabError;
use crate::job::{ExtractionJob, ExtractionMode, PreparedJob, SubmissionStyle};
use crate::metadata::VideoMetadata;
use crate::naming::{
    ExistingOutputs, frame_file_name, staging_file_name, staging_pattern, video_stem,
};
use crate::planner::{PlanRequest, plan};
use crate::probe::{FfprobeProber, MediaProber, MetadataCache};
use crate::progress::ProgressState;
use crate::stream::{
    Abandoned, ExtractionStream, ExtractionUpdate, UpdateKind, UpdateSender, UpdateSlot,
    update_channel,
};

/// Runs extraction jobs against a prober and a decoder.
///
/// The orchestrator itself is cheap to keep around: it owns the metadata
/// cache (so repeated jobs over the same videos probe each one once) and the
/// [`CancellationController`] that stops its jobs. Run one job at a time per
/// controller.
///
/// # Example
///
/// ```no_run
/// use framegrab::{ExtractionJob, Orchestrator, UpdateKind, VideoSelection};
///
/// # async fn example() -> Result<(), framegrab::FrameGrabError> {
/// let orchestrator = Orchestrator::ffmpeg();
/// let stop = orchestrator.controller().clone();
///
/// let job = ExtractionJob::exhaustive(VideoSelection::Folder("clips".into())).with_stride(30);
/// let mut updates = orchestrator.run(job)?;
/// while let Some(update) = tokio_stream::StreamExt::next(&mut updates).await {
///     if let UpdateKind::TaskFailed { frame, .. } = update.kind {
///         eprintln!("frame {frame} failed, giving up");
///         stop.request_stop();
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub struct Orchestrator<P, D> {
    prober: Arc<P>,
    decoder: Arc<D>,
    cache: MetadataCache,
    options: ExtractOptions,
    controller: CancellationController,
}

impl Orchestrator<FfprobeProber, FfmpegDecoder> {
    /// Orchestrator using `ffprobe` and `ffmpeg` from `PATH`.
    pub fn ffmpeg() -> Self {
        Self::new(FfprobeProber::new(), FfmpegDecoder::new())
    }
}

impl<P: MediaProber, D: FrameDecoder> Orchestrator<P, D> {
    /// Create an orchestrator with default options, an empty cache, and a
    /// fresh controller.
    pub fn new(prober: P, decoder: D) -> Self {
        Self {
            prober: Arc::new(prober),
            decoder: Arc::new(decoder),
            cache: MetadataCache::new(),
            options: ExtractOptions::default(),
            controller: CancellationController::new(),
        }
    }

    /// Replace the options.
    #[must_use]
    pub fn with_options(mut self, options: ExtractOptions) -> Self {
        self.options = options;
        self
    }

    /// Use an existing controller, e.g. one shared with a UI.
    #[must_use]
    pub fn with_controller(mut self, controller: CancellationController) -> Self {
        self.controller = controller;
        self
    }

    /// Share a metadata cache with other orchestrators.
    #[must_use]
    pub fn with_cache(mut self, cache: MetadataCache) -> Self {
        self.cache = cache;
        self
    }

    /// The metadata prober.
    pub fn prober(&self) -> &P {
        &self.prober
    }

    /// The controller that stops this orchestrator's jobs.
    pub fn controller(&self) -> &CancellationController {
        &self.controller
    }

    /// The metadata cache.
    pub fn cache(&self) -> &MetadataCache {
        &self.cache
    }

    /// The options.
    pub fn options(&self) -> &ExtractOptions {
        &self.options
    }

    /// Start `job` and return its update stream.
    ///
    /// The job is validated and the output directory created before
    /// anything is spawned. The controller's stop flag is cleared, so a stop
    /// requested before this call does not affect the new job.
    ///
    /// # Errors
    ///
    /// Returns [`FrameGrabError::InvalidJobParameters`] for an unusable job
    /// and [`FrameGrabError::IoError`] if the output directory or the
    /// selected folder cannot be accessed.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn run(&self, job: ExtractionJob) -> Result<ExtractionStream, FrameGrabError> {
        let prepared = job.prepare(&self.options)?;
        log::debug!(
            "Starting job: {} video(s), parallelism {}, output {}",
            prepared.videos.len(),
            prepared.parallelism,
            prepared.output_dir.display()
        );

        self.controller.reset();
        let (updates, receiver) = update_channel();
        let coordinator = Coordinator {
            prober: Arc::clone(&self.prober),
            decoder: Arc::clone(&self.decoder),
            cache: self.cache.clone(),
            options: self.options.clone(),
            controller: self.controller.clone(),
            updates,
        };
        let handle = tokio::spawn(coordinator.run(prepared));

        Ok(ExtractionStream::new(receiver, handle))
    }
}

/// How a video's run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// Closed when a stop request reaches the active work.
#[derive(Default)]
struct StopSignal {
    closed: AtomicBool,
    wake: Notify,
}

impl StopSignal {
    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.wake.notify_one();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    async fn wait(&self) {
        if !self.is_closed() {
            self.wake.notified().await;
        }
    }
}

/// The per-frame decode pool as seen by the controller.
#[derive(Default)]
struct PoolGate {
    signal: StopSignal,
}

impl Terminate for PoolGate {
    fn terminate(&self) {
        self.signal.close();
    }
}

/// A ranged export as seen by the controller.
struct RangeGate<H> {
    signal: StopSignal,
    handle: Mutex<H>,
}

impl<H: RangeHandle> RangeGate<H> {
    fn new(handle: H) -> Self {
        Self {
            signal: StopSignal::default(),
            handle: Mutex::new(handle),
        }
    }

    fn is_running(&self) -> bool {
        let mut handle = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
        handle.poll().unwrap_or_else(|error| {
            log::warn!("Lost track of ranged export: {error}");
            false
        })
    }
}

impl<H: RangeHandle> Terminate for RangeGate<H> {
    fn terminate(&self) {
        self.signal.close();
        self.handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .terminate();
    }
}

/// Per-video state while its plan runs.
struct VideoRun<'a> {
    video: &'a Path,
    stem: String,
    output_dir: &'a Path,
    extension: &'static str,
    progress: ProgressState,
    preview: Option<PathBuf>,
}

impl VideoRun<'_> {
    fn destination(&self, frame: u64) -> PathBuf {
        self.output_dir
            .join(frame_file_name(&self.stem, frame, self.extension))
    }

    fn update(&self, kind: UpdateKind) -> ExtractionUpdate {
        ExtractionUpdate {
            preview: self.preview.clone(),
            status: self.progress.snapshot().status(&self.stem),
            kind,
        }
    }
}

struct Coordinator<P, D> {
    prober: Arc<P>,
    decoder: Arc<D>,
    cache: MetadataCache,
    options: ExtractOptions,
    controller: CancellationController,
    updates: UpdateSender,
}

impl<P: MediaProber, D: FrameDecoder> Coordinator<P, D> {
    async fn run(self, job: PreparedJob) {
        let mut rng = match job.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };

        for video in &job.videos {
            let Ok(slot) = self.updates.slot().await else {
                log::debug!("Update stream dropped, abandoning job");
                return;
            };
            if self.controller.is_stop_requested() {
                log::info!("Stop requested, {} not started", video.display());
                slot.send(stopped_update(None, "Stopped.".into(), 0));
                return;
            }
            drop(slot);

            match self.process_video(&job, video, &mut rng).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Stop) => return,
                Err(Abandoned) => {
                    log::debug!("Update stream dropped, abandoning job");
                    return;
                }
            }
        }

        let _ = self
            .emit(ExtractionUpdate {
                preview: None,
                status: "Done.".into(),
                kind: UpdateKind::Finished,
            })
            .await;
    }

    async fn emit(&self, update: ExtractionUpdate) -> Result<(), Abandoned> {
        self.updates.send(update).await
    }

    fn stop_requested(&self, signal: &StopSignal) -> bool {
        self.controller.is_stop_requested() || signal.is_closed()
    }

    async fn process_video(
        &self,
        job: &PreparedJob,
        video: &Path,
        rng: &mut SmallRng,
    ) -> Result<Flow, Abandoned> {
        let stem = video_stem(video);

        let metadata = match self.cache.get_or_probe(&*self.prober, video).await {
            Ok(metadata) => metadata,
            Err(error) => {
                log::warn!("Skipping {}: {error}", video.display());
                let reason = match error {
                    FrameGrabError::MetadataUnavailable { reason, .. } => reason,
                    other => other.to_string(),
                };
                self.emit(ExtractionUpdate {
                    preview: None,
                    status: format!("{stem}: skipped"),
                    kind: UpdateKind::Skipped {
                        video: video.to_path_buf(),
                        reason,
                    },
                })
                .await?;
                return Ok(Flow::Continue);
            }
        };

        let existing = ExistingOutputs::scan(&job.output_dir).unwrap_or_else(|error| {
            log::warn!(
                "Could not list {}, assuming no frames exist: {error}",
                job.output_dir.display()
            );
            ExistingOutputs::empty()
        });
        let extension = self.options.image_extension();
        let request = PlanRequest {
            mode: job.mode,
            bounded: job.bounded,
            stem: &stem,
            extension,
            existing: &existing,
        };
        let frame_plan = plan(&request, &metadata, rng);
        let skipped_existing = frame_plan.skipped_existing();
        let targets = frame_plan.into_indices();
        let planned = targets.len() as u64;

        log::info!(
            "{}: {planned} frame(s) planned, {skipped_existing} already extracted",
            video.display()
        );

        let mut run = VideoRun {
            video,
            stem,
            output_dir: &job.output_dir,
            extension,
            progress: ProgressState::new(planned),
            preview: None,
        };

        self.emit(run.update(UpdateKind::Started {
            video: video.to_path_buf(),
            planned,
            skipped_existing,
        }))
        .await?;

        let flow = if targets.is_empty() {
            Flow::Continue
        } else {
            match (job.submission, job.mode) {
                (SubmissionStyle::Streaming, ExtractionMode::ExhaustiveRange { stride, .. }) => {
                    self.run_streaming(&mut run, &metadata, targets, stride).await?
                }
                _ => {
                    self.run_per_frame(&mut run, &metadata, targets, job.parallelism)
                        .await?
                }
            }
        };

        match flow {
            Flow::Continue => {
                log::info!(
                    "{}: {} extracted, {} failed",
                    video.display(),
                    run.progress.succeeded(),
                    run.progress.failed()
                );
                self.emit(run.update(UpdateKind::VideoCompleted {
                    video: video.to_path_buf(),
                    extracted: run.progress.succeeded(),
                    failed: run.progress.failed(),
                    planned,
                }))
                .await?;
            }
            Flow::Stop => {
                let completed = run.progress.completed();
                log::info!(
                    "{}: stopped after {completed}/{planned}",
                    video.display()
                );
                self.emit(stopped_update(
                    run.preview.clone(),
                    run.progress.snapshot().status(&run.stem),
                    completed,
                ))
                .await?;
            }
        }

        Ok(flow)
    }

    /// Wait for the consumer to ask for the next update.
    ///
    /// Returns `None` when a stop was requested in the meantime; the caller
    /// must then leave the completion uncounted.
    async fn ready(&self, signal: &StopSignal) -> Result<Option<UpdateSlot<'_>>, Abandoned> {
        let slot = self.updates.slot().await?;
        if self.stop_requested(signal) {
            return Ok(None);
        }
        Ok(Some(slot))
    }

    /// Count one finished unit and report it through `slot`.
    async fn record(
        &self,
        run: &mut VideoRun<'_>,
        slot: UpdateSlot<'_>,
        frame: u64,
        destination: PathBuf,
        produced: bool,
    ) -> Result<(), Abandoned> {
        let completed = run.progress.record(produced);

        if !produced {
            log::warn!(
                "{}",
                FrameGrabError::DecodeTaskFailed {
                    path: run.video.to_path_buf(),
                    frame,
                }
            );
            slot.send(run.update(UpdateKind::TaskFailed {
                video: run.video.to_path_buf(),
                frame,
            }));
            let info = run.progress.snapshot();
            return self.emit(run.update(UpdateKind::Progress(info))).await;
        }

        if completed % self.options.preview_interval == 0 || completed == run.progress.planned() {
            run.preview = Some(destination);
        }
        let info = run.progress.snapshot();
        slot.send(run.update(UpdateKind::Progress(info)));
        Ok(())
    }

    /// [`ready`](Self::ready) followed by [`record`](Self::record).
    async fn complete(
        &self,
        run: &mut VideoRun<'_>,
        signal: &StopSignal,
        frame: u64,
        produced: bool,
    ) -> Result<Flow, Abandoned> {
        let Some(slot) = self.ready(signal).await? else {
            return Ok(Flow::Stop);
        };
        let destination = run.destination(frame);
        self.record(run, slot, frame, destination, produced).await?;
        Ok(Flow::Continue)
    }

    async fn run_per_frame(
        &self,
        run: &mut VideoRun<'_>,
        metadata: &VideoMetadata,
        targets: Vec<u64>,
        parallelism: usize,
    ) -> Result<Flow, Abandoned> {
        let gate = Arc::new(PoolGate::default());
        let _registration = self.controller.register(&gate);

        let mut pending = targets.into_iter();
        let mut in_flight: JoinSet<bool> = JoinSet::new();
        let mut frames: HashMap<Id, u64> = HashMap::new();

        loop {
            while in_flight.len() < parallelism && !self.stop_requested(&gate.signal) {
                let Some(frame) = pending.next() else {
                    break;
                };
                let decoder = Arc::clone(&self.decoder);
                let video = run.video.to_path_buf();
                let destination = run.destination(frame);
                let target = FrameTarget {
                    index: frame,
                    timestamp: metadata.frame_to_timestamp(frame),
                };
                let unit = in_flight.spawn(async move {
                    decoder
                        .decode_single_frame(&video, target, &destination)
                        .await
                        .unwrap_or_else(|error| {
                            log::warn!("Frame {frame} of {}: {error}", video.display());
                            false
                        })
                });
                frames.insert(unit.id(), frame);
            }

            if self.stop_requested(&gate.signal) {
                self.drain_after_stop(&mut in_flight).await;
                return Ok(Flow::Stop);
            }
            if in_flight.is_empty() {
                return Ok(Flow::Continue);
            }

            let joined = tokio::select! {
                joined = in_flight.join_next_with_id() => joined,
                () = gate.signal.wait() => continue,
            };
            let (id, produced) = match joined {
                Some(Ok((id, produced))) => (id, produced),
                Some(Err(error)) => {
                    log::warn!("Decode unit for {} died: {error}", run.video.display());
                    (error.id(), false)
                }
                None => continue,
            };
            let Some(frame) = frames.remove(&id) else {
                continue;
            };

            if self.complete(run, &gate.signal, frame, produced).await? == Flow::Stop {
                self.drain_after_stop(&mut in_flight).await;
                return Ok(Flow::Stop);
            }
        }
    }

    /// Give in-flight units the grace period, then abort whatever is left.
    async fn drain_after_stop(&self, in_flight: &mut JoinSet<bool>) {
        if in_flight.is_empty() {
            return;
        }

        let grace = self.options.grace_period;
        let drained = tokio::time::timeout(grace, async {
            while in_flight.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            log::debug!(
                "Grace period of {grace:?} elapsed, aborting {} decode(s)",
                in_flight.len()
            );
            in_flight.shutdown().await;
        }
    }

    async fn run_streaming(
        &self,
        run: &mut VideoRun<'_>,
        metadata: &VideoMetadata,
        targets: Vec<u64>,
        stride: u64,
    ) -> Result<Flow, Abandoned> {
        let (Some(&first), Some(&last)) = (targets.first(), targets.last()) else {
            return Ok(Flow::Continue);
        };
        let stride = stride.max(1);
        let half_frame = Duration::from_secs_f64(0.5 / metadata.frames_per_second);
        let request = RangeRequest {
            start: metadata.frame_to_timestamp(first),
            end: metadata.frame_to_timestamp(last) + half_frame,
            stride,
            pattern: run
                .output_dir
                .join(staging_pattern(&run.stem, run.extension)),
        };

        let handle = match self.decoder.decode_range(run.video, &request) {
            Ok(handle) => handle,
            Err(error) => {
                log::warn!("Ranged export of {} failed: {error}", run.video.display());
                let signal = StopSignal::default();
                for frame in targets {
                    if self.complete(run, &signal, frame, false).await? == Flow::Stop {
                        return Ok(Flow::Stop);
                    }
                }
                return Ok(Flow::Continue);
            }
        };

        let gate = Arc::new(RangeGate::new(handle));
        let _registration = self.controller.register(&gate);

        let mut ordinal = 0;
        let outcome = self
            .watch_range(run, &gate, first, stride, targets, &mut ordinal)
            .await;

        if !matches!(outcome, Ok(Flow::Continue)) {
            gate.terminate();
        }
        self.discard_staging(run, &gate, ordinal).await;

        outcome
    }

    /// Promote staged files to their final names as the export writes them.
    ///
    /// Ordinal `k` maps to frame `first + k * stride` and is ready once
    /// ordinal `k + 1` exists or the export has exited. A staged file is
    /// renamed only once the consumer has asked for its update.
    async fn watch_range<H: RangeHandle>(
        &self,
        run: &mut VideoRun<'_>,
        gate: &RangeGate<H>,
        first: u64,
        stride: u64,
        targets: Vec<u64>,
        ordinal: &mut u64,
    ) -> Result<Flow, Abandoned> {
        let mut wanted: BTreeSet<u64> = targets.into_iter().collect();
        let (output_dir, stem, extension) = (run.output_dir, run.stem.clone(), run.extension);
        let staged =
            |ordinal: u64| output_dir.join(staging_file_name(&stem, ordinal, extension));

        let mut ticker = tokio::time::interval(self.options.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if self.stop_requested(&gate.signal) {
                return Ok(Flow::Stop);
            }
            tokio::select! {
                _ = ticker.tick() => {}
                () = gate.signal.wait() => continue,
            }

            let running = gate.is_running();
            loop {
                let current = staged(*ordinal);
                if !current.is_file() || (running && !staged(*ordinal + 1).is_file()) {
                    break;
                }

                let frame = first + *ordinal * stride;
                if !wanted.contains(&frame) {
                    *ordinal += 1;
                    let _ = std::fs::remove_file(&current);
                    continue;
                }

                let Some(slot) = self.ready(&gate.signal).await? else {
                    return Ok(Flow::Stop);
                };
                *ordinal += 1;
                wanted.remove(&frame);

                let destination = run.destination(frame);
                let produced = match std::fs::rename(&current, &destination) {
                    Ok(()) => true,
                    Err(error) => {
                        log::warn!("Could not promote {}: {error}", current.display());
                        let _ = std::fs::remove_file(&current);
                        false
                    }
                };
                self.record(run, slot, frame, destination, produced).await?;
            }

            if !running {
                break;
            }
        }

        for frame in wanted {
            if self.complete(run, &gate.signal, frame, false).await? == Flow::Stop {
                return Ok(Flow::Stop);
            }
        }
        Ok(Flow::Continue)
    }

    /// Wait (up to the grace period) for the export to exit, then delete the
    /// staged files that were never promoted.
    async fn discard_staging<H: RangeHandle>(
        &self,
        run: &VideoRun<'_>,
        gate: &RangeGate<H>,
        from_ordinal: u64,
    ) {
        let exited = tokio::time::timeout(self.options.grace_period, async {
            while gate.is_running() {
                tokio::time::sleep(self.options.poll_interval).await;
            }
        })
        .await;
        if exited.is_err() {
            log::debug!(
                "Ranged export of {} still running after the grace period",
                run.video.display()
            );
        }

        let mut ordinal = from_ordinal;
        while std::fs::remove_file(
            run.output_dir
                .join(staging_file_name(&run.stem, ordinal, run.extension)),
        )
        .is_ok()
        {
            ordinal += 1;
        }
        if ordinal > from_ordinal {
            log::debug!(
                "Discarded {} staged frame(s) of {}",
                ordinal - from_ordinal,
                run.video.display()
            );
        }
    }
}

fn stopped_update(preview: Option<PathBuf>, status: String, completed: u64) -> ExtractionUpdate {
    ExtractionUpdate {
        preview,
        status,
        kind: UpdateKind::Stopped { completed },
    }
}
