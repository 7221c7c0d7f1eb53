use std::{
    future::Future,
    io::Result as IoResult,
    path::{Path, PathBuf},
    time::Duration,
};

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use colored::Colorize;
use framegrab::{
    CancellationController, ExtractOptions, ExtractionJob, ExtractionMode, ExtractionUpdate, FfmpegDecoder, FfprobeProber,
    MediaProber, Orchestrator, SubmissionStyle, UpdateKind, VideoMetadata, VideoSelection,
    configuration::DEFAULT_PREVIEW_INTERVAL,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::{Value, json};

const CLI_AFTER_HELP: &str = "Examples:\n  framegrab exhaustive talk.mp4 --stride 30 --out frames\n  framegrab exhaustive talk.mp4 --start 0:01:00 --end 0:02:00 --streaming\n  framegrab --jobs 4 random clips/ --count 25 --seed 7\n  framegrab --json probe talk.mp4\n  framegrab completions zsh > _framegrab";

#[derive(Debug, Parser)]
#[command(
    name = "framegrab",
    version,
    about = "Extract still frames from videos, exhaustively or as a random sample",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone)]
struct GlobalOptions {
    /// Show debug logging output.
    #[arg(long)]
    verbose: bool,

    /// Print one JSON object per update instead of progress bars.
    #[arg(long)]
    json: bool,

    /// Maximum number of concurrent decodes.
    #[arg(long, short = 'j')]
    jobs: Option<usize>,

    /// Output image extension (png, jpg, bmp, tiff, webp).
    #[arg(long, default_value = "png")]
    ext: String,

    /// Report a new preview frame every N completions.
    #[arg(long, default_value_t = DEFAULT_PREVIEW_INTERVAL)]
    preview_every: u64,

    /// Milliseconds in-flight decodes may keep running after a stop.
    #[arg(long)]
    grace_ms: Option<u64>,

    /// Path to the ffmpeg executable.
    #[arg(long, default_value = "ffmpeg")]
    ffmpeg: PathBuf,

    /// Path to the ffprobe executable.
    #[arg(long, default_value = "ffprobe")]
    ffprobe: PathBuf,

    /// How video metadata is read.
    #[arg(long, value_enum, default_value_t = ProberKind::Ffprobe)]
    prober: ProberKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ProberKind {
    /// Run the ffprobe executable.
    Ffprobe,
    /// Open the container in-process (requires the `libav` feature).
    Libav,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Extract every Nth frame of a video or of every video in a folder.
    #[command(
        about = "Extract every Nth frame",
        after_help = "Examples:\n  framegrab exhaustive talk.mp4 --stride 10 --start 100 --end 400\n  framegrab exhaustive clips/ --stride 30 --out frames"
    )]
    Exhaustive {
        /// Video file or folder of videos.
        input: PathBuf,
        /// Output directory (defaults to ./ExtractedFrames).
        #[arg(long)]
        out: Option<PathBuf>,
        /// Extract every Nth frame.
        #[arg(long, default_value_t = 1)]
        stride: u64,
        /// First frame (inclusive): a frame number or a timecode. Single videos only.
        #[arg(long)]
        start: Option<String>,
        /// Last frame (inclusive): a frame number or a timecode. Single videos only.
        #[arg(long)]
        end: Option<String>,
        /// Decode the whole range with one ffmpeg process.
        #[arg(long)]
        streaming: bool,
    },

    /// Extract distinct random frames from each video.
    #[command(
        about = "Extract a random sample of frames",
        after_help = "Examples:\n  framegrab random talk.mp4 --count 50\n  framegrab random clips/ --count 10 --seed 42 --out samples"
    )]
    Random {
        /// Video file or folder of videos.
        input: PathBuf,
        /// Output directory (defaults to ./ExtractedFrames).
        #[arg(long)]
        out: Option<PathBuf>,
        /// Frames per video.
        #[arg(long, default_value_t = 10)]
        count: u64,
        /// Seed for a reproducible sample.
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Print duration, frame rate, and frame count of a video.
    #[command(about = "Print video metadata", visible_alias = "info")]
    Probe {
        /// Video file.
        input: PathBuf,
    },

    /// Generate shell completion scripts.
    #[command(about = "Generate shell completions")]
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();
}

fn parse_timecode(value: &str) -> Result<Duration, Box<dyn std::error::Error>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("time value cannot be empty".into());
    }

    let parts: Vec<&str> = trimmed.split(':').collect();
    if parts.len() < 2 || parts.len() > 3 {
        return Err(format!("invalid time format: {trimmed}").into());
    }

    let (hours, minutes, seconds_str) = if parts.len() == 3 {
        (parts[0].parse::<u64>()?, parts[1].parse::<u64>()?, parts[2])
    } else {
        (0_u64, parts[0].parse::<u64>()?, parts[1])
    };

    let seconds = seconds_str.parse::<f64>()?;
    let total_seconds = (hours as f64 * 3600.0) + (minutes as f64 * 60.0) + seconds;
    Ok(Duration::from_secs_f64(total_seconds.max(0.0)))
}

fn timestamp_to_frame_number(timestamp: Duration, frames_per_second: f64) -> u64 {
    (timestamp.as_secs_f64() * frames_per_second) as u64
}

/// Frame bounds given as timecodes need the frame rate; plain numbers do not.
fn needs_frame_rate(bounds: &[&Option<String>]) -> bool {
    bounds
        .iter()
        .any(|bound| bound.as_deref().is_some_and(|value| value.contains(':')))
}

fn parse_bound(
    value: Option<&str>,
    metadata: Option<&VideoMetadata>,
) -> Result<Option<u64>, Box<dyn std::error::Error>> {
    let Some(value) = value else {
        return Ok(None);
    };

    if value.contains(':') {
        let metadata = metadata.ok_or("timecode bounds need video metadata")?;
        let timestamp = parse_timecode(value)?;
        Ok(Some(timestamp_to_frame_number(
            timestamp,
            metadata.frames_per_second,
        )))
    } else {
        Ok(Some(value.trim().parse::<u64>()?))
    }
}

fn selection_for(input: &Path) -> VideoSelection {
    if input.is_dir() {
        VideoSelection::Folder(input.to_path_buf())
    } else {
        VideoSelection::Single(input.to_path_buf())
    }
}

fn base_extract_options(
    global: &GlobalOptions,
) -> Result<ExtractOptions, Box<dyn std::error::Error>> {
    let mut options = ExtractOptions::new()
        .with_image_extension(&global.ext)?
        .with_preview_interval(global.preview_every);

    if let Some(grace_ms) = global.grace_ms {
        options = options.with_grace_period(Duration::from_millis(grace_ms));
    }

    Ok(options)
}

/// JSON form of one update, as printed with `--json`.
fn update_json(update: &ExtractionUpdate) -> Value {
    let event = match &update.kind {
        UpdateKind::Started {
            video,
            planned,
            skipped_existing,
        } => json!({
            "event": "started",
            "video": video,
            "planned": planned,
            "skipped_existing": skipped_existing,
        }),
        UpdateKind::Progress(info) => json!({
            "event": "progress",
            "completed": info.completed,
            "planned": info.planned,
            "failed": info.failed,
            "rate": info.rate,
            "percent": info.percent,
            "eta_seconds": info.eta.as_secs_f64(),
        }),
        UpdateKind::TaskFailed { video, frame } => json!({
            "event": "task_failed",
            "video": video,
            "frame": frame,
        }),
        UpdateKind::Skipped { video, reason } => json!({
            "event": "skipped",
            "video": video,
            "reason": reason,
        }),
        UpdateKind::VideoCompleted {
            video,
            extracted,
            failed,
            planned,
        } => json!({
            "event": "video_completed",
            "video": video,
            "extracted": extracted,
            "failed": failed,
            "planned": planned,
        }),
        UpdateKind::Stopped { completed } => json!({
            "event": "stopped",
            "completed": completed,
        }),
        UpdateKind::Finished => json!({ "event": "finished" }),
        _ => json!({ "event": "unknown" }),
    };

    json!({
        "status": update.status,
        "preview": update.preview,
        "update": event,
    })
}

fn progress_bar(planned: u64) -> Result<ProgressBar, Box<dyn std::error::Error>> {
    let bar = ProgressBar::new(planned);
    let style = ProgressStyle::with_template(
        "{spinner:.green} {prefix:.bold} {bar:40.cyan/blue} {pos}/{len} {msg}",
    )?;
    bar.set_style(style.progress_chars("##-"));
    Ok(bar)
}

/// Renders updates as progress bars and colored messages.
#[derive(Default)]
struct TerminalReport {
    bar: Option<ProgressBar>,
    extracted: u64,
    failed: u64,
}

impl TerminalReport {
    fn show(&mut self, update: &ExtractionUpdate) -> Result<(), Box<dyn std::error::Error>> {
        match &update.kind {
            UpdateKind::Started {
                video,
                planned,
                skipped_existing,
            } => {
                let bar = progress_bar(*planned)?;
                bar.set_prefix(video_label(video));
                if *skipped_existing > 0 {
                    bar.println(format!(
                        "{} {skipped_existing} frame(s) of {} already extracted",
                        "note:".cyan().bold(),
                        video.display()
                    ));
                }
                self.bar = Some(bar);
            }
            UpdateKind::Progress(info) => {
                if let Some(bar) = &self.bar {
                    bar.set_position(info.completed);
                    bar.set_message(format!(
                        "{:.1} fps, ETA {:.1}s",
                        info.rate,
                        info.eta.as_secs_f64()
                    ));
                }
            }
            UpdateKind::TaskFailed { video, frame } => {
                let message = format!(
                    "{} {}",
                    "warning:".yellow().bold(),
                    format!("frame {frame} of {} produced no output", video.display()).yellow()
                );
                match &self.bar {
                    Some(bar) => bar.println(message),
                    None => eprintln!("{message}"),
                }
            }
            UpdateKind::Skipped { video, reason } => {
                eprintln!(
                    "{} {}",
                    "warning:".yellow().bold(),
                    format!("skipping {}: {reason}", video.display()).yellow()
                );
            }
            UpdateKind::VideoCompleted {
                extracted, failed, ..
            } => {
                self.extracted += extracted;
                self.failed += failed;
                if let Some(bar) = self.bar.take() {
                    bar.finish_with_message("done");
                }
            }
            UpdateKind::Stopped { completed } => {
                if let Some(bar) = self.bar.take() {
                    bar.abandon_with_message("stopped");
                }
                eprintln!(
                    "{} {}",
                    "stopped:".yellow().bold(),
                    format!("{completed} frame(s) completed before the stop").yellow()
                );
            }
            UpdateKind::Finished => {
                println!(
                    "{} {}",
                    "success:".green().bold(),
                    format!(
                        "Extracted {} frame(s), {} failed",
                        self.extracted, self.failed
                    )
                    .green()
                );
            }
            _ => {}
        }

        if let Some(preview) = &update.preview {
            log::debug!("{}: preview {}", update.status, preview.display());
        }
        Ok(())
    }
}

fn video_label(video: &Path) -> String {
    video
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| video.display().to_string())
}

/// Build the job for an extraction subcommand, resolving timecode bounds.
fn build_job<P: MediaProber>(
    command: &Commands,
    orchestrator: &Orchestrator<P, FfmpegDecoder>,
    runtime: &tokio::runtime::Runtime,
) -> Result<ExtractionJob, Box<dyn std::error::Error>> {
    match command {
        Commands::Exhaustive {
            input,
            out,
            stride,
            start,
            end,
            streaming,
        } => {
            let selection = selection_for(input);
            let metadata = match (&selection, needs_frame_rate(&[start, end])) {
                (VideoSelection::Single(path), true) => Some(
                    runtime.block_on(orchestrator.cache().get_or_probe(orchestrator.prober(), path))?,
                ),
                (VideoSelection::Folder(_), _) if start.is_some() || end.is_some() => {
                    eprintln!(
                        "{} {}",
                        "warning:".yellow().bold(),
                        "--start/--end are ignored for folders".yellow()
                    );
                    None
                }
                _ => None,
            };

            let start = parse_bound(start.as_deref(), metadata.as_ref())?;
            let end = parse_bound(end.as_deref(), metadata.as_ref())?;
            let mut job = ExtractionJob::new(
                selection,
                ExtractionMode::ExhaustiveRange {
                    stride: *stride,
                    start,
                    end,
                },
            );
            if *streaming {
                job = job.with_submission(SubmissionStyle::Streaming);
            }
            if let Some(out) = out {
                job = job.with_output_dir(out);
            }
            Ok(job)
        }
        Commands::Random {
            input,
            out,
            count,
            seed,
        } => {
            let mut job = ExtractionJob::random(selection_for(input), *count);
            if let Some(seed) = seed {
                job = job.with_seed(*seed);
            }
            if let Some(out) = out {
                job = job.with_output_dir(out);
            }
            Ok(job)
        }
        _ => Err("not an extraction command".into()),
    }
}

fn extract<P: MediaProber>(
    prober: P,
    cli: &Cli,
    runtime: &tokio::runtime::Runtime,
) -> Result<(), Box<dyn std::error::Error>> {
    let decoder = FfmpegDecoder::new().with_binary(&cli.global.ffmpeg);
    let orchestrator =
        Orchestrator::new(prober, decoder).with_options(base_extract_options(&cli.global)?);

    let mut job = build_job(&cli.command, &orchestrator, runtime)?;
    if let Some(jobs) = cli.global.jobs {
        job = job.with_parallelism(jobs);
    }

    let updates = {
        let _guard = runtime.enter();
        orchestrator.run(job)?
    };
    let interrupt = runtime.spawn(stop_on_interrupt(orchestrator.controller().clone()));

    // Drained to the end even after Ctrl-C, so the run reports `Stopped` and
    // removes its staging files.
    let mut report = TerminalReport::default();
    for update in updates.into_blocking_iter() {
        if cli.global.json {
            println!("{}", serde_json::to_string(&update_json(&update))?);
        } else {
            report.show(&update)?;
        }
    }
    interrupt.abort();
    Ok(())
}

/// Request a stop once `interrupted` resolves.
async fn stop_when(
    interrupted: impl Future<Output = IoResult<()>>,
    controller: &CancellationController,
) {
    match interrupted.await {
        Ok(()) => {
            eprintln!(
                "{} {}",
                "stopping:".yellow().bold(),
                "waiting for in-flight frames, press Ctrl-C again to abort".yellow()
            );
            controller.request_stop();
        }
        Err(error) => log::warn!("Could not listen for Ctrl-C: {error}"),
    }
}

/// First Ctrl-C stops the run gracefully; a second one exits immediately.
async fn stop_on_interrupt(controller: CancellationController) {
    stop_when(tokio::signal::ctrl_c(), &controller).await;
    if controller.is_stop_requested() && tokio::signal::ctrl_c().await.is_ok() {
        std::process::exit(130);
    }
}

fn probe<P: MediaProber>(
    prober: P,
    input: &Path,
    json: bool,
    runtime: &tokio::runtime::Runtime,
) -> Result<(), Box<dyn std::error::Error>> {
    let metadata = runtime.block_on(prober.probe_metadata(input))?;

    if json {
        let payload = json!({
            "path": input,
            "duration_seconds": metadata.duration.as_secs_f64(),
            "fps": metadata.frames_per_second,
            "frame_count": metadata.frame_count,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!("Duration: {:.3}s", metadata.duration.as_secs_f64());
        println!("Frame rate: {:.3} fps", metadata.frames_per_second);
        println!("Frames: {}", metadata.frame_count);
    }
    Ok(())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.global.verbose);

    if let Commands::Completions { shell } = &cli.command {
        let mut command = Cli::command();
        clap_complete::generate(*shell, &mut command, "framegrab", &mut std::io::stdout());
        return Ok(());
    }

    let runtime = tokio::runtime::Runtime::new()?;
    let ffprobe = FfprobeProber::new().with_binary(&cli.global.ffprobe);

    match (&cli.command, cli.global.prober) {
        (Commands::Probe { input }, ProberKind::Ffprobe) => {
            probe(ffprobe, input, cli.global.json, &runtime)
        }
        #[cfg(feature = "libav")]
        (Commands::Probe { input }, ProberKind::Libav) => {
            probe(framegrab::LibavProber, input, cli.global.json, &runtime)
        }
        #[cfg(feature = "libav")]
        (_, ProberKind::Libav) => extract(framegrab::LibavProber, &cli, &runtime),
        #[cfg(not(feature = "libav"))]
        (_, ProberKind::Libav) => {
            Err("--prober libav requires building with the `libav` feature".into())
        }
        (_, ProberKind::Ffprobe) => extract(ffprobe, &cli, &runtime),
    }
}

fn main() {
    if let Err(error) = run() {
        eprintln!("{} {error}", "error:".red().bold());
        std::process::exit(1);
    }
}
