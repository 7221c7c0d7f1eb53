//! Stop an exhaustive extraction after a fixed number of frames.
//!
//! Usage:
//!   cargo run --example stop_midway -- <input_file> [frames_before_stop]

use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;

use framegrab::{
    ExtractOptions, ExtractionJob, Orchestrator, SubmissionStyle, UpdateKind, VideoSelection,
};
use tokio_stream::StreamExt;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let mut arguments = std::env::args().skip(1);
    let input_path = PathBuf::from(
        arguments
            .next()
            .unwrap_or_else(|| "input.mp4".to_string()),
    );
    let stop_after: u64 = arguments.next().map(|raw| raw.parse()).transpose()?.unwrap_or(25);

    let orchestrator = Orchestrator::ffmpeg()
        .with_options(ExtractOptions::new().with_grace_period(Duration::from_millis(500)));
    let controller = orchestrator.controller().clone();

    let job = ExtractionJob::exhaustive(VideoSelection::Single(input_path))
        .with_output_dir("stopped_frames")
        .with_submission(SubmissionStyle::Streaming);

    let mut stream = orchestrator.run(job)?;
    while let Some(update) = stream.next().await {
        match update.kind {
            UpdateKind::Progress(info) => {
                print!("\r{}", update.status);
                if info.completed >= stop_after && !controller.is_stop_requested() {
                    println!("\nRequesting stop...");
                    controller.request_stop();
                }
            }
            UpdateKind::Stopped { completed } => {
                println!("Stopped after {completed} frames");
            }
            UpdateKind::VideoCompleted { extracted, planned, .. } => {
                println!("\nFinished before the stop: {extracted}/{planned}");
            }
            _ => {}
        }
    }

    Ok(())
}
