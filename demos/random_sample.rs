//! Random frame sampling example.
//!
//! Usage:
//!   cargo run --example random_sample -- <input_file> [count] [output_dir]

use std::error::Error;
use std::path::PathBuf;

use framegrab::{ExtractionJob, Orchestrator, UpdateKind, VideoSelection};
use tokio_stream::StreamExt;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let mut arguments = std::env::args().skip(1);
    let input_path = PathBuf::from(
        arguments
            .next()
            .unwrap_or_else(|| "input.mp4".to_string()),
    );
    let count: u64 = arguments.next().map(|raw| raw.parse()).transpose()?.unwrap_or(10);
    let output_dir = arguments
        .next()
        .unwrap_or_else(|| "sampled_frames".to_string());

    let orchestrator = Orchestrator::ffmpeg();
    let job = ExtractionJob::random(VideoSelection::Single(input_path), count)
        .with_output_dir(&output_dir)
        .with_seed(7);

    let mut stream = orchestrator.run(job)?;
    while let Some(update) = stream.next().await {
        match &update.kind {
            UpdateKind::Started { planned, skipped_existing, .. } => {
                println!("Sampling {planned} frames ({skipped_existing} already on disk)");
            }
            UpdateKind::Progress(info) => {
                print!("\r{}", info.line());
            }
            UpdateKind::TaskFailed { frame, .. } => {
                println!("\nFrame {frame} could not be decoded");
            }
            UpdateKind::Skipped { video, reason } => {
                println!("Skipped {}: {reason}", video.display());
            }
            UpdateKind::VideoCompleted { extracted, planned, .. } => {
                println!("\nExtracted {extracted}/{planned} frames into {output_dir}");
            }
            _ => {}
        }
        if let Some(preview) = &update.preview {
            log_preview(preview);
        }
    }

    println!("Done!");
    Ok(())
}

fn log_preview(preview: &std::path::Path) {
    if let Some(name) = preview.file_name() {
        print!("  latest: {}", name.to_string_lossy());
    }
}
