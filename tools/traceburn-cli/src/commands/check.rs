//! Verify encoder availability and run a short self-test export.

use std::process::Command;
use std::time::Duration;

use traceburn_capture::{BitmapPool, ScriptedFrame, ScriptedFrameSource, SourceMetadata};
use traceburn_export::{export_clip, ExportRequest, Mp4Muxer, X264PipeEncoder};
use traceburn_model::{Trajectory, TrajectoryPoint};

pub async fn run() -> anyhow::Result<()> {
    println!("Traceburn System Check");
    println!("{}", "=".repeat(50));

    let ffmpeg = command_exists("ffmpeg");
    let ffprobe = command_exists("ffprobe");
    println!("[{}] ffmpeg", if ffmpeg { "OK" } else { "MISSING" });
    println!("[{}] ffprobe", if ffprobe { "OK" } else { "MISSING" });

    if !(ffmpeg && ffprobe) {
        println!("\nInstall ffmpeg and ffprobe, then re-run the check.");
        return Ok(());
    }

    // Tiny synthetic export through the real encoder and muxer.
    println!("\nRunning self-test export (16 frames, 160x90)...");
    let frames: Vec<ScriptedFrame> = (0..16)
        .map(|i| ScriptedFrame::new(0, i as f64 / 30.0))
        .collect();
    let source = ScriptedFrameSource::new(SourceMetadata {
        duration_secs: 1.0,
        width: 160,
        height: 90,
        frame_rate: 30.0,
    })
    .with_frames(frames);

    let trajectory = Trajectory::new(vec![
        TrajectoryPoint::new(0.0, 0.1, 0.9),
        TrajectoryPoint::new(0.25, 0.5, 0.2),
        TrajectoryPoint::new(0.5, 0.9, 0.8),
    ]);
    let mut request = ExportRequest::new(trajectory, 0.0, 0.5);
    request.bitrate_kbps = 500;
    request.stall_timeout = Duration::from_secs(5);
    request.global_timeout = Duration::from_secs(60);

    let pool = BitmapPool::new();
    match export_clip(
        source,
        X264PipeEncoder::new(),
        Mp4Muxer::new(None),
        &pool,
        request,
        None,
    )
    .await
    {
        Ok(output) => {
            println!(
                "[OK] Self-test produced a {} byte MP4 from {} frames",
                output.container.len(),
                output.frames_encoded
            );
            println!("\nTraceburn is ready.");
        }
        Err(err) => {
            println!("[FAIL] Self-test export failed: {err}");
        }
    }
    Ok(())
}

fn command_exists(binary: &str) -> bool {
    Command::new("sh")
        .arg("-c")
        .arg(format!("command -v {binary} >/dev/null 2>&1"))
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}
