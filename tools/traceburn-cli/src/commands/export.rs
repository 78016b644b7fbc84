//! Export a clip window with the overlay burned in.

use std::path::PathBuf;
use std::time::Duration;

use traceburn_common::{AppConfig, CancelToken};
use traceburn_export::{
    export_file, AudioMode, ExportPhase, ExportProgress, ExportRequest, ProgressCallback,
};
use traceburn_model::{AnimationMode, Rgba, Trajectory};

pub struct ExportArgs {
    pub clip: PathBuf,
    pub trajectory: PathBuf,
    pub start: f64,
    pub end: f64,
    pub output: Option<PathBuf>,
    pub max_height: Option<u32>,
    pub bitrate: u32,
    pub keyframe_interval: u32,
    pub stall_timeout: u64,
    pub global_timeout: u64,
    pub no_audio: bool,
    pub color: Option<String>,
    pub full_path: bool,
}

pub async fn run(args: ExportArgs) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(&args.trajectory).map_err(|e| {
        anyhow::anyhow!("Failed to read {}: {e}", args.trajectory.display())
    })?;
    let trajectory: Trajectory = serde_json::from_str(&raw)
        .map_err(|e| anyhow::anyhow!("Invalid trajectory JSON: {e}"))?;
    if trajectory.len() < 2 {
        return Err(anyhow::anyhow!(
            "Trajectory needs at least 2 points, found {}",
            trajectory.len()
        ));
    }

    let config = AppConfig::load();
    let output_path = args.output.unwrap_or_else(|| {
        let stem = args
            .clip
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "clip".to_string());
        config.exports_dir.join(format!("{stem}-overlay.mp4"))
    });
    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut request = ExportRequest::new(trajectory, args.start, args.end);
    request.max_height = args.max_height.or(config.export.max_height);
    request.bitrate_kbps = args.bitrate;
    request.keyframe_interval = args.keyframe_interval;
    request.stall_timeout = Duration::from_secs(args.stall_timeout);
    request.global_timeout = Duration::from_secs(args.global_timeout);
    request.audio = if args.no_audio {
        AudioMode::Omit
    } else {
        AudioMode::Preserve
    };
    if let Some(color) = &args.color {
        request.style.color = Rgba::parse(color)
            .map_err(|e| anyhow::anyhow!("Invalid --color: {e}"))?;
        if let Some(glow) = &mut request.style.glow {
            glow.color = request.style.color.with_alpha(glow.color.a);
        }
    }
    if args.full_path {
        request.style.animation = AnimationMode::Full;
    }

    // Ctrl-C cancels cleanly instead of killing the process mid-mux.
    let cancel = CancelToken::new();
    request.cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nCancelling export...");
            cancel.cancel();
        }
    });

    println!("Exporting {}", args.clip.display());
    println!("  Window: {:.3}s .. {:.3}s", args.start, args.end);
    println!("  Output: {}", output_path.display());

    let progress: ProgressCallback = Box::new(|p: ExportProgress| match p.phase {
        ExportPhase::Encoding => {
            let eta = p
                .eta_secs
                .map(|s| format!("{s:.0}s"))
                .unwrap_or_else(|| "--".to_string());
            print!(
                "\r  Encoding: {:.1}% ({}/{} frames, ETA: {eta})   ",
                p.percent, p.current_frame, p.total_frames
            );
        }
        ExportPhase::Extracting => {
            print!("\r  Capturing: {:.1}% ({} frames)          ", p.percent, p.current_frame);
        }
        _ => {}
    });

    let output = export_file(&args.clip, &output_path, request, Some(progress)).await?;

    println!("\nExport complete: {}", output_path.display());
    println!("  Frames: {}", output.frames_encoded);
    println!(
        "  Capture started at {:.3}s (drift {:+.0} ms)",
        output.actual_capture_start_secs,
        output.drift.drift_ms()
    );
    Ok(())
}
