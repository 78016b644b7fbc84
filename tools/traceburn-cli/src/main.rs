//! Traceburn CLI: export media clips with an animated trajectory overlay.
//!
//! Usage:
//!   traceburn export <CLIP> --trajectory points.json --start 4.0 --end 9.5
//!   traceburn probe <CLIP>     Show stream properties
//!   traceburn check            Verify ffmpeg availability and run a self-test

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "traceburn",
    about = "Trajectory overlay clip exports",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export a clip window with the overlay burned in
    Export {
        /// Source media file
        clip: PathBuf,

        /// Trajectory points JSON (normalized coordinates)
        #[arg(short, long)]
        trajectory: PathBuf,

        /// Capture window start (media seconds)
        #[arg(long)]
        start: f64,

        /// Capture window end (media seconds, exclusive)
        #[arg(long)]
        end: f64,

        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Cap output height, keeping aspect ratio
        #[arg(long)]
        max_height: Option<u32>,

        /// Video bitrate in kbit/s
        #[arg(long, default_value = "8000")]
        bitrate: u32,

        /// Keyframe cadence in frames
        #[arg(long, default_value = "30")]
        keyframe_interval: u32,

        /// Stall watchdog window in seconds
        #[arg(long, default_value = "10")]
        stall_timeout: u64,

        /// Absolute export ceiling in seconds
        #[arg(long, default_value = "300")]
        global_timeout: u64,

        /// Drop the source audio track
        #[arg(long)]
        no_audio: bool,

        /// Path stroke color (#RRGGBB or #RRGGBBAA)
        #[arg(long)]
        color: Option<String>,

        /// Draw the whole path on every frame instead of revealing it
        #[arg(long)]
        full_path: bool,
    },

    /// Show a clip's stream properties
    Probe {
        /// Source media file
        clip: PathBuf,
    },

    /// Check encoder availability and run a short self-test export
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    traceburn_common::logging::init_logging(&traceburn_common::LoggingConfig {
        level: log_level.to_string(),
        json: false,
        file: None,
    });

    match cli.command {
        Commands::Export {
            clip,
            trajectory,
            start,
            end,
            output,
            max_height,
            bitrate,
            keyframe_interval,
            stall_timeout,
            global_timeout,
            no_audio,
            color,
            full_path,
        } => {
            commands::export::run(commands::export::ExportArgs {
                clip,
                trajectory,
                start,
                end,
                output,
                max_height,
                bitrate,
                keyframe_interval,
                stall_timeout,
                global_timeout,
                no_audio,
                color,
                full_path,
            })
            .await
        }
        Commands::Probe { clip } => commands::probe::run(clip).await,
        Commands::Check => commands::check::run().await,
    }
}
