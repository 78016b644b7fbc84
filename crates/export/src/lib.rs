//! Traceburn Export
//!
//! The two-phase export pipeline: capture frames from a playing source
//! into owned bitmaps, then composite the trajectory overlay and feed
//! the result through an encoder into a container.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                     export_clip                        │
//! │                                                        │
//! │  FrameSource ──ticks──▶ CAPTURE ──bitmaps──▶ ENCODE    │
//! │   (real-time,            stall +              overlay  │
//! │    per-request)          global               + H.264  │
//! │                          watchdogs              │      │
//! │                                                 ▼      │
//! │                                       ContainerMuxer   │
//! │                                       (complete MP4    │
//! │                                        or nothing)     │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! Every exit path closes the source and returns outstanding bitmaps
//! to the pool; a failed export never produces partial output.

pub mod encoder;
pub mod ffmpeg;
pub mod pipeline;
pub mod progress;

pub use encoder::{
    capped_resolution, ContainerMuxer, EncodedChunk, EncoderConfig, ProfileTier, VideoEncoder,
};
pub use ffmpeg::{AudioSpan, Mp4Muxer, X264PipeEncoder};
pub use pipeline::{export_clip, export_file, AudioMode, ExportOutput, ExportRequest};
pub use progress::{ExportPhase, ExportProgress, ProgressCallback};
