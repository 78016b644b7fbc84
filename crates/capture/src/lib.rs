//! Traceburn Capture
//!
//! Frame acquisition for clip export. A [`FrameSource`] plays a media
//! clip in real time and hands frames to the caller one at a time
//! through single-shot requests; the caller owns each materialized
//! bitmap explicitly and returns it to the [`BitmapPool`] when done.
//!
//! Two sources ship here: [`FfmpegPlayerSource`] decodes real media
//! through an ffmpeg subprocess, and [`ScriptedFrameSource`] replays a
//! deterministic frame schedule for tests.

pub mod bitmap;
pub mod media;
pub mod scripted;
pub mod source;

pub use bitmap::{BitmapPool, PooledBitmap};
pub use media::FfmpegPlayerSource;
pub use scripted::{ScriptedFrame, ScriptedFrameSource};
pub use source::{FramePending, FrameSource, FrameTick, SourceMetadata};
