//! ffmpeg-backed frame source.
//!
//! Decodes a clip through an ffmpeg subprocess in real time (`-re`) and
//! reads raw RGBA frames off its stdout on a dedicated thread. Frames
//! that arrive while no request is armed are dropped, which is exactly
//! the throttling behavior the capture contract asks for.

use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use bytes::Bytes;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use traceburn_common::{ExportError, ExportResult};

use crate::source::{FramePending, FrameSnapshot, FrameSource, FrameTick, SourceMetadata};

type FrameSender = oneshot::Sender<ExportResult<Option<FrameTick>>>;

/// Shared state between the source and its reader thread.
#[derive(Debug, Default)]
struct DeliverySlot {
    armed: Mutex<Option<FrameSender>>,
    eos: AtomicBool,
    dropped: AtomicU64,
}

impl DeliverySlot {
    fn fulfill(&self, outcome: ExportResult<Option<FrameTick>>) -> bool {
        if let Some(tx) = self.armed.lock().expect("delivery slot poisoned").take() {
            let _ = tx.send(outcome);
            true
        } else {
            false
        }
    }
}

/// Plays a media file through ffmpeg and serves per-request frames.
pub struct FfmpegPlayerSource {
    path: PathBuf,
    metadata: Option<SourceMetadata>,
    capture_size: Option<(u32, u32)>,
    start_secs: f64,
    slot: Arc<DeliverySlot>,
    child: Option<Child>,
    reader: Option<std::thread::JoinHandle<()>>,
    play_started: Option<Instant>,
}

impl FfmpegPlayerSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            metadata: None,
            capture_size: None,
            start_secs: 0.0,
            slot: Arc::new(DeliverySlot::default()),
            child: None,
            reader: None,
            play_started: None,
        }
    }

    /// Frames dropped because no request was armed when they arrived.
    pub fn dropped_frames(&self) -> u64 {
        self.slot.dropped.load(Ordering::SeqCst)
    }

    fn metadata_or_err(&self) -> ExportResult<SourceMetadata> {
        self.metadata
            .ok_or_else(|| ExportError::source("Frame source used before load"))
    }
}

#[async_trait::async_trait]
impl FrameSource for FfmpegPlayerSource {
    async fn load(&mut self) -> ExportResult<SourceMetadata> {
        if !self.path.exists() {
            return Err(ExportError::FileNotFound {
                path: self.path.clone(),
            });
        }
        let path = self.path.clone();
        let metadata =
            tokio::task::spawn_blocking(move || probe_metadata(&path))
                .await
                .map_err(|e| ExportError::source(format!("Probe task failed: {e}")))??;
        info!(
            path = %self.path.display(),
            width = metadata.width,
            height = metadata.height,
            duration_secs = metadata.duration_secs,
            frame_rate = metadata.frame_rate,
            "Loaded media source"
        );
        self.metadata = Some(metadata);
        Ok(metadata)
    }

    fn configure(&mut self, capture_width: u32, capture_height: u32) -> ExportResult<()> {
        if capture_width == 0 || capture_height == 0 {
            return Err(ExportError::source("Capture dimensions must be non-zero"));
        }
        self.metadata_or_err()?;
        self.capture_size = Some((capture_width, capture_height));
        Ok(())
    }

    async fn seek(&mut self, target_secs: f64) -> ExportResult<f64> {
        self.metadata_or_err()?;
        let path = self.path.clone();
        let landing = tokio::task::spawn_blocking(move || {
            previous_keyframe_secs(&path, target_secs)
        })
        .await
        .map_err(|e| ExportError::source(format!("Keyframe probe task failed: {e}")))??;
        debug!(target_secs, landing, "Seek resolved to keyframe");
        self.start_secs = landing;
        Ok(landing)
    }

    async fn play(&mut self) -> ExportResult<()> {
        let metadata = self.metadata_or_err()?;
        let (width, height) = self
            .capture_size
            .ok_or_else(|| ExportError::source("Frame source played before configure"))?;

        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-nostdin", "-v", "error"])
            .args(["-noaccurate_seek", "-ss", &format!("{:.6}", self.start_secs)])
            .arg("-re")
            .arg("-i")
            .arg(&self.path)
            .args(["-map", "0:v:0"])
            .args(["-vf", &format!("scale={width}:{height}")])
            .args(["-f", "rawvideo", "-pix_fmt", "rgba", "-"])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null());

        let mut child = cmd
            .spawn()
            .map_err(|e| ExportError::source(format!("Failed to start ffmpeg: {e}")))?;
        info!(pid = child.id(), start_secs = self.start_secs, "ffmpeg playback started");

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExportError::source("Failed to capture ffmpeg stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ExportError::source("Failed to capture ffmpeg stderr"))?;

        // Drain stderr so ffmpeg never blocks on a full pipe.
        std::thread::spawn(move || {
            let mut reader = BufReader::new(stderr);
            let mut output = String::new();
            if reader.read_to_string(&mut output).is_ok() && !output.trim().is_empty() {
                warn!(stderr = %output.trim(), "ffmpeg reported errors");
            }
        });

        let slot = Arc::clone(&self.slot);
        let started = Instant::now();
        let start_secs = self.start_secs;
        let frame_rate = metadata.frame_rate.max(1.0);
        let frame_bytes = width as usize * height as usize * 4;

        let reader = std::thread::spawn(move || {
            let mut reader = BufReader::new(stdout);
            let mut index = 0u64;
            let mut buf = vec![0u8; frame_bytes];
            loop {
                match reader.read_exact(&mut buf) {
                    Ok(()) => {
                        let presentation_secs = start_secs + index as f64 / frame_rate;
                        index += 1;
                        let tick = FrameTick {
                            host_clock_secs: started.elapsed().as_secs_f64(),
                            presentation_secs,
                            snapshot: FrameSnapshot::new(
                                Bytes::copy_from_slice(&buf),
                                width,
                                height,
                            ),
                        };
                        if !slot.fulfill(Ok(Some(tick))) {
                            slot.dropped.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                    Err(_) => {
                        // EOF or a torn-down pipe: both mean no more frames.
                        slot.eos.store(true, Ordering::SeqCst);
                        slot.fulfill(Ok(None));
                        break;
                    }
                }
            }
        });

        self.child = Some(child);
        self.reader = Some(reader);
        self.play_started = Some(started);
        Ok(())
    }

    fn request_next_frame(&mut self) -> ExportResult<FramePending> {
        if self.play_started.is_none() {
            return Err(ExportError::source("Frame requested before play"));
        }
        if self.slot.eos.load(Ordering::SeqCst) {
            return Ok(FramePending::resolved(Ok(None)));
        }
        let mut armed = self.slot.armed.lock().expect("delivery slot poisoned");
        if armed.is_some() {
            return Err(ExportError::source(
                "A frame request is already outstanding",
            ));
        }
        let (tx, pending) = FramePending::channel();
        *armed = Some(tx);
        Ok(pending)
    }

    async fn close(&mut self) -> ExportResult<()> {
        if let Some(mut child) = self.child.take() {
            // Killing a finished process is fine; the error is expected.
            let _ = child.kill();
            let _ = child.wait();
        }
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
        // Anything still armed resolves as end of stream.
        self.slot.eos.store(true, Ordering::SeqCst);
        self.slot.fulfill(Ok(None));
        self.play_started = None;
        debug!(path = %self.path.display(), "Frame source closed");
        Ok(())
    }
}

fn probe_metadata(path: &Path) -> ExportResult<SourceMetadata> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height,avg_frame_rate:format=duration",
            "-of",
            "json",
        ])
        .arg(path)
        .output()
        .map_err(|e| ExportError::load(format!("Failed to run ffprobe: {e}")))?;

    if !output.status.success() {
        return Err(ExportError::load(format!(
            "ffprobe failed for {}: {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let parsed: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    let stream = parsed["streams"]
        .get(0)
        .ok_or_else(|| ExportError::load("No video stream found"))?;

    let width = stream["width"].as_u64().unwrap_or(0) as u32;
    let height = stream["height"].as_u64().unwrap_or(0) as u32;
    if width == 0 || height == 0 {
        return Err(ExportError::load("Video stream reports zero dimensions"));
    }

    let frame_rate = stream["avg_frame_rate"]
        .as_str()
        .and_then(parse_rational)
        .unwrap_or(30.0);
    let duration_secs = parsed["format"]["duration"]
        .as_str()
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    Ok(SourceMetadata {
        duration_secs,
        width,
        height,
        frame_rate,
    })
}

fn parse_rational(raw: &str) -> Option<f64> {
    let (num, den) = raw.split_once('/')?;
    let num: f64 = num.parse().ok()?;
    let den: f64 = den.parse().ok()?;
    if den == 0.0 {
        return None;
    }
    Some(num / den)
}

/// Find the last keyframe at or before `target_secs`.
///
/// Scans only a short interval back from the target; clips with sparser
/// keyframes fall back to the start of the file.
fn previous_keyframe_secs(path: &Path, target_secs: f64) -> ExportResult<f64> {
    let window_start = (target_secs - 15.0).max(0.0);
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-skip_frame",
            "nokey",
            "-show_entries",
            "frame=pts_time",
            "-of",
            "csv=p=0",
            "-read_intervals",
            &format!("{window_start:.3}%{:.3}", target_secs + 0.05),
        ])
        .arg(path)
        .output()
        .map_err(|e| ExportError::source(format!("Failed to run ffprobe: {e}")))?;

    if !output.status.success() {
        return Err(ExportError::source(format!(
            "Keyframe probe failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let landing = String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter_map(|line| line.trim().trim_end_matches(',').parse::<f64>().ok())
        .filter(|&pts| pts <= target_secs + 1e-6)
        .fold(0.0f64, f64::max);
    Ok(landing)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rational_frame_rates_parse() {
        assert_eq!(parse_rational("30000/1001").map(|v| (v * 100.0).round()), Some(2997.0));
        assert_eq!(parse_rational("25/1"), Some(25.0));
        assert!(parse_rational("0/0").is_none());
        assert!(parse_rational("not-a-rate").is_none());
    }

    #[tokio::test]
    async fn load_rejects_missing_files() {
        let mut source = FfmpegPlayerSource::new("/nonexistent/clip.mp4");
        let err = source.load().await.unwrap_err();
        assert!(matches!(err, ExportError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn request_before_play_is_an_error() {
        let mut source = FfmpegPlayerSource::new("/nonexistent/clip.mp4");
        assert!(source.request_next_frame().is_err());
    }
}
