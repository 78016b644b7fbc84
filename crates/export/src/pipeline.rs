//! Export orchestration.
//!
//! Two phases run on one task. Capture plays the source in real time
//! and collects owned bitmaps while two watchdogs supervise it: a
//! stall deadline that only a qualifying frame (new, inside the
//! window) pushes forward, and a global deadline nothing pushes
//! forward. Encoding then composites the overlay and drives the
//! encoder and muxer at whatever speed they can sustain.

use std::path::Path;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tiny_skia::PixmapMut;
use tracing::{debug, info, warn};
use traceburn_capture::{
    BitmapPool, FfmpegPlayerSource, FrameSource, PooledBitmap,
};
use traceburn_common::{
    micros_to_secs, secs_to_micros, CancelToken, ExportError, ExportResult, StartDrift,
    ThroughputEstimator,
};
use traceburn_model::{OverlayStyle, Trajectory};
use traceburn_overlay::OverlayRenderer;

use crate::encoder::{capped_resolution, ContainerMuxer, EncoderConfig, VideoEncoder};
use crate::ffmpeg::{AudioSpan, Mp4Muxer, X264PipeEncoder};
use crate::progress::{ExportPhase, ExportProgress, ProgressCallback};

/// Frames delivered earlier than this before the window start are
/// treated as seek preroll.
const PREROLL_EPSILON_MICROS: i64 = 1_000;

/// Consecutive mid-stream encoder failures tolerated before aborting.
const MAX_CONSECUTIVE_ENCODER_ERRORS: u32 = 3;

/// Drift above this gets a warning in the log.
const DRIFT_WARN_MS: f64 = 250.0;

/// What to do with the source clip's audio track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioMode {
    Omit,
    Preserve,
}

/// Everything a single export needs.
#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub trajectory: Trajectory,
    pub style: OverlayStyle,

    /// Capture window in media time, half open: `[start, end)`.
    pub start_secs: f64,
    pub end_secs: f64,

    pub max_height: Option<u32>,
    pub bitrate_kbps: u32,
    pub keyframe_interval: u32,
    pub progress_interval_frames: u32,
    pub stall_timeout: Duration,
    pub global_timeout: Duration,
    pub audio: AudioMode,
    pub cancel: CancelToken,
}

impl ExportRequest {
    pub fn new(trajectory: Trajectory, start_secs: f64, end_secs: f64) -> Self {
        Self {
            trajectory,
            style: OverlayStyle::default(),
            start_secs,
            end_secs,
            max_height: None,
            bitrate_kbps: 8_000,
            keyframe_interval: 30,
            progress_interval_frames: 10,
            stall_timeout: Duration::from_secs(10),
            global_timeout: Duration::from_secs(300),
            audio: AudioMode::Omit,
            cancel: CancelToken::new(),
        }
    }

    fn validate(&self) -> ExportResult<()> {
        if !(self.start_secs.is_finite() && self.end_secs.is_finite()) {
            return Err(ExportError::config("Capture window must be finite"));
        }
        if self.end_secs <= self.start_secs {
            return Err(ExportError::config(format!(
                "Capture window is empty: start {} >= end {}",
                self.start_secs, self.end_secs
            )));
        }
        if self.stall_timeout.is_zero() || self.global_timeout.is_zero() {
            return Err(ExportError::config("Timeouts must be non-zero"));
        }
        Ok(())
    }
}

/// A finished export.
#[derive(Debug)]
pub struct ExportOutput {
    /// The complete container bytes.
    pub container: Bytes,

    /// Media time of the first captured frame.
    pub actual_capture_start_secs: f64,

    /// Requested versus actual capture start.
    pub drift: StartDrift,

    pub frames_encoded: u64,
}

struct CaptureFrame {
    bitmap: PooledBitmap,
    /// Offset from the requested window start.
    relative_micros: i64,
}

/// Run a full export through the given collaborators.
///
/// On any exit, success or not, the source is closed and every pooled
/// bitmap is back in `pool`; on error no container bytes exist.
pub async fn export_clip<S, E, M>(
    mut source: S,
    mut encoder: E,
    mut muxer: M,
    pool: &BitmapPool,
    request: ExportRequest,
    progress: Option<ProgressCallback>,
) -> ExportResult<ExportOutput>
where
    S: FrameSource,
    E: VideoEncoder,
    M: ContainerMuxer,
{
    let report = move |update: ExportProgress| {
        if let Some(cb) = &progress {
            cb(update);
        }
    };

    let result = run_pipeline(&mut source, &mut encoder, &mut muxer, pool, &request, &report).await;

    // Teardown runs on every path; the original error wins.
    if let Err(close_err) = source.close().await {
        warn!(error = %close_err, "Source close failed during teardown");
    }
    if result.is_err() {
        if let Err(close_err) = encoder.close().await {
            warn!(error = %close_err, "Encoder close failed during teardown");
        }
    }

    match result {
        Ok(output) => {
            report(ExportProgress {
                phase: ExportPhase::Complete,
                percent: 100.0,
                current_frame: output.frames_encoded,
                total_frames: output.frames_encoded,
                eta_secs: Some(0.0),
            });
            info!(
                frames = output.frames_encoded,
                bytes = output.container.len(),
                drift_ms = output.drift.drift_ms(),
                "Export complete"
            );
            Ok(output)
        }
        Err(err) => {
            report(ExportProgress::phase_started(ExportPhase::Failed));
            if err.is_cancelled() {
                info!("Export cancelled");
            } else {
                warn!(error = %err, "Export failed");
            }
            Err(err)
        }
    }
}

async fn run_pipeline<S, E, M>(
    source: &mut S,
    encoder: &mut E,
    muxer: &mut M,
    pool: &BitmapPool,
    request: &ExportRequest,
    report: &dyn Fn(ExportProgress),
) -> ExportResult<ExportOutput>
where
    S: FrameSource,
    E: VideoEncoder,
    M: ContainerMuxer,
{
    request.validate()?;
    request.cancel.check()?;
    report(ExportProgress::phase_started(ExportPhase::Preparing));

    let export_started = Instant::now();
    let global_deadline = export_started + request.global_timeout;

    let metadata = source.load().await?;
    let (width, height) = capped_resolution(metadata.width, metadata.height, request.max_height);
    let config = EncoderConfig::new(
        width,
        height,
        metadata.frame_rate,
        request.bitrate_kbps,
        request.keyframe_interval,
    )?;
    debug!(
        width,
        height,
        profile = config.tier.profile,
        level = config.tier.level,
        "Export configuration validated"
    );

    encoder.configure(&config).await?;
    muxer.begin(&config)?;
    source.configure(width, height)?;

    request.cancel.check()?;
    let seek_landing = source.seek(request.start_secs).await?;
    debug!(
        requested = request.start_secs,
        landing = seek_landing,
        "Seek complete"
    );
    source.play().await?;

    report(ExportProgress::phase_started(ExportPhase::Extracting));
    let (frames, drift) =
        capture_frames(source, pool, request, export_started, global_deadline, report).await?;
    let actual_capture_start_secs = drift.actual_secs;

    report(ExportProgress::phase_started(ExportPhase::Encoding));
    let frames_encoded = encode_frames(
        encoder,
        muxer,
        frames,
        request,
        export_started,
        global_deadline,
        report,
    )
    .await?;

    request.cancel.check()?;
    report(ExportProgress::phase_started(ExportPhase::Muxing));
    for chunk in encoder.flush().await? {
        muxer.write_chunk(chunk)?;
    }
    encoder.close().await?;
    let container = muxer.finalize().await?;

    Ok(ExportOutput {
        container,
        actual_capture_start_secs,
        drift,
        frames_encoded,
    })
}

/// Real-time capture under stall and global supervision.
async fn capture_frames<S: FrameSource>(
    source: &mut S,
    pool: &BitmapPool,
    request: &ExportRequest,
    export_started: Instant,
    global_deadline: Instant,
    report: &dyn Fn(ExportProgress),
) -> ExportResult<(Vec<CaptureFrame>, StartDrift)> {
    let start_micros = secs_to_micros(request.start_secs);
    let end_micros = secs_to_micros(request.end_secs);
    let window_micros = (end_micros - start_micros).max(1);

    let mut frames: Vec<CaptureFrame> = Vec::new();
    let mut drift: Option<StartDrift> = None;
    let mut last_pts_micros: Option<i64> = None;
    let mut stall_deadline = Instant::now() + request.stall_timeout;

    let mut pending = source.request_next_frame()?;
    loop {
        request.cancel.check()?;

        let now = Instant::now();
        let nearest = stall_deadline.min(global_deadline);
        if now >= nearest {
            return Err(deadline_error(
                request,
                export_started,
                stall_deadline,
                global_deadline,
            ));
        }

        let tick = match tokio::time::timeout(nearest - now, pending.wait()).await {
            Err(_) => {
                return Err(deadline_error(
                    request,
                    export_started,
                    stall_deadline,
                    global_deadline,
                ));
            }
            Ok(delivered) => delivered?,
        };
        let Some(tick) = tick else {
            debug!(frames = frames.len(), "Source reached end of stream");
            break;
        };

        let pts_micros = secs_to_micros(tick.presentation_secs);

        // Seek preroll: before the window, does not feed the watchdog.
        if pts_micros < start_micros - PREROLL_EPSILON_MICROS {
            debug!(pts = tick.presentation_secs, "Discarding preroll frame");
            pending = source.request_next_frame()?;
            continue;
        }

        // Repeated or regressing presentation timestamps are likewise not
        // a sign of life; captured timestamps stay strictly increasing.
        if last_pts_micros.is_some_and(|last| pts_micros <= last) {
            debug!(pts = tick.presentation_secs, "Discarding non-advancing frame");
            pending = source.request_next_frame()?;
            continue;
        }

        // The window is half open; the end frame is not captured.
        if pts_micros >= end_micros {
            debug!(pts = tick.presentation_secs, "Reached window end");
            break;
        }

        stall_deadline = Instant::now() + request.stall_timeout;
        last_pts_micros = Some(pts_micros);
        if drift.is_none() {
            let d = StartDrift {
                requested_secs: request.start_secs,
                actual_secs: tick.presentation_secs,
            };
            if d.exceeds_threshold_ms(DRIFT_WARN_MS) {
                warn!(drift_ms = d.drift_ms(), "Capture started far from the requested time");
            } else {
                debug!(drift_ms = d.drift_ms(), "Capture start drift recorded");
            }
            drift = Some(d);
        }

        // Re-arm before the copy so no frame lands in a dead slot.
        pending = source.request_next_frame()?;
        let bitmap = tick.snapshot.materialize(pool).await?;
        frames.push(CaptureFrame {
            bitmap,
            relative_micros: pts_micros - start_micros,
        });

        report(ExportProgress {
            phase: ExportPhase::Extracting,
            percent: ((pts_micros - start_micros) as f64 / window_micros as f64 * 100.0)
                .clamp(0.0, 100.0),
            current_frame: frames.len() as u64,
            total_frames: 0,
            eta_secs: None,
        });
    }

    let drift = drift.ok_or_else(|| {
        ExportError::source("No frames arrived inside the capture window")
    })?;
    info!(
        frames = frames.len(),
        first_pts = drift.actual_secs,
        drift_ms = drift.drift_ms(),
        "Capture finished"
    );
    Ok((frames, drift))
}

fn deadline_error(
    request: &ExportRequest,
    export_started: Instant,
    stall_deadline: Instant,
    global_deadline: Instant,
) -> ExportError {
    if stall_deadline <= global_deadline {
        ExportError::StallTimeout {
            idle: request.stall_timeout,
        }
    } else {
        ExportError::GlobalTimeout {
            elapsed: export_started.elapsed(),
            limit: request.global_timeout,
        }
    }
}

/// Composite the overlay and push each frame through the encoder.
async fn encode_frames<E: VideoEncoder, M: ContainerMuxer>(
    encoder: &mut E,
    muxer: &mut M,
    frames: Vec<CaptureFrame>,
    request: &ExportRequest,
    export_started: Instant,
    global_deadline: Instant,
    report: &dyn Fn(ExportProgress),
) -> ExportResult<u64> {
    let renderer = OverlayRenderer::new(request.style);
    let total = frames.len() as u64;
    let mut estimator = ThroughputEstimator::new(30);
    let mut consecutive_errors = 0u32;
    let mut encoded = 0u64;
    let progress_interval = request.progress_interval_frames.max(1) as u64;

    for (index, frame) in frames.into_iter().enumerate() {
        request.cancel.check()?;
        if Instant::now() >= global_deadline {
            return Err(ExportError::GlobalTimeout {
                elapsed: export_started.elapsed(),
                limit: request.global_timeout,
            });
        }

        let mut bitmap = frame.bitmap;
        let media_time_secs = request.start_secs + micros_to_secs(frame.relative_micros);
        {
            let width = bitmap.width();
            let height = bitmap.height();
            let mut pixmap = PixmapMut::from_bytes(bitmap.data_mut(), width, height)
                .ok_or_else(|| ExportError::overlay("Bitmap does not match its dimensions"))?;
            renderer.render(&mut pixmap, &request.trajectory, media_time_secs);
        }

        let keyframe = index as u32 % request.keyframe_interval == 0;
        match encoder
            .encode(&bitmap, frame.relative_micros, keyframe)
            .await
        {
            Ok(chunks) => {
                consecutive_errors = 0;
                for chunk in chunks {
                    muxer.write_chunk(chunk)?;
                }
                encoded += 1;
            }
            Err(err @ ExportError::EncoderRuntime { .. }) => {
                consecutive_errors += 1;
                if consecutive_errors >= MAX_CONSECUTIVE_ENCODER_ERRORS {
                    return Err(err);
                }
                warn!(
                    error = %err,
                    consecutive = consecutive_errors,
                    "Transient encoder failure, frame skipped"
                );
            }
            Err(err) => return Err(err),
        }
        bitmap.release();

        let done = index as u64 + 1;
        estimator.record(done);
        if done % progress_interval == 0 || done == total {
            report(ExportProgress {
                phase: ExportPhase::Encoding,
                percent: done as f64 / total as f64 * 100.0,
                current_frame: encoded,
                total_frames: total,
                eta_secs: estimator.eta_secs(total - done),
            });
        }
    }

    Ok(encoded)
}

/// Export a clip on disk with the shipped ffmpeg collaborators.
pub async fn export_file(
    clip: &Path,
    output: &Path,
    request: ExportRequest,
    progress: Option<ProgressCallback>,
) -> ExportResult<ExportOutput> {
    let source = FfmpegPlayerSource::new(clip);
    let encoder = X264PipeEncoder::new();
    let audio = match request.audio {
        AudioMode::Preserve => Some(AudioSpan {
            path: clip.to_path_buf(),
            start_secs: request.start_secs,
            duration_secs: request.end_secs - request.start_secs,
        }),
        AudioMode::Omit => None,
    };
    let muxer = Mp4Muxer::new(audio);
    let pool = BitmapPool::new();

    let result = export_clip(source, encoder, muxer, &pool, request, progress).await?;
    debug_assert_eq!(pool.outstanding(), 0);
    tokio::fs::write(output, &result.container).await?;
    info!(output = %output.display(), bytes = result.container.len(), "Export written");
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use traceburn_model::TrajectoryPoint;

    fn trajectory() -> Trajectory {
        Trajectory::new(vec![
            TrajectoryPoint::new(0.0, 0.1, 0.9),
            TrajectoryPoint::new(1.0, 0.9, 0.2),
        ])
    }

    #[test]
    fn request_validation_rejects_empty_windows() {
        let mut request = ExportRequest::new(trajectory(), 5.0, 5.0);
        assert!(request.validate().is_err());
        request.end_secs = 4.0;
        assert!(request.validate().is_err());
        request.end_secs = 6.0;
        assert!(request.validate().is_ok());
    }

    #[test]
    fn request_validation_rejects_zero_timeouts() {
        let mut request = ExportRequest::new(trajectory(), 0.0, 1.0);
        request.stall_timeout = Duration::ZERO;
        assert!(request.validate().is_err());
    }
}
