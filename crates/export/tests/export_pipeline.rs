//! End-to-end pipeline tests against a scripted frame source and
//! recording encoder/muxer doubles. No external binaries involved.

use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use traceburn_capture::{
    BitmapPool, PooledBitmap, ScriptedFrame, ScriptedFrameSource, SourceMetadata,
};
use traceburn_common::{CancelToken, ExportError, ExportResult};
use traceburn_export::{
    export_clip, ContainerMuxer, EncodedChunk, EncoderConfig, ExportRequest, VideoEncoder,
};
use traceburn_model::{Trajectory, TrajectoryPoint};

#[derive(Default)]
struct EncoderState {
    config: Option<EncoderConfig>,
    encoded: Vec<(i64, bool)>,
    flushed: bool,
    closed: bool,
}

/// Encoder double: one synthetic chunk per frame, scripted failures.
#[derive(Clone, Default)]
struct RecordingEncoder {
    state: Arc<Mutex<EncoderState>>,
    fail_next: Arc<Mutex<VecDeque<bool>>>,
}

impl RecordingEncoder {
    fn failing(plan: impl IntoIterator<Item = bool>) -> Self {
        let encoder = Self::default();
        *encoder.fail_next.lock().unwrap() = plan.into_iter().collect();
        encoder
    }
}

#[async_trait]
impl VideoEncoder for RecordingEncoder {
    async fn configure(&mut self, config: &EncoderConfig) -> ExportResult<()> {
        self.state.lock().unwrap().config = Some(config.clone());
        Ok(())
    }

    async fn encode(
        &mut self,
        frame: &PooledBitmap,
        pts_micros: i64,
        keyframe: bool,
    ) -> ExportResult<Vec<EncodedChunk>> {
        if self.fail_next.lock().unwrap().pop_front() == Some(true) {
            return Err(ExportError::encoder_runtime("scripted failure"));
        }
        assert!(!frame.data().is_empty());
        self.state.lock().unwrap().encoded.push((pts_micros, keyframe));
        Ok(vec![EncodedChunk {
            data: Bytes::from_static(b"chunk"),
            pts_micros,
            keyframe,
        }])
    }

    async fn flush(&mut self) -> ExportResult<Vec<EncodedChunk>> {
        self.state.lock().unwrap().flushed = true;
        Ok(Vec::new())
    }

    async fn close(&mut self) -> ExportResult<()> {
        self.state.lock().unwrap().closed = true;
        Ok(())
    }
}

#[derive(Default)]
struct MuxerState {
    begun: bool,
    chunks: Vec<EncodedChunk>,
    finalized: bool,
}

#[derive(Clone, Default)]
struct RecordingMuxer {
    state: Arc<Mutex<MuxerState>>,
}

#[async_trait]
impl ContainerMuxer for RecordingMuxer {
    fn begin(&mut self, _config: &EncoderConfig) -> ExportResult<()> {
        self.state.lock().unwrap().begun = true;
        Ok(())
    }

    fn write_chunk(&mut self, chunk: EncodedChunk) -> ExportResult<()> {
        let mut state = self.state.lock().unwrap();
        assert!(state.begun, "chunk written before begin");
        state.chunks.push(chunk);
        Ok(())
    }

    async fn finalize(&mut self) -> ExportResult<Bytes> {
        let mut state = self.state.lock().unwrap();
        state.finalized = true;
        let total: usize = state.chunks.iter().map(|c| c.data.len()).sum();
        Ok(Bytes::from(vec![0xb0; total.max(1)]))
    }
}

fn metadata() -> SourceMetadata {
    SourceMetadata {
        duration_secs: 30.0,
        width: 320,
        height: 180,
        frame_rate: 30.0,
    }
}

fn trajectory() -> Trajectory {
    Trajectory::new(vec![
        TrajectoryPoint::new(1.0, 0.1, 0.9),
        TrajectoryPoint::new(1.5, 0.5, 0.3),
        TrajectoryPoint::new(2.0, 0.9, 0.85),
    ])
}

fn fast_request(start: f64, end: f64) -> ExportRequest {
    let mut request = ExportRequest::new(trajectory(), start, end);
    request.stall_timeout = Duration::from_secs(5);
    request.global_timeout = Duration::from_secs(30);
    request
}

#[tokio::test]
async fn duplicate_timestamps_do_not_inflate_the_frame_count() {
    let source = ScriptedFrameSource::new(metadata()).with_frames([
        ScriptedFrame::new(0, 1.0),
        ScriptedFrame::new(0, 1.0),
        ScriptedFrame::new(0, 1.033),
        ScriptedFrame::new(0, 1.066),
        ScriptedFrame::new(0, 1.066),
        ScriptedFrame::new(0, 1.1),
    ]);
    let encoder = RecordingEncoder::default();
    let muxer = RecordingMuxer::default();
    let pool = BitmapPool::new();

    let output = export_clip(
        source,
        encoder.clone(),
        muxer.clone(),
        &pool,
        fast_request(1.0, 1.1),
        None,
    )
    .await
    .unwrap();

    assert_eq!(output.frames_encoded, 3);
    assert_eq!(muxer.state.lock().unwrap().chunks.len(), 3);
    assert_eq!(pool.outstanding(), 0);
}

#[tokio::test]
async fn regressing_timestamps_are_discarded() {
    // The third delivery steps backwards inside the window; it must not
    // be captured, and encoded timestamps stay strictly increasing.
    let source = ScriptedFrameSource::new(metadata()).with_frames([
        ScriptedFrame::new(0, 1.0),
        ScriptedFrame::new(0, 1.066),
        ScriptedFrame::new(0, 1.033),
        ScriptedFrame::new(0, 1.1),
    ]);
    let encoder = RecordingEncoder::default();
    let pool = BitmapPool::new();

    let output = export_clip(
        source,
        encoder.clone(),
        RecordingMuxer::default(),
        &pool,
        fast_request(1.0, 2.0),
        None,
    )
    .await
    .unwrap();

    assert_eq!(output.frames_encoded, 3);
    let state = encoder.state.lock().unwrap();
    let pts: Vec<i64> = state.encoded.iter().map(|&(p, _)| p).collect();
    assert_eq!(pts, vec![0, 66_000, 100_000]);
}

#[tokio::test]
async fn preroll_frames_are_discarded_and_drift_is_reported() {
    let source = ScriptedFrameSource::new(metadata())
        .with_keyframe_interval(2.0)
        .with_frames([
            ScriptedFrame::new(0, 4.0),
            ScriptedFrame::new(0, 4.5),
            ScriptedFrame::new(0, 5.0),
            ScriptedFrame::new(0, 5.5),
        ]);
    let pool = BitmapPool::new();

    let output = export_clip(
        source,
        RecordingEncoder::default(),
        RecordingMuxer::default(),
        &pool,
        fast_request(4.9, 6.0),
        None,
    )
    .await
    .unwrap();

    assert_eq!(output.frames_encoded, 2);
    assert_eq!(output.actual_capture_start_secs, 5.0);
    assert!((output.drift.drift_ms() - 100.0).abs() < 1.0);
}

#[tokio::test]
async fn cancellation_returns_every_bitmap_to_the_pool() {
    let frames: Vec<ScriptedFrame> = (0..60)
        .map(|i| ScriptedFrame::new(40, 1.0 + i as f64 * 0.033))
        .collect();
    let source = ScriptedFrameSource::new(metadata()).with_frames(frames);
    let closed = source.closed_handle();
    let pool = BitmapPool::new();

    let mut request = fast_request(1.0, 10.0);
    let cancel = CancelToken::new();
    request.cancel = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        cancel.cancel();
    });

    let err = export_clip(
        source,
        RecordingEncoder::default(),
        RecordingMuxer::default(),
        &pool,
        request,
        None,
    )
    .await
    .unwrap_err();

    assert!(err.is_cancelled());
    assert!(matches!(err, ExportError::Cancelled));
    assert_eq!(pool.outstanding(), 0);
    assert!(closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn stall_timeout_fires_when_no_frame_arrives() {
    let source = ScriptedFrameSource::new(metadata())
        .with_frames([ScriptedFrame::new(500, 1.0)]);
    let pool = BitmapPool::new();

    let mut request = fast_request(1.0, 2.0);
    request.stall_timeout = Duration::from_millis(80);

    let err = export_clip(
        source,
        RecordingEncoder::default(),
        RecordingMuxer::default(),
        &pool,
        request,
        None,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, ExportError::StallTimeout { .. }));
    assert!(err.is_timeout());
    assert_eq!(pool.outstanding(), 0);
}

#[tokio::test]
async fn duplicates_do_not_feed_the_stall_watchdog() {
    let source = ScriptedFrameSource::new(metadata()).with_frames([
        ScriptedFrame::new(0, 1.0),
        ScriptedFrame::new(60, 1.0),
        ScriptedFrame::new(60, 1.0),
        ScriptedFrame::new(60, 1.0),
    ]);
    let pool = BitmapPool::new();

    let mut request = fast_request(1.0, 2.0);
    request.stall_timeout = Duration::from_millis(100);

    let err = export_clip(
        source,
        RecordingEncoder::default(),
        RecordingMuxer::default(),
        &pool,
        request,
        None,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, ExportError::StallTimeout { .. }));
}

#[tokio::test]
async fn steady_qualifying_frames_keep_the_watchdog_quiet() {
    let frames: Vec<ScriptedFrame> = (0..8)
        .map(|i| ScriptedFrame::new(40, 1.0 + i as f64 * 0.033))
        .collect();
    let source = ScriptedFrameSource::new(metadata()).with_frames(frames);
    let pool = BitmapPool::new();

    let mut request = fast_request(1.0, 2.0);
    request.stall_timeout = Duration::from_millis(100);

    let output = export_clip(
        source,
        RecordingEncoder::default(),
        RecordingMuxer::default(),
        &pool,
        request,
        None,
    )
    .await
    .unwrap();

    assert_eq!(output.frames_encoded, 8);
}

#[tokio::test]
async fn global_timeout_fires_even_while_frames_flow() {
    let frames: Vec<ScriptedFrame> = (0..40)
        .map(|i| ScriptedFrame::new(50, 1.0 + i as f64 * 0.033))
        .collect();
    let source = ScriptedFrameSource::new(metadata()).with_frames(frames);
    let pool = BitmapPool::new();

    let mut request = fast_request(1.0, 10.0);
    request.global_timeout = Duration::from_millis(180);

    let err = export_clip(
        source,
        RecordingEncoder::default(),
        RecordingMuxer::default(),
        &pool,
        request,
        None,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, ExportError::GlobalTimeout { .. }));
    assert_eq!(pool.outstanding(), 0);
}

#[tokio::test]
async fn single_frame_window_produces_one_frame() {
    let source = ScriptedFrameSource::new(metadata()).with_frames([
        ScriptedFrame::new(0, 10.0),
        ScriptedFrame::new(0, 10.1),
    ]);
    let muxer = RecordingMuxer::default();
    let pool = BitmapPool::new();

    let output = export_clip(
        source,
        RecordingEncoder::default(),
        muxer.clone(),
        &pool,
        fast_request(10.0, 10.1),
        None,
    )
    .await
    .unwrap();

    assert_eq!(output.frames_encoded, 1);
    assert_eq!(output.actual_capture_start_secs, 10.0);
    assert!(!output.container.is_empty());
    assert!(muxer.state.lock().unwrap().finalized);
}

#[tokio::test]
async fn height_cap_scales_the_encoder_configuration() {
    let source = ScriptedFrameSource::new(SourceMetadata {
        duration_secs: 30.0,
        width: 3840,
        height: 2160,
        frame_rate: 30.0,
    })
    .with_frames([ScriptedFrame::new(0, 1.0), ScriptedFrame::new(0, 2.0)]);
    let encoder = RecordingEncoder::default();
    let pool = BitmapPool::new();

    let mut request = fast_request(1.0, 2.0);
    request.max_height = Some(1080);

    export_clip(
        source,
        encoder.clone(),
        RecordingMuxer::default(),
        &pool,
        request,
        None,
    )
    .await
    .unwrap();

    let state = encoder.state.lock().unwrap();
    let config = state.config.as_ref().unwrap();
    assert_eq!((config.width, config.height), (1920, 1080));
    assert_eq!(config.tier.profile, "main");
}

#[tokio::test]
async fn oversized_uncapped_source_fails_before_capture() {
    let source = ScriptedFrameSource::new(SourceMetadata {
        duration_secs: 30.0,
        width: 3840,
        height: 2160,
        frame_rate: 30.0,
    })
    .with_frames([ScriptedFrame::new(0, 1.0)]);
    let encoder = RecordingEncoder::default();
    let pool = BitmapPool::new();

    let err = export_clip(
        source,
        encoder.clone(),
        RecordingMuxer::default(),
        &pool,
        fast_request(1.0, 2.0),
        None,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, ExportError::EncoderConfig { .. }));
    assert!(encoder.state.lock().unwrap().config.is_none());
}

#[tokio::test]
async fn transient_encoder_failures_are_tolerated() {
    let frames: Vec<ScriptedFrame> = (0..5)
        .map(|i| ScriptedFrame::new(0, 1.0 + i as f64 * 0.033))
        .collect();
    let source = ScriptedFrameSource::new(metadata()).with_frames(frames);
    let encoder = RecordingEncoder::failing([true, false]);
    let pool = BitmapPool::new();

    let output = export_clip(
        source,
        encoder.clone(),
        RecordingMuxer::default(),
        &pool,
        fast_request(1.0, 2.0),
        None,
    )
    .await
    .unwrap();

    // one frame dropped, the rest made it through
    assert_eq!(output.frames_encoded, 4);
    assert_eq!(pool.outstanding(), 0);
}

#[tokio::test]
async fn persistent_encoder_failures_abort_the_export() {
    let frames: Vec<ScriptedFrame> = (0..5)
        .map(|i| ScriptedFrame::new(0, 1.0 + i as f64 * 0.033))
        .collect();
    let source = ScriptedFrameSource::new(metadata()).with_frames(frames);
    let encoder = RecordingEncoder::failing([true, true, true]);
    let pool = BitmapPool::new();

    let err = export_clip(
        source,
        encoder.clone(),
        RecordingMuxer::default(),
        &pool,
        fast_request(1.0, 2.0),
        None,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, ExportError::EncoderRuntime { .. }));
    assert_eq!(pool.outstanding(), 0);
    assert!(encoder.state.lock().unwrap().closed);
}

#[tokio::test]
async fn keyframes_follow_the_configured_interval() {
    let frames: Vec<ScriptedFrame> = (0..7)
        .map(|i| ScriptedFrame::new(0, 1.0 + i as f64 * 0.033))
        .collect();
    let source = ScriptedFrameSource::new(metadata()).with_frames(frames);
    let encoder = RecordingEncoder::default();
    let pool = BitmapPool::new();

    let mut request = fast_request(1.0, 2.0);
    request.keyframe_interval = 3;

    export_clip(
        source,
        encoder.clone(),
        RecordingMuxer::default(),
        &pool,
        request,
        None,
    )
    .await
    .unwrap();

    let state = encoder.state.lock().unwrap();
    let keyframes: Vec<bool> = state.encoded.iter().map(|&(_, k)| k).collect();
    assert_eq!(keyframes, [true, false, false, true, false, false, true]);
}

#[tokio::test]
async fn relative_timestamps_are_strictly_increasing_from_zero() {
    let source = ScriptedFrameSource::new(metadata()).with_frames([
        ScriptedFrame::new(0, 1.0),
        ScriptedFrame::new(0, 1.033),
        ScriptedFrame::new(0, 1.066),
    ]);
    let encoder = RecordingEncoder::default();
    let pool = BitmapPool::new();

    export_clip(
        source,
        encoder.clone(),
        RecordingMuxer::default(),
        &pool,
        fast_request(1.0, 2.0),
        None,
    )
    .await
    .unwrap();

    let state = encoder.state.lock().unwrap();
    let pts: Vec<i64> = state.encoded.iter().map(|&(p, _)| p).collect();
    assert_eq!(pts[0], 0);
    assert!(pts.windows(2).all(|w| w[0] < w[1]));
}
