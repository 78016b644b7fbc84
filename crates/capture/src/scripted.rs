//! Deterministic frame source for pipeline tests.
//!
//! Replays a fixed schedule of frames with configurable delivery
//! delays, a synthetic keyframe grid for seek landings, and optional
//! readback latency. Duplicate and pre-seek timestamps can be scripted
//! directly, so supervision and dedup behavior is testable without any
//! media files or external binaries.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::oneshot;
use traceburn_common::{ExportError, ExportResult};

use crate::source::{FramePending, FrameSnapshot, FrameSource, FrameTick, SourceMetadata};

type FrameSender = oneshot::Sender<ExportResult<Option<FrameTick>>>;

/// One scheduled delivery.
#[derive(Debug, Clone, Copy)]
pub struct ScriptedFrame {
    /// Wall-clock delay between the request arming and this delivery.
    pub delay: Duration,

    /// Presentation timestamp the frame reports.
    pub presentation_secs: f64,
}

impl ScriptedFrame {
    pub fn new(delay_ms: u64, presentation_secs: f64) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
            presentation_secs,
        }
    }
}

/// A [`FrameSource`] that replays a scripted schedule.
pub struct ScriptedFrameSource {
    metadata: SourceMetadata,
    frames: VecDeque<ScriptedFrame>,
    keyframe_interval_secs: Option<f64>,
    readback_delay: Duration,
    capture_size: Option<(u32, u32)>,
    armed: Arc<Mutex<Option<FrameSender>>>,
    closed: Arc<AtomicBool>,
    play_started: Option<Instant>,
    delivered: u64,
}

impl ScriptedFrameSource {
    pub fn new(metadata: SourceMetadata) -> Self {
        Self {
            metadata,
            frames: VecDeque::new(),
            keyframe_interval_secs: None,
            readback_delay: Duration::ZERO,
            capture_size: None,
            armed: Arc::new(Mutex::new(None)),
            closed: Arc::new(AtomicBool::new(false)),
            play_started: None,
            delivered: 0,
        }
    }

    pub fn with_frames(mut self, frames: impl IntoIterator<Item = ScriptedFrame>) -> Self {
        self.frames = frames.into_iter().collect();
        self
    }

    /// Seeks land on the nearest earlier multiple of `interval_secs`.
    pub fn with_keyframe_interval(mut self, interval_secs: f64) -> Self {
        self.keyframe_interval_secs = Some(interval_secs);
        self
    }

    pub fn with_readback_delay(mut self, delay: Duration) -> Self {
        self.readback_delay = delay;
        self
    }

    /// Flag that flips when [`close`](FrameSource::close) runs.
    ///
    /// Clone it before handing the source off so teardown is observable
    /// from outside.
    pub fn closed_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closed)
    }

    fn capture_size(&self) -> (u32, u32) {
        self.capture_size
            .unwrap_or((self.metadata.width, self.metadata.height))
    }
}

#[async_trait::async_trait]
impl FrameSource for ScriptedFrameSource {
    async fn load(&mut self) -> ExportResult<SourceMetadata> {
        Ok(self.metadata)
    }

    fn configure(&mut self, capture_width: u32, capture_height: u32) -> ExportResult<()> {
        if capture_width == 0 || capture_height == 0 {
            return Err(ExportError::source("Capture dimensions must be non-zero"));
        }
        self.capture_size = Some((capture_width, capture_height));
        Ok(())
    }

    async fn seek(&mut self, target_secs: f64) -> ExportResult<f64> {
        let landing = match self.keyframe_interval_secs {
            Some(interval) if interval > 0.0 => (target_secs / interval).floor() * interval,
            _ => target_secs,
        };
        Ok(landing.max(0.0))
    }

    async fn play(&mut self) -> ExportResult<()> {
        self.play_started = Some(Instant::now());
        Ok(())
    }

    fn request_next_frame(&mut self) -> ExportResult<FramePending> {
        let started = self
            .play_started
            .ok_or_else(|| ExportError::source("Frame requested before play"))?;
        if self.closed.load(Ordering::SeqCst) {
            return Ok(FramePending::resolved(Ok(None)));
        }

        let mut armed = self.armed.lock().expect("scripted slot poisoned");
        if armed.is_some() {
            return Err(ExportError::source(
                "A frame request is already outstanding",
            ));
        }

        let Some(frame) = self.frames.pop_front() else {
            return Ok(FramePending::resolved(Ok(None)));
        };

        let (tx, pending) = FramePending::channel();
        *armed = Some(tx);
        drop(armed);

        let (width, height) = self.capture_size();
        let fill = (self.delivered % 251) as u8 + 1;
        self.delivered += 1;
        let slot = Arc::clone(&self.armed);
        let readback_delay = self.readback_delay;

        tokio::spawn(async move {
            if !frame.delay.is_zero() {
                tokio::time::sleep(frame.delay).await;
            }
            let pixels = Bytes::from(vec![fill; width as usize * height as usize * 4]);
            let snapshot =
                FrameSnapshot::new(pixels, width, height).with_readback_delay(readback_delay);
            let tick = FrameTick {
                host_clock_secs: started.elapsed().as_secs_f64(),
                presentation_secs: frame.presentation_secs,
                snapshot,
            };
            if let Some(tx) = slot.lock().expect("scripted slot poisoned").take() {
                let _ = tx.send(Ok(Some(tick)));
            }
        });

        Ok(pending)
    }

    async fn close(&mut self) -> ExportResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(tx) = self.armed.lock().expect("scripted slot poisoned").take() {
            let _ = tx.send(Ok(None));
        }
        self.play_started = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> SourceMetadata {
        SourceMetadata {
            duration_secs: 10.0,
            width: 8,
            height: 8,
            frame_rate: 30.0,
        }
    }

    #[tokio::test]
    async fn delivers_scripted_frames_in_order_then_eos() {
        let mut source = ScriptedFrameSource::new(metadata())
            .with_frames([ScriptedFrame::new(0, 1.0), ScriptedFrame::new(0, 1.5)]);
        source.load().await.unwrap();
        source.play().await.unwrap();

        let first = source.request_next_frame().unwrap().wait().await.unwrap();
        assert_eq!(first.unwrap().presentation_secs, 1.0);
        let second = source.request_next_frame().unwrap().wait().await.unwrap();
        assert_eq!(second.unwrap().presentation_secs, 1.5);
        let eos = source.request_next_frame().unwrap().wait().await.unwrap();
        assert!(eos.is_none());
    }

    #[tokio::test]
    async fn rejects_a_second_outstanding_request() {
        let mut source = ScriptedFrameSource::new(metadata())
            .with_frames([ScriptedFrame::new(50, 1.0)]);
        source.play().await.unwrap();

        let pending = source.request_next_frame().unwrap();
        assert!(source.request_next_frame().is_err());
        let tick = pending.wait().await.unwrap();
        assert!(tick.is_some());
    }

    #[tokio::test]
    async fn keyframe_grid_snaps_seeks_down() {
        let mut source = ScriptedFrameSource::new(metadata()).with_keyframe_interval(2.0);
        assert_eq!(source.seek(5.3).await.unwrap(), 4.0);
        assert_eq!(source.seek(4.0).await.unwrap(), 4.0);
        assert_eq!(source.seek(0.4).await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn close_resolves_an_armed_request_with_eos() {
        let mut source = ScriptedFrameSource::new(metadata())
            .with_frames([ScriptedFrame::new(10_000, 1.0)]);
        source.play().await.unwrap();
        let closed = source.closed_handle();

        let pending = source.request_next_frame().unwrap();
        source.close().await.unwrap();
        assert!(closed.load(Ordering::SeqCst));
        assert!(pending.wait().await.unwrap().is_none());
    }
}
