//! The frame source contract.
//!
//! A source plays media in real time and delivers frames only on
//! request: the caller arms a single-shot request, the source fulfills
//! it with the next frame that arrives, and any frame that lands while
//! no request is armed is dropped. Sources under load (or a pipeline
//! that falls behind) therefore thin out delivery instead of queueing
//! unboundedly; the consumer sees gaps, never backlog.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::oneshot;
use traceburn_common::{ExportError, ExportResult};

use crate::bitmap::{BitmapPool, PooledBitmap};

/// Stream properties discovered during load.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceMetadata {
    pub duration_secs: f64,
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
}

/// A lightweight handle to one decoded frame's pixels.
///
/// Snapshots are cheap to clone; the pixel copy into a caller-owned
/// bitmap happens in [`materialize`](FrameSnapshot::materialize).
#[derive(Debug, Clone)]
pub struct FrameSnapshot {
    pixels: Bytes,
    width: u32,
    height: u32,
    readback_delay: Duration,
}

impl FrameSnapshot {
    pub fn new(pixels: Bytes, width: u32, height: u32) -> Self {
        Self {
            pixels,
            width,
            height,
            readback_delay: Duration::ZERO,
        }
    }

    /// Simulate slow pixel readback. Used by scripted sources.
    pub fn with_readback_delay(mut self, delay: Duration) -> Self {
        self.readback_delay = delay;
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Copy the pixels into a pooled bitmap owned by the caller.
    pub async fn materialize(&self, pool: &BitmapPool) -> ExportResult<PooledBitmap> {
        if !self.readback_delay.is_zero() {
            tokio::time::sleep(self.readback_delay).await;
        }
        let expected = self.width as usize * self.height as usize * 4;
        if self.pixels.len() != expected {
            return Err(ExportError::source(format!(
                "Frame snapshot has {} bytes, expected {} for {}x{} RGBA",
                self.pixels.len(),
                expected,
                self.width,
                self.height
            )));
        }
        let mut bitmap = pool.acquire(self.width, self.height);
        bitmap.data_mut().copy_from_slice(&self.pixels);
        Ok(bitmap)
    }
}

/// One delivered frame.
#[derive(Debug, Clone)]
pub struct FrameTick {
    /// Seconds on the host clock since playback started.
    pub host_clock_secs: f64,

    /// The frame's presentation timestamp in media time.
    pub presentation_secs: f64,

    pub snapshot: FrameSnapshot,
}

/// The receiving half of an armed frame request.
///
/// Exactly one outcome arrives: a frame, end of stream (`None`), or an
/// error. If the source is torn down with the request still armed the
/// wait resolves to a source error rather than hanging.
#[derive(Debug)]
pub struct FramePending {
    rx: oneshot::Receiver<ExportResult<Option<FrameTick>>>,
}

impl FramePending {
    /// Create a request pair. The sender side belongs to the source.
    pub fn channel() -> (oneshot::Sender<ExportResult<Option<FrameTick>>>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }

    /// A request that resolves immediately, used at end of stream.
    pub fn resolved(outcome: ExportResult<Option<FrameTick>>) -> Self {
        let (tx, pending) = Self::channel();
        let _ = tx.send(outcome);
        pending
    }

    /// Wait for the source to fulfill this request.
    pub async fn wait(self) -> ExportResult<Option<FrameTick>> {
        match self.rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(ExportError::source(
                "Frame source went away without fulfilling the request",
            )),
        }
    }
}

/// A playable clip that delivers frames one request at a time.
///
/// Some hosts throttle or suspend frame delivery for surfaces that are
/// not visible. Implementations backed by such a host must keep their
/// capture surface minimally visible for the duration of playback, and
/// this behavior must be re-verified on every new host: a source that
/// stops delivering trips the caller's stall watchdog, not an error
/// from this trait.
#[async_trait]
pub trait FrameSource: Send {
    /// Open the media and read its stream properties.
    async fn load(&mut self) -> ExportResult<SourceMetadata>;

    /// Set the pixel dimensions frames will be delivered at.
    ///
    /// Must be called after [`load`](FrameSource::load) and before
    /// [`play`](FrameSource::play).
    fn configure(&mut self, capture_width: u32, capture_height: u32) -> ExportResult<()>;

    /// Position playback at `target_secs`.
    ///
    /// Returns where playback actually landed, which for keyframe-bound
    /// sources may be earlier than requested.
    async fn seek(&mut self, target_secs: f64) -> ExportResult<f64>;

    /// Begin real-time playback from the seeked position.
    async fn play(&mut self) -> ExportResult<()>;

    /// Arm a single-shot request for the next frame.
    ///
    /// At most one request may be outstanding; arming a second before
    /// the first resolves is an error.
    fn request_next_frame(&mut self) -> ExportResult<FramePending>;

    /// Stop playback and free decoder resources.
    ///
    /// Idempotent. Any armed request resolves with an error or end of
    /// stream rather than hanging.
    async fn close(&mut self) -> ExportResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn materialize_copies_pixels_into_a_pooled_bitmap() {
        let pool = BitmapPool::new();
        let snapshot = FrameSnapshot::new(Bytes::from(vec![7u8; 2 * 2 * 4]), 2, 2);
        let bitmap = snapshot.materialize(&pool).await.unwrap();
        assert_eq!(pool.outstanding(), 1);
        assert!(bitmap.data().iter().all(|&b| b == 7));
        bitmap.release();
        assert_eq!(pool.outstanding(), 0);
    }

    #[tokio::test]
    async fn materialize_rejects_mismatched_buffer_sizes() {
        let pool = BitmapPool::new();
        let snapshot = FrameSnapshot::new(Bytes::from(vec![0u8; 3]), 2, 2);
        assert!(snapshot.materialize(&pool).await.is_err());
        assert_eq!(pool.outstanding(), 0);
    }

    #[tokio::test]
    async fn dropped_sender_surfaces_as_a_source_error() {
        let (tx, pending) = FramePending::channel();
        drop(tx);
        assert!(pending.wait().await.is_err());
    }

    #[tokio::test]
    async fn resolved_request_completes_immediately() {
        let pending = FramePending::resolved(Ok(None));
        assert!(pending.wait().await.unwrap().is_none());
    }
}
