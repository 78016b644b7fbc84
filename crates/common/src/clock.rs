//! Clock, drift, and throughput utilities for the export pipeline.
//!
//! Frame timestamps travel through the pipeline as microseconds relative
//! to the first captured frame. This module provides the conversions, the
//! drift record between requested and actual capture start (seeks land on
//! the nearest keyframe), and a windowed throughput estimator used for
//! progress ETA reporting.

use std::time::Instant;

/// Microseconds per second, as f64 for timestamp conversions.
const MICROS_PER_SEC: f64 = 1_000_000.0;

/// Convert media seconds to integer microseconds.
pub fn secs_to_micros(secs: f64) -> i64 {
    (secs * MICROS_PER_SEC).round() as i64
}

/// Convert integer microseconds to media seconds.
pub fn micros_to_secs(micros: i64) -> f64 {
    micros as f64 / MICROS_PER_SEC
}

/// Drift between the requested capture start and the presentation time of
/// the first frame actually captured.
///
/// Seeking lands on the nearest keyframe, so the first captured frame may
/// precede the requested start. Callers use this to resynchronize
/// companion audio downstream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StartDrift {
    /// The start time the caller requested (media seconds).
    pub requested_secs: f64,
    /// The presentation time of the first captured frame (media seconds).
    pub actual_secs: f64,
}

impl StartDrift {
    /// Signed drift in milliseconds (negative = capture started early).
    pub fn drift_ms(&self) -> f64 {
        (self.actual_secs - self.requested_secs) * 1_000.0
    }

    /// Whether the drift magnitude exceeds a threshold.
    pub fn exceeds_threshold_ms(&self, threshold_ms: f64) -> bool {
        self.drift_ms().abs() > threshold_ms
    }
}

/// Windowed throughput estimator for ETA reporting.
///
/// Accumulates (instant, items-done) samples and estimates remaining time
/// from the rate over the most recent window.
#[derive(Debug)]
pub struct ThroughputEstimator {
    samples: Vec<(Instant, u64)>,
    window: usize,
}

impl ThroughputEstimator {
    /// Create an estimator keeping the last `window` samples (minimum 2).
    pub fn new(window: usize) -> Self {
        Self {
            samples: Vec::new(),
            window: window.max(2),
        }
    }

    /// Record that `done` items have completed as of now.
    pub fn record(&mut self, done: u64) {
        self.record_at(Instant::now(), done);
    }

    /// Record with an explicit instant (testable variant).
    pub fn record_at(&mut self, at: Instant, done: u64) {
        self.samples.push((at, done));
        if self.samples.len() > self.window {
            let overflow = self.samples.len() - self.window;
            self.samples.drain(0..overflow);
        }
    }

    /// Items per second over the current window, if measurable.
    pub fn rate(&self) -> Option<f64> {
        let (first, last) = (self.samples.first()?, self.samples.last()?);
        let elapsed = last.0.duration_since(first.0).as_secs_f64();
        let progressed = last.1.saturating_sub(first.1);
        if elapsed <= 0.0 || progressed == 0 {
            return None;
        }
        Some(progressed as f64 / elapsed)
    }

    /// Estimated seconds to complete `remaining` more items.
    pub fn eta_secs(&self, remaining: u64) -> Option<f64> {
        if remaining == 0 {
            return Some(0.0);
        }
        self.rate().map(|rate| remaining as f64 / rate)
    }
}
