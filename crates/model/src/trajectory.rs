//! Trajectory points and the sorted trajectory container.
//!
//! All coordinates are normalized to `[0.0, 1.0]`: `(0.0, 0.0)` is the
//! top-left of the frame, `(1.0, 1.0)` the bottom-right. Timestamps are
//! media seconds on the source clip's own timeline.

use serde::{Deserialize, Serialize};

/// A single timestamped point on a detected flight path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryPoint {
    /// Presentation time on the source clip's timeline (seconds).
    #[serde(alias = "timestamp")]
    pub time_secs: f64,

    /// Horizontal position (normalized).
    pub x: f64,

    /// Vertical position (normalized, 0 = top).
    pub y: f64,

    /// Detector confidence in `[0, 1]`, when available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,

    /// Whether this point was interpolated rather than detected.
    #[serde(default)]
    pub interpolated: bool,
}

impl TrajectoryPoint {
    /// Create a detected (non-interpolated) point.
    pub fn new(time_secs: f64, x: f64, y: f64) -> Self {
        Self {
            time_secs,
            x,
            y,
            confidence: None,
            interpolated: false,
        }
    }

    /// Euclidean distance to another point in normalized space.
    pub fn distance_to(&self, other: &TrajectoryPoint) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// An immutable, time-ordered flight path.
///
/// Callers may submit points out of order; construction sorts them
/// (stable, by timestamp) so downstream code can rely on ordering
/// without re-checking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<TrajectoryPoint>", into = "Vec<TrajectoryPoint>")]
pub struct Trajectory {
    points: Vec<TrajectoryPoint>,
}

impl Trajectory {
    /// Build a trajectory, sorting the points by timestamp.
    pub fn new(mut points: Vec<TrajectoryPoint>) -> Self {
        points.sort_by(|a, b| a.time_secs.total_cmp(&b.time_secs));
        Self { points }
    }

    /// The ordered points.
    pub fn points(&self) -> &[TrajectoryPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Timestamp of the first point, if any.
    pub fn first_time(&self) -> Option<f64> {
        self.points.first().map(|p| p.time_secs)
    }

    /// Timestamp of the last point, if any.
    pub fn last_time(&self) -> Option<f64> {
        self.points.last().map(|p| p.time_secs)
    }

    /// Duration covered by the path (seconds); 0 for degenerate paths.
    pub fn span_secs(&self) -> f64 {
        match (self.first_time(), self.last_time()) {
            (Some(first), Some(last)) => (last - first).max(0.0),
            _ => 0.0,
        }
    }

    /// The launch point (first in time).
    pub fn origin(&self) -> Option<&TrajectoryPoint> {
        self.points.first()
    }

    /// The highest point of the flight (minimum normalized `y`).
    pub fn apex(&self) -> Option<&TrajectoryPoint> {
        self.points
            .iter()
            .min_by(|a, b| a.y.total_cmp(&b.y))
    }

    /// The landing point (last in time).
    pub fn landing(&self) -> Option<&TrajectoryPoint> {
        self.points.last()
    }
}

impl From<Vec<TrajectoryPoint>> for Trajectory {
    fn from(points: Vec<TrajectoryPoint>) -> Self {
        Self::new(points)
    }
}

impl From<Trajectory> for Vec<TrajectoryPoint> {
    fn from(trajectory: Trajectory) -> Self {
        trajectory.points
    }
}
