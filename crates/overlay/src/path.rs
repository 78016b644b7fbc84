//! Arc-length geometry for the visible portion of a path.
//!
//! The reveal animation exposes the polyline by *distance travelled*, not
//! by vertex index: the tip sits at `display_progress * total_length`
//! along the path, linearly interpolated between the two bracketing
//! vertices.

use traceburn_model::Trajectory;

/// An image-space polyline with precomputed cumulative arc lengths.
#[derive(Debug, Clone)]
pub struct PathGeometry {
    vertices: Vec<(f32, f32)>,
    cumulative: Vec<f64>,
}

impl PathGeometry {
    /// Project a normalized trajectory into `width x height` pixel space.
    pub fn from_trajectory(trajectory: &Trajectory, width: u32, height: u32) -> Self {
        let vertices: Vec<(f32, f32)> = trajectory
            .points()
            .iter()
            .map(|p| ((p.x * width as f64) as f32, (p.y * height as f64) as f32))
            .collect();

        let mut cumulative = Vec::with_capacity(vertices.len());
        let mut total = 0.0f64;
        for (i, v) in vertices.iter().enumerate() {
            if i > 0 {
                let prev = vertices[i - 1];
                let dx = (v.0 - prev.0) as f64;
                let dy = (v.1 - prev.1) as f64;
                total += (dx * dx + dy * dy).sqrt();
            }
            cumulative.push(total);
        }

        Self {
            vertices,
            cumulative,
        }
    }

    /// Total arc length in pixels.
    pub fn total_length(&self) -> f64 {
        self.cumulative.last().copied().unwrap_or(0.0)
    }

    pub fn vertices(&self) -> &[(f32, f32)] {
        &self.vertices
    }

    /// The polyline prefix visible at `display_progress` in `[0, 1]`.
    ///
    /// Includes every vertex whose arc position is within the revealed
    /// length, plus an interpolated tip between the two bracketing
    /// vertices when the reveal ends mid-segment. Fewer than 2 source
    /// vertices, or zero revealed length, yields an empty prefix.
    pub fn visible_prefix(&self, display_progress: f64) -> Vec<(f32, f32)> {
        if self.vertices.len() < 2 {
            return Vec::new();
        }

        let progress = display_progress.clamp(0.0, 1.0);
        if progress >= 1.0 {
            return self.vertices.clone();
        }

        let target = progress * self.total_length();
        if target <= 0.0 {
            return Vec::new();
        }

        let mut prefix = Vec::new();
        for (i, v) in self.vertices.iter().enumerate() {
            if self.cumulative[i] <= target {
                prefix.push(*v);
                continue;
            }

            // Interpolate the tip inside the segment [i-1, i].
            let seg_start = self.cumulative[i - 1];
            let seg_len = self.cumulative[i] - seg_start;
            if seg_len > 0.0 {
                let t = ((target - seg_start) / seg_len) as f32;
                let prev = self.vertices[i - 1];
                prefix.push((prev.0 + (v.0 - prev.0) * t, prev.1 + (v.1 - prev.1) * t));
            }
            break;
        }

        // A single vertex is not a drawable path.
        if prefix.len() < 2 {
            return Vec::new();
        }
        prefix
    }
}
