//! Stroked overlay drawing on top of captured frames.

use tiny_skia::{
    FillRule, LineCap, LineJoin, Paint, Path, PathBuilder, PixmapMut, Stroke, Transform,
};
use tracing::trace;
use traceburn_model::{AnimationMode, OverlayStyle, Rgba, Trajectory};

use crate::path::PathGeometry;
use crate::progress::{reveal_progress, time_ratio};

/// Draws the animated flight path onto RGBA frames.
///
/// Stateless aside from style: each call recomputes the visible prefix
/// from the trajectory and the frame's media time.
#[derive(Debug, Clone)]
pub struct OverlayRenderer {
    style: OverlayStyle,
}

impl OverlayRenderer {
    pub fn new(style: OverlayStyle) -> Self {
        Self { style }
    }

    pub fn style(&self) -> &OverlayStyle {
        &self.style
    }

    /// Composite the overlay for `current_time_secs` onto `pixmap`.
    ///
    /// Returns the display progress actually drawn, in `[0, 1]`. Frames
    /// before the trajectory's first timestamp, and trajectories with
    /// fewer than 2 points, leave the pixmap untouched and report 0.
    pub fn render(
        &self,
        pixmap: &mut PixmapMut<'_>,
        trajectory: &Trajectory,
        current_time_secs: f64,
    ) -> f64 {
        let (Some(first), Some(last)) = (trajectory.first_time(), trajectory.last_time()) else {
            return 0.0;
        };
        if trajectory.len() < 2 || current_time_secs < first {
            return 0.0;
        }

        let ratio = time_ratio(current_time_secs, first, last);
        let progress = match self.style.animation {
            AnimationMode::Reveal => reveal_progress(ratio),
            AnimationMode::Full => 1.0,
        };

        let geometry =
            PathGeometry::from_trajectory(trajectory, pixmap.width(), pixmap.height());
        let prefix = geometry.visible_prefix(progress);
        if prefix.len() >= 2 {
            trace!(
                time = current_time_secs,
                progress,
                vertices = prefix.len(),
                "drawing overlay prefix"
            );
            if let Some(path) = smoothed_path(&prefix) {
                self.stroke_passes(pixmap, &path);
            }
        }
        self.draw_markers(pixmap, &geometry, trajectory);

        progress
    }

    /// Glow-to-core stroke order so the solid line lands on top.
    fn stroke_passes(&self, pixmap: &mut PixmapMut<'_>, path: &Path) {
        let core_width = self.style.stroke_width;
        if let Some(glow) = self.style.glow {
            let inner = glow.color.with_alpha(glow.color.a.saturating_mul(2));
            self.stroke_one(pixmap, path, glow.color, core_width + 2.0 * glow.radius);
            self.stroke_one(pixmap, path, inner, core_width + glow.radius);
        }
        self.stroke_one(pixmap, path, self.style.color, core_width);
    }

    fn stroke_one(&self, pixmap: &mut PixmapMut<'_>, path: &Path, color: Rgba, width: f32) {
        let mut paint = Paint::default();
        paint.set_color_rgba8(color.r, color.g, color.b, color.a);
        paint.anti_alias = true;
        let stroke = Stroke {
            width,
            line_cap: LineCap::Round,
            line_join: LineJoin::Round,
            ..Stroke::default()
        };
        pixmap.stroke_path(path, &paint, &stroke, Transform::identity(), None);
    }

    /// Markers sit at fixed image-space positions, independent of how far
    /// the reveal has progressed.
    fn draw_markers(
        &self,
        pixmap: &mut PixmapMut<'_>,
        geometry: &PathGeometry,
        trajectory: &Trajectory,
    ) {
        let markers = self.style.markers;
        let vertices = geometry.vertices();

        if markers.origin {
            if let Some(&(x, y)) = vertices.first() {
                self.fill_marker(pixmap, x, y);
            }
        }
        if markers.apex {
            if let Some(idx) = apex_index(trajectory) {
                let (x, y) = vertices[idx];
                self.fill_marker(pixmap, x, y);
            }
        }
        if markers.landing {
            if let Some(&(x, y)) = vertices.last() {
                self.fill_marker(pixmap, x, y);
            }
        }
    }

    fn fill_marker(&self, pixmap: &mut PixmapMut<'_>, x: f32, y: f32) {
        let radius = self.style.stroke_width * 1.5;
        let Some(circle) = PathBuilder::from_circle(x, y, radius) else {
            return;
        };
        let mut paint = Paint::default();
        let c = self.style.color;
        paint.set_color_rgba8(c.r, c.g, c.b, c.a);
        paint.anti_alias = true;
        pixmap.fill_path(&circle, &paint, FillRule::Winding, Transform::identity(), None);
    }
}

/// Quadratic smoothing through segment midpoints.
///
/// Each interior vertex becomes a control point; the curve passes through
/// the midpoints between consecutive vertices, which rounds off corners
/// without leaving the polyline's convex hull.
fn smoothed_path(vertices: &[(f32, f32)]) -> Option<Path> {
    if vertices.len() < 2 {
        return None;
    }
    let mut pb = PathBuilder::new();
    pb.move_to(vertices[0].0, vertices[0].1);
    if vertices.len() == 2 {
        pb.line_to(vertices[1].0, vertices[1].1);
        return pb.finish();
    }
    for i in 1..vertices.len() - 1 {
        let control = vertices[i];
        let next = vertices[i + 1];
        let mid = ((control.0 + next.0) * 0.5, (control.1 + next.1) * 0.5);
        pb.quad_to(control.0, control.1, mid.0, mid.1);
    }
    let end = vertices[vertices.len() - 1];
    pb.line_to(end.0, end.1);
    pb.finish()
}

fn apex_index(trajectory: &Trajectory) -> Option<usize> {
    trajectory
        .points()
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.y.total_cmp(&b.y))
        .map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiny_skia::Pixmap;
    use traceburn_model::{MarkerToggles, TrajectoryPoint};

    fn arc_trajectory() -> Trajectory {
        Trajectory::new(vec![
            TrajectoryPoint::new(0.0, 0.2, 0.8),
            TrajectoryPoint::new(1.0, 0.5, 0.3),
            TrajectoryPoint::new(2.0, 0.8, 0.8),
        ])
    }

    fn render_with(style: OverlayStyle, time: f64) -> (Pixmap, f64) {
        let mut pixmap = Pixmap::new(200, 200).unwrap();
        let renderer = OverlayRenderer::new(style);
        let progress = renderer.render(&mut pixmap.as_mut(), &arc_trajectory(), time);
        (pixmap, progress)
    }

    fn render_at(time: f64) -> (Pixmap, f64) {
        render_with(OverlayStyle::default(), time)
    }

    fn no_markers() -> OverlayStyle {
        OverlayStyle {
            markers: MarkerToggles {
                origin: false,
                apex: false,
                landing: false,
            },
            ..OverlayStyle::default()
        }
    }

    #[test]
    fn leaves_frame_untouched_before_first_timestamp() {
        let (pixmap, progress) = render_at(-0.5);
        assert_eq!(progress, 0.0);
        assert!(pixmap.data().iter().all(|&b| b == 0));
    }

    #[test]
    fn leaves_frame_untouched_for_degenerate_trajectory() {
        let mut pixmap = Pixmap::new(64, 64).unwrap();
        let renderer = OverlayRenderer::new(OverlayStyle::default());
        let single = Trajectory::new(vec![TrajectoryPoint::new(0.0, 0.5, 0.5)]);
        let progress = renderer.render(&mut pixmap.as_mut(), &single, 1.0);
        assert_eq!(progress, 0.0);
        assert!(pixmap.data().iter().all(|&b| b == 0));
    }

    #[test]
    fn draws_pixels_once_reveal_starts() {
        let (pixmap, progress) = render_at(1.0);
        assert!(progress > 0.5 && progress < 1.0);
        assert!(pixmap.data().iter().any(|&b| b != 0));
    }

    #[test]
    fn partial_reveal_stroke_stays_short_of_the_landing_vertex() {
        // Landing vertex maps to (160, 160); at t=0.4 the eased reveal
        // has not reached it, so with markers off that corner stays
        // transparent.
        let (pixmap, progress) = render_with(no_markers(), 0.4);
        assert!(progress < 1.0);
        let px = pixmap.pixel(160, 160).unwrap();
        assert_eq!(px.alpha(), 0);
    }

    #[test]
    fn markers_are_drawn_at_fixed_positions_during_partial_reveal() {
        // Apex maps to (100, 60), landing to (160, 160). Both markers
        // show from the first rendered frame even though the stroke has
        // only partially revealed.
        let style = OverlayStyle {
            markers: MarkerToggles {
                origin: true,
                apex: true,
                landing: true,
            },
            ..OverlayStyle::default()
        };
        let (pixmap, progress) = render_with(style, 0.4);
        assert!(progress < 1.0);
        assert!(pixmap.pixel(100, 60).unwrap().alpha() > 0);
        assert!(pixmap.pixel(160, 160).unwrap().alpha() > 0);
    }

    #[test]
    fn full_reveal_reaches_the_landing_vertex() {
        let (pixmap, progress) = render_at(2.0);
        assert_eq!(progress, 1.0);
        let px = pixmap.pixel(160, 160).unwrap();
        assert!(px.alpha() > 0);
    }

    #[test]
    fn full_mode_draws_everything_immediately() {
        let style = OverlayStyle {
            animation: AnimationMode::Full,
            ..OverlayStyle::default()
        };
        let mut pixmap = Pixmap::new(200, 200).unwrap();
        let renderer = OverlayRenderer::new(style);
        let progress = renderer.render(&mut pixmap.as_mut(), &arc_trajectory(), 0.0);
        assert_eq!(progress, 1.0);
        assert!(pixmap.pixel(160, 160).unwrap().alpha() > 0);
    }
}
