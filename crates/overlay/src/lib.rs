//! Traceburn Overlay Renderer
//!
//! Pure drawing of a progressively revealed flight path onto a frame.
//! Given a time-ordered trajectory and a "current time", the renderer
//! computes how much of the path is visible (through a fast-then-linear
//! easing curve), smooths the visible polyline, and strokes it in three
//! concentric passes (outer glow, inner glow, solid core) with optional
//! origin/apex/landing markers.
//!
//! No I/O and no state: the same inputs always produce the same pixels.

pub mod path;
pub mod progress;
pub mod render;

pub use render::OverlayRenderer;
