//! Traceburn Data Model
//!
//! Shared serde types consumed across the pipeline:
//! - Timestamped, normalized trajectory points and the `Trajectory`
//!   container (sorted at construction, immutable afterwards)
//! - Overlay styling: colors, stroke/glow configuration, marker toggles,
//!   and the animation mode

pub mod style;
pub mod trajectory;

pub use style::*;
pub use trajectory::*;
