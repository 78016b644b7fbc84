//! Reveal-progress easing.
//!
//! The reveal follows a decelerating projectile: fast early, settling to
//! near-linear toward landing. This is a blend of ease-out-cubic and
//! linear whose blend weight itself shifts over time:
//!
//! `progress(t) = easeOutCubic(t) * w(t) + t * (1 - w(t))`, with
//! `w(t) = 0.7 - 0.4 t`: 70% eased at launch, 30% eased near landing.
//!
//! Callers rely on the result being in `[0, 1]` and monotonically
//! non-decreasing over the clamped domain.

/// Map a clamped time ratio to display progress.
///
/// Returns 0 for `t <= 0` and 1 for `t >= 1`.
pub fn reveal_progress(t: f64) -> f64 {
    if t <= 0.0 {
        return 0.0;
    }
    if t >= 1.0 {
        return 1.0;
    }
    let eased = ease_out_cubic(t);
    let weight = 0.7 - 0.4 * t;
    eased * weight + t * (1.0 - weight)
}

/// Fraction of the trajectory's time span elapsed at `current`, in `[0, 1]`.
///
/// Degenerate spans (`last <= first`) report 1 once `current` reaches the
/// first timestamp.
pub fn time_ratio(current: f64, first: f64, last: f64) -> f64 {
    if current < first {
        return 0.0;
    }
    let span = last - first;
    if span <= 0.0 {
        return 1.0;
    }
    ((current - first) / span).clamp(0.0, 1.0)
}

fn ease_out_cubic(t: f64) -> f64 {
    1.0 - (1.0 - t).powi(3)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn endpoints_are_exact() {
        assert_eq!(reveal_progress(0.0), 0.0);
        assert_eq!(reveal_progress(1.0), 1.0);
        assert_eq!(reveal_progress(-3.5), 0.0);
        assert_eq!(reveal_progress(42.0), 1.0);
    }

    #[test]
    fn midpoint_is_eased_not_linear() {
        let mid = reveal_progress(0.5);
        // At t=0.5: eased = 0.875, weight = 0.5 -> 0.6875
        assert!((mid - 0.6875).abs() < 1e-12);
        assert!(mid > 0.5);
    }

    #[test]
    fn time_ratio_clamps_and_handles_degenerate_span() {
        assert_eq!(time_ratio(0.5, 1.0, 2.0), 0.0);
        assert_eq!(time_ratio(1.5, 1.0, 2.0), 0.5);
        assert_eq!(time_ratio(9.0, 1.0, 2.0), 1.0);
        // Zero-span trajectory: fully revealed once reached
        assert_eq!(time_ratio(1.0, 1.0, 1.0), 1.0);
        assert_eq!(time_ratio(0.9, 1.0, 1.0), 0.0);
    }

    proptest! {
        #[test]
        fn progress_stays_in_unit_interval(t in -10.0f64..10.0) {
            let p = reveal_progress(t);
            prop_assert!((0.0..=1.0).contains(&p));
        }

        #[test]
        fn progress_is_monotonic(a in 0.0f64..1.0, b in 0.0f64..1.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(reveal_progress(lo) <= reveal_progress(hi) + 1e-12);
        }
    }
}
