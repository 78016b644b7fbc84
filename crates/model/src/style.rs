//! Overlay styling configuration.
//!
//! Pure configuration with no lifecycle: colors, stroke and glow sizing,
//! marker toggles, and the reveal-animation mode.

use serde::{Deserialize, Serialize};

/// An 8-bit RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Parse `#RRGGBB` or `#RRGGBBAA` (leading `#` optional).
    pub fn parse(input: &str) -> Result<Self, StyleParseError> {
        let hex = input.strip_prefix('#').unwrap_or(input);
        if !hex.is_ascii() {
            return Err(StyleParseError::BadColor {
                value: input.to_string(),
            });
        }
        let byte = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&hex[range], 16).map_err(|_| StyleParseError::BadColor {
                value: input.to_string(),
            })
        };
        match hex.len() {
            6 => Ok(Self::new(byte(0..2)?, byte(2..4)?, byte(4..6)?, 0xff)),
            8 => Ok(Self::new(byte(0..2)?, byte(2..4)?, byte(4..6)?, byte(6..8)?)),
            _ => Err(StyleParseError::BadColor {
                value: input.to_string(),
            }),
        }
    }

    /// The same color with a replacement alpha.
    pub fn with_alpha(self, a: u8) -> Self {
        Self { a, ..self }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StyleParseError {
    #[error("Invalid color literal: {value} (expected #RRGGBB or #RRGGBBAA)")]
    BadColor { value: String },
}

/// Glow configuration for the outer stroke passes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GlowStyle {
    pub color: Rgba,

    /// Extra stroke radius beyond the core width, in output pixels.
    pub radius: f32,
}

/// Which fixed-position markers to draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerToggles {
    pub origin: bool,
    pub apex: bool,
    pub landing: bool,
}

impl Default for MarkerToggles {
    fn default() -> Self {
        Self {
            origin: true,
            apex: false,
            landing: true,
        }
    }
}

/// How the path reveal is animated over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnimationMode {
    /// Reveal the path progressively, synchronized to media time.
    Reveal,
    /// Draw the complete path on every frame.
    Full,
}

/// Complete overlay styling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverlayStyle {
    /// Core stroke color.
    pub color: Rgba,

    /// Core stroke width in output pixels.
    pub stroke_width: f32,

    /// Optional glow drawn beneath the core stroke.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub glow: Option<GlowStyle>,

    #[serde(default)]
    pub markers: MarkerToggles,

    pub animation: AnimationMode,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            color: Rgba::new(0xff, 0x3b, 0x30, 0xff),
            stroke_width: 4.0,
            glow: Some(GlowStyle {
                color: Rgba::new(0xff, 0x3b, 0x30, 0x59),
                radius: 6.0,
            }),
            markers: MarkerToggles::default(),
            animation: AnimationMode::Reveal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_six_and_eight_digit_hex() {
        assert_eq!(Rgba::parse("#ff3b30").unwrap(), Rgba::new(0xff, 0x3b, 0x30, 0xff));
        assert_eq!(
            Rgba::parse("ff3b3080").unwrap(),
            Rgba::new(0xff, 0x3b, 0x30, 0x80)
        );
        assert!(Rgba::parse("#f00").is_err());
        assert!(Rgba::parse("#zzzzzz").is_err());
    }

    #[test]
    fn style_round_trips_through_json() {
        let style = OverlayStyle::default();
        let json = serde_json::to_string(&style).unwrap();
        let parsed: OverlayStyle = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, style);
    }

    #[test]
    fn animation_mode_uses_snake_case() {
        let json = serde_json::to_string(&AnimationMode::Reveal).unwrap();
        assert_eq!(json, "\"reveal\"");
    }
}
