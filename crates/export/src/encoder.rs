//! Encoder and muxer collaborator contracts.
//!
//! Encoding is pluggable behind two traits so the pipeline can run
//! against an ffmpeg subprocess in production and recording doubles in
//! tests. Configuration is validated before any frame is captured: a
//! resolution the selected profile tier cannot carry fails the whole
//! export up front.

use async_trait::async_trait;
use bytes::Bytes;
use traceburn_capture::PooledBitmap;
use traceburn_common::{ExportError, ExportResult};

/// H.264 profile/level tier, selected by output pixel count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileTier {
    pub profile: &'static str,
    pub level: &'static str,

    /// Largest frame, in pixels, this tier is allowed to carry.
    pub max_pixels: u32,
}

const BASELINE_30: ProfileTier = ProfileTier {
    profile: "baseline",
    level: "3.0",
    max_pixels: 1280 * 720,
};

const MAIN_40: ProfileTier = ProfileTier {
    profile: "main",
    level: "4.0",
    max_pixels: 1920 * 1080,
};

// Level 4.2 frame ceiling: 8704 macroblocks of 16x16.
const HIGH_42: ProfileTier = ProfileTier {
    profile: "high",
    level: "4.2",
    max_pixels: 8704 * 256,
};

impl ProfileTier {
    /// Pick the tier for an output resolution.
    pub fn for_resolution(width: u32, height: u32) -> Self {
        let pixels = width.saturating_mul(height);
        if pixels <= BASELINE_30.max_pixels {
            BASELINE_30
        } else if pixels <= MAIN_40.max_pixels {
            MAIN_40
        } else {
            HIGH_42
        }
    }
}

/// Validated encoder parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderConfig {
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    pub bitrate_kbps: u32,
    pub keyframe_interval: u32,
    pub tier: ProfileTier,
}

impl EncoderConfig {
    /// Build and validate a configuration.
    ///
    /// Rejects zero or odd dimensions, degenerate rate parameters, and
    /// resolutions beyond the selected tier's frame ceiling.
    pub fn new(
        width: u32,
        height: u32,
        frame_rate: f64,
        bitrate_kbps: u32,
        keyframe_interval: u32,
    ) -> ExportResult<Self> {
        let tier = ProfileTier::for_resolution(width, height);
        let reject = |message: &str| {
            Err(ExportError::EncoderConfig {
                message: message.to_string(),
                width,
                height,
                profile: tier.profile.to_string(),
            })
        };

        if width == 0 || height == 0 {
            return reject("Dimensions must be non-zero");
        }
        if width % 2 != 0 || height % 2 != 0 {
            return reject("Dimensions must be even for 4:2:0 output");
        }
        if width.saturating_mul(height) > tier.max_pixels {
            return reject("Resolution exceeds the highest supported profile level");
        }
        if !(frame_rate.is_finite() && frame_rate > 0.0) {
            return reject("Frame rate must be positive");
        }
        if bitrate_kbps == 0 {
            return reject("Bitrate must be non-zero");
        }
        if keyframe_interval == 0 {
            return reject("Keyframe interval must be non-zero");
        }

        Ok(Self {
            width,
            height,
            frame_rate,
            bitrate_kbps,
            keyframe_interval,
            tier,
        })
    }
}

/// Output dimensions after applying an optional height cap.
///
/// Aspect ratio is preserved and both dimensions round up to even.
pub fn capped_resolution(src_width: u32, src_height: u32, max_height: Option<u32>) -> (u32, u32) {
    let (width, height) = match max_height {
        Some(cap) if cap > 0 && src_height > cap => {
            let scaled = (src_width as u64 * cap as u64) / src_height as u64;
            (scaled.max(1) as u32, cap)
        }
        _ => (src_width, src_height),
    };
    (round_up_even(width), round_up_even(height))
}

fn round_up_even(value: u32) -> u32 {
    value + (value & 1)
}

/// One unit of encoded bitstream output.
#[derive(Debug, Clone)]
pub struct EncodedChunk {
    pub data: Bytes,
    pub pts_micros: i64,
    pub keyframe: bool,
}

/// Turns owned RGBA bitmaps into compressed video.
#[async_trait]
pub trait VideoEncoder: Send {
    /// Accept or reject the configuration before any frame is encoded.
    async fn configure(&mut self, config: &EncoderConfig) -> ExportResult<()>;

    /// Encode one frame. May return zero or more chunks; encoders are
    /// allowed to buffer.
    async fn encode(
        &mut self,
        frame: &PooledBitmap,
        pts_micros: i64,
        keyframe: bool,
    ) -> ExportResult<Vec<EncodedChunk>>;

    /// Drain everything still buffered.
    async fn flush(&mut self) -> ExportResult<Vec<EncodedChunk>>;

    /// Release encoder resources. Idempotent.
    async fn close(&mut self) -> ExportResult<()>;
}

/// Assembles encoded chunks into a finished container.
///
/// `finalize` returns the complete container or an error; there is no
/// partially written output to clean up on failure.
#[async_trait]
pub trait ContainerMuxer: Send {
    fn begin(&mut self, config: &EncoderConfig) -> ExportResult<()>;

    fn write_chunk(&mut self, chunk: EncodedChunk) -> ExportResult<()>;

    async fn finalize(&mut self) -> ExportResult<Bytes>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_follow_pixel_count() {
        assert_eq!(ProfileTier::for_resolution(1280, 720).profile, "baseline");
        assert_eq!(ProfileTier::for_resolution(1920, 1080).profile, "main");
        assert_eq!(ProfileTier::for_resolution(1920, 1080).level, "4.0");
        assert_eq!(ProfileTier::for_resolution(2048, 1080).profile, "high");
    }

    #[test]
    fn config_rejects_oversized_frames_up_front() {
        let err = EncoderConfig::new(3840, 2160, 30.0, 8000, 30).unwrap_err();
        match err {
            ExportError::EncoderConfig { width, height, profile, .. } => {
                assert_eq!((width, height), (3840, 2160));
                assert_eq!(profile, "high");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn config_rejects_odd_dimensions_and_zero_rates() {
        assert!(EncoderConfig::new(1281, 720, 30.0, 8000, 30).is_err());
        assert!(EncoderConfig::new(1280, 720, 0.0, 8000, 30).is_err());
        assert!(EncoderConfig::new(1280, 720, 30.0, 0, 30).is_err());
        assert!(EncoderConfig::new(1280, 720, 30.0, 8000, 0).is_err());
        assert!(EncoderConfig::new(1280, 720, 29.97, 8000, 30).is_ok());
    }

    #[test]
    fn height_cap_preserves_aspect_and_evenness() {
        assert_eq!(capped_resolution(3840, 2160, Some(1080)), (1920, 1080));
        assert_eq!(capped_resolution(1280, 720, Some(1080)), (1280, 720));
        assert_eq!(capped_resolution(1280, 720, None), (1280, 720));
        // 1707.5 truncates to 1707, which rounds up to even
        assert_eq!(capped_resolution(3415, 2160, Some(1080)), (1708, 1080));
        // odd source passed through untouched still becomes even
        assert_eq!(capped_resolution(853, 481, None), (854, 482));
    }
}
