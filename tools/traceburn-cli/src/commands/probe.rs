//! Show a clip's stream properties.

use std::path::PathBuf;

use traceburn_capture::{FfmpegPlayerSource, FrameSource};
use traceburn_export::capped_resolution;

pub async fn run(clip: PathBuf) -> anyhow::Result<()> {
    let mut source = FfmpegPlayerSource::new(&clip);
    let metadata = source.load().await?;
    source.close().await?;

    println!("{}", clip.display());
    println!("  Resolution: {}x{}", metadata.width, metadata.height);
    println!("  Duration:   {:.3}s", metadata.duration_secs);
    println!("  Frame rate: {:.3} fps", metadata.frame_rate);

    let (w, h) = capped_resolution(metadata.width, metadata.height, Some(1080));
    if (w, h) != (metadata.width, metadata.height) {
        println!("  With --max-height 1080: {w}x{h}");
    }
    Ok(())
}
