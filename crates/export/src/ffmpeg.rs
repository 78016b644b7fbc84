//! ffmpeg-backed encoder and muxer.
//!
//! The encoder streams raw RGBA frames into an ffmpeg subprocess and
//! reads an Annex B H.264 elementary stream back. The muxer spools
//! that stream to disk and lets a second ffmpeg invocation wrap it in
//! a faststart MP4; the container bytes only exist once finalization
//! succeeds, so a failed export leaves nothing behind.

use std::fs;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, info, warn};
use traceburn_capture::PooledBitmap;
use traceburn_common::{ExportError, ExportResult};

use crate::encoder::{ContainerMuxer, EncodedChunk, EncoderConfig, VideoEncoder};

static SPOOL_SEQ: AtomicU64 = AtomicU64::new(0);

/// H.264 encoding through an ffmpeg rawvideo pipe.
pub struct X264PipeEncoder {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    chunks: Option<mpsc::Receiver<Vec<u8>>>,
    reader: Option<std::thread::JoinHandle<()>>,
    frame_bytes: usize,
    last_pts_micros: i64,
}

impl X264PipeEncoder {
    pub fn new() -> Self {
        Self {
            child: None,
            stdin: None,
            chunks: None,
            reader: None,
            frame_bytes: 0,
            last_pts_micros: 0,
        }
    }

    /// Collect whatever bitstream the reader thread has produced.
    fn drain(&mut self, pts_micros: i64) -> Vec<EncodedChunk> {
        let Some(rx) = &self.chunks else {
            return Vec::new();
        };
        let mut data = Vec::new();
        while let Ok(piece) = rx.try_recv() {
            data.extend_from_slice(&piece);
        }
        if data.is_empty() {
            return Vec::new();
        }
        let keyframe = contains_idr_nal(&data);
        vec![EncodedChunk {
            data: Bytes::from(data),
            pts_micros,
            keyframe,
        }]
    }
}

impl Default for X264PipeEncoder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VideoEncoder for X264PipeEncoder {
    async fn configure(&mut self, config: &EncoderConfig) -> ExportResult<()> {
        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-v", "error"])
            .args(["-f", "rawvideo", "-pix_fmt", "rgba"])
            .args(["-s", &format!("{}x{}", config.width, config.height)])
            .args(["-r", &format!("{:.4}", config.frame_rate)])
            .args(["-i", "-"])
            .arg("-an")
            .args(["-c:v", "libx264"])
            .args(["-profile:v", config.tier.profile])
            .args(["-level:v", config.tier.level])
            .args(["-b:v", &format!("{}k", config.bitrate_kbps)])
            .args(["-g", &config.keyframe_interval.to_string()])
            .args(["-keyint_min", &config.keyframe_interval.to_string()])
            .args(["-sc_threshold", "0"])
            .args(["-pix_fmt", "yuv420p"])
            .args(["-f", "h264", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| ExportError::EncoderConfig {
            message: format!("Failed to start ffmpeg encoder: {e}"),
            width: config.width,
            height: config.height,
            profile: config.tier.profile.to_string(),
        })?;
        info!(
            pid = child.id(),
            width = config.width,
            height = config.height,
            profile = config.tier.profile,
            level = config.tier.level,
            "Encoder started"
        );

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ExportError::encoder_runtime("Failed to open encoder stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExportError::encoder_runtime("Failed to open encoder stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ExportError::encoder_runtime("Failed to open encoder stderr"))?;

        std::thread::spawn(move || {
            let mut output = String::new();
            if std::io::BufReader::new(stderr).read_to_string(&mut output).is_ok()
                && !output.trim().is_empty()
            {
                warn!(stderr = %output.trim(), "Encoder reported errors");
            }
        });

        // Bitstream reader; keeps ffmpeg's stdout pipe drained.
        let (tx, rx) = mpsc::channel();
        let reader = std::thread::spawn(move || {
            let mut stdout = stdout;
            let mut buf = vec![0u8; 64 * 1024];
            loop {
                match stdout.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if tx.send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        self.frame_bytes = config.width as usize * config.height as usize * 4;
        self.child = Some(child);
        self.stdin = Some(stdin);
        self.chunks = Some(rx);
        self.reader = Some(reader);
        Ok(())
    }

    async fn encode(
        &mut self,
        frame: &PooledBitmap,
        pts_micros: i64,
        _keyframe: bool,
    ) -> ExportResult<Vec<EncodedChunk>> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| ExportError::encoder_runtime("Encoder used before configure"))?;
        if frame.data().len() != self.frame_bytes {
            return Err(ExportError::encoder_runtime(format!(
                "Frame is {} bytes, encoder expects {}",
                frame.data().len(),
                self.frame_bytes
            )));
        }
        stdin
            .write_all(frame.data())
            .map_err(|e| ExportError::encoder_runtime(format!("Encoder pipe write failed: {e}")))?;
        self.last_pts_micros = pts_micros;
        Ok(self.drain(pts_micros))
    }

    async fn flush(&mut self) -> ExportResult<Vec<EncodedChunk>> {
        // Closing stdin tells ffmpeg to flush its lookahead and exit.
        self.stdin = None;
        if let Some(mut child) = self.child.take() {
            let status = child
                .wait()
                .map_err(|e| ExportError::encoder_runtime(format!("Encoder wait failed: {e}")))?;
            if !status.success() {
                return Err(ExportError::encoder_runtime(format!(
                    "Encoder exited with status {status}"
                )));
            }
        }
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
        let chunks = self.drain(self.last_pts_micros);
        self.chunks = None;
        debug!(chunks = chunks.len(), "Encoder flushed");
        Ok(chunks)
    }

    async fn close(&mut self) -> ExportResult<()> {
        self.stdin = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
        self.chunks = None;
        Ok(())
    }
}

/// Scan an Annex B stream for an IDR slice (NAL type 5).
fn contains_idr_nal(data: &[u8]) -> bool {
    let mut i = 0;
    while i + 3 < data.len() {
        let (header_at, advance) = if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            (i + 3, 3)
        } else if i + 4 < data.len()
            && data[i] == 0
            && data[i + 1] == 0
            && data[i + 2] == 0
            && data[i + 3] == 1
        {
            (i + 4, 4)
        } else {
            i += 1;
            continue;
        };
        if header_at < data.len() && data[header_at] & 0x1f == 5 {
            return true;
        }
        i += advance;
    }
    false
}

/// Source audio to carry into the container.
#[derive(Debug, Clone)]
pub struct AudioSpan {
    pub path: PathBuf,
    pub start_secs: f64,
    pub duration_secs: f64,
}

/// Spools the elementary stream and wraps it in a faststart MP4.
pub struct Mp4Muxer {
    audio: Option<AudioSpan>,
    config: Option<EncoderConfig>,
    spool_path: Option<PathBuf>,
    spool: Option<fs::File>,
}

impl Mp4Muxer {
    pub fn new(audio: Option<AudioSpan>) -> Self {
        Self {
            audio,
            config: None,
            spool_path: None,
            spool: None,
        }
    }
}

impl Drop for Mp4Muxer {
    // Finalize takes ownership of the spool path; anything still here
    // belongs to an aborted export and must not outlive the muxer.
    fn drop(&mut self) {
        self.spool = None;
        if let Some(path) = self.spool_path.take() {
            let _ = fs::remove_file(&path);
        }
    }
}

#[async_trait]
impl ContainerMuxer for Mp4Muxer {
    fn begin(&mut self, config: &EncoderConfig) -> ExportResult<()> {
        let path = std::env::temp_dir().join(format!(
            "traceburn-{}-{}.h264",
            std::process::id(),
            SPOOL_SEQ.fetch_add(1, Ordering::SeqCst)
        ));
        let file = fs::File::create(&path)
            .map_err(|e| ExportError::mux(format!("Failed to create spool file: {e}")))?;
        debug!(spool = %path.display(), "Mux spool opened");
        self.config = Some(config.clone());
        self.spool_path = Some(path);
        self.spool = Some(file);
        Ok(())
    }

    fn write_chunk(&mut self, chunk: EncodedChunk) -> ExportResult<()> {
        let spool = self
            .spool
            .as_mut()
            .ok_or_else(|| ExportError::mux("Muxer used before begin"))?;
        spool
            .write_all(&chunk.data)
            .map_err(|e| ExportError::mux(format!("Spool write failed: {e}")))
    }

    async fn finalize(&mut self) -> ExportResult<Bytes> {
        let config = self
            .config
            .take()
            .ok_or_else(|| ExportError::mux("Muxer finalized before begin"))?;
        let spool_path = self
            .spool_path
            .take()
            .ok_or_else(|| ExportError::mux("Muxer finalized before begin"))?;
        self.spool = None;

        let audio = self.audio.clone();
        let result = tokio::task::spawn_blocking(move || {
            wrap_in_mp4(&spool_path, &config, audio.as_ref())
        })
        .await
        .map_err(|e| ExportError::mux(format!("Mux task failed: {e}")))?;
        result
    }
}

fn wrap_in_mp4(
    spool_path: &std::path::Path,
    config: &EncoderConfig,
    audio: Option<&AudioSpan>,
) -> ExportResult<Bytes> {
    let out_path = spool_path.with_extension("mp4");

    let mut cmd = Command::new("ffmpeg");
    cmd.args(["-v", "error", "-y"])
        .args(["-r", &format!("{:.4}", config.frame_rate)])
        .args(["-f", "h264"])
        .arg("-i")
        .arg(spool_path);
    if let Some(span) = audio {
        cmd.args(["-ss", &format!("{:.3}", span.start_secs)])
            .args(["-t", &format!("{:.3}", span.duration_secs)])
            .arg("-i")
            .arg(&span.path);
        cmd.args(["-map", "0:v:0", "-map", "1:a:0?"])
            .args(["-c:a", "aac", "-b:a", "192k"])
            .arg("-shortest");
    } else {
        cmd.args(["-map", "0:v:0"]).arg("-an");
    }
    cmd.args(["-c:v", "copy"])
        .args(["-movflags", "+faststart"])
        .args(["-f", "mp4"])
        .arg(&out_path)
        .stdin(Stdio::null());

    let cleanup = |out: &std::path::Path| {
        let _ = fs::remove_file(spool_path);
        let _ = fs::remove_file(out);
    };

    let output = cmd.output().map_err(|e| {
        cleanup(&out_path);
        ExportError::mux(format!("Failed to run ffmpeg mux: {e}"))
    })?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        cleanup(&out_path);
        return Err(ExportError::mux(format!(
            "Container finalization failed: {}",
            stderr.trim()
        )));
    }

    let bytes = fs::read(&out_path).map_err(|e| {
        cleanup(&out_path);
        ExportError::mux(format!("Failed to read container: {e}"))
    })?;
    cleanup(&out_path);
    info!(bytes = bytes.len(), "Container finalized");
    Ok(Bytes::from(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idr_scan_finds_keyframes() {
        // SPS (7), PPS (8), IDR (5) with 4-byte start codes
        let stream = [
            0, 0, 0, 1, 0x67, 0xaa, 0, 0, 0, 1, 0x68, 0xbb, 0, 0, 0, 1, 0x65, 0xcc,
        ];
        assert!(contains_idr_nal(&stream));

        // non-IDR slice (1) only, 3-byte start code
        let stream = [0u8, 0, 1, 0x41, 0x9a, 0x00];
        assert!(!contains_idr_nal(&stream));

        assert!(!contains_idr_nal(&[]));
        assert!(!contains_idr_nal(&[0, 0]));
    }

    #[test]
    fn dropping_an_unfinalized_muxer_removes_the_spool() {
        let config = EncoderConfig::new(160, 90, 30.0, 500, 30).unwrap();
        let mut muxer = Mp4Muxer::new(None);
        muxer.begin(&config).unwrap();
        muxer
            .write_chunk(EncodedChunk {
                data: Bytes::from_static(&[0, 0, 0, 1, 0x65, 0xcc]),
                pts_micros: 0,
                keyframe: true,
            })
            .unwrap();

        let spool = muxer.spool_path.clone().unwrap();
        assert!(spool.exists());
        drop(muxer);
        assert!(!spool.exists());
    }
}
