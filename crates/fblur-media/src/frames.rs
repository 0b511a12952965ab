//! Raw RGB24 frame streaming over FFmpeg pipes.
//!
//! Decoding reads `-f rawvideo -pix_fmt rgb24` output from FFmpeg's
//! stdout one frame at a time; encoding feeds composited frames back
//! through stdin of a second FFmpeg process. Both sides reap their
//! child process on every exit path.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use fblur_models::BoundingBox;

use crate::command::check_ffmpeg;
use crate::error::{MediaError, MediaResult};

/// Bytes per pixel for RGB24.
const BYTES_PER_PIXEL: usize = 3;

/// Borrowed view of one decoded frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
}

impl<'a> FrameView<'a> {
    /// Create a view over a raw RGB24 buffer.
    ///
    /// Returns `None` when the buffer length does not match the
    /// dimensions.
    pub fn new(data: &'a [u8], width: u32, height: u32) -> Option<Self> {
        (data.len() == frame_len(width, height)).then_some(Self {
            data,
            width,
            height,
        })
    }

    /// Copy out the pixels under a bounding box as a standalone RGB24
    /// buffer. Degenerate crops yield `None`.
    pub fn crop(&self, bbox: &BoundingBox) -> Option<(Vec<u8>, u32, u32)> {
        let clamped = bbox.clamp(self.width, self.height);
        let x = clamped.x as usize;
        let y = clamped.y as usize;
        let w = clamped.width as usize;
        let h = clamped.height as usize;
        if w == 0 || h == 0 {
            return None;
        }

        let stride = self.width as usize * BYTES_PER_PIXEL;
        let mut out = Vec::with_capacity(w * h * BYTES_PER_PIXEL);
        for row in y..y + h {
            let start = row * stride + x * BYTES_PER_PIXEL;
            out.extend_from_slice(&self.data[start..start + w * BYTES_PER_PIXEL]);
        }
        Some((out, w as u32, h as u32))
    }
}

/// Expected byte length of one RGB24 frame.
pub fn frame_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * BYTES_PER_PIXEL
}

/// Source of sequential RGB24 frames.
///
/// The seam between the engine's frame loop and the FFmpeg decoder, so
/// the loop can be exercised against in-memory frames.
#[async_trait]
pub trait FrameSource: Send {
    /// Read the next frame into `buf`. `Ok(false)` at end of stream.
    async fn next_frame(&mut self, buf: &mut Vec<u8>) -> MediaResult<bool>;
}

/// Sink for sequential RGB24 frames.
#[async_trait]
pub trait FrameSink: Send {
    async fn write_frame(&mut self, frame: &[u8]) -> MediaResult<()>;
}

/// Sequential frame decoder backed by an FFmpeg child process.
pub struct FrameReader {
    child: Child,
    stdout: BufReader<ChildStdout>,
    frame_len: usize,
    width: u32,
    height: u32,
}

impl FrameReader {
    /// Open a video for sequential RGB24 frame reads.
    pub async fn open(path: impl AsRef<Path>, width: u32, height: u32) -> MediaResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(MediaError::FileNotFound(path.to_path_buf()));
        }
        check_ffmpeg()?;

        let mut child = Command::new("ffmpeg")
            .args(["-v", "error", "-i"])
            .arg(path)
            .args(["-pix_fmt", "rgb24", "-f", "rawvideo", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::internal("FFmpeg stdout not captured"))?;

        debug!("Opened frame reader for {} ({}x{})", path.display(), width, height);

        Ok(Self {
            child,
            stdout: BufReader::new(stdout),
            frame_len: frame_len(width, height),
            width,
            height,
        })
    }

    /// Read the next frame into `buf`, resizing it as needed.
    ///
    /// Returns `Ok(false)` at end of stream. A truncated trailing frame
    /// is discarded with a warning rather than surfaced as an error.
    pub async fn next_frame(&mut self, buf: &mut Vec<u8>) -> MediaResult<bool> {
        buf.resize(self.frame_len, 0);
        let mut filled = 0usize;
        while filled < self.frame_len {
            let n = self.stdout.read(&mut buf[filled..]).await?;
            if n == 0 {
                if filled > 0 {
                    warn!("Discarding truncated trailing frame ({} bytes)", filled);
                }
                return Ok(false);
            }
            filled += n;
        }
        Ok(true)
    }

    /// View the buffer just produced by [`next_frame`](Self::next_frame).
    pub fn view<'a>(&self, buf: &'a [u8]) -> MediaResult<FrameView<'a>> {
        FrameView::new(buf, self.width, self.height)
            .ok_or_else(|| MediaError::internal("Frame buffer size mismatch"))
    }

    /// Wait for the decoder process to exit.
    pub async fn finish(mut self) -> MediaResult<()> {
        let status = self.child.wait().await?;
        if !status.success() {
            return Err(MediaError::ffmpeg_failed(
                "FFmpeg decoder exited with non-zero status",
                None,
                status.code(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl FrameSource for FrameReader {
    async fn next_frame(&mut self, buf: &mut Vec<u8>) -> MediaResult<bool> {
        FrameReader::next_frame(self, buf).await
    }
}

/// Sequential frame encoder backed by an FFmpeg child process.
pub struct FrameWriter {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr_task: Option<JoinHandle<Vec<u8>>>,
    frame_len: usize,
}

impl FrameWriter {
    /// Open an H.264 output stream with the given geometry.
    pub async fn open(
        path: impl AsRef<Path>,
        width: u32,
        height: u32,
        fps: f64,
        preset: &str,
        crf: u8,
    ) -> MediaResult<Self> {
        check_ffmpeg()?;

        let mut child = Command::new("ffmpeg")
            .args([
                "-y",
                "-v",
                "error",
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgb24",
                "-s",
                &format!("{}x{}", width, height),
                "-r",
                &format!("{:.3}", fps),
                "-i",
                "-",
                "-an",
                "-c:v",
                "libx264",
                "-preset",
                preset,
                "-crf",
                &crf.to_string(),
                "-pix_fmt",
                "yuv420p",
            ])
            .arg(path.as_ref())
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| MediaError::internal("FFmpeg stdin not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::internal("FFmpeg stderr not captured"))?;

        Ok(Self {
            child: Some(child),
            stdin: Some(stdin),
            stderr_task: Some(drain_to_end(stderr)),
            frame_len: frame_len(width, height),
        })
    }

    /// Write one RGB24 frame.
    pub async fn write_frame(&mut self, frame: &[u8]) -> MediaResult<()> {
        if frame.len() != self.frame_len {
            return Err(MediaError::internal(format!(
                "Frame size mismatch: expected {} bytes, got {}",
                self.frame_len,
                frame.len()
            )));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| MediaError::internal("Frame writer already finished"))?;
        stdin.write_all(frame).await?;
        Ok(())
    }

    /// Close the input pipe and wait for the encoder to finish.
    pub async fn finish(mut self) -> MediaResult<()> {
        // Dropping stdin sends EOF so the encoder can flush and exit
        drop(self.stdin.take());

        let mut child = self
            .child
            .take()
            .ok_or_else(|| MediaError::internal("Frame writer already finished"))?;
        let status = child.wait().await?;

        let captured = match self.stderr_task.take() {
            Some(task) => task.await.unwrap_or_default(),
            None => Vec::new(),
        };

        if !status.success() {
            let stderr = String::from_utf8_lossy(&captured).trim().to_string();
            return Err(MediaError::ffmpeg_failed(
                "FFmpeg encoder exited with non-zero status",
                (!stderr.is_empty()).then_some(stderr),
                status.code(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl FrameSink for FrameWriter {
    async fn write_frame(&mut self, frame: &[u8]) -> MediaResult<()> {
        FrameWriter::write_frame(self, frame).await
    }
}

/// Drain a child's diagnostic stream into memory on a background task.
///
/// FFmpeg blocks once the stderr pipe buffer fills, so the stream has
/// to be consumed while frames are still being written, not only at
/// `finish()`.
fn drain_to_end<R>(reader: R) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = reader;
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf).await;
        buf
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_len() {
        assert_eq!(frame_len(640, 480), 640 * 480 * 3);
    }

    #[test]
    fn test_view_rejects_wrong_size() {
        let buf = vec![0u8; 10];
        assert!(FrameView::new(&buf, 2, 2).is_none());
        let buf = vec![0u8; 12];
        assert!(FrameView::new(&buf, 2, 2).is_some());
    }

    #[test]
    fn test_crop_extracts_region() {
        // 4x2 frame with a distinct pixel at (2, 1)
        let mut buf = vec![0u8; frame_len(4, 2)];
        let idx = (1 * 4 + 2) * 3;
        buf[idx] = 255;

        let view = FrameView::new(&buf, 4, 2).unwrap();
        let (crop, w, h) = view
            .crop(&BoundingBox::new(2.0, 1.0, 1.0, 1.0))
            .unwrap();
        assert_eq!((w, h), (1, 1));
        assert_eq!(crop, vec![255, 0, 0]);
    }

    #[test]
    fn test_crop_clamps_out_of_bounds() {
        let buf = vec![0u8; frame_len(4, 4)];
        let view = FrameView::new(&buf, 4, 4).unwrap();
        let (_, w, h) = view
            .crop(&BoundingBox::new(-10.0, -10.0, 100.0, 100.0))
            .unwrap();
        assert!(w <= 4 && h <= 4);
    }

    #[tokio::test]
    async fn test_stderr_drained_while_producer_writes() {
        // The pipe buffer here is far smaller than the payload, so the
        // writer only gets through because the drain task keeps reading
        let (mut tx, rx) = tokio::io::duplex(1024);
        let drain = drain_to_end(rx);

        let payload = vec![b'x'; 256 * 1024];
        tx.write_all(&payload).await.unwrap();
        drop(tx);

        assert_eq!(drain.await.unwrap().len(), payload.len());
    }
}
