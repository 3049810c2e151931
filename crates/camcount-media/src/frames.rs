//! Frame-level video I/O used while streaming a clip through detection.
//!
//! Everything here is blocking and meant to run on a `spawn_blocking`
//! thread. The default backend shells out to FFmpeg and moves raw RGB24
//! frames over pipes.

use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use image::RgbImage;
use tracing::debug;

use crate::command::{check_ffmpeg, check_ffprobe, stderr_tail};
use crate::error::{MediaError, MediaResult};
use crate::video_info::{parse_ffprobe_json, VideoInfo};

/// What the engine needs to know about a clip before streaming it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoMeta {
    /// Frames per second as declared by the container
    pub fps: f64,
    /// Total frame count
    pub frame_count: u64,
    pub width: u32,
    pub height: u32,
}

impl VideoMeta {
    pub fn whole_fps(&self) -> u32 {
        crate::video_info::whole_fps(self.fps)
    }
}

impl From<&VideoInfo> for VideoMeta {
    fn from(info: &VideoInfo) -> Self {
        Self {
            fps: info.fps,
            frame_count: info.effective_frame_count(),
            width: info.width,
            height: info.height,
        }
    }
}

/// Sequential decoder for one clip.
pub trait FrameSource: Send {
    /// Next decoded frame, or `None` at end of stream.
    fn next_frame(&mut self) -> MediaResult<Option<RgbImage>>;
}

/// Sequential encoder for one working file.
pub trait FrameSink: Send {
    fn write_frame(&mut self, frame: &RgbImage) -> MediaResult<()>;

    /// Flush and close the output file.
    fn finish(self: Box<Self>) -> MediaResult<()>;
}

/// Opens decoders and encoders.
pub trait FrameBackend: Send + Sync {
    /// Read stream info for `path` and open it for decoding.
    ///
    /// Unreadable, empty or corrupt input is a [`MediaError::MediaOpen`].
    fn open(&self, path: &Path) -> MediaResult<(VideoMeta, Box<dyn FrameSource>)>;

    /// Create an MPEG-4 Part 2 writer at `path`.
    fn create_sink(
        &self,
        path: &Path,
        fps: f64,
        width: u32,
        height: u32,
    ) -> MediaResult<Box<dyn FrameSink>>;
}

/// FFmpeg/FFprobe subprocess backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegFrameBackend;

impl FfmpegFrameBackend {
    pub fn new() -> Self {
        Self
    }

    fn read_info(path: &Path) -> MediaResult<VideoInfo> {
        check_ffprobe()?;

        let output = Command::new("ffprobe")
            .args([
                "-v",
                "error",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .output()?;

        if !output.status.success() {
            return Err(MediaError::media_open(path, stderr_tail(&output.stderr)));
        }

        parse_ffprobe_json(&output.stdout).map_err(|e| MediaError::media_open(path, e.to_string()))
    }
}

impl FrameBackend for FfmpegFrameBackend {
    fn open(&self, path: &Path) -> MediaResult<(VideoMeta, Box<dyn FrameSource>)> {
        if !path.exists() {
            return Err(MediaError::media_open(path, "file does not exist"));
        }

        let info = Self::read_info(path)?;
        let meta = VideoMeta::from(&info);
        if meta.width == 0 || meta.height == 0 || meta.frame_count == 0 {
            return Err(MediaError::media_open(
                path,
                format!(
                    "no decodable frames ({}x{}, {} frames)",
                    meta.width, meta.height, meta.frame_count
                ),
            ));
        }

        let source = FfmpegFrameSource::spawn(path, meta.width, meta.height)?;
        Ok((meta, Box::new(source)))
    }

    fn create_sink(
        &self,
        path: &Path,
        fps: f64,
        width: u32,
        height: u32,
    ) -> MediaResult<Box<dyn FrameSink>> {
        Ok(Box::new(FfmpegFrameSink::spawn(path, fps, width, height)?))
    }
}

/// Decodes a clip into RGB24 frames read from FFmpeg's stdout.
pub struct FfmpegFrameSource {
    path: PathBuf,
    child: Child,
    stdout: ChildStdout,
    width: u32,
    height: u32,
    frames_read: u64,
}

impl FfmpegFrameSource {
    fn spawn(path: &Path, width: u32, height: u32) -> MediaResult<Self> {
        check_ffmpeg()?;

        let mut child = Command::new("ffmpeg")
            .args(["-hide_banner", "-loglevel", "error", "-i"])
            .arg(path)
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| MediaError::media_open(path, format!("failed to spawn ffmpeg: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::internal("FFmpeg stdout not captured"))?;

        Ok(Self {
            path: path.to_path_buf(),
            child,
            stdout,
            width,
            height,
            frames_read: 0,
        })
    }

    fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

impl FrameSource for FfmpegFrameSource {
    fn next_frame(&mut self) -> MediaResult<Option<RgbImage>> {
        let mut buf = vec![0u8; self.frame_len()];
        let filled = read_full(&mut self.stdout, &mut buf)?;

        if filled == 0 {
            let status = self.child.wait()?;
            if !status.success() && self.frames_read == 0 {
                return Err(MediaError::detection(format!(
                    "decoder for {} exited with {}",
                    self.path.display(),
                    status
                )));
            }
            return Ok(None);
        }
        if filled < buf.len() {
            return Err(MediaError::detection(format!(
                "truncated frame {} in {} ({} of {} bytes)",
                self.frames_read,
                self.path.display(),
                filled,
                buf.len()
            )));
        }

        self.frames_read += 1;
        RgbImage::from_raw(self.width, self.height, buf)
            .map(Some)
            .ok_or_else(|| MediaError::internal("frame buffer size mismatch"))
    }
}

impl Drop for FfmpegFrameSource {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Read until `buf` is full or the stream ends; returns bytes read.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> MediaResult<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(MediaError::from(e)),
        }
    }
    Ok(filled)
}

/// Encodes RGB24 frames written to FFmpeg's stdin as MPEG-4 Part 2.
pub struct FfmpegFrameSink {
    path: PathBuf,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    width: u32,
    height: u32,
}

impl FfmpegFrameSink {
    fn spawn(path: &Path, fps: f64, width: u32, height: u32) -> MediaResult<Self> {
        check_ffmpeg()?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut child = Command::new("ffmpeg")
            .args(["-y", "-hide_banner", "-loglevel", "error"])
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24"])
            .args(["-s", &format!("{}x{}", width, height)])
            .args(["-r", &format!("{:.3}", fps)])
            .args(["-i", "-"])
            .args(["-c:v", "mpeg4", "-vtag", "mp4v", "-q:v", "3", "-pix_fmt", "yuv420p"])
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| MediaError::detection(format!("failed to spawn encoder: {}", e)))?;

        let stdin = child.stdin.take();
        debug!(path = %path.display(), width, height, fps, "Opened working file writer");

        Ok(Self {
            path: path.to_path_buf(),
            child: Some(child),
            stdin,
            width,
            height,
        })
    }
}

impl FrameSink for FfmpegFrameSink {
    fn write_frame(&mut self, frame: &RgbImage) -> MediaResult<()> {
        if frame.dimensions() != (self.width, self.height) {
            return Err(MediaError::detection(format!(
                "frame size {:?} differs from writer size {}x{}",
                frame.dimensions(),
                self.width,
                self.height
            )));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| MediaError::internal("encoder stdin already closed"))?;
        stdin
            .write_all(frame.as_raw())
            .map_err(|e| MediaError::detection(format!("encoder write failed: {}", e)))
    }

    fn finish(mut self: Box<Self>) -> MediaResult<()> {
        drop(self.stdin.take());
        let child = self
            .child
            .take()
            .ok_or_else(|| MediaError::internal("encoder already finished"))?;
        let output = child.wait_with_output()?;

        if output.status.success() {
            Ok(())
        } else {
            Err(MediaError::detection(format!(
                "encoder for {} failed: {}",
                self.path.display(),
                stderr_tail(&output.stderr)
            )))
        }
    }
}

impl Drop for FfmpegFrameSink {
    fn drop(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_read_full_partial() {
        let mut reader = Cursor::new(vec![1u8; 5]);
        let mut buf = [0u8; 8];
        assert_eq!(read_full(&mut reader, &mut buf).unwrap(), 5);
        assert_eq!(read_full(&mut reader, &mut buf).unwrap(), 0);
    }

    #[test]
    fn test_meta_from_info() {
        let info = VideoInfo {
            duration: 11.0,
            width: 640,
            height: 360,
            fps: 29.97,
            frame_count: None,
            codec: "h264".to_string(),
        };
        let meta = VideoMeta::from(&info);
        assert_eq!(meta.whole_fps(), 30);
        assert_eq!(meta.frame_count, 330);
    }

    #[test]
    fn test_open_missing_file_is_media_open() {
        let err = FfmpegFrameBackend::new()
            .open(Path::new("/no/such/clip.mp4"))
            .err()
            .unwrap();
        assert!(err.is_media_open());
    }

    #[test]
    fn test_open_garbage_is_media_open() {
        if which::which("ffprobe").is_err() {
            return;
        }
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("broken.mp4");
        std::fs::write(&path, b"definitely not a video").unwrap();

        let err = FfmpegFrameBackend::new().open(&path).err().unwrap();
        assert!(err.is_media_open());
    }

    #[test]
    fn test_ffmpeg_backend_round_trip() {
        if !crate::test_media::ffmpeg_available() {
            return;
        }
        let dir = tempfile::TempDir::new().unwrap();
        let input = dir.path().join("in.mp4");
        let working = dir.path().join("work").join("in.mp4");
        crate::test_media::synth_clip(&input, 3, 30);

        let backend = FfmpegFrameBackend::new();
        let (meta, mut source) = backend.open(&input).unwrap();
        assert_eq!((meta.width, meta.height), (160, 120));
        assert_eq!(meta.whole_fps(), 30);
        assert_eq!(meta.frame_count, 90);

        let mut sink = backend.create_sink(&working, meta.fps, 160, 120).unwrap();
        let mut decoded = 0;
        while let Some(frame) = source.next_frame().unwrap() {
            sink.write_frame(&frame).unwrap();
            decoded += 1;
        }
        sink.finish().unwrap();
        assert_eq!(decoded, 90);

        let (written, _) = backend.open(&working).unwrap();
        assert_eq!(written.frame_count, 90);
        assert_eq!(written.whole_fps(), 30);
    }
}
