//! In-memory stand-ins for FFmpeg and the ONNX detector.
//!
//! Fake clips are small text files such as `frames=360;fps=30`. The frame
//! backend "decodes" them into solid frames whose first pixel encodes the
//! frame index, and the sink writes a text summary of what it received.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use image::{Rgb, RgbImage};

use camcount_media::{
    ClipTrimmer, FrameBackend, FrameSink, FrameSource, MediaError, MediaResult, ObjectDetect,
    ObjectDetection, Transcode, TrimOutcome, TrimPolicy, VideoMeta,
};

/// Behaviour switches embedded in a fake clip.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FakeClip {
    pub frames: u64,
    pub fps: u64,
    pub panic_at: Option<u64>,
    pub stall: bool,
}

impl FakeClip {
    pub fn new(frames: u64, fps: u64) -> Self {
        Self {
            frames,
            fps,
            ..Default::default()
        }
    }

    pub fn encode(&self) -> String {
        let mut s = format!("frames={};fps={}", self.frames, self.fps);
        if let Some(at) = self.panic_at {
            s.push_str(&format!(";panic_at={}", at));
        }
        if self.stall {
            s.push_str(";stall");
        }
        s
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let mut clip = FakeClip::default();
        for part in raw.trim().split(';') {
            match part.split_once('=') {
                Some(("frames", v)) => clip.frames = v.parse().ok()?,
                Some(("fps", v)) => clip.fps = v.parse().ok()?,
                Some(("panic_at", v)) => clip.panic_at = Some(v.parse().ok()?),
                None if part == "stall" => clip.stall = true,
                _ => return None,
            }
        }
        (clip.fps > 0).then_some(clip)
    }

    pub fn write(&self, path: &Path) {
        std::fs::write(path, self.encode()).unwrap();
    }

    pub fn read(path: &Path) -> Option<Self> {
        Self::parse(&std::fs::read_to_string(path).ok()?)
    }
}

pub struct FakeFrameBackend;

impl FrameBackend for FakeFrameBackend {
    fn open(&self, path: &Path) -> MediaResult<(VideoMeta, Box<dyn FrameSource>)> {
        let clip = FakeClip::read(path)
            .ok_or_else(|| MediaError::media_open(path, "not a fake clip"))?;
        if clip.frames == 0 {
            return Err(MediaError::media_open(path, "empty clip"));
        }
        let meta = VideoMeta {
            fps: clip.fps as f64,
            frame_count: clip.frames,
            width: 8,
            height: 8,
        };
        Ok((meta, Box::new(FakeSource { clip, next: 0 })))
    }

    fn create_sink(
        &self,
        path: &Path,
        _fps: f64,
        _width: u32,
        _height: u32,
    ) -> MediaResult<Box<dyn FrameSink>> {
        Ok(Box::new(FakeSink {
            path: path.to_path_buf(),
            frames: 0,
        }))
    }
}

struct FakeSource {
    clip: FakeClip,
    next: u64,
}

impl FrameSource for FakeSource {
    fn next_frame(&mut self) -> MediaResult<Option<RgbImage>> {
        if self.next == self.clip.frames {
            return Ok(None);
        }
        if self.clip.stall {
            std::thread::sleep(Duration::from_millis(400));
        }
        if Some(self.next) == self.clip.panic_at {
            panic!("decoder crashed at frame {}", self.next);
        }
        let i = self.next;
        self.next += 1;
        Ok(Some(RgbImage::from_pixel(
            8,
            8,
            Rgb([(i >> 8) as u8, (i & 0xff) as u8, 1]),
        )))
    }
}

struct FakeSink {
    path: std::path::PathBuf,
    frames: u64,
}

impl FrameSink for FakeSink {
    fn write_frame(&mut self, _frame: &RgbImage) -> MediaResult<()> {
        self.frames += 1;
        Ok(())
    }

    fn finish(self: Box<Self>) -> MediaResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, format!("annotated frames={}", self.frames))?;
        Ok(())
    }
}

/// One car per frame during odd seconds at 30 fps, plus a pedestrian.
pub struct FakeDetector;

impl ObjectDetect for FakeDetector {
    fn detect(&self, frame: &RgbImage) -> MediaResult<Vec<ObjectDetection>> {
        let p = frame.get_pixel(0, 0);
        let index = (u64::from(p[0]) << 8) | u64::from(p[1]);
        let object = |class_id| ObjectDetection {
            x: 1.0,
            y: 1.0,
            width: 4.0,
            height: 4.0,
            class_id,
            confidence: 0.7,
        };
        let mut out = vec![object(0)];
        if (index / 30) % 2 == 1 {
            out.push(object(2));
        }
        Ok(out)
    }
}

/// Applies a [`TrimPolicy`] to fake clips by dropping frames.
pub struct FakeTrimmer(pub TrimPolicy);

#[async_trait]
impl ClipTrimmer for FakeTrimmer {
    async fn trim(&self, path: &Path) -> MediaResult<TrimOutcome> {
        let mut clip = FakeClip::read(path).ok_or_else(|| MediaError::trim("unreadable clip"))?;
        let duration = clip.frames as f64 / clip.fps as f64;
        match self.0.target_duration(duration) {
            Some(target) => {
                clip.frames = (target * clip.fps as f64).round() as u64;
                clip.write(path);
                Ok(TrimOutcome::Trimmed {
                    from: duration,
                    to: target,
                })
            }
            None => Ok(TrimOutcome::Untouched { duration }),
        }
    }
}

/// Copies the working file; fails for sources whose name contains `fail_on`.
pub struct CopyTranscoder {
    pub fail_on: Option<&'static str>,
}

#[async_trait]
impl Transcode for CopyTranscoder {
    async fn transcode(&self, src: &Path, dst: &Path) -> MediaResult<()> {
        if let Some(pattern) = self.fail_on {
            if src.to_string_lossy().contains(pattern) {
                return Err(MediaError::transcode("libx264 not available"));
            }
        }
        if let Some(parent) = dst.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(src, dst).await?;
        Ok(())
    }
}

#[test]
fn test_fake_clip_format() {
    let clip = FakeClip {
        frames: 10,
        fps: 5,
        panic_at: Some(3),
        stall: true,
    };
    assert_eq!(FakeClip::parse(&clip.encode()), Some(clip));
    assert_eq!(FakeClip::parse("garbage"), None);
}
