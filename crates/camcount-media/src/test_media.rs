//! Synthetic clips for tests that need real FFmpeg.

use std::path::Path;
use std::process::{Command, Stdio};

/// Both binaries are on PATH; tests that need them return early otherwise.
pub fn ffmpeg_available() -> bool {
    which::which("ffmpeg").is_ok() && which::which("ffprobe").is_ok()
}

/// Write an H.264 test pattern of `secs` seconds at `fps` to `path`.
pub fn synth_clip(path: &Path, secs: u32, fps: u32) {
    let source = format!("testsrc=duration={}:size=160x120:rate={}", secs, fps);
    let status = Command::new("ffmpeg")
        .args(["-y", "-v", "error", "-f", "lavfi", "-i", &source])
        .args(["-c:v", "libx264", "-pix_fmt", "yuv420p"])
        .arg(path)
        .stdin(Stdio::null())
        .status()
        .unwrap();
    assert!(status.success(), "ffmpeg could not synthesize {}", path.display());
}
