//! FFprobe clip information.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::command::{check_ffprobe, stderr_tail};
use crate::error::{MediaError, MediaResult};

/// Clip information as reported by the container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    /// Duration in seconds
    pub duration: f64,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Frame rate (fps)
    pub fps: f64,
    /// Frame count declared by the video stream, if any
    pub frame_count: Option<u64>,
    /// Video codec
    pub codec: String,
}

impl VideoInfo {
    /// Frame rate rounded to a whole number, never below 1.
    pub fn whole_fps(&self) -> u32 {
        whole_fps(self.fps)
    }

    /// Declared frame count, or one derived from duration and fps.
    pub fn effective_frame_count(&self) -> u64 {
        match self.frame_count {
            Some(n) if n > 0 => n,
            _ => (self.duration * self.fps).round().max(0.0) as u64,
        }
    }
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
}

/// Read stream information for a clip via FFprobe.
pub async fn read_video_info(path: impl AsRef<Path>) -> MediaResult<VideoInfo> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

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
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::media_open(
            path,
            format!("ffprobe failed: {}", stderr_tail(&output.stderr)),
        ));
    }

    parse_ffprobe_json(&output.stdout).map_err(|e| MediaError::media_open(path, e.to_string()))
}

/// Get clip duration in seconds.
pub async fn get_duration(path: impl AsRef<Path>) -> MediaResult<f64> {
    let info = read_video_info(path).await?;
    Ok(info.duration)
}

pub(crate) fn parse_ffprobe_json(raw: &[u8]) -> MediaResult<VideoInfo> {
    let parsed: FfprobeOutput = serde_json::from_slice(raw)?;

    let video_stream = parsed
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| MediaError::FfprobeFailed {
            message: "no video stream found".to_string(),
            stderr: None,
        })?;

    // Container duration first, stream duration as fallback
    let duration = parsed
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .or(video_stream.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    let fps = video_stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .or_else(|| video_stream.r_frame_rate.as_deref().and_then(parse_frame_rate))
        .unwrap_or(30.0);

    let frame_count = video_stream
        .nb_frames
        .as_deref()
        .and_then(|n| n.parse::<u64>().ok());

    Ok(VideoInfo {
        duration,
        width: video_stream.width.unwrap_or(0),
        height: video_stream.height.unwrap_or(0),
        fps,
        frame_count,
        codec: video_stream.codec_name.clone().unwrap_or_default(),
    })
}

/// Parse frame rate string (e.g., "30/1" or "29.97").
pub(crate) fn parse_frame_rate(s: &str) -> Option<f64> {
    if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den > 0.0 && num > 0.0 {
            return Some(num / den);
        }
        return None;
    }
    s.parse().ok().filter(|v: &f64| *v > 0.0)
}

/// Round a frame rate to a whole number of frames per second (minimum 1).
pub fn whole_fps(fps: f64) -> u32 {
    if !fps.is_finite() {
        return 1;
    }
    (fps.round() as u32).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame_rate() {
        assert!((parse_frame_rate("30/1").unwrap() - 30.0).abs() < 0.01);
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert!((parse_frame_rate("29.97").unwrap() - 29.97).abs() < 0.01);
        assert!(parse_frame_rate("0/0").is_none());
    }

    #[test]
    fn test_whole_fps() {
        assert_eq!(whole_fps(29.97), 30);
        assert_eq!(whole_fps(25.0), 25);
        assert_eq!(whole_fps(0.2), 1);
        assert_eq!(whole_fps(f64::NAN), 1);
    }

    #[test]
    fn test_parse_ffprobe_json() {
        let raw = br#"{
            "streams": [
                {"codec_type": "audio", "codec_name": "aac"},
                {"codec_type": "video", "codec_name": "h264", "width": 1280, "height": 720,
                 "avg_frame_rate": "30/1", "r_frame_rate": "30/1", "nb_frames": "360"}
            ],
            "format": {"duration": "12.000000"}
        }"#;

        let info = parse_ffprobe_json(raw).unwrap();
        assert_eq!(info.width, 1280);
        assert_eq!(info.whole_fps(), 30);
        assert_eq!(info.frame_count, Some(360));
        assert_eq!(info.effective_frame_count(), 360);
        assert!((info.duration - 12.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_frame_count_falls_back_to_duration() {
        let raw = br#"{
            "streams": [{"codec_type": "video", "avg_frame_rate": "25/1"}],
            "format": {"duration": "4.0"}
        }"#;

        let info = parse_ffprobe_json(raw).unwrap();
        assert_eq!(info.frame_count, None);
        assert_eq!(info.effective_frame_count(), 100);
    }

    #[test]
    fn test_no_video_stream() {
        let raw = br#"{"streams": [{"codec_type": "audio"}], "format": {}}"#;
        assert!(parse_ffprobe_json(raw).is_err());
    }
}
