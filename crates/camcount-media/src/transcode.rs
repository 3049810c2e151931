//! Conversion of annotated working files to the served format.

use std::path::Path;

use async_trait::async_trait;
use tracing::debug;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::ensure_parent;

/// Produce a web-playable copy of `src` at `dst`, replacing anything there.
#[async_trait]
pub trait Transcode: Send + Sync {
    async fn transcode(&self, src: &Path, dst: &Path) -> MediaResult<()>;
}

/// H.264/AAC transcoder.
#[derive(Debug, Clone, Default)]
pub struct FfmpegTranscoder {
    runner: FfmpegRunner,
}

impl FfmpegTranscoder {
    pub fn new(runner: FfmpegRunner) -> Self {
        Self { runner }
    }

    fn command(src: &Path, dst: &Path) -> FfmpegCommand {
        FfmpegCommand::new(src, dst)
            .video_codec("libx264")
            .audio_codec("aac")
    }
}

#[async_trait]
impl Transcode for FfmpegTranscoder {
    async fn transcode(&self, src: &Path, dst: &Path) -> MediaResult<()> {
        if !src.exists() {
            return Err(MediaError::transcode(format!(
                "source {} does not exist",
                src.display()
            )));
        }
        ensure_parent(dst)
            .await
            .map_err(|e| MediaError::transcode(e.to_string()))?;

        debug!(src = %src.display(), dst = %dst.display(), "Transcoding");
        self.runner
            .run(&Self::command(src, dst))
            .await
            .map_err(|e| match e {
                MediaError::FfmpegFailed { stderr: Some(s), .. } if !s.is_empty() => {
                    MediaError::transcode(s)
                }
                other => MediaError::transcode(other.to_string()),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcode_args() {
        let args = FfmpegTranscoder::command(Path::new("/tmp/a.avi"), Path::new("/out/a.mp4"))
            .build_args();
        assert_eq!(args[0], "-y");
        let joined = args.join(" ");
        assert!(joined.contains("-i /tmp/a.avi -c:v libx264 -c:a aac /out/a.mp4"));
    }

    #[tokio::test]
    async fn test_missing_source() {
        let err = FfmpegTranscoder::default()
            .transcode(Path::new("/nope/in.mp4"), Path::new("/nope/out.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::Transcode(_)));
    }

    #[tokio::test]
    async fn test_ffmpeg_transcode_to_h264() {
        if !crate::test_media::ffmpeg_available() {
            return;
        }
        let dir = tempfile::TempDir::new().unwrap();
        let src = dir.path().join("tmp").join("1_a_1.mp4");
        let dst = dir.path().join("cameras").join("1").join("1_a_1.mp4");
        std::fs::create_dir_all(src.parent().unwrap()).unwrap();
        crate::test_media::synth_clip(&src, 2, 30);

        FfmpegTranscoder::default().transcode(&src, &dst).await.unwrap();

        let info = crate::video_info::read_video_info(&dst).await.unwrap();
        assert_eq!(info.codec, "h264");
        assert!((info.duration - 2.0).abs() < 0.2);
    }
}
