//! Media side of camcount.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building and FFprobe stream info
//! - HTTP clip fetching with the trim policy
//! - Frame-level decode/encode backends
//! - The ONNX vehicle detector and the per-clip detection engine
//! - Transcoding of annotated clips to H.264

pub mod annotate;
pub mod assets;
pub mod command;
pub mod detector;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod frames;
pub mod fs_utils;
#[cfg(feature = "opencv")]
pub mod opencv_backend;
#[cfg(test)]
mod test_media;
pub mod transcode;
pub mod trim;
pub mod video_info;

pub use annotate::{default_annotator, Annotate};
pub use assets::ensure_model;
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use detector::{
    DetectorSettings, ObjectDetect, ObjectDetection, OnnxObjectDetector, COCO_CLASSES,
    DEFAULT_VEHICLE_CLASSES,
};
pub use engine::DetectionEngine;
pub use error::{MediaError, MediaResult};
pub use fetch::ClipFetcher;
pub use frames::{FfmpegFrameBackend, FrameBackend, FrameSink, FrameSource, VideoMeta};
pub use transcode::{FfmpegTranscoder, Transcode};
pub use trim::{ClipTrimmer, FfmpegTrimmer, NoopTrimmer, TrimOutcome, TrimPolicy};
pub use video_info::{read_video_info, VideoInfo};

#[cfg(feature = "opencv")]
pub use opencv_backend::{OpencvAnnotator, OpencvFrameBackend};
