//! OpenCV frame I/O and label rendering (`opencv` feature).

use std::path::Path;

use image::RgbImage;
use opencv::core::{Mat, Point, Rect, Scalar, Size, CV_8UC3};
use opencv::imgproc;
use opencv::prelude::*;
use opencv::videoio::{
    VideoCapture, VideoWriter, CAP_ANY, CAP_PROP_FPS, CAP_PROP_FRAME_COUNT,
    CAP_PROP_FRAME_HEIGHT, CAP_PROP_FRAME_WIDTH,
};

use crate::annotate::{Annotate, PixelRect, BOX_THICKNESS};
use crate::detector::ObjectDetection;
use crate::error::{MediaError, MediaResult};
use crate::frames::{FrameBackend, FrameSink, FrameSource, VideoMeta};

fn cv_err(e: opencv::Error) -> MediaError {
    MediaError::detection(format!("OpenCV: {}", e))
}

fn path_str(path: &Path) -> MediaResult<&str> {
    path.to_str()
        .ok_or_else(|| MediaError::media_open(path, "path is not valid UTF-8"))
}

/// BGR <-> RGB channel swap, in place.
fn swap_red_blue(bytes: &mut [u8]) {
    for px in bytes.chunks_exact_mut(3) {
        px.swap(0, 2);
    }
}

/// Frame backend built on `VideoCapture` / `VideoWriter`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpencvFrameBackend;

impl FrameBackend for OpencvFrameBackend {
    fn open(&self, path: &Path) -> MediaResult<(VideoMeta, Box<dyn FrameSource>)> {
        let cap = VideoCapture::from_file(path_str(path)?, CAP_ANY)
            .map_err(|e| MediaError::media_open(path, e.to_string()))?;
        if !cap.is_opened().unwrap_or(false) {
            return Err(MediaError::media_open(path, "VideoCapture could not open file"));
        }

        let meta = VideoMeta {
            fps: cap.get(CAP_PROP_FPS).unwrap_or(0.0),
            frame_count: cap.get(CAP_PROP_FRAME_COUNT).unwrap_or(0.0).max(0.0) as u64,
            width: cap.get(CAP_PROP_FRAME_WIDTH).unwrap_or(0.0) as u32,
            height: cap.get(CAP_PROP_FRAME_HEIGHT).unwrap_or(0.0) as u32,
        };
        if meta.fps <= 0.0 || meta.frame_count == 0 {
            return Err(MediaError::media_open(
                path,
                format!("no usable stream ({} fps, {} frames)", meta.fps, meta.frame_count),
            ));
        }

        Ok((meta, Box::new(OpencvFrameSource { cap })))
    }

    fn create_sink(
        &self,
        path: &Path,
        fps: f64,
        width: u32,
        height: u32,
    ) -> MediaResult<Box<dyn FrameSink>> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let fourcc = VideoWriter::fourcc('m', 'p', '4', 'v').map_err(cv_err)?;
        let writer = VideoWriter::new(
            path_str(path)?,
            fourcc,
            fps,
            Size::new(width as i32, height as i32),
            true,
        )
        .map_err(cv_err)?;
        if !writer.is_opened().unwrap_or(false) {
            return Err(MediaError::detection(format!(
                "VideoWriter could not open {}",
                path.display()
            )));
        }
        Ok(Box::new(OpencvFrameSink { writer }))
    }
}

struct OpencvFrameSource {
    cap: VideoCapture,
}

impl FrameSource for OpencvFrameSource {
    fn next_frame(&mut self) -> MediaResult<Option<RgbImage>> {
        let mut mat = Mat::default();
        if !self.cap.read(&mut mat).map_err(cv_err)? || mat.empty() {
            return Ok(None);
        }
        mat_to_rgb(&mat).map(Some)
    }
}

struct OpencvFrameSink {
    writer: VideoWriter,
}

impl FrameSink for OpencvFrameSink {
    fn write_frame(&mut self, frame: &RgbImage) -> MediaResult<()> {
        let mat = rgb_to_mat(frame, true)?;
        self.writer.write(&mat).map_err(cv_err)
    }

    fn finish(mut self: Box<Self>) -> MediaResult<()> {
        self.writer.release().map_err(cv_err)
    }
}

fn mat_to_rgb(mat: &Mat) -> MediaResult<RgbImage> {
    let width = mat.cols() as u32;
    let height = mat.rows() as u32;
    let mut bytes = mat.data_bytes().map_err(cv_err)?.to_vec();
    swap_red_blue(&mut bytes);
    RgbImage::from_raw(width, height, bytes)
        .ok_or_else(|| MediaError::detection("decoded frame has unexpected layout"))
}

/// Copy a frame into a new 8UC3 `Mat`, optionally converting to BGR order.
fn rgb_to_mat(frame: &RgbImage, to_bgr: bool) -> MediaResult<Mat> {
    let mut mat = Mat::new_rows_cols_with_default(
        frame.height() as i32,
        frame.width() as i32,
        CV_8UC3,
        Scalar::all(0.0),
    )
    .map_err(cv_err)?;
    let data = mat.data_bytes_mut().map_err(cv_err)?;
    data.copy_from_slice(frame.as_raw());
    if to_bgr {
        swap_red_blue(data);
    }
    Ok(mat)
}

/// Draws boxes with `putText` labels.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpencvAnnotator;

impl OpencvAnnotator {
    fn draw(frame: &mut RgbImage, detections: &[ObjectDetection]) -> MediaResult<()> {
        // Drawing happens in RGB order, so green is the same either way.
        let mut mat = rgb_to_mat(frame, false)?;
        let green = Scalar::new(0.0, 255.0, 0.0, 0.0);

        for detection in detections {
            let Some(r) = PixelRect::clip(detection, frame.width(), frame.height()) else {
                continue;
            };
            let rect = Rect::new(r.x0 as i32, r.y0 as i32, r.width() as i32, r.height() as i32);
            imgproc::rectangle(&mut mat, rect, green, BOX_THICKNESS as i32, imgproc::LINE_8, 0)
                .map_err(cv_err)?;
            imgproc::put_text(
                &mut mat,
                &detection.label(),
                Point::new(r.x0 as i32, (r.y0 as i32 - 10).max(0)),
                imgproc::FONT_HERSHEY_SIMPLEX,
                0.5,
                green,
                BOX_THICKNESS as i32,
                imgproc::LINE_8,
                false,
            )
            .map_err(cv_err)?;
        }

        let bytes: &mut [u8] = frame;
        bytes.copy_from_slice(mat.data_bytes().map_err(cv_err)?);
        Ok(())
    }
}

impl Annotate for OpencvAnnotator {
    fn annotate(&self, frame: &mut RgbImage, detections: &[ObjectDetection]) {
        if let Err(e) = Self::draw(frame, detections) {
            tracing::warn!("Failed to draw detections: {}", e);
        }
    }
}
