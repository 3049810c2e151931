//! Drawing detections onto frames.
//!
//! Rendering itself lives in [`crate::opencv_backend::OpencvAnnotator`];
//! this module holds the trait and the geometry shared by annotators.

use std::sync::Arc;

use image::{Rgb, RgbImage};

use crate::detector::ObjectDetection;

/// Box colour for vehicles.
pub const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
/// Box outline thickness in pixels.
pub const BOX_THICKNESS: u32 = 2;

/// Draws detections onto a frame in place.
pub trait Annotate: Send + Sync {
    fn annotate(&self, frame: &mut RgbImage, detections: &[ObjectDetection]);
}

/// Annotator used when none is configured, if the build has one.
#[cfg(feature = "opencv")]
pub fn default_annotator() -> Option<Arc<dyn Annotate>> {
    Some(Arc::new(crate::opencv_backend::OpencvAnnotator))
}

/// Builds without OpenCV have no text renderer and leave frames as decoded.
#[cfg(not(feature = "opencv"))]
pub fn default_annotator() -> Option<Arc<dyn Annotate>> {
    None
}

/// Inclusive pixel rectangle inside a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PixelRect {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl PixelRect {
    /// Clip a detection box to the frame, or `None` if nothing is visible.
    pub(crate) fn clip(detection: &ObjectDetection, width: u32, height: u32) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        let max_x = (width - 1) as f32;
        let max_y = (height - 1) as f32;

        let x0 = detection.x.max(0.0);
        let y0 = detection.y.max(0.0);
        let x1 = (detection.x + detection.width).min(max_x);
        let y1 = (detection.y + detection.height).min(max_y);
        if !(x0 <= x1 && y0 <= y1) || x0 > max_x || y0 > max_y {
            return None;
        }

        Some(Self {
            x0: x0 as u32,
            y0: y0 as u32,
            x1: x1 as u32,
            y1: y1 as u32,
        })
    }

    pub(crate) fn width(&self) -> u32 {
        self.x1 - self.x0 + 1
    }

    pub(crate) fn height(&self) -> u32 {
        self.y1 - self.y0 + 1
    }
}
