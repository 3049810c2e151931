//! Vehicle detection with a YOLOv8 ONNX model.
//!
//! Execution provider selection:
//! - CUDA on Linux with NVIDIA GPU (when `cuda` feature enabled)
//! - CoreML on macOS
//! - CPU fallback on all platforms

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use image::{imageops::FilterType, RgbImage};
use ndarray::Array;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Tensor, Value};
use tracing::{debug, info};

use crate::error::{MediaError, MediaResult};

/// COCO class ids counted as vehicles: car, bus, truck.
pub const DEFAULT_VEHICLE_CLASSES: &[usize] = &[2, 5, 7];

/// COCO class names (80 classes).
pub const COCO_CLASSES: &[&str] = &[
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck",
    "boat", "traffic light", "fire hydrant", "stop sign", "parking meter", "bench",
    "bird", "cat", "dog", "horse", "sheep", "cow", "elephant", "bear", "zebra",
    "giraffe", "backpack", "umbrella", "handbag", "tie", "suitcase", "frisbee",
    "skis", "snowboard", "sports ball", "kite", "baseball bat", "baseball glove",
    "skateboard", "surfboard", "tennis racket", "bottle", "wine glass", "cup",
    "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
    "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
    "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse",
    "remote", "keyboard", "cell phone", "microwave", "oven", "toaster", "sink",
    "refrigerator", "book", "clock", "vase", "scissors", "teddy bear", "hair drier",
    "toothbrush",
];

/// One detected object, in pixel coordinates of the source frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectDetection {
    /// Top-left corner
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// COCO class id
    pub class_id: usize,
    /// Detection confidence [0, 1]
    pub confidence: f32,
}

impl ObjectDetection {
    pub fn class_name(&self) -> &'static str {
        COCO_CLASSES.get(self.class_id).copied().unwrap_or("object")
    }

    /// Text drawn next to the box, e.g. `car 0.87`.
    pub fn label(&self) -> String {
        format!("{} {:.2}", self.class_name(), self.confidence)
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    fn iou(&self, other: &ObjectDetection) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union = self.area() + other.area() - intersection;

        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }
}

/// Per-frame object detection capability.
///
/// Implementations are shared between concurrently processed clips and must
/// serialize access to any non-reentrant state themselves.
pub trait ObjectDetect: Send + Sync {
    fn detect(&self, frame: &RgbImage) -> MediaResult<Vec<ObjectDetection>>;
}

/// Detector configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorSettings {
    /// Path to the ONNX model file
    pub model_path: PathBuf,
    /// Where to download the model from when it is missing
    pub model_url: Option<String>,
    pub confidence_threshold: f32,
    /// IoU threshold for NMS
    pub nms_threshold: f32,
    /// Square model input size
    pub input_size: u32,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/object_detection/yolov8n.onnx"),
            model_url: None,
            confidence_threshold: 0.25,
            nms_threshold: 0.45,
            input_size: 640,
        }
    }
}

impl DetectorSettings {
    /// Create settings from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            model_path: std::env::var("MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_path),
            model_url: std::env::var("MODEL_URL").ok().filter(|s| !s.is_empty()),
            confidence_threshold: std::env::var("DETECTION_CONFIDENCE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.confidence_threshold),
            nms_threshold: std::env::var("DETECTION_NMS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.nms_threshold),
            input_size: std::env::var("DETECTION_INPUT_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.input_size),
        }
    }
}

/// YOLOv8 detector running on ONNX Runtime.
///
/// Inference is serialized through the session mutex; one instance can be
/// shared by every clip task.
pub struct OnnxObjectDetector {
    session: Mutex<Session>,
    settings: DetectorSettings,
}

impl OnnxObjectDetector {
    /// Load the model named by `settings`.
    pub fn new(settings: DetectorSettings) -> MediaResult<Self> {
        if !settings.model_path.exists() {
            return Err(MediaError::model_not_found(
                settings.model_path.display().to_string(),
            ));
        }

        let session = Mutex::new(create_session(&settings.model_path)?);
        info!(
            model_path = %settings.model_path.display(),
            input_size = settings.input_size,
            "Vehicle detector initialized"
        );

        Ok(Self { session, settings })
    }

    /// Resize to the model input and lay out as normalized NCHW.
    fn preprocess(&self, frame: &RgbImage) -> MediaResult<Value> {
        let size = self.settings.input_size;
        let resized = image::imageops::resize(frame, size, size, FilterType::Triangle);

        let plane = (size * size) as usize;
        let mut chw = vec![0f32; 3 * plane];
        for (i, pixel) in resized.pixels().enumerate() {
            chw[i] = pixel[0] as f32 / 255.0;
            chw[plane + i] = pixel[1] as f32 / 255.0;
            chw[2 * plane + i] = pixel[2] as f32 / 255.0;
        }

        let shape = vec![1usize, 3, size as usize, size as usize];
        Tensor::from_array((shape, chw.into_boxed_slice()))
            .map(Value::from)
            .map_err(|e| MediaError::detection(format!("failed to create tensor: {}", e)))
    }

    fn run_inference(&self, input: Value) -> MediaResult<Vec<f32>> {
        let mut session = self
            .session
            .lock()
            .map_err(|_| MediaError::internal("Session lock poisoned"))?;

        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| MediaError::detection(format!("ONNX inference failed: {}", e)))?;

        // YOLOv8 output is [1, 84, candidates]
        let output = outputs
            .get("output0")
            .ok_or_else(|| MediaError::detection("missing output0 tensor"))?;

        let tensor = output
            .try_extract_tensor::<f32>()
            .map_err(|e| MediaError::detection(format!("failed to extract tensor: {}", e)))?;

        Ok(tensor.1.to_vec())
    }
}

impl ObjectDetect for OnnxObjectDetector {
    fn detect(&self, frame: &RgbImage) -> MediaResult<Vec<ObjectDetection>> {
        let input = self.preprocess(frame)?;
        let raw = self.run_inference(input)?;
        let (width, height) = frame.dimensions();
        let detections = decode_yolo_output(
            &raw,
            width,
            height,
            &self.settings,
        )?;
        debug!(count = detections.len(), "Frame inference completed");
        Ok(detections)
    }
}

/// Turn raw YOLOv8 output into frame-space detections.
///
/// Layout is `[84, candidates]`: 4 box values (cx, cy, w, h in model input
/// pixels) followed by 80 class scores.
fn decode_yolo_output(
    outputs: &[f32],
    frame_width: u32,
    frame_height: u32,
    settings: &DetectorSettings,
) -> MediaResult<Vec<ObjectDetection>> {
    let num_classes = COCO_CLASSES.len();
    let num_features = 4 + num_classes;

    if outputs.is_empty() || outputs.len() % num_features != 0 {
        return Err(MediaError::detection(format!(
            "unexpected output size {} (not a multiple of {})",
            outputs.len(),
            num_features
        )));
    }
    let num_boxes = outputs.len() / num_features;

    let grid = Array::from_shape_vec((num_features, num_boxes), outputs.to_vec())
        .map_err(|e| MediaError::detection(format!("failed to reshape output: {}", e)))?;
    let rows = grid.t();

    let input_size = settings.input_size as f32;
    let scale_w = frame_width as f32 / input_size;
    let scale_h = frame_height as f32 / input_size;
    let (fw, fh) = (frame_width as f32, frame_height as f32);

    let mut candidates = Vec::new();
    for i in 0..num_boxes {
        let (best_class, best_score) = (0..num_classes)
            .map(|c| (c, rows[[i, 4 + c]]))
            .fold((0, 0.0f32), |best, cur| if cur.1 > best.1 { cur } else { best });

        if best_score < settings.confidence_threshold {
            continue;
        }

        let (cx, cy, w, h) = (rows[[i, 0]], rows[[i, 1]], rows[[i, 2]], rows[[i, 3]]);
        let x = ((cx - w / 2.0) * scale_w).clamp(0.0, fw);
        let y = ((cy - h / 2.0) * scale_h).clamp(0.0, fh);

        candidates.push(ObjectDetection {
            x,
            y,
            width: (w * scale_w).min(fw - x),
            height: (h * scale_h).min(fh - y),
            class_id: best_class,
            confidence: best_score,
        });
    }

    Ok(non_maximum_suppression(candidates, settings.nms_threshold))
}

/// Per-class NMS, highest confidence first.
pub fn non_maximum_suppression(
    mut detections: Vec<ObjectDetection>,
    iou_threshold: f32,
) -> Vec<ObjectDetection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<ObjectDetection> = Vec::new();
    for candidate in detections {
        let overlaps = keep
            .iter()
            .any(|k| k.class_id == candidate.class_id && k.iou(&candidate) > iou_threshold);
        if !overlaps {
            keep.push(candidate);
        }
    }
    keep
}

/// Create ONNX Runtime session with automatic execution provider selection.
fn create_session(model_path: &Path) -> MediaResult<Session> {
    let model_bytes = std::fs::read(model_path)
        .map_err(|e| MediaError::internal(format!("Failed to read model file: {}", e)))?;

    let builder = Session::builder()
        .map_err(|e| MediaError::internal(format!("Failed to create session builder: {}", e)))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| MediaError::internal(format!("Failed to set optimization level: {}", e)))?;

    #[cfg(all(target_os = "linux", feature = "cuda"))]
    {
        use ort::execution_providers::CUDAExecutionProvider;
        if let Ok(cuda_builder) = builder
            .clone()
            .with_execution_providers([CUDAExecutionProvider::default().build()])
        {
            if let Ok(session) = cuda_builder.commit_from_memory(&model_bytes) {
                info!("Using CUDA execution provider for vehicle detection");
                return Ok(session);
            }
        }
        debug!("CUDA execution provider not available, trying alternatives");
    }

    #[cfg(target_os = "macos")]
    {
        use ort::execution_providers::CoreMLExecutionProvider;
        if let Ok(coreml_builder) = builder
            .clone()
            .with_execution_providers([CoreMLExecutionProvider::default().build()])
        {
            if let Ok(session) = coreml_builder.commit_from_memory(&model_bytes) {
                info!("Using CoreML execution provider for vehicle detection");
                return Ok(session);
            }
        }
        debug!("CoreML execution provider not available, using CPU");
    }

    info!("Using CPU execution provider for vehicle detection");
    builder
        .commit_from_memory(&model_bytes)
        .map_err(|e| MediaError::internal(format!("Failed to load ONNX model: {}", e)))
}
