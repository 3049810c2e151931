//! Per-clip vehicle counting.
//!
//! A clip is streamed frame by frame through the detector. Every frame is
//! annotated and written to the working file; the per-second vehicle count is
//! sampled on the first frame of each second.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::annotate::{default_annotator, Annotate};
use crate::detector::{ObjectDetect, DEFAULT_VEHICLE_CLASSES};
use crate::error::{MediaError, MediaResult};
use crate::frames::{FrameBackend, FrameSink};

/// Detection pipeline for single clips, shared across clip tasks.
#[derive(Clone)]
pub struct DetectionEngine {
    backend: Arc<dyn FrameBackend>,
    detector: Arc<dyn ObjectDetect>,
    annotator: Option<Arc<dyn Annotate>>,
    vehicle_classes: Arc<[usize]>,
}

impl DetectionEngine {
    pub fn new(backend: Arc<dyn FrameBackend>, detector: Arc<dyn ObjectDetect>) -> Self {
        Self {
            backend,
            detector,
            annotator: default_annotator(),
            vehicle_classes: Arc::from(DEFAULT_VEHICLE_CLASSES),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_annotator(mut self, annotator: Arc<dyn Annotate>) -> Self {
        self.annotator = Some(annotator);
        self
    }

    pub fn with_vehicle_classes(mut self, classes: impl Into<Arc<[usize]>>) -> Self {
        self.vehicle_classes = classes.into();
        self
    }

    /// Whether frames get boxes and labels drawn before encoding.
    pub fn annotates(&self) -> bool {
        self.annotator.is_some()
    }

    /// Count vehicles in `local_path`, writing the annotated clip to
    /// `working_path`.
    ///
    /// Returns the working path and one count per second of footage
    /// (`frame_count / fps + 1` entries). If the returned future is dropped
    /// early, the blocking decode stops at the next frame and removes the
    /// working file.
    pub async fn detect(
        &self,
        local_path: &Path,
        working_path: &Path,
    ) -> MediaResult<(PathBuf, Vec<u32>)> {
        let engine = self.clone();
        let local = local_path.to_path_buf();
        let working = working_path.to_path_buf();
        let abandoned = AbandonOnDrop::default();
        let flag = abandoned.flag();

        let joined = tokio::task::spawn_blocking(move || {
            let result = engine.run_blocking(&local, &working, &flag);
            // Checked after the sink is finished so a late write is caught too
            if result.is_err() || flag.load(Ordering::Acquire) {
                let _ = std::fs::remove_file(&working);
            }
            result.map(|counts| (working, counts))
        })
        .await;

        match joined {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(MediaError::detection(format!("detection task cancelled: {}", e))),
        }
    }

    fn run_blocking(
        &self,
        local: &Path,
        working: &Path,
        abandoned: &AtomicBool,
    ) -> MediaResult<Vec<u32>> {
        let started = Instant::now();
        let (meta, mut source) = self.backend.open(local)?;

        let fps = u64::from(meta.whole_fps());
        let duration_secs = meta.frame_count / fps;
        let mut counts = vec![0u32; duration_secs as usize + 1];

        debug!(
            path = %local.display(),
            fps,
            frame_count = meta.frame_count,
            "Streaming clip through detector"
        );

        let mut sink: Option<Box<dyn FrameSink>> = None;
        let mut frame_index: u64 = 0;

        while let Some(mut frame) = source.next_frame().map_err(mid_stream)? {
            if abandoned.load(Ordering::Acquire) {
                return Err(MediaError::detection("caller stopped waiting for the clip"));
            }
            let vehicles: Vec<_> = self
                .detector
                .detect(&frame)
                .map_err(mid_stream)?
                .into_iter()
                .filter(|d| self.vehicle_classes.contains(&d.class_id))
                .collect();

            if frame_index % fps == 0 {
                // Containers sometimes under-report their frame count
                if let Some(slot) = counts.get_mut((frame_index / fps) as usize) {
                    *slot = vehicles.len() as u32;
                }
            }

            if let Some(annotator) = &self.annotator {
                annotator.annotate(&mut frame, &vehicles);
            }

            if sink.is_none() {
                let writer = self
                    .backend
                    .create_sink(working, meta.fps, frame.width(), frame.height())
                    .map_err(mid_stream)?;
                sink = Some(writer);
            }
            if let Some(writer) = sink.as_mut() {
                writer.write_frame(&frame).map_err(mid_stream)?;
            }
            frame_index += 1;
        }

        match sink {
            Some(writer) => writer.finish().map_err(mid_stream)?,
            None => return Err(MediaError::media_open(local, "no frames decoded")),
        }

        info!(
            path = %local.display(),
            frames = frame_index,
            seconds = counts.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Clip detection finished"
        );

        Ok(counts)
    }
}

/// Raises its flag when dropped, including when the owning future is.
#[derive(Default)]
struct AbandonOnDrop(Arc<AtomicBool>);

impl AbandonOnDrop {
    fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.0)
    }
}

impl Drop for AbandonOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

/// Anything failing after the clip opened is a detection failure.
fn mid_stream(e: MediaError) -> MediaError {
    match e {
        MediaError::Detection(_) => e,
        other => MediaError::detection(other.to_string()),
    }
}
