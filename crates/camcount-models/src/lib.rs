//! Shared data models for the camera vehicle-count service.
//!
//! This crate provides Serde-serializable types for:
//! - The static camera registry (groups of camera descriptors)
//! - Fetched clips and the per-request group snapshot
//! - Detection results and typed per-clip failures
//! - The persisted request manifest

pub mod camera;
pub mod clip;
pub mod detection;
pub mod error;
pub mod manifest;

// Re-export common types
pub use camera::{CameraDescriptor, CameraRegistry};
pub use clip::{fetch_timestamp_now, ClipRecord, GroupSnapshot};
pub use detection::{ClipFailure, ClipFailureKind, DetectionResult};
pub use error::{ModelError, ModelResult};
pub use manifest::{ManifestEntry, RequestId, RequestManifest};
