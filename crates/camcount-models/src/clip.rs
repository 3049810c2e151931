//! Fetched clip models.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::camera::CameraDescriptor;

/// Outcome of fetching one camera at one timestamp.
///
/// Built once by the fetcher and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipRecord {
    pub camera: CameraDescriptor,
    /// Absolute path of the stored clip; absent when the fetch failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_path: Option<PathBuf>,
    /// Nanoseconds since the Unix epoch
    pub fetch_timestamp: i64,
    /// Why the fetch failed, if it did
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch_error: Option<String>,
}

impl ClipRecord {
    pub fn fetched(camera: CameraDescriptor, fetch_timestamp: i64, local_path: PathBuf) -> Self {
        Self {
            camera,
            local_path: Some(local_path),
            fetch_timestamp,
            fetch_error: None,
        }
    }

    pub fn failed(camera: CameraDescriptor, fetch_timestamp: i64, error: impl Into<String>) -> Self {
        Self {
            camera,
            local_path: None,
            fetch_timestamp,
            fetch_error: Some(error.into()),
        }
    }

    /// One failed record per camera, sharing a reason.
    pub fn all_failed(cameras: &[CameraDescriptor], fetch_timestamp: i64, reason: &str) -> Vec<Self> {
        cameras
            .iter()
            .map(|camera| Self::failed(camera.clone(), fetch_timestamp, reason))
            .collect()
    }

    pub fn group_id(&self) -> &str {
        &self.camera.group_id
    }

    pub fn camera_id(&self) -> &str {
        &self.camera.camera_id
    }

    pub fn local_path(&self) -> Option<&Path> {
        self.local_path.as_deref()
    }

    pub fn is_fetched(&self) -> bool {
        self.local_path.is_some()
    }
}

/// Timestamp shared by every fetch of one download run.
pub fn fetch_timestamp_now() -> i64 {
    let now = Utc::now();
    now.timestamp_nanos_opt()
        .unwrap_or_else(|| now.timestamp_micros().saturating_mul(1000))
}

/// Clips of one download run, keyed by group id.
///
/// Only constructed after every fetch task has joined.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupSnapshot {
    groups: BTreeMap<String, Vec<ClipRecord>>,
}

impl GroupSnapshot {
    pub fn from_groups(groups: BTreeMap<String, Vec<ClipRecord>>) -> Self {
        Self { groups }
    }

    pub fn get(&self, group_id: &str) -> Option<&[ClipRecord]> {
        self.groups.get(group_id).map(Vec::as_slice)
    }

    /// Snapshot restricted to one group, or `None` if unknown.
    pub fn select(&self, group_id: &str) -> Option<Self> {
        self.groups.get(group_id).map(|clips| {
            let mut groups = BTreeMap::new();
            groups.insert(group_id.to_string(), clips.clone());
            Self { groups }
        })
    }

    pub fn groups(&self) -> impl Iterator<Item = (&String, &Vec<ClipRecord>)> {
        self.groups.iter()
    }

    /// Every clip, flattened across groups in group order.
    pub fn clips(&self) -> impl Iterator<Item = &ClipRecord> {
        self.groups.values().flatten()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn clip_count(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    pub fn fetched_count(&self) -> usize {
        self.clips().filter(|c| c.is_fetched()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera(group: &str, id: &str) -> CameraDescriptor {
        CameraDescriptor::new(group, id, format!("Camera {}", id), "http://cams.local/x")
    }

    fn snapshot() -> GroupSnapshot {
        let mut groups = BTreeMap::new();
        groups.insert(
            "1".to_string(),
            vec![
                ClipRecord::fetched(camera("1", "a"), 10, PathBuf::from("/data/1_a_10.mp4")),
                ClipRecord::failed(camera("1", "b"), 10, "HTTP 404"),
            ],
        );
        groups.insert(
            "2".to_string(),
            vec![ClipRecord::fetched(camera("2", "c"), 10, PathBuf::from("/data/2_c_10.mp4"))],
        );
        GroupSnapshot::from_groups(groups)
    }

    #[test]
    fn test_counts() {
        let snapshot = snapshot();
        assert_eq!(snapshot.group_count(), 2);
        assert_eq!(snapshot.clip_count(), 3);
        assert_eq!(snapshot.fetched_count(), 2);
    }

    #[test]
    fn test_flattened_order() {
        let ids: Vec<_> = snapshot().clips().map(|c| c.camera_id().to_string()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_select() {
        let snapshot = snapshot();
        let selected = snapshot.select("2").unwrap();
        assert_eq!(selected.group_count(), 1);
        assert_eq!(selected.get("2").unwrap()[0].camera_id(), "c");
        assert!(snapshot.select("9").is_none());
    }

    #[test]
    fn test_all_failed_keeps_one_record_per_camera() {
        let cameras = vec![camera("1", "a"), camera("1", "b")];
        let records = ClipRecord::all_failed(&cameras, 5, "group task panicked");

        assert_eq!(records.len(), 2);
        assert_eq!(records[1].camera_id(), "b");
        assert!(records.iter().all(|r| !r.is_fetched()));
        assert!(ClipRecord::all_failed(&[], 5, "x").is_empty());
    }

    #[test]
    fn test_failed_record() {
        let record = ClipRecord::failed(camera("1", "a"), 1, "timeout");
        assert!(!record.is_fetched());
        assert_eq!(record.fetch_error.as_deref(), Some("timeout"));
    }

    #[test]
    fn test_fetch_timestamp_is_nanoseconds() {
        // Anything after 2001 in nanoseconds has at least 19 digits.
        assert!(fetch_timestamp_now() > 1_000_000_000_000_000_000);
    }
}
