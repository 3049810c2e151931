//! Request manifest models.
//!
//! A manifest is persisted as a single-key JSON object:
//!
//! ```json
//! { "1": [ { "name": "...", "camera": "...", "url": "...", "path": "...",
//!            "processed_video_path": "...", "number_vehicles": [0, 2, 1] } ] }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::de::Deserializer;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

use crate::detection::DetectionResult;
use crate::error::{ModelError, ModelResult};

/// Identifier of one processing request; also names its output directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Validate a request id for use as a path component.
    pub fn parse(s: impl Into<String>) -> ModelResult<Self> {
        let s = s.into();
        if !is_path_component(&s) {
            return Err(ModelError::config(format!("invalid request id {:?}", s)));
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name of the persisted manifest.
    pub fn manifest_file_name(&self) -> String {
        format!("{}.json", self.0)
    }
}

/// Usable verbatim as one file or directory name.
pub(crate) fn is_path_component(s: &str) -> bool {
    !(s.is_empty() || s == "." || s == ".." || s.contains(['/', '\\', '\0']))
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One processed clip as exposed to API callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub name: String,
    pub camera: String,
    pub url: String,
    /// Source clip as fetched
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    pub processed_video_path: PathBuf,
    pub number_vehicles: Vec<u32>,
}

impl From<&DetectionResult> for ManifestEntry {
    fn from(result: &DetectionResult) -> Self {
        let camera = &result.source.camera;
        Self {
            name: camera.display_name.clone(),
            camera: camera.camera_id.clone(),
            url: camera.fetch_url.clone(),
            path: result.source.local_path.clone(),
            processed_video_path: result.processed_path.clone(),
            number_vehicles: result.vehicle_counts.clone(),
        }
    }
}

/// Summary of one processing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestManifest {
    pub request_id: RequestId,
    pub entries: Vec<ManifestEntry>,
}

impl RequestManifest {
    pub fn new(request_id: RequestId, results: &[DetectionResult]) -> Self {
        Self {
            request_id,
            entries: results.iter().map(ManifestEntry::from).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_json_pretty(&self) -> ModelResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json_slice(raw: &[u8]) -> ModelResult<Self> {
        Ok(serde_json::from_slice(raw)?)
    }
}

impl Serialize for RequestManifest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(self.request_id.as_str(), &self.entries)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for RequestManifest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error;

        let map = BTreeMap::<String, Vec<ManifestEntry>>::deserialize(deserializer)?;
        if map.len() != 1 {
            return Err(D::Error::custom(format!(
                "manifest must have exactly one request id, found {}",
                map.len()
            )));
        }
        let (request_id, entries) = map
            .into_iter()
            .next()
            .ok_or_else(|| D::Error::custom("empty manifest"))?;
        let request_id = RequestId::parse(request_id).map_err(D::Error::custom)?;

        Ok(Self {
            request_id,
            entries,
        })
    }
}
