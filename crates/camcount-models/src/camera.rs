//! Camera registry models.
//!
//! The registry is a static JSON document grouping cameras under a group id:
//!
//! ```json
//! { "1": [ { "name": "North gate", "camera": "cam-7", "url": "http://..." } ] }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ModelError, ModelResult};
use crate::manifest::is_path_component;

/// One camera, as declared in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraDescriptor {
    /// Group the camera is reported under
    #[serde(skip)]
    pub group_id: String,
    /// Camera identifier used in file names
    #[serde(rename = "camera", deserialize_with = "string_or_number")]
    pub camera_id: String,
    /// Human readable name
    #[serde(rename = "name")]
    pub display_name: String,
    /// Clip endpoint, queried with `?time=<timestamp>`
    #[serde(rename = "url")]
    pub fetch_url: String,
}

impl CameraDescriptor {
    pub fn new(
        group_id: impl Into<String>,
        camera_id: impl Into<String>,
        display_name: impl Into<String>,
        fetch_url: impl Into<String>,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            camera_id: camera_id.into(),
            display_name: display_name.into(),
            fetch_url: fetch_url.into(),
        }
    }

    /// Deterministic clip file name for a fetch at `timestamp`.
    pub fn clip_file_name(&self, timestamp: i64) -> String {
        format!("{}_{}_{}.mp4", self.group_id, self.camera_id, timestamp)
    }
}

/// Camera ids are free-form in the registry; accept strings and integers.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    struct IdVisitor;

    impl<'de> Visitor<'de> for IdVisitor {
        type Value = String;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a string or integer camera id")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<String, E> {
            Ok(v.to_string())
        }
    }

    deserializer.deserialize_any(IdVisitor)
}

/// Grouped camera list, loaded once from the registry file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CameraRegistry {
    groups: BTreeMap<String, Vec<CameraDescriptor>>,
}

impl CameraRegistry {
    /// Build a registry from already-constructed groups.
    pub fn from_groups(groups: BTreeMap<String, Vec<CameraDescriptor>>) -> Self {
        Self { groups }
    }

    /// Load the registry from a JSON file.
    ///
    /// A missing file, unparsable JSON, a missing field or an unusable URL all
    /// surface as a configuration error.
    pub fn load(path: impl AsRef<Path>) -> ModelResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ModelError::RegistryNotFound(path.to_path_buf())
            } else {
                ModelError::config(format!("cannot read {}: {}", path.display(), e))
            }
        })?;
        Self::from_json_str(&raw)
    }

    /// Parse the registry from its JSON text.
    ///
    /// Group and camera ids end up in file names, so path separators and
    /// dot segments are rejected.
    pub fn from_json_str(raw: &str) -> ModelResult<Self> {
        let parsed: BTreeMap<String, Vec<CameraDescriptor>> = serde_json::from_str(raw)
            .map_err(|e| ModelError::config(format!("malformed camera registry: {}", e)))?;

        let mut groups = BTreeMap::new();
        for (group_id, mut cameras) in parsed {
            if !is_path_component(&group_id) {
                return Err(ModelError::config(format!("invalid group id {:?}", group_id)));
            }
            for camera in &mut cameras {
                if !is_path_component(&camera.camera_id) {
                    return Err(ModelError::config(format!(
                        "invalid camera id {:?} in group {}",
                        camera.camera_id, group_id
                    )));
                }
                Url::parse(&camera.fetch_url).map_err(|e| {
                    ModelError::config(format!(
                        "camera {} in group {} has invalid url {:?}: {}",
                        camera.camera_id, group_id, camera.fetch_url, e
                    ))
                })?;
                camera.group_id = group_id.clone();
            }
            groups.insert(group_id, cameras);
        }

        Ok(Self { groups })
    }

    /// Registry restricted to a single group, or `None` if unknown.
    pub fn select(&self, group_id: &str) -> Option<Self> {
        self.cameras(group_id).map(|cameras| {
            let mut groups = BTreeMap::new();
            groups.insert(group_id.to_string(), cameras.to_vec());
            Self { groups }
        })
    }

    pub fn cameras(&self, group_id: &str) -> Option<&[CameraDescriptor]> {
        self.groups.get(group_id).map(Vec::as_slice)
    }

    pub fn groups(&self) -> impl Iterator<Item = (&String, &Vec<CameraDescriptor>)> {
        self.groups.iter()
    }

    pub fn group_ids(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn camera_count(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }
}
