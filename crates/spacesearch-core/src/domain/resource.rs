//! The indexed resource model
//!
//! A [`Resource`] is what both backends store per document: structural
//! fields (ids, path, type, flags) plus a flattened [`Document`] payload.
//! The serialized JSON form is the stored source of a document.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::path::{base_name, normalize_path};

/// Kind of a storage resource
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    #[default]
    File,
    Container,
    Symlink,
    Reference,
}

impl ResourceType {
    /// Value stored in the `resource_type` index field
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::File => "file",
            ResourceType::Container => "container",
            ResourceType::Symlink => "symlink",
            ResourceType::Reference => "reference",
        }
    }

    /// Parse the user-facing `type:` query value
    pub fn from_query_value(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "file" => Some(ResourceType::File),
            "folder" | "container" | "directory" => Some(ResourceType::Container),
            _ => None,
        }
    }
}

/// A single indexed resource
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Textual resource id, also the document key
    pub id: String,
    /// Textual id of the space root this resource lives in
    pub root_id: String,
    /// Normalized path relative to the space root
    pub path: String,
    #[serde(default)]
    pub parent_id: String,
    #[serde(default)]
    pub resource_type: ResourceType,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub hidden: bool,
    #[serde(flatten)]
    pub document: Document,
}

impl Resource {
    pub fn is_container(&self) -> bool {
        self.resource_type == ResourceType::Container
    }

    /// Place the resource at `path`, keeping the name in sync with the last segment
    pub fn relocate(&mut self, path: &str) {
        self.path = normalize_path(path);
        self.document.name = base_name(&self.path).to_string();
    }
}

/// Content payload of a resource
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Document {
    pub name: String,
    pub title: String,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtime: Option<DateTime<Utc>>,
    pub mime_type: String,
    pub content: String,
    pub tags: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<Audio>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<Image>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoCoordinates>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo: Option<Photo>,
}

impl Document {
    pub fn is_audio(&self) -> bool {
        self.mime_type.starts_with("audio/")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Audio {
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub artist: Option<String>,
    pub bitrate: Option<i64>,
    pub composers: Option<String>,
    pub copyright: Option<String>,
    pub disc: Option<i32>,
    pub disc_count: Option<i32>,
    /// Duration in milliseconds
    pub duration: Option<i64>,
    pub genre: Option<String>,
    pub has_drm: Option<bool>,
    pub is_variable_bitrate: Option<bool>,
    pub title: Option<String>,
    pub track: Option<i32>,
    pub track_count: Option<i32>,
    pub year: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Image {
    pub width: Option<i32>,
    pub height: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoCoordinates {
    pub altitude: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Photo {
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub exposure_denominator: Option<f64>,
    pub exposure_numerator: Option<f64>,
    pub f_number: Option<f64>,
    pub focal_length: Option<f64>,
    pub iso: Option<i32>,
    pub orientation: Option<i32>,
    pub taken_date_time: Option<DateTime<Utc>>,
}
