//! Search request/response contract shared by every backend

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainResult;
use super::identity::{Reference, ResourceId};
use super::path::{is_within_scope, normalize_path};
use super::resource::{Audio, GeoCoordinates, Image, Photo, Resource, ResourceType};

/// Page size used when a request asks for `0` results
pub const DEFAULT_PAGE_SIZE: usize = 200;

/// Opening tag wrapped around highlighted terms
pub const HIGHLIGHT_PRE_TAG: &str = "<mark>";
/// Closing tag wrapped around highlighted terms
pub const HIGHLIGHT_POST_TAG: &str = "</mark>";

/// A search request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Query text in the query language, `scope:` already extracted
    pub query: String,
    /// Restrict results to this space root and path subtree
    pub reference: Option<Reference>,
    /// `-1` means as many as the backend allows, `0` the default page
    pub page_size: i32,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn with_reference(mut self, reference: Reference) -> Self {
        self.reference = Some(reference);
        self
    }

    pub fn with_page_size(mut self, page_size: i32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Resolve the requested page size against a backend limit.
    ///
    /// `None` means unbounded.
    pub fn resolved_page_size(&self, max: Option<usize>) -> Option<usize> {
        match self.page_size {
            size if size < 0 => max,
            0 => Some(DEFAULT_PAGE_SIZE),
            size => Some(max.map_or(size as usize, |max| (size as usize).min(max))),
        }
    }

    /// Whether a hit at `path` survives the request's path scope
    pub fn accepts_path(&self, path: &str) -> bool {
        match &self.reference {
            Some(reference) => is_within_scope(path, &normalize_path(&reference.path)),
            None => true,
        }
    }
}

/// Response of a search
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub matches: Vec<Match>,
    /// Backend hit count minus hits dropped by the path scope
    pub total_matches: i64,
}

impl SearchResponse {
    pub fn sort_by_score(&mut self) {
        self.matches.sort_by(|a, b| b.score.total_cmp(&a.score));
    }
}

/// A single search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub score: f32,
    pub entity: Entity,
}

/// The resource view carried by a match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Space root id plus the path below it
    pub reference: Reference,
    pub id: ResourceId,
    pub parent_id: Option<ResourceId>,
    pub name: String,
    pub size: u64,
    pub resource_type: ResourceType,
    pub mime_type: String,
    pub deleted: bool,
    pub tags: Vec<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub highlights: String,
    pub audio: Option<Audio>,
    pub image: Option<Image>,
    pub location: Option<GeoCoordinates>,
    pub photo: Option<Photo>,
}

impl Match {
    /// Build a match from a stored resource.
    ///
    /// The root id and own id must parse; an unparseable parent id is
    /// dropped. Audio metadata only surfaces for audio MIME types.
    pub fn from_resource(resource: Resource, score: f32, highlights: String) -> DomainResult<Self> {
        let root_id = resource.root_id.parse::<ResourceId>()?;
        let id = resource.id.parse::<ResourceId>()?;
        let parent_id = resource.parent_id.parse::<ResourceId>().ok();

        let document = resource.document;
        let audio = if document.is_audio() {
            document.audio.clone()
        } else {
            None
        };

        Ok(Self {
            score,
            entity: Entity {
                reference: Reference::new(root_id, resource.path),
                id,
                parent_id,
                name: document.name,
                size: document.size,
                resource_type: resource.resource_type,
                mime_type: document.mime_type,
                deleted: resource.deleted,
                tags: document.tags.into_iter().collect(),
                last_modified: document.mtime,
                highlights,
                audio,
                image: document.image,
                location: document.location,
                photo: document.photo,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Document;

    fn resource(mime_type: &str) -> Resource {
        Resource {
            id: "s$sp!f".to_string(),
            root_id: "s$sp!sp".to_string(),
            path: "./song.mp3".to_string(),
            parent_id: "s$sp!sp".to_string(),
            document: Document {
                name: "song.mp3".to_string(),
                mime_type: mime_type.to_string(),
                audio: Some(Audio {
                    artist: Some("someone".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_page_size_resolution() {
        let request = SearchRequest::new("x");
        assert_eq!(request.resolved_page_size(Some(1000)), Some(200));
        assert_eq!(request.clone().with_page_size(-1).resolved_page_size(Some(1000)), Some(1000));
        assert_eq!(request.clone().with_page_size(-1).resolved_page_size(None), None);
        assert_eq!(request.clone().with_page_size(5000).resolved_page_size(Some(1000)), Some(1000));
        assert_eq!(request.with_page_size(7).resolved_page_size(None), Some(7));
    }

    #[test]
    fn test_audio_only_for_audio_mime() {
        let hit = Match::from_resource(resource("audio/mpeg"), 1.0, String::new()).unwrap();
        assert!(hit.entity.audio.is_some());
        assert_eq!(hit.entity.reference.resource_id.to_string(), "s$sp!sp");

        let hit = Match::from_resource(resource("text/plain"), 1.0, String::new()).unwrap();
        assert!(hit.entity.audio.is_none());
    }

    #[test]
    fn test_bad_root_id_is_rejected() {
        let mut bad = resource("text/plain");
        bad.root_id = String::new();
        assert!(Match::from_resource(bad, 1.0, String::new()).is_err());
    }

    #[test]
    fn test_sort_by_score_descending() {
        let mut response = SearchResponse {
            matches: vec![
                Match::from_resource(resource("text/plain"), 0.5, String::new()).unwrap(),
                Match::from_resource(resource("text/plain"), 2.0, String::new()).unwrap(),
            ],
            total_matches: 2,
        };
        response.sort_by_score();
        assert_eq!(response.matches[0].score, 2.0);
    }
}
