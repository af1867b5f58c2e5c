//! Resource identity
//!
//! A resource is addressed by a storage id, the space it lives in and an
//! opaque id unique within that space. The textual form used as the index
//! document key is `storage$space!opaque`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::path::ROOT_PATH;

/// Separates the storage part from the opaque id
pub const ID_DELIMITER: char = '!';

/// Separates the storage id from the space id
pub const STORAGE_DELIMITER: char = '$';

/// Identity of a single resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceId {
    pub storage_id: String,
    pub space_id: String,
    pub opaque_id: String,
}

impl ResourceId {
    pub fn new(
        storage_id: impl Into<String>,
        space_id: impl Into<String>,
        opaque_id: impl Into<String>,
    ) -> Self {
        Self {
            storage_id: storage_id.into(),
            space_id: space_id.into(),
            opaque_id: opaque_id.into(),
        }
    }

    /// The space this resource belongs to
    pub fn space(&self) -> SpaceId {
        SpaceId::new(self.storage_id.clone(), self.space_id.clone())
    }

    /// True when this id addresses the root container of its space
    pub fn is_space_root(&self) -> bool {
        !self.space_id.is_empty() && self.opaque_id == self.space_id
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_storage(f, &self.storage_id, &self.space_id)?;
        if !self.opaque_id.is_empty() {
            write!(f, "{}{}", ID_DELIMITER, self.opaque_id)?;
        }
        Ok(())
    }
}

impl FromStr for ResourceId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(DomainError::InvalidResourceId(s.to_string()));
        }

        let (storage, opaque) = match s.split_once(ID_DELIMITER) {
            Some((storage, opaque)) => (storage, opaque),
            None => (s, ""),
        };
        let space = storage.parse::<SpaceId>()?;
        if opaque.contains(ID_DELIMITER) {
            return Err(DomainError::InvalidResourceId(s.to_string()));
        }

        Ok(Self {
            storage_id: space.storage_id,
            space_id: space.space_id,
            opaque_id: opaque.to_string(),
        })
    }
}

/// Identity of a space: the storage it is hosted on plus the space id
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SpaceId {
    pub storage_id: String,
    pub space_id: String,
}

impl SpaceId {
    pub fn new(storage_id: impl Into<String>, space_id: impl Into<String>) -> Self {
        Self {
            storage_id: storage_id.into(),
            space_id: space_id.into(),
        }
    }

    /// Id of the space root container; its opaque id equals the space id
    pub fn root_id(&self) -> ResourceId {
        ResourceId::new(
            self.storage_id.clone(),
            self.space_id.clone(),
            self.space_id.clone(),
        )
    }

    /// Reference to the root of the space
    pub fn root_reference(&self) -> Reference {
        Reference::new(self.root_id(), ROOT_PATH)
    }
}

impl fmt::Display for SpaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_storage(f, &self.storage_id, &self.space_id)
    }
}

impl FromStr for SpaceId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s.contains(ID_DELIMITER) {
            return Err(DomainError::InvalidResourceId(s.to_string()));
        }
        let id = match s.split_once(STORAGE_DELIMITER) {
            Some((storage, space)) => SpaceId::new(storage, space),
            None => SpaceId::new("", s),
        };
        if id.space_id.is_empty() || id.space_id.contains(STORAGE_DELIMITER) {
            return Err(DomainError::InvalidResourceId(s.to_string()));
        }
        Ok(id)
    }
}

fn write_storage(f: &mut fmt::Formatter<'_>, storage_id: &str, space_id: &str) -> fmt::Result {
    if storage_id.is_empty() {
        write!(f, "{}", space_id)
    } else {
        write!(f, "{}{}{}", storage_id, STORAGE_DELIMITER, space_id)
    }
}

/// A resource addressed relative to a resource id, usually a space root
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reference {
    pub resource_id: ResourceId,
    pub path: String,
}

impl Reference {
    pub fn new(resource_id: ResourceId, path: impl Into<String>) -> Self {
        Self {
            resource_id,
            path: path.into(),
        }
    }

    pub fn space(&self) -> SpaceId {
        self.resource_id.space()
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource_id, self.path)
    }
}
