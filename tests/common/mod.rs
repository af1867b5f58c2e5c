//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use spacesearch::{EmbeddedBackend, IndexResult, ResourceProvider};
use spacesearch_core::{Reference, Resource, ResourceType, SpaceId};
use tempfile::TempDir;

pub const ROOT_ID: &str = "st$sp!sp";

/// Storage stand-in holding resources by id
#[derive(Default)]
pub struct MemoryProvider {
    resources: Mutex<HashMap<String, Resource>>,
}

impl MemoryProvider {
    pub fn put(&self, resource: Resource) {
        self.resources.lock().insert(resource.id.clone(), resource);
    }

    pub fn remove(&self, id: &str) {
        self.resources.lock().remove(id);
    }
}

#[async_trait]
impl ResourceProvider for MemoryProvider {
    async fn stat(&self, reference: &Reference) -> IndexResult<Option<Resource>> {
        Ok(self
            .resources
            .lock()
            .get(&reference.resource_id.to_string())
            .cloned())
    }

    async fn list_space(&self, space: &SpaceId) -> IndexResult<Vec<Resource>> {
        let root = space.root_id().to_string();
        Ok(self
            .resources
            .lock()
            .values()
            .filter(|resource| resource.root_id == root)
            .cloned()
            .collect())
    }
}

pub fn id(opaque: &str) -> String {
    format!("st$sp!{}", opaque)
}

pub fn resource(opaque: &str, path: &str, resource_type: ResourceType) -> Resource {
    let mut resource = Resource {
        id: id(opaque),
        root_id: ROOT_ID.into(),
        parent_id: ROOT_ID.into(),
        resource_type,
        ..Default::default()
    };
    resource.relocate(path);
    resource
}

pub fn folder(opaque: &str, path: &str) -> Resource {
    resource(opaque, path, ResourceType::Container)
}

pub fn file(opaque: &str, path: &str) -> Resource {
    resource(opaque, path, ResourceType::File)
}

/// A fresh embedded index in a temporary directory
pub fn embedded() -> (TempDir, Arc<EmbeddedBackend>) {
    let dir = tempfile::tempdir().expect("tempdir");
    let backend = EmbeddedBackend::open(dir.path(), 15_000_000).expect("open index");
    (dir, Arc::new(backend))
}
