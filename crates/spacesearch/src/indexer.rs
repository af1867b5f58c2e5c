//! Turns storage changes into index mutations

use std::sync::Arc;

use async_trait::async_trait;
use spacesearch_core::{Reference, Resource, ResourceId, SpaceId};
use tracing::{debug, info};

use crate::engine::Engine;
use crate::error::{IndexError, IndexResult};

/// Index maintenance driven by change events
#[async_trait]
pub trait SpaceIndexer: Send + Sync {
    /// Re-read every resource of the space and write it to the index
    async fn index_space(&self, space: &SpaceId) -> IndexResult<()>;

    async fn trash_item(&self, id: &ResourceId) -> IndexResult<()>;

    async fn purge_item(&self, reference: &Reference) -> IndexResult<()>;

    /// Remove every soft-deleted document of the space
    async fn purge_deleted(&self, space: &SpaceId) -> IndexResult<()>;

    async fn move_item(&self, reference: &Reference) -> IndexResult<()>;

    async fn restore_item(&self, reference: &Reference) -> IndexResult<()>;

    async fn upsert_item(&self, reference: &Reference) -> IndexResult<()>;
}

/// Read access to the storage the index mirrors
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    /// Current state of the referenced resource, `None` when it no longer exists
    async fn stat(&self, reference: &Reference) -> IndexResult<Option<Resource>>;

    /// Every resource of the space, the space root included
    async fn list_space(&self, space: &SpaceId) -> IndexResult<Vec<Resource>>;
}

/// [`SpaceIndexer`] writing through an [`Engine`]
pub struct IndexService<E> {
    engine: E,
    provider: Arc<dyn ResourceProvider>,
    batch_size: usize,
}

impl<E: Engine> IndexService<E> {
    pub fn new(engine: E, provider: Arc<dyn ResourceProvider>, batch_size: usize) -> IndexResult<Self> {
        if batch_size == 0 {
            return Err(IndexError::InvalidBatchSize);
        }
        Ok(Self {
            engine,
            provider,
            batch_size,
        })
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn provider(&self) -> &Arc<dyn ResourceProvider> {
        &self.provider
    }

    /// Stat `reference`; a resource that vanished in the meantime is skipped
    async fn current(&self, reference: &Reference) -> IndexResult<Option<Resource>> {
        let resource = self.provider.stat(reference).await?;
        if resource.is_none() {
            debug!(reference = %reference, "resource no longer exists, skipping");
        }
        Ok(resource)
    }
}

#[async_trait]
impl<E: Engine> SpaceIndexer for IndexService<E> {
    async fn index_space(&self, space: &SpaceId) -> IndexResult<()> {
        let resources = self.provider.list_space(space).await?;
        let total = resources.len();

        let batch = self.engine.new_batch(self.batch_size).await?;
        for resource in resources {
            let id = resource.id.clone();
            batch.upsert(&id, resource).await?;
        }
        batch.push().await?;

        info!(space_id = %space, resources = total, "indexed space");
        let count = self.engine.doc_count().await?;
        debug!(space_id = %space, doc_count = count, "index document count");
        Ok(())
    }

    async fn trash_item(&self, id: &ResourceId) -> IndexResult<()> {
        self.engine.delete(&id.to_string()).await
    }

    async fn purge_item(&self, reference: &Reference) -> IndexResult<()> {
        self.engine
            .purge(&reference.resource_id.to_string(), false)
            .await
    }

    async fn purge_deleted(&self, space: &SpaceId) -> IndexResult<()> {
        self.engine.purge(&space.root_id().to_string(), true).await
    }

    async fn move_item(&self, reference: &Reference) -> IndexResult<()> {
        match self.current(reference).await? {
            Some(resource) => {
                self.engine
                    .move_to(&resource.id, &resource.parent_id, &resource.path)
                    .await
            }
            None => Ok(()),
        }
    }

    async fn restore_item(&self, reference: &Reference) -> IndexResult<()> {
        let resource = match self.current(reference).await? {
            Some(resource) => resource,
            None => return Ok(()),
        };
        // restored items may come back somewhere other than where they were trashed
        let batch = self.engine.new_batch(self.batch_size).await?;
        batch.restore(&resource.id).await?;
        batch
            .move_to(&resource.id, &resource.parent_id, &resource.path)
            .await?;
        batch.push().await
    }

    async fn upsert_item(&self, reference: &Reference) -> IndexResult<()> {
        match self.current(reference).await? {
            Some(resource) => {
                let id = resource.id.clone();
                self.engine.upsert(&id, resource).await
            }
            None => Ok(()),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::embedded::EmbeddedBackend;
    use parking_lot::Mutex;
    use spacesearch_core::{ResourceType, SearchRequest};
    use std::collections::HashMap;
    use tempfile::tempdir;

    /// Storage stand-in keyed by resource id
    #[derive(Default)]
    pub(crate) struct MemoryProvider {
        resources: Mutex<HashMap<String, Resource>>,
    }

    impl MemoryProvider {
        pub(crate) fn put(&self, resource: Resource) {
            self.resources.lock().insert(resource.id.clone(), resource);
        }

        pub(crate) fn remove(&self, id: &str) {
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
            let mut resources: Vec<_> = self
                .resources
                .lock()
                .values()
                .filter(|resource| resource.root_id == root)
                .cloned()
                .collect();
            resources.sort_by(|a, b| a.path.cmp(&b.path));
            Ok(resources)
        }
    }

    pub(crate) fn resource(opaque: &str, path: &str, resource_type: ResourceType) -> Resource {
        let mut resource = Resource {
            id: format!("st$sp!{}", opaque),
            root_id: "st$sp!sp".into(),
            parent_id: "st$sp!sp".into(),
            resource_type,
            ..Default::default()
        };
        resource.relocate(path);
        resource
    }

    fn reference(opaque: &str) -> Reference {
        Reference::new(ResourceId::new("st", "sp", opaque), ".")
    }

    async fn service() -> (tempfile::TempDir, Arc<MemoryProvider>, IndexService<EmbeddedBackend>) {
        let dir = tempdir().expect("tempdir");
        let engine = EmbeddedBackend::open(dir.path(), 15_000_000).unwrap();
        let provider = Arc::new(MemoryProvider::default());
        provider.put(resource("sp", "/", ResourceType::Container));
        provider.put(resource("docs", "/docs", ResourceType::Container));
        provider.put(resource("a", "/docs/a.txt", ResourceType::File));
        let service = IndexService::new(engine, provider.clone(), 2).unwrap();
        (dir, provider, service)
    }

    #[tokio::test]
    async fn test_index_space_writes_every_resource() {
        let (_dir, _provider, service) = service().await;
        service.index_space(&SpaceId::new("st", "sp")).await.unwrap();
        assert_eq!(service.engine().doc_count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_move_follows_storage() {
        let (_dir, provider, service) = service().await;
        service.index_space(&SpaceId::new("st", "sp")).await.unwrap();

        provider.put(resource("a", "/docs/b.txt", ResourceType::File));
        service.move_item(&reference("a")).await.unwrap();

        let response = service.engine().search(&SearchRequest::new("b.txt")).await.unwrap();
        assert_eq!(response.matches.len(), 1);
        assert_eq!(response.matches[0].entity.reference.path, "./docs/b.txt");
    }

    #[tokio::test]
    async fn test_vanished_resource_is_ignored() {
        let (_dir, provider, service) = service().await;
        provider.remove("st$sp!a");
        service.upsert_item(&reference("a")).await.unwrap();
        service.move_item(&reference("a")).await.unwrap();
        assert_eq!(service.engine().doc_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_trash_restore_and_purge() {
        let (_dir, _provider, service) = service().await;
        let space = SpaceId::new("st", "sp");
        service.index_space(&space).await.unwrap();

        service
            .trash_item(&ResourceId::new("st", "sp", "docs"))
            .await
            .unwrap();
        assert_eq!(service.engine().doc_count().await.unwrap(), 1);

        service.restore_item(&reference("docs")).await.unwrap();
        assert_eq!(service.engine().doc_count().await.unwrap(), 3);

        service
            .trash_item(&ResourceId::new("st", "sp", "a"))
            .await
            .unwrap();
        service.purge_deleted(&space).await.unwrap();
        let index = service.engine().index();
        assert!(index.resource_by_id("st$sp!a").unwrap_err().is_not_found());
        assert!(index.resource_by_id("st$sp!docs").is_ok());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let dir = tempdir().expect("tempdir");
        let engine = EmbeddedBackend::open(dir.path(), 15_000_000).unwrap();
        let result = IndexService::new(engine, Arc::new(MemoryProvider::default()), 0);
        assert!(matches!(result, Err(IndexError::InvalidBatchSize)));
    }
}
