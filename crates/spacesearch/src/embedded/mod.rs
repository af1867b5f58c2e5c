//! Embedded, file-system resident backend built on tantivy
//!
//! Subtree operations are executed client-side: the root document is
//! loaded, its descendants are found with a path-prefix query and every
//! affected document is rewritten or removed in one commit.

pub mod index;
pub mod query;
pub mod schema;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use spacesearch_core::{
    normalize_path, replace_path_prefix, QueryAst, QueryCompiler, Resource, SearchRequest,
    SearchResponse,
};
use tracing::debug;

use crate::batch::{BatchExecutor, Cascade, CascadeAction, StagedBatch};
use crate::engine::{collect_matches, BatchOperator, Engine};
use crate::error::IndexResult;

pub use index::{EmbeddedIndex, IndexWrite, INDEX_DIR};
pub use query::TantivyQueryCompiler;
pub use schema::ResourceSchema;

/// Search engine over an [`EmbeddedIndex`]
#[derive(Clone)]
pub struct EmbeddedBackend {
    index: Arc<EmbeddedIndex>,
}

impl EmbeddedBackend {
    /// Open the index below `data_path`, creating it when missing
    pub fn open<P: AsRef<Path>>(data_path: P, heap_bytes: usize) -> IndexResult<Self> {
        let index = EmbeddedIndex::open_or_create(data_path, heap_bytes)?;
        Ok(Self {
            index: Arc::new(index),
        })
    }

    pub fn index(&self) -> &EmbeddedIndex {
        &self.index
    }
}

/// Run index work off the async runtime
async fn blocking<T, F>(index: &Arc<EmbeddedIndex>, work: F) -> IndexResult<T>
where
    T: Send + 'static,
    F: FnOnce(&EmbeddedIndex) -> IndexResult<T> + Send + 'static,
{
    let index = Arc::clone(index);
    tokio::task::spawn_blocking(move || work(&index)).await?
}

#[async_trait]
impl Engine for EmbeddedBackend {
    async fn search(&self, request: &SearchRequest) -> IndexResult<SearchResponse> {
        let request = request.clone();
        blocking(&self.index, move |index| {
            let ast = QueryAst::parse(&request.query)?;
            let query = TantivyQueryCompiler::new(index).compile(&ast)?;
            let root_id = request
                .reference
                .as_ref()
                .map(|reference| reference.resource_id.to_string());

            let (hits, total) =
                index.search(query, root_id.as_deref(), request.resolved_page_size(None))?;
            collect_matches(
                &request,
                hits.into_iter()
                    .map(|hit| (hit.score, hit.resource, hit.highlights)),
                total as u64,
            )
        })
        .await
    }

    async fn doc_count(&self) -> IndexResult<u64> {
        blocking(&self.index, |index| index.live_count()).await
    }

    async fn new_batch(&self, size: usize) -> IndexResult<Box<dyn BatchOperator>> {
        let executor = EmbeddedExecutor {
            index: Arc::clone(&self.index),
        };
        Ok(Box::new(StagedBatch::new(executor, size)?))
    }
}

struct EmbeddedExecutor {
    index: Arc<EmbeddedIndex>,
}

#[async_trait]
impl BatchExecutor for EmbeddedExecutor {
    type Write = IndexWrite;

    fn prepare_upsert(&self, id: &str, mut resource: Resource) -> IndexResult<IndexWrite> {
        resource.id = id.to_string();
        resource.path = normalize_path(&resource.path);
        let document = self.index.schema().to_document(&resource)?;
        Ok(IndexWrite::Put {
            id: resource.id,
            document,
        })
    }

    async fn flush(&self, writes: Vec<IndexWrite>) -> IndexResult<()> {
        blocking(&self.index, move |index| index.apply(writes)).await
    }

    async fn apply(&self, cascade: Cascade) -> IndexResult<()> {
        blocking(&self.index, move |index| apply_cascade(index, cascade)).await
    }
}

fn apply_cascade(index: &EmbeddedIndex, cascade: Cascade) -> IndexResult<()> {
    let root = index.resource_by_id(&cascade.id)?;
    let descendants = if root.is_container() {
        index.descendants(&root.root_id, &root.path)?
    } else {
        Vec::new()
    };
    debug!(
        id = %cascade.id,
        action = ?cascade.action,
        descendants = descendants.len(),
        "applying subtree operation"
    );

    let writes = match cascade.action {
        CascadeAction::Move {
            parent_id,
            location,
        } => {
            let old_path = root.path.clone();
            let mut moved = root;
            moved.parent_id = parent_id;
            moved.relocate(&location);
            let new_path = moved.path.clone();

            let mut resources = vec![moved];
            for mut descendant in descendants {
                if let Some(path) = replace_path_prefix(&descendant.path, &old_path, &new_path) {
                    descendant.path = path;
                }
                resources.push(descendant);
            }
            put_all(index, resources)?
        }
        CascadeAction::SetDeleted(deleted) => {
            let resources = std::iter::once(root)
                .chain(descendants)
                .map(|mut resource| {
                    resource.deleted = deleted;
                    resource
                })
                .collect();
            put_all(index, resources)?
        }
        CascadeAction::Purge { only_deleted } => std::iter::once(root)
            .chain(descendants)
            .filter(|resource| !only_deleted || resource.deleted)
            .map(|resource| IndexWrite::Remove { id: resource.id })
            .collect(),
    };

    index.apply(writes)
}

fn put_all(index: &EmbeddedIndex, resources: Vec<Resource>) -> IndexResult<Vec<IndexWrite>> {
    resources
        .into_iter()
        .map(|resource| {
            let document = index.schema().to_document(&resource)?;
            Ok(IndexWrite::Put {
                id: resource.id,
                document,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use spacesearch_core::{Reference, ResourceId, ResourceType};
    use tempfile::tempdir;

    const ROOT: &str = "s$sp!sp";

    fn resource(id: &str, path: &str, resource_type: ResourceType) -> Resource {
        let mut resource = Resource {
            id: format!("s$sp!{}", id),
            root_id: ROOT.into(),
            parent_id: ROOT.into(),
            resource_type,
            ..Default::default()
        };
        resource.relocate(path);
        resource
    }

    async fn seeded() -> (tempfile::TempDir, EmbeddedBackend) {
        let dir = tempdir().expect("tempdir");
        let backend = EmbeddedBackend::open(dir.path(), 15_000_000).unwrap();
        let batch = backend.new_batch(10).await.unwrap();
        for resource in [
            resource("sp", "/", ResourceType::Container),
            resource("a", "/a", ResourceType::Container),
            resource("f", "/a/f.txt", ResourceType::File),
            resource("g", "/a/sub/g.txt", ResourceType::File),
            resource("x", "/ab/x.txt", ResourceType::File),
        ] {
            batch.upsert(&resource.id.clone(), resource).await.unwrap();
        }
        batch.push().await.unwrap();
        (dir, backend)
    }

    #[tokio::test]
    async fn test_move_rewrites_subtree() {
        let (_dir, backend) = seeded().await;
        backend.move_to("s$sp!a", ROOT, "/c").await.unwrap();

        let index = backend.index();
        let moved = index.resource_by_id("s$sp!a").unwrap();
        assert_eq!(moved.path, "./c");
        assert_eq!(moved.document.name, "c");
        assert_eq!(index.resource_by_id("s$sp!f").unwrap().path, "./c/f.txt");
        assert_eq!(index.resource_by_id("s$sp!g").unwrap().path, "./c/sub/g.txt");
        assert_eq!(index.resource_by_id("s$sp!x").unwrap().path, "./ab/x.txt");
    }

    #[tokio::test]
    async fn test_delete_and_restore_cascade() {
        let (_dir, backend) = seeded().await;
        assert_eq!(backend.doc_count().await.unwrap(), 5);

        backend.delete("s$sp!a").await.unwrap();
        assert_eq!(backend.doc_count().await.unwrap(), 2);
        assert!(backend.index().resource_by_id("s$sp!g").unwrap().deleted);
        assert!(!backend.index().resource_by_id("s$sp!x").unwrap().deleted);

        backend.restore("s$sp!a").await.unwrap();
        assert_eq!(backend.doc_count().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_purge_only_deleted() {
        let (_dir, backend) = seeded().await;
        backend.delete("s$sp!f").await.unwrap();
        backend.purge(ROOT, true).await.unwrap();

        assert!(backend.index().resource_by_id("s$sp!f").unwrap_err().is_not_found());
        assert!(backend.index().resource_by_id("s$sp!g").is_ok());
        assert!(backend.index().resource_by_id(ROOT).is_ok());
    }

    #[tokio::test]
    async fn test_missing_root_is_not_found() {
        let (_dir, backend) = seeded().await;
        let err = backend.delete("s$sp!nope").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_search_scoped_to_reference() {
        let (_dir, backend) = seeded().await;
        let request = SearchRequest::new("txt")
            .with_reference(Reference::new(ResourceId::new("s", "sp", "sp"), "./a"));
        let response = backend.search(&request).await.unwrap();

        let mut paths: Vec<_> = response
            .matches
            .iter()
            .map(|m| m.entity.reference.path.clone())
            .collect();
        paths.sort();
        assert_eq!(paths, vec!["./a/f.txt", "./a/sub/g.txt"]);
        assert_eq!(response.total_matches, 2);
    }

    #[tokio::test]
    async fn test_invalid_query_is_validation_error() {
        let (_dir, backend) = seeded().await;
        let err = backend
            .search(&SearchRequest::new("\"unterminated"))
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }
}
