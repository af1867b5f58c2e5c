//! Engine and batch contracts
//!
//! An [`Engine`] answers searches and hands out [`BatchOperator`]s. Every
//! direct mutation on an engine is a batch of its own: the convenience
//! methods open a batch, stage the single call and push it.

use async_trait::async_trait;
use spacesearch_core::{Match, Resource, SearchRequest, SearchResponse};

use crate::error::IndexResult;

/// Size of the batches opened by the convenience mutation methods
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Stages mutations and applies them in submission order on push.
///
/// Staging an operation may trigger a push once the batch holds as many
/// operations as its configured size. Staged operations are discarded when
/// a push finishes, successfully or not.
#[async_trait]
pub trait BatchOperator: Send + Sync {
    /// Insert or replace the resource stored under `id`
    async fn upsert(&self, id: &str, resource: Resource) -> IndexResult<()>;

    /// Move the resource and its subtree to `location` below `parent_id`
    async fn move_to(&self, id: &str, parent_id: &str, location: &str) -> IndexResult<()>;

    /// Soft-delete the resource and its subtree
    async fn delete(&self, id: &str) -> IndexResult<()>;

    /// Undo a soft delete of the resource and its subtree
    async fn restore(&self, id: &str) -> IndexResult<()>;

    /// Remove the resource and its subtree; with `only_deleted` only soft-deleted documents go
    async fn purge(&self, id: &str, only_deleted: bool) -> IndexResult<()>;

    /// Apply everything staged so far
    async fn push(&self) -> IndexResult<()>;
}

/// A search index backend
#[async_trait]
pub trait Engine: Send + Sync {
    /// Run a query. Soft-deleted documents never match.
    async fn search(&self, request: &SearchRequest) -> IndexResult<SearchResponse>;

    /// Number of documents that are not soft-deleted
    async fn doc_count(&self) -> IndexResult<u64>;

    /// Open a batch that auto-pushes every `size` staged operations
    async fn new_batch(&self, size: usize) -> IndexResult<Box<dyn BatchOperator>>;

    async fn upsert(&self, id: &str, resource: Resource) -> IndexResult<()> {
        let batch = self.new_batch(DEFAULT_BATCH_SIZE).await?;
        batch.upsert(id, resource).await?;
        batch.push().await
    }

    async fn move_to(&self, id: &str, parent_id: &str, location: &str) -> IndexResult<()> {
        let batch = self.new_batch(DEFAULT_BATCH_SIZE).await?;
        batch.move_to(id, parent_id, location).await?;
        batch.push().await
    }

    async fn delete(&self, id: &str) -> IndexResult<()> {
        let batch = self.new_batch(DEFAULT_BATCH_SIZE).await?;
        batch.delete(id).await?;
        batch.push().await
    }

    async fn restore(&self, id: &str) -> IndexResult<()> {
        let batch = self.new_batch(DEFAULT_BATCH_SIZE).await?;
        batch.restore(id).await?;
        batch.push().await
    }

    async fn purge(&self, id: &str, only_deleted: bool) -> IndexResult<()> {
        let batch = self.new_batch(DEFAULT_BATCH_SIZE).await?;
        batch.purge(id, only_deleted).await?;
        batch.push().await
    }
}

/// Turn backend hits into a response, dropping hits outside the request's path scope.
///
/// Each dropped hit also lowers the reported total.
pub(crate) fn collect_matches<I>(
    request: &SearchRequest,
    hits: I,
    total: u64,
) -> IndexResult<SearchResponse>
where
    I: IntoIterator<Item = (f32, Resource, String)>,
{
    let mut total_matches = total as i64;
    let mut matches = Vec::new();
    for (score, resource, highlights) in hits {
        if !request.accepts_path(&resource.path) {
            total_matches -= 1;
            continue;
        }
        matches.push(Match::from_resource(resource, score, highlights)?);
    }
    Ok(SearchResponse {
        matches,
        total_matches,
    })
}

#[async_trait]
impl<E: Engine + ?Sized> Engine for std::sync::Arc<E> {
    async fn search(&self, request: &SearchRequest) -> IndexResult<SearchResponse> {
        (**self).search(request).await
    }

    async fn doc_count(&self) -> IndexResult<u64> {
        (**self).doc_count().await
    }

    async fn new_batch(&self, size: usize) -> IndexResult<Box<dyn BatchOperator>> {
        (**self).new_batch(size).await
    }
}
