//! Ordered staging shared by every backend
//!
//! Mutations fall into two groups. Keyed writes (index or delete a single
//! document by id) are cheap to group into one bulk request. Subtree
//! operations (move, soft delete, restore, purge) are addressed by a root
//! document and must see every write staged before them. [`StagedBatch`]
//! keeps the staged operations in order and, on push, flushes the pending
//! keyed writes before running each subtree operation.

use async_trait::async_trait;
use spacesearch_core::Resource;
use tokio::sync::Mutex;
use tracing::debug;

use crate::engine::BatchOperator;
use crate::error::{IndexError, IndexResult};

/// What a subtree operation does to the root and its descendants
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CascadeAction {
    /// Re-home the root under `parent_id` at `location`, rewriting descendant paths
    Move { parent_id: String, location: String },
    /// Set the soft-delete flag
    SetDeleted(bool),
    /// Remove documents; with `only_deleted` soft-deleted ones only
    Purge { only_deleted: bool },
}

/// A subtree operation addressed by the id of its root document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cascade {
    pub id: String,
    pub action: CascadeAction,
}

/// Backend half of a batch: how keyed writes and subtree operations execute
#[async_trait]
pub trait BatchExecutor: Send + Sync + 'static {
    /// A keyed write ready to be sent in bulk
    type Write: Send + 'static;

    /// Turn an upsert into a keyed write; called at staging time
    fn prepare_upsert(&self, id: &str, resource: Resource) -> IndexResult<Self::Write>;

    /// Apply a group of keyed writes so later reads observe them
    async fn flush(&self, writes: Vec<Self::Write>) -> IndexResult<()>;

    /// Resolve the root of `cascade` and apply it to the subtree
    async fn apply(&self, cascade: Cascade) -> IndexResult<()>;
}

enum Staged<W> {
    Write(W),
    Cascade(Cascade),
}

/// A batch of staged operations over a [`BatchExecutor`]
pub struct StagedBatch<X: BatchExecutor> {
    executor: X,
    size: usize,
    staged: Mutex<Vec<Staged<X::Write>>>,
}

impl<X: BatchExecutor> StagedBatch<X> {
    pub fn new(executor: X, size: usize) -> IndexResult<Self> {
        if size == 0 {
            return Err(IndexError::InvalidBatchSize);
        }
        Ok(Self {
            executor,
            size,
            staged: Mutex::new(Vec::new()),
        })
    }

    /// Number of operations currently staged
    pub async fn len(&self) -> usize {
        self.staged.lock().await.len()
    }

    /// Stage `operation`, pushing once `size` operations are staged.
    ///
    /// Subtree operations only record the root id here. The root and its
    /// descendants are resolved at push time, after every earlier staged
    /// write has been flushed, so the size counts operations rather than
    /// the documents they end up touching.
    async fn stage(&self, operation: Staged<X::Write>) -> IndexResult<()> {
        let staged = {
            let mut staged = self.staged.lock().await;
            staged.push(operation);
            staged.len()
        };

        if staged >= self.size {
            self.push().await?;
        }
        Ok(())
    }

    async fn stage_cascade(&self, id: &str, action: CascadeAction) -> IndexResult<()> {
        self.stage(Staged::Cascade(Cascade {
            id: id.to_string(),
            action,
        }))
        .await
    }
}

#[async_trait]
impl<X: BatchExecutor> BatchOperator for StagedBatch<X> {
    async fn upsert(&self, id: &str, resource: Resource) -> IndexResult<()> {
        let write = self.executor.prepare_upsert(id, resource)?;
        self.stage(Staged::Write(write)).await
    }

    async fn move_to(&self, id: &str, parent_id: &str, location: &str) -> IndexResult<()> {
        self.stage_cascade(
            id,
            CascadeAction::Move {
                parent_id: parent_id.to_string(),
                location: location.to_string(),
            },
        )
        .await
    }

    async fn delete(&self, id: &str) -> IndexResult<()> {
        self.stage_cascade(id, CascadeAction::SetDeleted(true)).await
    }

    async fn restore(&self, id: &str) -> IndexResult<()> {
        self.stage_cascade(id, CascadeAction::SetDeleted(false)).await
    }

    async fn purge(&self, id: &str, only_deleted: bool) -> IndexResult<()> {
        self.stage_cascade(id, CascadeAction::Purge { only_deleted })
            .await
    }

    async fn push(&self) -> IndexResult<()> {
        let mut staged = self.staged.lock().await;
        let operations = std::mem::take(&mut *staged);
        if operations.is_empty() {
            return Ok(());
        }
        debug!(operations = operations.len(), "pushing batch");

        let mut pending = Vec::new();
        for operation in operations {
            match operation {
                Staged::Write(write) => pending.push(write),
                Staged::Cascade(cascade) => {
                    if !pending.is_empty() {
                        self.executor.flush(std::mem::take(&mut pending)).await?;
                    }
                    self.executor.apply(cascade).await?;
                }
            }
        }

        if !pending.is_empty() {
            self.executor.flush(pending).await?;
        }
        Ok(())
    }
}
