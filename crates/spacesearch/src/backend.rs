//! Backend selection

use async_trait::async_trait;
use spacesearch_core::{SearchRequest, SearchResponse};
use tracing::info;

use crate::clustered::ClusteredBackend;
use crate::config::EngineConfig;
use crate::embedded::EmbeddedBackend;
use crate::engine::{BatchOperator, Engine};
use crate::error::IndexResult;

/// The backend chosen by configuration at startup
#[derive(Clone)]
pub enum IndexBackend {
    Embedded(EmbeddedBackend),
    Clustered(ClusteredBackend),
}

impl IndexBackend {
    pub async fn from_config(config: &EngineConfig) -> IndexResult<Self> {
        match config {
            EngineConfig::Embedded(embedded) => {
                info!(path = %embedded.data_path.display(), "using embedded search index");
                let data_path = embedded.data_path.clone();
                let heap_bytes = embedded.writer_heap_bytes;
                let backend = tokio::task::spawn_blocking(move || {
                    EmbeddedBackend::open(data_path, heap_bytes)
                })
                .await??;
                Ok(IndexBackend::Embedded(backend))
            }
            EngineConfig::Clustered(clustered) => Ok(IndexBackend::Clustered(
                ClusteredBackend::connect(clustered).await?,
            )),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            IndexBackend::Embedded(_) => "embedded",
            IndexBackend::Clustered(_) => "clustered",
        }
    }
}

#[async_trait]
impl Engine for IndexBackend {
    async fn search(&self, request: &SearchRequest) -> IndexResult<SearchResponse> {
        match self {
            IndexBackend::Embedded(backend) => backend.search(request).await,
            IndexBackend::Clustered(backend) => backend.search(request).await,
        }
    }

    async fn doc_count(&self) -> IndexResult<u64> {
        match self {
            IndexBackend::Embedded(backend) => backend.doc_count().await,
            IndexBackend::Clustered(backend) => backend.doc_count().await,
        }
    }

    async fn new_batch(&self, size: usize) -> IndexResult<Box<dyn BatchOperator>> {
        match self {
            IndexBackend::Embedded(backend) => backend.new_batch(size).await,
            IndexBackend::Clustered(backend) => backend.new_batch(size).await,
        }
    }
}
