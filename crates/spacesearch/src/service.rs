//! Read path: scoped, cached searches

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use spacesearch_core::{parse_scope, Reference, ResourceId, SearchRequest, SearchResponse, SpaceId};
use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;

use crate::engine::Engine;
use crate::error::{IndexError, IndexResult};
use crate::indexer::{ResourceProvider, SpaceIndexer};

/// How long a search response is served from cache
pub const CACHE_TTL: Duration = Duration::from_secs(1);

/// Errors returned to search clients
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request itself is wrong, e.g. malformed query syntax
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<IndexError> for ServiceError {
    fn from(err: IndexError) -> Self {
        if err.is_validation() {
            ServiceError::BadRequest(err.to_string())
        } else if err.is_not_found() {
            ServiceError::NotFound(err.to_string())
        } else {
            ServiceError::Internal(err.to_string())
        }
    }
}

/// Turns a `scope:` value into the reference searches are restricted to
#[async_trait]
pub trait ReferenceResolver: Send + Sync {
    /// `None` when the scope resource does not exist
    async fn resolve(&self, scope: &ResourceId) -> IndexResult<Option<Reference>>;
}

/// Resolves scopes by stating the scope resource in storage
pub struct ProviderResolver {
    provider: Arc<dyn ResourceProvider>,
}

impl ProviderResolver {
    pub fn new(provider: Arc<dyn ResourceProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl ReferenceResolver for ProviderResolver {
    async fn resolve(&self, scope: &ResourceId) -> IndexResult<Option<Reference>> {
        let stat = Reference::new(scope.clone(), ".");
        match self.provider.stat(&stat).await? {
            Some(resource) => {
                let root = resource.root_id.parse::<ResourceId>()?;
                Ok(Some(Reference::new(root, resource.path)))
            }
            None => Ok(None),
        }
    }
}

struct CachedResponse {
    stored: Instant,
    response: SearchResponse,
}

/// Search front end over an [`Engine`]
pub struct SearchService<E> {
    engine: E,
    resolver: Arc<dyn ReferenceResolver>,
    indexer: Arc<dyn SpaceIndexer>,
    cache: DashMap<String, CachedResponse>,
}

impl<E: Engine> SearchService<E> {
    pub fn new(
        engine: E,
        resolver: Arc<dyn ReferenceResolver>,
        indexer: Arc<dyn SpaceIndexer>,
    ) -> Self {
        Self {
            engine,
            resolver,
            indexer,
            cache: DashMap::new(),
        }
    }

    pub async fn search(&self, request: SearchRequest) -> Result<SearchResponse, ServiceError> {
        let mut request = request;
        let (query, scope) = parse_scope(&request.query);
        request.query = query;
        if let Some(scope) = scope {
            let id = scope.parse::<ResourceId>().map_err(IndexError::from)?;
            let reference = self
                .resolver
                .resolve(&id)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("scope {}", scope)))?;
            request.reference = Some(reference);
        }

        let key = cache_key(&request);
        if let Some(cached) = self.cache.get(&key) {
            if cached.stored.elapsed() < CACHE_TTL {
                debug!(query = %request.query, "serving search from cache");
                return Ok(cached.response.clone());
            }
        }

        let mut response = self.engine.search(&request).await?;
        response.sort_by_score();

        self.cache.retain(|_, cached| cached.stored.elapsed() < CACHE_TTL);
        self.cache.insert(
            key,
            CachedResponse {
                stored: Instant::now(),
                response: response.clone(),
            },
        );
        Ok(response)
    }

    /// Reindex a space on request
    pub async fn index_space(&self, space: &SpaceId) -> Result<(), ServiceError> {
        Ok(self.indexer.index_space(space).await?)
    }
}

/// Keyed on the query without its scope token and the resolved scope
fn cache_key(request: &SearchRequest) -> String {
    let reference = request
        .reference
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_default();
    format!("{}|{}|{}", request.query, request.page_size, reference)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedded::EmbeddedBackend;
    use crate::indexer::tests::{resource, MemoryProvider};
    use crate::indexer::IndexService;
    use spacesearch_core::ResourceType;
    use tempfile::tempdir;

    struct Fixture {
        _dir: tempfile::TempDir,
        provider: Arc<MemoryProvider>,
        service: SearchService<Arc<EmbeddedBackend>>,
    }

    async fn fixture() -> Fixture {
        let dir = tempdir().expect("tempdir");
        let engine = Arc::new(EmbeddedBackend::open(dir.path(), 15_000_000).unwrap());
        let provider = Arc::new(MemoryProvider::default());
        provider.put(resource("sp", "/", ResourceType::Container));
        provider.put(resource("docs", "/docs", ResourceType::Container));
        provider.put(resource("a", "/docs/report.txt", ResourceType::File));
        provider.put(resource("b", "/other/report.txt", ResourceType::File));

        let indexer = Arc::new(IndexService::new(engine.clone(), provider.clone(), 10).unwrap());
        let resolver = Arc::new(ProviderResolver::new(provider.clone()));
        let service = SearchService::new(engine, resolver, indexer);
        service.index_space(&SpaceId::new("st", "sp")).await.unwrap();
        Fixture {
            _dir: dir,
            provider,
            service,
        }
    }

    #[tokio::test]
    async fn test_scope_restricts_results() {
        let fixture = fixture().await;
        let response = fixture
            .service
            .search(SearchRequest::new("report scope:st$sp!docs"))
            .await
            .unwrap();
        assert_eq!(response.matches.len(), 1);
        assert_eq!(response.matches[0].entity.reference.path, "./docs/report.txt");

        let response = fixture.service.search(SearchRequest::new("report")).await.unwrap();
        assert_eq!(response.matches.len(), 2);
    }

    #[tokio::test]
    async fn test_error_categories() {
        let fixture = fixture().await;
        let err = fixture
            .service
            .search(SearchRequest::new("\"open"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));

        let err = fixture
            .service
            .search(SearchRequest::new("scope:st$sp!missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));

        let err = fixture
            .service
            .search(SearchRequest::new("scope:a!b!c"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_responses_cached_for_a_second() {
        let fixture = fixture().await;
        let first = fixture.service.search(SearchRequest::new("report")).await.unwrap();
        assert_eq!(first.matches.len(), 2);

        fixture
            .provider
            .put(resource("c", "/docs/report-2.txt", ResourceType::File));
        fixture
            .service
            .index_space(&SpaceId::new("st", "sp"))
            .await
            .unwrap();

        let cached = fixture.service.search(SearchRequest::new("report")).await.unwrap();
        assert_eq!(cached.matches.len(), 2);

        tokio::time::advance(Duration::from_millis(1_100)).await;
        let fresh = fixture.service.search(SearchRequest::new("report")).await.unwrap();
        assert_eq!(fresh.matches.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_keyed_on_resolved_scope() {
        let fixture = fixture().await;
        let first = fixture
            .service
            .search(SearchRequest::new("scope:st$sp!docs report"))
            .await
            .unwrap();
        assert_eq!(first.matches.len(), 1);

        fixture
            .provider
            .put(resource("c", "/docs/report-2.txt", ResourceType::File));
        fixture
            .service
            .index_space(&SpaceId::new("st", "sp"))
            .await
            .unwrap();

        let cached = fixture
            .service
            .search(SearchRequest::new("report  scope:st$sp!docs"))
            .await
            .unwrap();
        assert_eq!(cached.matches.len(), 1);

        let key = cache_key(
            &SearchRequest::new("report")
                .with_reference(Reference::new(ResourceId::new("st", "sp", "sp"), "./docs")),
        );
        assert!(fixture.service.cache.contains_key(&key));
    }

    #[test]
    fn test_index_error_mapping() {
        assert!(matches!(
            ServiceError::from(IndexError::Validation("x".into())),
            ServiceError::BadRequest(_)
        ));
        assert!(matches!(
            ServiceError::from(IndexError::not_found("x")),
            ServiceError::NotFound(_)
        ));
        assert!(matches!(
            ServiceError::from(IndexError::Unhealthy("red".into())),
            ServiceError::Internal(_)
        ));
    }
}
