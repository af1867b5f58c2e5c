//! Clustered backend speaking the OpenSearch REST API
//!
//! Keyed writes go out as one `_bulk` request per flush. Subtree operations
//! run server side through `_update_by_query` / `_delete_by_query`, scoped
//! by the space root id and the `path.tree` hierarchy field.

pub mod client;
pub mod mapping;
pub mod query;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use spacesearch_core::{
    base_name, normalize_path, QueryAst, QueryCompiler, Resource, SearchRequest, SearchResponse,
    HIGHLIGHT_POST_TAG, HIGHLIGHT_PRE_TAG,
};
use tracing::{debug, info};

use crate::batch::{BatchExecutor, Cascade, CascadeAction, StagedBatch};
use crate::config::ClusteredConfig;
use crate::engine::{collect_matches, BatchOperator, Engine};
use crate::error::{IndexError, IndexResult};

pub use client::ClusterClient;
pub use query::OpenSearchQueryCompiler;

/// Largest page the cluster returns for one search
pub const MAX_PAGE_SIZE: usize = 1000;

const MOVE_SCRIPT: &str = "\
if (ctx._source.id == params.id) { \
  ctx._source.parent_id = params.parent_id; \
  ctx._source.name = params.name; \
} \
if (ctx._source.path == params.old_path) { \
  ctx._source.path = params.new_path; \
} else if (ctx._source.path.startsWith(params.old_path + '/')) { \
  ctx._source.path = params.new_path + ctx._source.path.substring(params.old_path.length()); \
}";

const SET_DELETED_SCRIPT: &str = "ctx._source.deleted = params.deleted;";

/// Search engine backed by an OpenSearch-compatible cluster
#[derive(Clone)]
pub struct ClusteredBackend {
    client: Arc<ClusterClient>,
}

impl std::fmt::Debug for ClusteredBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusteredBackend").finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct ClusterHealth {
    status: String,
    #[serde(default)]
    timed_out: bool,
}

impl ClusteredBackend {
    /// Connect to the cluster, create the index when missing and verify health
    pub async fn connect(config: &ClusteredConfig) -> IndexResult<Self> {
        let client = ClusterClient::new(config)?;
        client.ping().await?;
        ensure_index(&client).await?;
        check_health(&client, config.health_timeout()).await?;
        info!(url = %config.url, index = %config.index, "connected to search cluster");

        Ok(Self {
            client: Arc::new(client),
        })
    }
}

async fn ensure_index(client: &ClusterClient) -> IndexResult<()> {
    if client.exists(&[client.index()]).await? {
        return Ok(());
    }

    let created = client
        .json(
            Method::PUT,
            &[client.index()],
            &[],
            Some(&mapping::index_definition()),
        )
        .await;
    match created {
        Ok(_) => {
            info!(index = %client.index(), "created search index");
            Ok(())
        }
        // another instance won the race
        Err(IndexError::HttpStatus { message, .. })
            if message.contains("resource_already_exists_exception") =>
        {
            Ok(())
        }
        Err(err) => Err(err),
    }
}

async fn check_health(client: &ClusterClient, timeout: Duration) -> IndexResult<()> {
    let timeout = format!("{}ms", timeout.as_millis());
    let response = client
        .json(
            Method::GET,
            &["_cluster", "health", client.index()],
            &[("local", "true"), ("timeout", timeout.as_str())],
            None,
        )
        .await
        .map_err(|e| IndexError::Unhealthy(format!("health check failed: {}", e)))?;
    let health: ClusterHealth = serde_json::from_value(response)?;

    if health.timed_out {
        return Err(IndexError::Unhealthy(format!(
            "health check timed out after {}",
            timeout
        )));
    }
    if health.status != "green" && health.status != "yellow" {
        return Err(IndexError::Unhealthy(format!(
            "index '{}' is {}",
            client.index(),
            health.status
        )));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    hits: SearchHits,
}

#[derive(Debug, Deserialize)]
struct SearchHits {
    total: Option<TotalHits>,
    #[serde(default)]
    hits: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct TotalHits {
    value: u64,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(rename = "_score")]
    score: Option<f32>,
    #[serde(rename = "_source")]
    source: Resource,
    #[serde(default)]
    highlight: HashMap<String, Vec<String>>,
}

#[async_trait]
impl Engine for ClusteredBackend {
    async fn search(&self, request: &SearchRequest) -> IndexResult<SearchResponse> {
        let ast = QueryAst::parse(&request.query)?;
        let query = OpenSearchQueryCompiler.compile(&ast)?;

        let mut filter = vec![json!({ "term": { "deleted": false } })];
        if let Some(reference) = &request.reference {
            filter.push(json!({ "term": { "root_id": reference.resource_id.to_string() } }));
        }
        let size = request
            .resolved_page_size(Some(MAX_PAGE_SIZE))
            .unwrap_or(MAX_PAGE_SIZE);
        let body = json!({
            "query": { "bool": { "must": [query], "filter": filter } },
            "size": size,
            "track_total_hits": true,
            "highlight": {
                "pre_tags": [HIGHLIGHT_PRE_TAG],
                "post_tags": [HIGHLIGHT_POST_TAG],
                "fields": { "content": {} }
            }
        });

        let response = self
            .client
            .json(Method::POST, &[self.client.index(), "_search"], &[], Some(&body))
            .await?;
        let result: SearchResult = serde_json::from_value(response)?;
        let total = result
            .hits
            .total
            .map(|total| total.value)
            .unwrap_or(result.hits.hits.len() as u64);

        let hits = result.hits.hits.into_iter().map(|mut hit| {
            let highlights = hit
                .highlight
                .remove("content")
                .and_then(|fragments| fragments.into_iter().next())
                .unwrap_or_default();
            (hit.score.unwrap_or_default(), hit.source, highlights)
        });
        collect_matches(request, hits, total)
    }

    async fn doc_count(&self) -> IndexResult<u64> {
        let body = json!({ "query": { "term": { "deleted": false } } });
        let response = self
            .client
            .json(Method::POST, &[self.client.index(), "_count"], &[], Some(&body))
            .await?;
        response
            .get("count")
            .and_then(Value::as_u64)
            .ok_or_else(|| IndexError::QueryFailure("count response without count".to_string()))
    }

    async fn new_batch(&self, size: usize) -> IndexResult<Box<dyn BatchOperator>> {
        let executor = ClusteredExecutor {
            client: Arc::clone(&self.client),
        };
        Ok(Box::new(StagedBatch::new(executor, size)?))
    }
}

/// One document of a bulk request
struct BulkWrite {
    id: String,
    source: Value,
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<HashMap<String, BulkItem>>,
}

#[derive(Debug, Deserialize)]
struct BulkItem {
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ByQueryResponse {
    #[serde(default)]
    failures: Vec<Value>,
    #[serde(default)]
    version_conflicts: u64,
}

struct ClusteredExecutor {
    client: Arc<ClusterClient>,
}

impl ClusteredExecutor {
    async fn root(&self, id: &str) -> IndexResult<Resource> {
        let source = self
            .client
            .get_source(id)
            .await?
            .ok_or_else(|| IndexError::not_found(id))?;
        Ok(serde_json::from_value(source)?)
    }

    async fn by_query(&self, endpoint: &str, body: Value) -> IndexResult<()> {
        let response = self
            .client
            .json(
                Method::POST,
                &[self.client.index(), endpoint],
                &[("refresh", "true"), ("wait_for_completion", "true")],
                Some(&body),
            )
            .await?;
        let response: ByQueryResponse = serde_json::from_value(response)?;
        if let Some(failure) = response.failures.first() {
            return Err(IndexError::QueryFailure(format!(
                "{} reported {} failures, first: {}",
                endpoint,
                response.failures.len(),
                error_reason(failure)
            )));
        }
        // A partially applied subtree operation is a failure.
        if response.version_conflicts > 0 {
            return Err(IndexError::QueryFailure(format!(
                "{} hit {} version conflicts",
                endpoint, response.version_conflicts
            )));
        }
        Ok(())
    }
}

/// Documents affected by a subtree operation rooted at `root`
fn subtree_query(root: &Resource) -> Value {
    if root.is_container() {
        json!({
            "bool": {
                "filter": [
                    { "term": { "root_id": root.root_id } },
                    { "term": { "path.tree": root.path } }
                ]
            }
        })
    } else {
        json!({ "ids": { "values": [root.id] } })
    }
}

fn error_reason(error: &Value) -> String {
    error
        .get("reason")
        .or_else(|| error.get("cause").and_then(|cause| cause.get("reason")))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| error.to_string())
}

#[async_trait]
impl BatchExecutor for ClusteredExecutor {
    type Write = BulkWrite;

    fn prepare_upsert(&self, id: &str, mut resource: Resource) -> IndexResult<BulkWrite> {
        resource.id = id.to_string();
        resource.path = normalize_path(&resource.path);
        Ok(BulkWrite {
            id: resource.id.clone(),
            source: serde_json::to_value(&resource)?,
        })
    }

    async fn flush(&self, writes: Vec<BulkWrite>) -> IndexResult<()> {
        let total = writes.len();
        let mut ndjson = String::new();
        for write in writes {
            let action = json!({ "index": { "_index": self.client.index(), "_id": write.id } });
            ndjson.push_str(&serde_json::to_string(&action)?);
            ndjson.push('\n');
            ndjson.push_str(&serde_json::to_string(&write.source)?);
            ndjson.push('\n');
        }

        let response: BulkResponse = serde_json::from_value(self.client.bulk(ndjson).await?)?;
        if !response.errors {
            debug!(documents = total, "bulk request applied");
            return Ok(());
        }

        let failures: Vec<&Value> = response
            .items
            .iter()
            .flat_map(|item| item.values())
            .filter_map(|item| item.error.as_ref())
            .collect();
        Err(IndexError::BulkFailure {
            failed: failures.len(),
            total,
            reason: failures
                .first()
                .map(|error| error_reason(error))
                .unwrap_or_else(|| "unknown".to_string()),
        })
    }

    async fn apply(&self, cascade: Cascade) -> IndexResult<()> {
        let root = self.root(&cascade.id).await?;
        let query = subtree_query(&root);
        debug!(id = %cascade.id, action = ?cascade.action, "applying subtree operation");

        match cascade.action {
            CascadeAction::Move {
                parent_id,
                location,
            } => {
                let new_path = normalize_path(&location);
                let body = json!({
                    "query": query,
                    "script": {
                        "lang": "painless",
                        "source": MOVE_SCRIPT,
                        "params": {
                            "id": root.id,
                            "parent_id": parent_id,
                            "name": base_name(&new_path),
                            "old_path": root.path,
                            "new_path": new_path,
                        }
                    }
                });
                self.by_query("_update_by_query", body).await
            }
            CascadeAction::SetDeleted(deleted) => {
                let body = json!({
                    "query": query,
                    "script": {
                        "lang": "painless",
                        "source": SET_DELETED_SCRIPT,
                        "params": { "deleted": deleted }
                    }
                });
                self.by_query("_update_by_query", body).await
            }
            CascadeAction::Purge { only_deleted } => {
                let query = if only_deleted {
                    json!({ "bool": { "filter": [query, { "term": { "deleted": true } }] } })
                } else {
                    query
                };
                self.by_query("_delete_by_query", json!({ "query": query }))
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spacesearch_core::ResourceType;

    #[test]
    fn test_subtree_query_for_containers() {
        let mut folder = Resource {
            id: "s$sp!d".into(),
            root_id: "s$sp!sp".into(),
            resource_type: ResourceType::Container,
            ..Default::default()
        };
        folder.relocate("/docs");
        let query = subtree_query(&folder);
        assert_eq!(query["bool"]["filter"][1]["term"]["path.tree"], "./docs");

        folder.resource_type = ResourceType::File;
        assert_eq!(subtree_query(&folder), json!({ "ids": { "values": ["s$sp!d"] } }));
    }

    #[test]
    fn test_error_reason() {
        let error = json!({ "type": "mapper_parsing_exception", "reason": "failed to parse" });
        assert_eq!(error_reason(&error), "failed to parse");
        let failure = json!({ "cause": { "reason": "version conflict" } });
        assert_eq!(error_reason(&failure), "version conflict");
    }
}
