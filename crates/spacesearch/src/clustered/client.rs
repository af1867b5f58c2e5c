//! HTTP client for an OpenSearch-compatible cluster

use reqwest::{header, Method, Response, StatusCode};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::config::ClusteredConfig;
use crate::error::{IndexError, IndexResult};

/// Thin JSON client bound to one cluster and one index
pub struct ClusterClient {
    inner: reqwest::Client,
    base_url: Url,
    index: String,
    username: Option<String>,
    password: Option<String>,
}

impl ClusterClient {
    pub fn new(config: &ClusteredConfig) -> IndexResult<Self> {
        let inner = reqwest::Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout())
            .user_agent(&config.user_agent)
            .danger_accept_invalid_certs(config.insecure)
            .build()?;

        let base_url = Url::parse(&config.url)
            .map_err(|e| IndexError::Unhealthy(format!("invalid cluster url '{}': {}", config.url, e)))?;

        Ok(Self {
            inner,
            base_url,
            index: config.index.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    /// Build a URL from path segments, each percent-encoded as needed
    fn url(&self, segments: &[&str], query: &[(&str, &str)]) -> IndexResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| IndexError::Unhealthy(format!("cluster url '{}' cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<(String, &'static str)>,
    ) -> IndexResult<Response> {
        debug!(%method, %url, "cluster request");
        let mut request = self.inner.request(method, url);
        if let Some(username) = &self.username {
            request = request.basic_auth(username, self.password.as_ref());
        }
        if let Some((body, content_type)) = body {
            request = request.header(header::CONTENT_TYPE, content_type).body(body);
        }
        Ok(request.send().await?)
    }

    async fn into_json(response: Response) -> IndexResult<Value> {
        let status = response.status();
        if !status.is_success() {
            return Err(IndexError::HttpStatus {
                status,
                message: response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string()),
            });
        }
        Ok(response.json().await?)
    }

    /// Send a JSON request and decode the JSON response
    pub async fn json(
        &self,
        method: Method,
        segments: &[&str],
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> IndexResult<Value> {
        let url = self.url(segments, query)?;
        let body = body
            .map(serde_json::to_string)
            .transpose()?
            .map(|body| (body, "application/json"));
        let response = self.send(method, url, body).await?;
        Self::into_json(response).await
    }

    /// `HEAD` a path: `Ok(true)` on 2xx, `Ok(false)` on 404
    pub async fn exists(&self, segments: &[&str]) -> IndexResult<bool> {
        let url = self.url(segments, &[])?;
        let response = self.send(Method::HEAD, url, None).await?;
        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(IndexError::HttpStatus {
                status,
                message: format!("HEAD /{} failed", segments.join("/")),
            }),
        }
    }

    /// Check the cluster answers at all
    pub async fn ping(&self) -> IndexResult<()> {
        let response = self
            .send(Method::HEAD, self.url(&[], &[])?, None)
            .await
            .map_err(|e| IndexError::Unhealthy(format!("cluster unreachable: {}", e)))?;
        if !response.status().is_success() {
            return Err(IndexError::Unhealthy(format!(
                "cluster ping returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    /// Stored source of document `id`, `None` when it does not exist
    pub async fn get_source(&self, id: &str) -> IndexResult<Option<Value>> {
        let url = self.url(&[&self.index, "_doc", id], &[])?;
        let response = self.send(Method::GET, url, None).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let mut document = Self::into_json(response).await?;
        if document.get("found").and_then(Value::as_bool) == Some(false) {
            return Ok(None);
        }
        Ok(document.get_mut("_source").map(Value::take))
    }

    /// Send an NDJSON bulk body, refreshing so later reads see the writes
    pub async fn bulk(&self, ndjson: String) -> IndexResult<Value> {
        let url = self.url(&["_bulk"], &[("refresh", "true")])?;
        let response = self
            .send(Method::POST, url, Some((ndjson, "application/x-ndjson")))
            .await?;
        Self::into_json(response).await
    }
}
