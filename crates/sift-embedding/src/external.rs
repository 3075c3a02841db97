//! External search service backend.
//!
//! Speaks a small JSON protocol: `POST {base}/search` with the sub-query,
//! answered by `{"results": [{"id", "content", "score", "metadata"}]}`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use sift_core::retrieval::{BackendQuery, SearchBackend, SearchResult};
use sift_core::{SiftError, SiftResult};

pub const EXTERNAL_BACKEND: &str = "external";

#[derive(Serialize)]
struct SearchBody<'a> {
    query: &'a str,
    mode: &'a str,
    limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    index: Option<&'a str>,
    entities: &'a [String],
    filters: &'a HashMap<String, serde_json::Value>,
}

#[derive(Deserialize)]
struct SearchReply {
    #[serde(default)]
    results: Vec<Hit>,
}

#[derive(Deserialize)]
struct Hit {
    id: String,
    #[serde(default)]
    content: String,
    score: f64,
    #[serde(default)]
    metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Generic external search service reached over HTTP.
#[derive(Clone)]
pub struct HttpSearchBackend {
    base_url: String,
    api_key: Option<String>,
    default_index: Option<String>,
    client: reqwest::Client,
}

impl HttpSearchBackend {
    pub fn new(base_url: &str, api_key: Option<String>, default_index: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            default_index,
            client,
        }
    }

    async fn query(&self, query: &BackendQuery) -> Result<Vec<SearchResult>> {
        let body = SearchBody {
            query: &query.text,
            mode: query.kind.as_str(),
            limit: query.limit,
            index: query.index_name.as_deref().or(self.default_index.as_deref()),
            entities: &query.entities,
            filters: &query.filters,
        };

        let mut request = self.client.post(format!("{}/search", self.base_url)).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await.context("Failed to reach search service")?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Search service error ({}): {}", status, text);
        }

        let reply: SearchReply = response.json().await.context("Failed to parse search service response")?;
        debug!(hits = reply.results.len(), kind = query.kind.as_str(), "External search answered");

        Ok(reply
            .results
            .into_iter()
            .take(query.limit)
            .map(|hit| SearchResult {
                id: hit.id,
                content: hit.content,
                score: hit.score,
                source: EXTERNAL_BACKEND.to_string(),
                metadata: hit.metadata,
            })
            .collect())
    }
}

#[async_trait]
impl SearchBackend for HttpSearchBackend {
    fn name(&self) -> &str {
        EXTERNAL_BACKEND
    }

    async fn search(&self, query: &BackendQuery) -> SiftResult<Vec<SearchResult>> {
        self.query(query)
            .await
            .map_err(|e| SiftError::BackendUnavailable(format!("{:#}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use sift_core::retrieval::QueryKind;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn query(kind: QueryKind) -> BackendQuery {
        BackendQuery {
            text: "acme invoices".into(),
            kind,
            limit: 2,
            entities: vec!["customer".into()],
            index_name: None,
            filters: HashMap::new(),
        }
    }

    async fn echo(headers: HeaderMap, Json(body): Json<serde_json::Value>) -> Json<serde_json::Value> {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        Json(serde_json::json!({
            "results": [
                { "id": "doc:1", "content": "Acme invoice", "score": 0.8,
                  "metadata": { "index": body["index"], "mode": body["mode"], "auth": auth } },
                { "id": "doc:2", "score": 0.4 },
                { "id": "doc:3", "score": 0.2 }
            ]
        }))
    }

    #[tokio::test]
    async fn test_search_maps_results() {
        let url = serve(Router::new().route("/search", post(echo))).await;
        let backend = HttpSearchBackend::new(&url, Some("secret".into()), Some("docs".into()));

        let results = backend.search(&query(QueryKind::Semantic)).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "doc:1");
        assert_eq!(results[0].source, "external");
        let metadata = results[0].metadata.as_ref().unwrap();
        assert_eq!(metadata["index"], "docs");
        assert_eq!(metadata["mode"], "semantic");
        assert_eq!(metadata["auth"], "Bearer secret");
        assert_eq!(results[1].content, "");
    }

    #[tokio::test]
    async fn test_query_index_overrides_default() {
        let url = serve(Router::new().route("/search", post(echo))).await;
        let backend = HttpSearchBackend::new(&url, None, Some("docs".into()));
        let mut q = query(QueryKind::Keyword);
        q.index_name = Some("tickets".into());

        let results = backend.search(&q).await.unwrap();
        assert_eq!(results[0].metadata.as_ref().unwrap()["index"], "tickets");
    }

    #[tokio::test]
    async fn test_server_error_is_unavailable() {
        let router = Router::new().route("/search", post(|| async { (StatusCode::BAD_GATEWAY, "upstream down") }));
        let url = serve(router).await;
        let err = HttpSearchBackend::new(&url, None, None)
            .search(&query(QueryKind::Keyword))
            .await
            .unwrap_err();
        assert!(matches!(err, SiftError::BackendUnavailable(ref msg) if msg.contains("upstream down")));
    }
}
