//! Ollama HTTP client for embedding generation.
//!
//! Talks to `/api/embeddings`; the default model, nomic-embed-text,
//! produces 768-dimensional vectors.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

pub const DEFAULT_MODEL: &str = "nomic-embed-text";

/// Embedding dimension of the default model.
pub const EMBEDDING_DIM: usize = 768;

/// Ollama embedding client.
#[derive(Clone)]
pub struct OllamaClient {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Generate an embedding vector for the given text.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbeddingRequest {
            model: &self.model,
            prompt: text,
        };

        let response = self
            .client
            .post(format!("{}/api/embeddings", self.base_url))
            .json(&request)
            .send()
            .await
            .context("Failed to connect to Ollama")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Ollama API error ({}): {}", status, body);
        }

        let result: EmbeddingResponse = response.json().await.context("Failed to parse Ollama response")?;
        if result.embedding.is_empty() {
            anyhow::bail!("Ollama returned an empty embedding for model '{}'", self.model);
        }

        debug!(dim = result.embedding.len(), "Generated embedding");
        Ok(result.embedding)
    }

    /// True when the service answers and lists the configured model.
    pub async fn health_check(&self) -> bool {
        let response = self.client.get(format!("{}/api/tags", self.base_url)).send().await;

        match response {
            Ok(resp) if resp.status().is_success() => {
                let text = resp.text().await.unwrap_or_default();
                text.contains(&self.model)
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::{get, post};
    use axum::{Json, Router};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}/", addr)
    }

    #[tokio::test]
    async fn test_embed_and_health() {
        let router = Router::new()
            .route(
                "/api/embeddings",
                post(|Json(body): Json<serde_json::Value>| async move {
                    assert_eq!(body["model"], "nomic-embed-text");
                    Json(serde_json::json!({ "embedding": [0.25, 0.5, 0.25] }))
                }),
            )
            .route(
                "/api/tags",
                get(|| async { Json(serde_json::json!({ "models": [{ "name": "nomic-embed-text:latest" }] })) }),
            );
        let url = serve(router).await;

        let client = OllamaClient::new(&url, DEFAULT_MODEL);
        assert_eq!(client.embed("acme").await.unwrap(), vec![0.25, 0.5, 0.25]);
        assert!(client.health_check().await);
        assert!(!OllamaClient::new(&url, "other-model").health_check().await);
    }

    #[tokio::test]
    async fn test_empty_embedding_is_an_error() {
        let router = Router::new().route(
            "/api/embeddings",
            post(|| async { Json(serde_json::json!({ "embedding": [] })) }),
        );
        let url = serve(router).await;
        assert!(OllamaClient::new(&url, DEFAULT_MODEL).embed("x").await.is_err());
    }
}
