// src/store/qdrant.rs
//! Qdrant vector index over its REST API. The collection is created on first use
//! (cosine distance, 768 dims).

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::OnceCell;
use uuid::Uuid;

use super::{VectorHit, VectorIndex};
use crate::analyze::EMBEDDING_DIM;
use crate::error::DependencyError;

const STAGE: &str = "vector_index";

pub struct QdrantIndex {
    http: reqwest::Client,
    base_url: String,
    collection: String,
    api_key: Option<String>,
    ready: OnceCell<()>,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    result: Vec<ScoredPoint>,
}

#[derive(Deserialize)]
struct ScoredPoint {
    id: Value,
    score: f32,
    #[serde(default)]
    payload: Value,
}

impl QdrantIndex {
    pub fn new(base_url: &str, collection: &str, api_key: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(3))
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            collection: collection.to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            ready: OnceCell::new(),
        }
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.base_url, self.collection)
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        let req = self.http.request(method, url);
        match &self.api_key {
            Some(key) => req.header("api-key", key),
            None => req,
        }
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response, DependencyError> {
        req.send()
            .await
            .map_err(|e| DependencyError::failed(STAGE, e))?
            .error_for_status()
            .map_err(|e| DependencyError::failed(STAGE, e))
    }

    async fn ensure_collection(&self) -> Result<(), DependencyError> {
        self.ready
            .get_or_try_init(|| async {
                let resp = self
                    .request(reqwest::Method::GET, self.collection_url())
                    .send()
                    .await
                    .map_err(|e| DependencyError::failed(STAGE, e))?;
                if resp.status() == reqwest::StatusCode::NOT_FOUND {
                    let body = json!({ "vectors": { "size": EMBEDDING_DIM, "distance": "Cosine" } });
                    self.send(self.request(reqwest::Method::PUT, self.collection_url()).json(&body))
                        .await?;
                    tracing::info!(collection = %self.collection, "qdrant collection created");
                } else {
                    resp.error_for_status()
                        .map_err(|e| DependencyError::failed(STAGE, e))?;
                }
                Ok(())
            })
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn upsert(&self, id: Uuid, vector: Vec<f32>, payload: Value) -> Result<(), DependencyError> {
        self.ensure_collection().await?;
        let body = json!({ "points": [{ "id": id, "vector": vector, "payload": payload }] });
        let url = format!("{}/points?wait=true", self.collection_url());
        self.send(self.request(reqwest::Method::PUT, url).json(&body)).await?;
        Ok(())
    }

    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<VectorHit>, DependencyError> {
        self.ensure_collection().await?;
        let body = json!({ "vector": vector, "limit": k, "with_payload": true });
        let url = format!("{}/points/search", self.collection_url());
        let resp: SearchResponse = self
            .send(self.request(reqwest::Method::POST, url).json(&body))
            .await?
            .json()
            .await
            .map_err(|e| DependencyError::malformed(STAGE, e))?;

        // Points we did not write (numeric ids) are skipped.
        Ok(resp
            .result
            .into_iter()
            .filter_map(|p| {
                let id = p.id.as_str().and_then(|s| Uuid::parse_str(s).ok())?;
                Some(VectorHit {
                    id,
                    score: p.score,
                    payload: p.payload,
                })
            })
            .collect())
    }

    async fn delete(&self, id: Uuid) -> Result<(), DependencyError> {
        self.ensure_collection().await?;
        let url = format!("{}/points/delete?wait=true", self.collection_url());
        self.send(self.request(reqwest::Method::POST, url).json(&json!({ "points": [id] })))
            .await?;
        Ok(())
    }

    /// Drops every point by deleting with an empty filter.
    async fn clear(&self) -> Result<(), DependencyError> {
        self.ensure_collection().await?;
        let url = format!("{}/points/delete?wait=true", self.collection_url());
        self.send(self.request(reqwest::Method::POST, url).json(&json!({ "filter": {} })))
            .await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "qdrant"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_server_is_a_dependency_failure() {
        // Port 9 (discard) on localhost is closed in test environments.
        let index = QdrantIndex::new("http://127.0.0.1:9/", "incidents", Some(String::new()));
        assert_eq!(index.collection_url(), "http://127.0.0.1:9/collections/incidents");
        assert!(index.api_key.is_none());
        let err = index.search(&[0.0; 4], 3).await.unwrap_err();
        assert_eq!(err.stage(), "vector_index");
    }
}
