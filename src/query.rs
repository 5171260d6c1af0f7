// src/query.rs
//! Semantic search over indexed incidents.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::analyze::EmbeddingStage;
use crate::error::Degradation;
use crate::stage::{with_deadline, Staged};
use crate::store::{VectorHit, VectorIndex};

pub const DEFAULT_LIMIT: usize = 10;
pub const MAX_LIMIT: usize = 50;

#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub query: String,
    pub results: Vec<VectorHit>,
    pub count: usize,
    /// No ranking was possible: the query embedding or the index call fell back.
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<Degradation>,
}

#[derive(Clone)]
pub struct QueryService {
    embedding: EmbeddingStage,
    vectors: Arc<dyn VectorIndex>,
    deadline: Duration,
}

impl QueryService {
    pub fn new(embedding: EmbeddingStage, vectors: Arc<dyn VectorIndex>, deadline: Duration) -> Self {
        Self {
            embedding,
            vectors,
            deadline,
        }
    }

    /// A zero-vector query would rank everything equally, so a degraded embedding
    /// returns no results instead of a meaningless ranking.
    pub async fn search(&self, query: &str, limit: usize) -> QueryResult {
        let limit = limit.clamp(1, MAX_LIMIT);
        let vector = self.embedding.embed(query).await;
        if vector.is_degraded() {
            return QueryResult {
                query: query.to_string(),
                results: Vec::new(),
                count: 0,
                degraded: true,
                reason: vector.degradation(),
            };
        }

        let res = with_deadline(
            "vector_index",
            self.deadline,
            self.vectors.search(&vector.value, limit),
        )
        .await;
        let hits = Staged::or_fallback(res, Vec::new);
        QueryResult {
            query: query.to_string(),
            count: hits.value.len(),
            degraded: hits.is_degraded(),
            reason: hits.degradation(),
            results: hits.value,
        }
    }
}
