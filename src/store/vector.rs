// src/store/vector.rs
//! In-memory vector index. Brute-force cosine similarity, O(n) per search.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use super::{VectorHit, VectorIndex};
use crate::error::DependencyError;

const STAGE: &str = "vector_index";

#[derive(Debug, Clone)]
struct Entry {
    vector: Vec<f32>,
    payload: Value,
}

#[derive(Debug, Default)]
pub struct MemoryVectorIndex {
    entries: RwLock<HashMap<Uuid, Entry>>,
}

impl MemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned(e: impl std::fmt::Display) -> DependencyError {
    DependencyError::failed(STAGE, format!("lock poisoned: {e}"))
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn upsert(&self, id: Uuid, vector: Vec<f32>, payload: Value) -> Result<(), DependencyError> {
        self.entries
            .write()
            .map_err(poisoned)?
            .insert(id, Entry { vector, payload });
        Ok(())
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<VectorHit>, DependencyError> {
        let entries = self.entries.read().map_err(poisoned)?;
        let mut hits: Vec<VectorHit> = entries
            .iter()
            .map(|(id, e)| VectorHit {
                id: *id,
                score: cosine_similarity(query, &e.vector),
                payload: e.payload.clone(),
            })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        Ok(hits)
    }

    async fn delete(&self, id: Uuid) -> Result<(), DependencyError> {
        self.entries.write().map_err(poisoned)?.remove(&id);
        Ok(())
    }

    async fn clear(&self) -> Result<(), DependencyError> {
        self.entries.write().map_err(poisoned)?.clear();
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// 0.0 when lengths differ or either side has zero magnitude (degraded embeddings).
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let (mut dot, mut na, mut nb) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    (dot / (na.sqrt() * nb.sqrt())) as f32
}
