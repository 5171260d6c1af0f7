//! Embedding collaborator and the embedding stage.
//!
//! The fallback is the zero vector. Cosine similarity against it is 0, so it ranks
//! last/neutral; the stage marks it degraded so it is never passed off as semantic.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::gemini::GeminiClient;
use crate::config::ai::AiConfig;
use crate::error::DependencyError;
use crate::stage::{with_deadline, Staged};

pub const EMBEDDING_DIM: usize = 768;

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, DependencyError>;
    fn name(&self) -> &'static str;
}

/// Same provider selection as [`super::build_classifier`].
pub fn build_embedder(cfg: &AiConfig) -> Arc<dyn Embedder> {
    match cfg.provider.as_str() {
        "mock" => Arc::new(MockEmbedder),
        "gemini" if !cfg.api_key.is_empty() => Arc::new(GeminiClient::new(cfg)),
        _ => Arc::new(DisabledEmbedder),
    }
}

pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    async fn embed(&self, _: &str) -> Result<Vec<f32>, DependencyError> {
        Err(DependencyError::failed("embedding", "embedder disabled"))
    }
    fn name(&self) -> &'static str {
        "disabled"
    }
}

/// Deterministic bag-of-words hashing embedder: each lowercase token bumps the dimension
/// picked by its SHA-256 digest, then the vector is L2-normalised. Texts sharing words
/// score higher, and the same text embeds identically across builds.
#[derive(Clone, Copy, Default)]
pub struct MockEmbedder;

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, DependencyError> {
        let mut v = vec![0.0f32; EMBEDDING_DIM];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            v[token_slot(&token.to_lowercase())] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(v)
    }
    fn name(&self) -> &'static str {
        "mock"
    }
}

fn token_slot(token: &str) -> usize {
    let digest = Sha256::digest(token.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(head) % EMBEDDING_DIM as u64) as usize
}

#[derive(Clone)]
pub struct EmbeddingStage {
    embedder: Arc<dyn Embedder>,
    deadline: Duration,
}

impl EmbeddingStage {
    pub fn new(embedder: Arc<dyn Embedder>, deadline: Duration) -> Self {
        Self { embedder, deadline }
    }

    /// Never fails: a timeout, error or wrong dimensionality yields the zero vector.
    pub async fn embed(&self, text: &str) -> Staged<Vec<f32>> {
        let res = with_deadline("embedding", self.deadline, self.embedder.embed(text))
            .await
            .and_then(|v| {
                if v.len() == EMBEDDING_DIM {
                    Ok(v)
                } else {
                    Err(DependencyError::malformed(
                        "embedding",
                        format!("expected {EMBEDDING_DIM} dims, got {}", v.len()),
                    ))
                }
            });
        Staged::or_fallback(res, zero_vector)
    }
}

pub fn zero_vector() -> Vec<f32> {
    vec![0.0; EMBEDDING_DIM]
}
