//! Classification collaborator: trait, factory, and the non-network implementations.

use std::sync::Arc;

use async_trait::async_trait;

use super::gemini::GeminiClient;
use super::Classification;
use crate::config::ai::AiConfig;
use crate::error::DependencyError;

/// External vision/text classifier. Latency is bounded by the caller's deadline.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify_image(&self, image: &[u8], mime: &str)
        -> Result<Classification, DependencyError>;
    async fn classify_text(&self, text: &str) -> Result<Classification, DependencyError>;
    /// Provider name for diagnostics.
    fn name(&self) -> &'static str;
}

/// Factory: build a classifier according to config.
///
/// * `provider = "mock"` → fixed answer (local runs, tests).
/// * `provider = "gemini"` with a key → real client.
/// * anything else, or no key → disabled (every call falls back).
pub fn build_classifier(cfg: &AiConfig) -> Arc<dyn Classifier> {
    match cfg.provider.as_str() {
        "mock" => Arc::new(MockClassifier::default()),
        "gemini" if !cfg.api_key.is_empty() => Arc::new(GeminiClient::new(cfg)),
        "gemini" => {
            tracing::warn!("gemini classifier selected but no API key; classification disabled");
            Arc::new(DisabledClassifier)
        }
        _ => Arc::new(DisabledClassifier),
    }
}

/// Always fails; the analysis stage then uses the fallback sentinel.
pub struct DisabledClassifier;

#[async_trait]
impl Classifier for DisabledClassifier {
    async fn classify_image(&self, _: &[u8], _: &str) -> Result<Classification, DependencyError> {
        Err(DependencyError::failed("classifier", "classifier disabled"))
    }
    async fn classify_text(&self, _: &str) -> Result<Classification, DependencyError> {
        Err(DependencyError::failed("classifier", "classifier disabled"))
    }
    fn name(&self) -> &'static str {
        "disabled"
    }
}

/// Returns the same classification for every input.
#[derive(Clone)]
pub struct MockClassifier {
    pub fixed: Classification,
}

impl MockClassifier {
    pub fn new(fixed: Classification) -> Self {
        Self { fixed }
    }
}

impl Default for MockClassifier {
    fn default() -> Self {
        Self {
            fixed: Classification {
                incident_type: crate::incident::IncidentType::Other,
                confidence: 0.6,
                description: "Mock classification".to_string(),
                people_affected: 0,
                location_text: None,
            },
        }
    }
}

#[async_trait]
impl Classifier for MockClassifier {
    async fn classify_image(&self, _: &[u8], _: &str) -> Result<Classification, DependencyError> {
        Ok(self.fixed.clone())
    }
    async fn classify_text(&self, _: &str) -> Result<Classification, DependencyError> {
        Ok(self.fixed.clone())
    }
    fn name(&self) -> &'static str {
        "mock"
    }
}
