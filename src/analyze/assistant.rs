//! Operator assistant collaborator: answers free-form questions over recent incidents.

use std::sync::Arc;

use async_trait::async_trait;

use super::gemini::GeminiClient;
use crate::config::ai::AiConfig;
use crate::error::DependencyError;

#[async_trait]
pub trait Assistant: Send + Sync {
    /// `context` is a JSON array of the incidents the answer may draw on.
    async fn answer(&self, question: &str, context: &str) -> Result<String, DependencyError>;
    fn name(&self) -> &'static str;
}

/// Same provider selection as [`super::build_classifier`].
pub fn build_assistant(cfg: &AiConfig) -> Arc<dyn Assistant> {
    match cfg.provider.as_str() {
        "mock" => Arc::new(MockAssistant),
        "gemini" if !cfg.api_key.is_empty() => Arc::new(GeminiClient::new(cfg)),
        _ => Arc::new(DisabledAssistant),
    }
}

pub struct DisabledAssistant;

#[async_trait]
impl Assistant for DisabledAssistant {
    async fn answer(&self, _: &str, _: &str) -> Result<String, DependencyError> {
        Err(DependencyError::failed("assistant", "assistant disabled"))
    }
    fn name(&self) -> &'static str {
        "disabled"
    }
}

/// Counts the incidents it was given; no model involved.
#[derive(Clone, Copy, Default)]
pub struct MockAssistant;

#[async_trait]
impl Assistant for MockAssistant {
    async fn answer(&self, question: &str, context: &str) -> Result<String, DependencyError> {
        let n = serde_json::from_str::<Vec<serde_json::Value>>(context)
            .map(|v| v.len())
            .map_err(|e| DependencyError::malformed("assistant", e))?;
        Ok(format!("{n} active incidents on record. You asked: {question}"))
    }
    fn name(&self) -> &'static str {
        "mock"
    }
}
