// src/analyze/mod.rs
//! Analysis stage: classify evidence under a deadline, fall back to a deterministic
//! "unclassified" sentinel when the classifier is slow or unavailable.

pub mod assistant;
pub mod classifier;
pub mod embedding;
pub mod gemini;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::evidence::{AnalysisInput, NormalizedEvidence};
use crate::incident::IncidentType;
use crate::stage::{with_deadline, Staged};

pub use assistant::{build_assistant, Assistant, DisabledAssistant, MockAssistant};
pub use classifier::{build_classifier, Classifier, DisabledClassifier, MockClassifier};
pub use embedding::{build_embedder, Embedder, EmbeddingStage, MockEmbedder, EMBEDDING_DIM};

/// Confidence assigned to the fallback sentinel. Low enough to always yield `low`
/// urgency (for `people_affected == 0`) and to sort below genuine classifications.
pub const FALLBACK_CONFIDENCE: f64 = 0.0;
const MAX_DESCRIPTION_CHARS: usize = 1000;
const FALLBACK_TEXT_CHARS: usize = 100;

/// What the classifier says about one piece of evidence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Classification {
    #[serde(rename = "type")]
    pub incident_type: IncidentType,
    pub confidence: f64,
    pub description: String,
    pub people_affected: u32,
    #[serde(default)]
    pub location_text: Option<String>,
}

impl Classification {
    /// The degraded sentinel. Deterministic: same evidence, same fallback.
    pub fn fallback_for(evidence: &NormalizedEvidence) -> Self {
        let description = match &evidence.input {
            AnalysisInput::Image { .. } => {
                format!("Unclassified image evidence: {}", evidence.label)
            }
            AnalysisInput::Text(text) => text.chars().take(FALLBACK_TEXT_CHARS).collect(),
        };
        Self {
            incident_type: IncidentType::Unknown,
            confidence: FALLBACK_CONFIDENCE,
            description,
            people_affected: 0,
            location_text: None,
        }
    }

    /// Clamp confidence into [0, 1] and tidy the description.
    pub fn sanitized(mut self) -> Self {
        self.confidence = if self.confidence.is_finite() {
            self.confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let desc = self.description.trim();
        self.description = if desc.is_empty() {
            "No description provided".to_string()
        } else {
            desc.chars().take(MAX_DESCRIPTION_CHARS).collect()
        };
        self.location_text = self
            .location_text
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty() && !l.eq_ignore_ascii_case("unknown"));
        self
    }
}

/// Wraps the classifier with per-kind deadlines (image calls are slower than text).
#[derive(Clone)]
pub struct AnalysisStage {
    classifier: Arc<dyn Classifier>,
    image_deadline: Duration,
    text_deadline: Duration,
}

impl AnalysisStage {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        image_deadline: Duration,
        text_deadline: Duration,
    ) -> Self {
        Self {
            classifier,
            image_deadline,
            text_deadline,
        }
    }

    pub fn classifier_name(&self) -> &'static str {
        self.classifier.name()
    }

    /// Never fails: a timeout or error yields the fallback, tagged as degraded.
    pub async fn analyze(&self, evidence: &NormalizedEvidence) -> Staged<Classification> {
        let res = match &evidence.input {
            AnalysisInput::Image { bytes, mime } => {
                with_deadline(
                    "image_analysis",
                    self.image_deadline,
                    self.classifier.classify_image(bytes, mime),
                )
                .await
            }
            AnalysisInput::Text(text) => {
                with_deadline(
                    "text_analysis",
                    self.text_deadline,
                    self.classifier.classify_text(text),
                )
                .await
            }
        };

        let mut staged = Staged::or_fallback(res.map(Classification::sanitized), || {
            Classification::fallback_for(evidence)
        });
        apply_source_adjustments(&mut staged.value, evidence);
        staged
    }
}

/// Source-specific shaping: confidence caps, description prefixes, caller-supplied place names.
fn apply_source_adjustments(c: &mut Classification, evidence: &NormalizedEvidence) {
    if let Some(cap) = evidence.confidence_cap {
        c.confidence = c.confidence.min(cap);
    }
    if let Some(prefix) = evidence.description_prefix {
        if !c.description.starts_with(prefix) {
            c.description = format!("{prefix}{}", c.description);
        }
    }
    if evidence.location_text.is_some() {
        c.location_text = evidence.location_text.clone();
    }
}
