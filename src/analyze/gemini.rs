//! Gemini provider: image/text classification via `generateContent`, embeddings via
//! `embedContent`. Plain REST over reqwest; the key travels in `x-goog-api-key`.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::assistant::Assistant;
use super::classifier::Classifier;
use super::embedding::{Embedder, EMBEDDING_DIM};
use super::Classification;
use crate::config::ai::AiConfig;
use crate::error::DependencyError;
use crate::incident::IncidentType;

const IMAGE_PROMPT: &str = r#"Analyze this image for disaster/emergency situations.

INCIDENT TYPES (choose the most specific one):
- collapsed_building: Buildings that have fallen, structural damage, rubble
- fire: Active flames, burning structures
- flood: Water covering areas, submerged buildings/vehicles
- smoke: Heavy smoke without visible fire
- people_in_danger: People trapped, injured, or in immediate danger
- medical_emergency: Medical situations, ambulances, casualties
- other: Only if none of the above apply

Return ONLY valid JSON in this exact format (no markdown, no extra text):
{"type": "collapsed_building", "confidence": 0.95, "description": "Brief description of what you see", "people_affected": 0}"#;

const JSON_MIME: &str = "application/json";

fn chat_prompt(question: &str, context: &str) -> String {
    format!(
        r#"You are an AI disaster response assistant helping emergency operators.

Current incidents (JSON):
{context}

Operator question: {question}

Answer concisely and only from the incidents above. Say so if they do not cover the question."#
    )
}

fn text_prompt(text: &str) -> String {
    format!(
        r#"Extract disaster/emergency information from this report:
"{text}"

Incident type must be one of: fire, flood, collapsed_building, smoke, people_in_danger, medical_emergency, other.

Return ONLY valid JSON:
{{"type": "incident_type", "location_text": "location description or null", "people_affected": 0, "description": "brief description", "confidence": 0.85}}"#
    )
}

pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    embedding_model: String,
}

impl GeminiClient {
    pub fn new(cfg: &AiConfig) -> Self {
        // Per-call deadlines are enforced by the pipeline; these only bound sockets.
        let http = reqwest::Client::builder()
            .user_agent("incident-pipeline/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(20))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            api_key: cfg.api_key.clone(),
            base_url: cfg.base_url.clone(),
            model: cfg.model.clone(),
            embedding_model: cfg.embedding_model.clone(),
        }
    }

    /// `stage` labels failures; `mime` is the requested response type.
    async fn generate(
        &self,
        stage: &'static str,
        mime: &'static str,
        parts: Vec<Part<'_>>,
    ) -> Result<String, DependencyError> {
        #[derive(Serialize)]
        struct Content<'a> {
            parts: Vec<Part<'a>>,
        }
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct GenConfig {
            temperature: f32,
            response_mime_type: &'static str,
        }
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Req<'a> {
            contents: Vec<Content<'a>>,
            generation_config: GenConfig,
        }
        #[derive(Deserialize)]
        struct Resp {
            #[serde(default)]
            candidates: Vec<Candidate>,
        }
        #[derive(Deserialize)]
        struct Candidate {
            content: Option<RespContent>,
        }
        #[derive(Deserialize)]
        struct RespContent {
            #[serde(default)]
            parts: Vec<RespPart>,
        }
        #[derive(Deserialize)]
        struct RespPart {
            text: Option<String>,
        }

        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let req = Req {
            contents: vec![Content { parts }],
            generation_config: GenConfig {
                temperature: 0.2,
                response_mime_type: mime,
            },
        };

        let resp = self
            .http
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&req)
            .send()
            .await
            .map_err(|e| DependencyError::failed(stage, e))?
            .error_for_status()
            .map_err(|e| DependencyError::failed(stage, e))?;

        let body: Resp = resp
            .json()
            .await
            .map_err(|e| DependencyError::malformed(stage, e))?;

        body.candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .find_map(|p| p.text)
            .ok_or_else(|| DependencyError::malformed(stage, "no text candidate"))
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text {
        text: &'a str,
    },
    Inline {
        inline_data: InlineData<'a>,
    },
}

#[derive(Serialize)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: String,
}

#[async_trait]
impl Classifier for GeminiClient {
    async fn classify_image(
        &self,
        image: &[u8],
        mime: &str,
    ) -> Result<Classification, DependencyError> {
        let parts = vec![
            Part::Text { text: IMAGE_PROMPT },
            Part::Inline {
                inline_data: InlineData {
                    mime_type: mime,
                    data: BASE64.encode(image),
                },
            },
        ];
        let raw = self.generate("classifier", JSON_MIME, parts).await?;
        parse_classification(&raw)
    }

    async fn classify_text(&self, text: &str) -> Result<Classification, DependencyError> {
        let prompt = text_prompt(text);
        let raw = self
            .generate("classifier", JSON_MIME, vec![Part::Text { text: &prompt }])
            .await?;
        parse_classification(&raw)
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

#[async_trait]
impl Assistant for GeminiClient {
    async fn answer(&self, question: &str, context: &str) -> Result<String, DependencyError> {
        let prompt = chat_prompt(question, context);
        let raw = self
            .generate("assistant", "text/plain", vec![Part::Text { text: &prompt }])
            .await?;
        let reply = raw.trim();
        if reply.is_empty() {
            return Err(DependencyError::malformed("assistant", "empty reply"));
        }
        Ok(reply.to_string())
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

#[async_trait]
impl Embedder for GeminiClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, DependencyError> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Req<'a> {
            model: String,
            content: EmbedContent<'a>,
            task_type: &'static str,
        }
        #[derive(Serialize)]
        struct EmbedContent<'a> {
            parts: Vec<Part<'a>>,
        }
        #[derive(Deserialize)]
        struct Resp {
            embedding: Values,
        }
        #[derive(Deserialize)]
        struct Values {
            values: Vec<f32>,
        }

        let url = format!(
            "{}/models/{}:embedContent",
            self.base_url, self.embedding_model
        );
        let req = Req {
            model: format!("models/{}", self.embedding_model),
            content: EmbedContent {
                parts: vec![Part::Text { text }],
            },
            task_type: "RETRIEVAL_DOCUMENT",
        };

        let resp = self
            .http
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&req)
            .send()
            .await
            .map_err(|e| DependencyError::failed("embedding", e))?
            .error_for_status()
            .map_err(|e| DependencyError::failed("embedding", e))?;
        let body: Resp = resp
            .json()
            .await
            .map_err(|e| DependencyError::malformed("embedding", e))?;

        if body.embedding.values.len() != EMBEDDING_DIM {
            return Err(DependencyError::malformed(
                "embedding",
                format!("expected {EMBEDDING_DIM} dims, got {}", body.embedding.values.len()),
            ));
        }
        Ok(body.embedding.values)
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

/// Raw model answer. Models drift, so everything is lenient.
#[derive(Deserialize)]
struct RawClassification {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    people_affected: Option<f64>,
    #[serde(default)]
    location_text: Option<String>,
}

/// Strip optional ```json fences, then parse.
pub(crate) fn parse_classification(raw: &str) -> Result<Classification, DependencyError> {
    static RE_FENCE: OnceCell<Regex> = OnceCell::new();
    let re = RE_FENCE.get_or_init(|| {
        Regex::new(r"(?s)^\s*```(?:json)?\s*(.*?)\s*```\s*$").expect("fence regex")
    });
    let body = re
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(raw)
        .trim();

    let parsed: RawClassification =
        serde_json::from_str(body).map_err(|e| DependencyError::malformed("classifier", e))?;
    if parsed.kind.trim().is_empty() {
        return Err(DependencyError::malformed("classifier", "missing type"));
    }

    Ok(Classification {
        incident_type: IncidentType::from_label(&parsed.kind),
        confidence: parsed.confidence.unwrap_or(0.5),
        description: parsed.description,
        people_affected: parsed
            .people_affected
            .filter(|p| p.is_finite() && *p > 0.0)
            .map(|p| p.round().min(u32::MAX as f64) as u32)
            .unwrap_or(0),
        location_text: parsed.location_text,
    })
}
