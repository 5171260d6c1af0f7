// src/evidence.rs
//! Evidence submissions and their normalisation at the ingestion boundary.
//!
//! Every kind of submission is reduced to a [`NormalizedEvidence`]: what to classify,
//! where it happened (if known), and what to keep as the evidence attachment.
//! Validation failures are rejected here, before any write.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Deserialize;

use crate::error::IncidentError;
use crate::geotag::gps_from_image;
use crate::incident::{GeoPoint, Source};

/// Social posts are weaker evidence than direct uploads.
pub const SOCIAL_CONFIDENCE_CAP: f64 = 0.65;
pub const SOCIAL_DESCRIPTION_PREFIX: &str = "[Social Media] ";
/// Extracted document text shorter than this is treated as "nothing extracted".
pub const MIN_DOCUMENT_TEXT_CHARS: usize = 10;
pub const DOCUMENT_EXTENSIONS: [&str; 4] = ["pdf", "docx", "doc", "txt"];

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Evidence {
    Image(ImageEvidence),
    Text(TextEvidence),
    Document(DocumentEvidence),
    Social(SocialEvidence),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageEvidence {
    #[serde(default)]
    pub filename: Option<String>,
    pub image_base64: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextEvidence {
    pub text: String,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DocumentEvidence {
    pub filename: String,
    /// Raw file bytes; plain-text files are decoded from here.
    #[serde(default)]
    pub content_base64: Option<String>,
    /// Pre-extracted text for binary formats (pdf/docx/doc).
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SocialEvidence {
    pub text: String,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub location_text: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

/// What the classification collaborator is asked to look at.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisInput {
    Image { bytes: Vec<u8>, mime: String },
    Text(String),
}

/// Bytes to hand to the object store.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedEvidence {
    pub source: Source,
    pub input: AnalysisInput,
    /// Short label for logs and fallback descriptions (file name or kind).
    pub label: String,
    pub location: Option<GeoPoint>,
    pub location_text: Option<String>,
    pub attachment: Option<Attachment>,
    pub source_detail: Option<String>,
    pub confidence_cap: Option<f64>,
    pub description_prefix: Option<&'static str>,
}

impl Evidence {
    pub fn source(&self) -> Source {
        match self {
            Evidence::Image(_) => Source::Image,
            Evidence::Text(_) => Source::Text,
            Evidence::Document(_) => Source::Document,
            Evidence::Social(_) => Source::Social,
        }
    }

    /// Short label used in batch results.
    pub fn label(&self) -> String {
        match self {
            Evidence::Image(img) => img.filename.clone().unwrap_or_else(|| "image".into()),
            Evidence::Text(_) => "text".into(),
            Evidence::Document(doc) => doc.filename.clone(),
            Evidence::Social(s) => s.platform.clone().unwrap_or_else(|| "social".into()),
        }
    }

    /// Validate and reduce to the canonical pipeline input.
    ///
    /// Image location: explicit coordinates, then the photo's EXIF GPS tags, then
    /// `default_image_location`.
    pub fn normalize(
        self,
        default_image_location: GeoPoint,
    ) -> Result<NormalizedEvidence, IncidentError> {
        match self {
            Evidence::Image(img) => {
                let bytes = decode_base64(&img.image_base64, "image_base64")?;
                let location = match coordinates(img.latitude, img.longitude)? {
                    Some(point) => point,
                    None => match gps_from_image(&bytes) {
                        Some(point) => {
                            tracing::debug!(?point, "image location from exif");
                            point
                        }
                        None => default_image_location,
                    },
                };
                let mime = img
                    .content_type
                    .filter(|m| m.starts_with("image/"))
                    .unwrap_or_else(|| "image/jpeg".to_string());
                let name = img.filename.unwrap_or_else(|| "upload.jpg".to_string());
                Ok(NormalizedEvidence {
                    source: Source::Image,
                    input: AnalysisInput::Image {
                        bytes: bytes.clone(),
                        mime: mime.clone(),
                    },
                    label: name.clone(),
                    location: Some(location),
                    location_text: None,
                    attachment: Some(Attachment {
                        name,
                        content_type: mime,
                        bytes,
                    }),
                    source_detail: None,
                    confidence_cap: None,
                    description_prefix: None,
                })
            }
            Evidence::Text(t) => {
                let text = non_empty(&t.text, "text")?;
                Ok(NormalizedEvidence {
                    source: Source::Text,
                    input: AnalysisInput::Text(text),
                    label: "text".into(),
                    location: coordinates(t.latitude, t.longitude)?,
                    location_text: None,
                    attachment: None,
                    source_detail: None,
                    confidence_cap: None,
                    description_prefix: None,
                })
            }
            Evidence::Document(doc) => normalize_document(doc),
            Evidence::Social(s) => {
                let text = non_empty(&s.text, "text")?;
                let platform = s.platform.unwrap_or_else(|| "twitter".to_string());
                let user = s.user.unwrap_or_else(|| "anonymous".to_string());
                Ok(NormalizedEvidence {
                    source: Source::Social,
                    input: AnalysisInput::Text(text),
                    label: platform.clone(),
                    location: coordinates(s.latitude, s.longitude)?,
                    location_text: s.location_text.filter(|l| !l.trim().is_empty()),
                    attachment: None,
                    source_detail: Some(format!("{platform}:{user}")),
                    confidence_cap: Some(SOCIAL_CONFIDENCE_CAP),
                    description_prefix: Some(SOCIAL_DESCRIPTION_PREFIX),
                })
            }
        }
    }
}

fn normalize_document(doc: DocumentEvidence) -> Result<NormalizedEvidence, IncidentError> {
    let ext = doc
        .filename
        .rsplit_once('.')
        .map(|(_, e)| e.to_ascii_lowercase())
        .unwrap_or_default();
    if !DOCUMENT_EXTENSIONS.contains(&ext.as_str()) {
        return Err(IncidentError::validation(
            "unsupported file type; upload pdf, docx, doc or txt",
        ));
    }

    let raw = doc
        .content_base64
        .as_deref()
        .map(|b| decode_base64(b, "content_base64"))
        .transpose()?;

    let extracted = match (doc.text, ext.as_str(), &raw) {
        (Some(text), _, _) => text,
        (None, "txt", Some(bytes)) => String::from_utf8_lossy(bytes).into_owned(),
        _ => String::new(),
    };
    if extracted.trim().chars().count() < MIN_DOCUMENT_TEXT_CHARS {
        return Err(IncidentError::validation(
            "could not extract meaningful text from document",
        ));
    }

    let content_type = match ext.as_str() {
        "pdf" => "application/pdf",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "doc" => "application/msword",
        _ => "text/plain",
    };

    Ok(NormalizedEvidence {
        source: Source::Document,
        input: AnalysisInput::Text(extracted.trim().to_string()),
        label: doc.filename.clone(),
        location: coordinates(doc.latitude, doc.longitude)?,
        location_text: None,
        attachment: raw.map(|bytes| Attachment {
            name: doc.filename.clone(),
            content_type: content_type.to_string(),
            bytes,
        }),
        source_detail: Some(doc.filename),
        confidence_cap: None,
        description_prefix: None,
    })
}

fn decode_base64(raw: &str, field: &str) -> Result<Vec<u8>, IncidentError> {
    // tolerate data URLs ("data:image/png;base64,....")
    let payload = raw.split_once(',').map(|(_, p)| p).unwrap_or(raw).trim();
    let bytes = BASE64
        .decode(payload)
        .map_err(|e| IncidentError::validation(format!("{field} is not valid base64: {e}")))?;
    if bytes.is_empty() {
        return Err(IncidentError::validation(format!("{field} is empty")));
    }
    Ok(bytes)
}

fn non_empty(s: &str, field: &str) -> Result<String, IncidentError> {
    let t = s.trim();
    if t.is_empty() {
        return Err(IncidentError::validation(format!("{field} must not be empty")));
    }
    Ok(t.to_string())
}

fn coordinates(lat: Option<f64>, lng: Option<f64>) -> Result<Option<GeoPoint>, IncidentError> {
    match (lat, lng) {
        (None, None) => Ok(None),
        (Some(lat), Some(lng)) => {
            let p = GeoPoint::new(lat, lng);
            if p.is_valid() {
                Ok(Some(p))
            } else {
                Err(IncidentError::validation(format!(
                    "coordinates out of range: ({lat}, {lng})"
                )))
            }
        }
        _ => Err(IncidentError::validation(
            "latitude and longitude must be given together",
        )),
    }
}

/// Short anonymised fingerprint of submitted text, for logs. Raw text is never logged.
pub fn fingerprint(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(text.as_bytes());
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}
