// src/incident.rs
//! The canonical incident record and its enumerations.
//!
//! One schema, no aliases. Presentation-layer aliases (`lat`/`latitude`, `location_text`)
//! live in `api.rs`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Incident category.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IncidentType {
    Fire,
    Flood,
    CollapsedBuilding,
    MedicalEmergency,
    PeopleInDanger,
    Smoke,
    Other,
    /// Sentinel used when classification fell back.
    Unknown,
}

impl IncidentType {
    pub const ALL: [IncidentType; 8] = [
        IncidentType::Fire,
        IncidentType::Flood,
        IncidentType::CollapsedBuilding,
        IncidentType::MedicalEmergency,
        IncidentType::PeopleInDanger,
        IncidentType::Smoke,
        IncidentType::Other,
        IncidentType::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentType::Fire => "fire",
            IncidentType::Flood => "flood",
            IncidentType::CollapsedBuilding => "collapsed_building",
            IncidentType::MedicalEmergency => "medical_emergency",
            IncidentType::PeopleInDanger => "people_in_danger",
            IncidentType::Smoke => "smoke",
            IncidentType::Other => "other",
            IncidentType::Unknown => "unknown",
        }
    }

    /// Lenient mapping for labels produced by models and older clients.
    /// Anything unrecognised becomes `Other`.
    pub fn from_label(label: &str) -> Self {
        let norm = label.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        match norm.as_str() {
            "fire" | "wildfire" => IncidentType::Fire,
            "flood" | "flooding" => IncidentType::Flood,
            "collapsed_building" | "building_collapse" | "collapse" => {
                IncidentType::CollapsedBuilding
            }
            "medical_emergency" | "medical" => IncidentType::MedicalEmergency,
            "people_in_danger" | "trapped" => IncidentType::PeopleInDanger,
            "smoke" => IncidentType::Smoke,
            "unknown" => IncidentType::Unknown,
            _ => IncidentType::Other,
        }
    }

    /// Human-readable label, e.g. "Collapsed building".
    pub fn title(&self) -> String {
        let s = self.as_str().replace('_', " ");
        let mut chars = s.chars();
        match chars.next() {
            Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
            None => String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Medium,
    High,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Low => "low",
            Urgency::Medium => "medium",
            Urgency::High => "high",
        }
    }
}

/// Where the evidence came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Image,
    Text,
    Document,
    Social,
    Batch,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Image => "image",
            Source::Text => "text",
            Source::Document => "document",
            Source::Social => "social",
            Source::Batch => "batch",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    New,
    Pending,
    InProgress,
    Resolved,
    FalseAlarm,
}

impl Status {
    pub const ALL: [Status; 5] = [
        Status::New,
        Status::Pending,
        Status::InProgress,
        Status::Resolved,
        Status::FalseAlarm,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::New => "new",
            Status::Pending => "pending",
            Status::InProgress => "in_progress",
            Status::Resolved => "resolved",
            Status::FalseAlarm => "false_alarm",
        }
    }

    /// Strict parse; returns `None` for anything outside the enumerated set.
    pub fn parse(s: &str) -> Option<Self> {
        Status::ALL.into_iter().find(|st| st.as_str() == s.trim())
    }
}

/// Geographic point in decimal degrees.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Incident fields known before persistence. The metadata store turns this into an
/// [`Incident`] by assigning `id` and `created_at`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewIncident {
    pub incident_type: IncidentType,
    pub confidence: f64,
    pub urgency: Urgency,
    pub description: String,
    pub location: Option<GeoPoint>,
    pub location_text: Option<String>,
    pub people_affected: u32,
    pub evidence_ref: Option<String>,
    pub source: Source,
    /// Free-form origin detail: platform/user for social posts, file name for documents.
    pub source_detail: Option<String>,
    /// Classification came from the fallback sentinel, not the classifier.
    pub analysis_degraded: bool,
}

impl NewIncident {
    /// Materialise the record with the given identity and creation time.
    pub fn into_incident(self, id: Uuid, created_at: DateTime<Utc>) -> Incident {
        Incident {
            id,
            incident_type: self.incident_type,
            confidence: self.confidence,
            urgency: self.urgency,
            description: self.description,
            location: self.location,
            location_text: self.location_text,
            people_affected: self.people_affected,
            evidence_ref: self.evidence_ref,
            source: self.source,
            source_detail: self.source_detail,
            analysis_degraded: self.analysis_degraded,
            status: Status::New,
            verified: false,
            archived: false,
            created_at,
            updated_at: created_at,
            verified_at: None,
            resolved_at: None,
            archived_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Incident {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub incident_type: IncidentType,
    pub confidence: f64,
    pub urgency: Urgency,
    pub description: String,
    pub location: Option<GeoPoint>,
    pub location_text: Option<String>,
    pub people_affected: u32,
    pub evidence_ref: Option<String>,
    pub source: Source,
    #[serde(default)]
    pub source_detail: Option<String>,
    #[serde(default)]
    pub analysis_degraded: bool,
    pub status: Status,
    pub verified: bool,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub archived_at: Option<DateTime<Utc>>,
}

impl Incident {
    /// Resolved and verified but not yet moved to the archive.
    pub fn is_archivable(&self) -> bool {
        self.status == Status::Resolved && self.verified && !self.archived
    }

    /// Copy the lifecycle fields set in `change`. Archive fields are ignored; only the
    /// store moves a record to the archive.
    pub fn apply_update(&mut self, change: &IncidentUpdate) {
        if let Some(status) = change.status {
            self.status = status;
        }
        if let Some(at) = change.updated_at {
            self.updated_at = at;
        }
        if let Some(at) = change.resolved_at {
            self.resolved_at = Some(at);
        }
        if let Some(verified) = change.verified {
            self.verified = verified;
        }
        if let Some(at) = change.verified_at {
            self.verified_at = Some(at);
        }
    }

    pub fn mark_archived(&mut self, at: DateTime<Utc>) {
        self.archived = true;
        self.archived_at = Some(at);
        self.updated_at = at;
    }
}

/// Partial change broadcast with `incident_updated`. Only set fields are serialised.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IncidentUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archived: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<DateTime<Utc>>,
}
