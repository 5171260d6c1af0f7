// src/persist.rs
//! Persistence stage: metadata insert (the durability boundary), vector upsert, evidence upload.
//!
//! Each write carries its own deadline. A failed metadata insert yields a locally
//! assigned id, flagged so callers can tell it was never stored.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::error::{Degradation, DependencyError};
use crate::evidence::Attachment;
use crate::incident::{Incident, NewIncident};
use crate::stage::{with_deadline, Staged};
use crate::store::{MetadataStore, ObjectStore, VectorIndex};

#[derive(Debug, Clone, Copy)]
pub struct PersistenceDeadlines {
    pub metadata: Duration,
    pub vector: Duration,
    pub object: Duration,
}

/// Result of [`PersistenceStage::persist`].
#[derive(Debug, Clone)]
pub struct Persisted {
    pub incident: Incident,
    /// The metadata write succeeded; `false` means the id is pipeline-local.
    pub durable: bool,
    pub degraded: Vec<Degradation>,
}

#[derive(Clone)]
pub struct PersistenceStage {
    metadata: Arc<dyn MetadataStore>,
    vectors: Arc<dyn VectorIndex>,
    objects: Arc<dyn ObjectStore>,
    deadlines: PersistenceDeadlines,
}

impl PersistenceStage {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        vectors: Arc<dyn VectorIndex>,
        objects: Arc<dyn ObjectStore>,
        deadlines: PersistenceDeadlines,
    ) -> Self {
        Self {
            metadata,
            vectors,
            objects,
            deadlines,
        }
    }

    pub fn metadata(&self) -> &Arc<dyn MetadataStore> {
        &self.metadata
    }

    pub fn vectors(&self) -> &Arc<dyn VectorIndex> {
        &self.vectors
    }

    pub fn metadata_deadline(&self) -> Duration {
        self.deadlines.metadata
    }

    /// Upload evidence bytes. Falls back to `local://<name>` so ingestion continues.
    pub async fn upload(&self, attachment: &Attachment) -> Staged<String> {
        let res = with_deadline(
            "object_store",
            self.deadlines.object,
            self.objects
                .store(&attachment.name, &attachment.content_type, &attachment.bytes),
        )
        .await;
        Staged::or_fallback(res, || format!("local://{}", attachment.name))
    }

    /// Active incidents for the duplicate scan, newest first.
    pub async fn active_working_set(&self, limit: usize) -> Result<Vec<Incident>, DependencyError> {
        with_deadline(
            "metadata_store",
            self.deadlines.metadata,
            self.metadata.list_active(limit),
        )
        .await
    }

    /// Insert metadata, then index the vector under the same id.
    ///
    /// The vector write is attempted even when the metadata write fell back, so semantic
    /// search still sees the incident once metadata catches up.
    pub async fn persist(&self, new: NewIncident, vector: Vec<f32>) -> Persisted {
        let mut degraded = Vec::new();
        let res = with_deadline(
            "metadata_store",
            self.deadlines.metadata,
            self.metadata.insert(new.clone()),
        )
        .await;
        let stored = Staged::or_fallback(res, || new.into_incident(Uuid::new_v4(), Utc::now()));
        degraded.extend(stored.degradation());
        let durable = !stored.is_degraded();
        let incident = stored.value;

        let res = with_deadline(
            "vector_index",
            self.deadlines.vector,
            self.vectors.upsert(incident.id, vector, vector_payload(&incident)),
        )
        .await;
        degraded.extend(Staged::or_fallback(res, || ()).degradation());

        Persisted {
            incident,
            durable,
            degraded,
        }
    }
}

/// Metadata snapshot stored next to the vector; enough to render a query hit.
pub fn vector_payload(incident: &Incident) -> serde_json::Value {
    json!({
        "incident_id": incident.id,
        "type": incident.incident_type,
        "urgency": incident.urgency,
        "description": incident.description,
        "latitude": incident.location.map(|l| l.latitude),
        "longitude": incident.location.map(|l| l.longitude),
        "source": incident.source,
        "created_at": incident.created_at,
    })
}
