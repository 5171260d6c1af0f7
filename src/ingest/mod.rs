// src/ingest/mod.rs
//! Ingestion coordinator: one pipeline run per evidence submission.
//!
//! analysis -> duplicate check -> urgency -> embedding -> persistence -> fan-out.
//! Collaborator failures degrade the result; only validation aborts a submission.

use std::time::Instant;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::Instrument;

use crate::analyze::{AnalysisStage, EmbeddingStage};
use crate::config::BatchConfig;
use crate::dedup::DuplicateDetector;
use crate::error::{Degradation, IncidentError};
use crate::evidence::{fingerprint, AnalysisInput, Evidence, NormalizedEvidence};
use crate::incident::{GeoPoint, Incident, NewIncident, Source};
use crate::metrics::ensure_metrics_described;
use crate::notify::NotificationFanout;
use crate::persist::PersistenceStage;
use crate::stage::Staged;
use crate::urgency;

/// What one submission produced.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IngestOutcome {
    Created {
        incident: Incident,
        /// `false` when the metadata write failed and the id is pipeline-local.
        persisted: bool,
        degraded: Vec<Degradation>,
    },
    Duplicate {
        existing_incident: Incident,
        distance_meters: f64,
        degraded: Vec<Degradation>,
    },
}

impl IngestOutcome {
    pub fn incident(&self) -> &Incident {
        match self {
            IngestOutcome::Created { incident, .. } => incident,
            IngestOutcome::Duplicate {
                existing_incident, ..
            } => existing_incident,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, IngestOutcome::Duplicate { .. })
    }

    pub fn degraded(&self) -> &[Degradation] {
        match self {
            IngestOutcome::Created { degraded, .. } | IngestOutcome::Duplicate { degraded, .. } => {
                degraded
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchItemResult {
    pub index: usize,
    pub label: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<IngestOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub results: Vec<BatchItemResult>,
}

#[derive(Clone)]
pub struct IngestionCoordinator {
    analysis: AnalysisStage,
    embedding: EmbeddingStage,
    detector: DuplicateDetector,
    persistence: PersistenceStage,
    fanout: NotificationFanout,
    default_location: GeoPoint,
    scan_limit: usize,
    batch: BatchConfig,
}

impl IngestionCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        analysis: AnalysisStage,
        embedding: EmbeddingStage,
        detector: DuplicateDetector,
        persistence: PersistenceStage,
        fanout: NotificationFanout,
        default_location: GeoPoint,
        scan_limit: usize,
        batch: BatchConfig,
    ) -> Self {
        Self {
            analysis,
            embedding,
            detector,
            persistence,
            fanout,
            default_location,
            scan_limit: scan_limit.max(1),
            batch,
        }
    }

    pub fn max_batch_items(&self) -> usize {
        self.batch.max_items
    }

    pub async fn ingest(&self, evidence: Evidence) -> Result<IngestOutcome, IncidentError> {
        let normalized = evidence.normalize(self.default_location)?;
        Ok(self.run(normalized).await)
    }

    /// Items are parsed one by one, so a malformed item fails alone. Results keep input order.
    pub async fn ingest_batch(
        &self,
        items: Vec<serde_json::Value>,
    ) -> Result<BatchReport, IncidentError> {
        if items.is_empty() {
            return Err(IncidentError::validation("batch contains no items"));
        }
        if items.len() > self.batch.max_items {
            return Err(IncidentError::validation(format!(
                "batch has {} items; maximum is {}",
                items.len(),
                self.batch.max_items
            )));
        }

        let total = items.len();
        let results: Vec<BatchItemResult> = stream::iter(items.into_iter().enumerate())
            .map(|(index, raw)| self.batch_item(index, raw))
            .buffered(self.batch.concurrency.max(1))
            .collect()
            .await;

        let successful = results.iter().filter(|r| r.success).count();
        tracing::info!(target: "ingest", total, successful, failed = total - successful, "batch processed");
        Ok(BatchReport {
            total,
            successful,
            failed: total - successful,
            results,
        })
    }

    async fn batch_item(&self, index: usize, raw: serde_json::Value) -> BatchItemResult {
        let label = raw
            .get("filename")
            .or_else(|| raw.get("kind"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| format!("item {}", index + 1));

        let normalized = serde_json::from_value::<Evidence>(raw)
            .map_err(|e| IncidentError::validation(format!("malformed evidence: {e}")))
            .and_then(|ev| ev.normalize(self.default_location));

        match normalized {
            Ok(mut n) => {
                n.source = Source::Batch;
                let outcome = self.run(n).await;
                BatchItemResult {
                    index,
                    label,
                    success: true,
                    outcome: Some(outcome),
                    error: None,
                }
            }
            Err(e) => {
                tracing::info!(target: "ingest", index, error = %e, "batch item rejected");
                BatchItemResult {
                    index,
                    label,
                    success: false,
                    outcome: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    async fn run(&self, evidence: NormalizedEvidence) -> IngestOutcome {
        ensure_metrics_described();
        // raw evidence text never reaches the logs, only its fingerprint
        let print = match &evidence.input {
            AnalysisInput::Text(text) => fingerprint(text),
            AnalysisInput::Image { .. } => fingerprint(&evidence.label),
        };
        let span = tracing::info_span!("ingest", source = evidence.source.as_str(), fp = %print);
        self.run_stages(evidence).instrument(span).await
    }

    async fn run_stages(&self, evidence: NormalizedEvidence) -> IngestOutcome {
        let started = Instant::now();
        let source = evidence.source;
        let mut degraded = Vec::new();

        let analysis = self.analysis.analyze(&evidence).await;
        degraded.extend(analysis.degradation());
        let classification = analysis.value;

        if let Some(here) = evidence.location {
            let scan = self.persistence.active_working_set(self.scan_limit).await;
            let active = Staged::or_fallback(scan, Vec::new);
            degraded.extend(active.degradation());
            if let Some(m) =
                self.detector
                    .find_duplicate(classification.incident_type, Some(here), &active.value)
            {
                metrics::counter!("incident_duplicates_total").increment(1);
                tracing::info!(
                    target: "ingest",
                    existing = %m.existing.id,
                    distance_m = m.distance_m,
                    incident_type = classification.incident_type.as_str(),
                    "duplicate suppressed"
                );
                return IngestOutcome::Duplicate {
                    existing_incident: m.existing,
                    distance_meters: m.distance_m,
                    degraded,
                };
            }
        }

        let urgency = urgency::classify(
            classification.confidence,
            classification.incident_type,
            classification.people_affected,
        );

        let evidence_ref = match &evidence.attachment {
            Some(att) => {
                let url = self.persistence.upload(att).await;
                degraded.extend(url.degradation());
                Some(url.value)
            }
            None => None,
        };

        let embedding_text = format!(
            "{} {}",
            classification.incident_type.as_str(),
            classification.description
        );
        let vector = self.embedding.embed(&embedding_text).await;
        degraded.extend(vector.degradation());

        let new = NewIncident {
            incident_type: classification.incident_type,
            confidence: classification.confidence,
            urgency,
            description: classification.description,
            location: evidence.location,
            location_text: classification.location_text.or(evidence.location_text),
            people_affected: classification.people_affected,
            evidence_ref,
            source,
            source_detail: evidence.source_detail,
            analysis_degraded: analysis.degraded.is_some(),
        };
        let persisted = self.persistence.persist(new, vector.value).await;
        degraded.extend(persisted.degraded);
        let incident = persisted.incident;

        if persisted.durable {
            self.fanout.publish_created(&incident);
        } else {
            tracing::warn!(target: "ingest", incident = %incident.id, "metadata write failed, incident not durable");
        }
        self.fanout.alert_if_urgent(&incident).await;

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        metrics::counter!("incident_ingest_total", "source" => source.as_str()).increment(1);
        metrics::histogram!("incident_ingest_ms").record(elapsed_ms);
        tracing::info!(
            target: "ingest",
            incident = %incident.id,
            incident_type = incident.incident_type.as_str(),
            urgency = incident.urgency.as_str(),
            durable = persisted.durable,
            degraded = degraded.len(),
            elapsed_ms,
            "incident created"
        );

        IngestOutcome::Created {
            incident,
            persisted: persisted.durable,
            degraded,
        }
    }
}
