// tests/common/mod.rs
// Shared wiring and hand-written collaborator doubles for integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use incident_pipeline::analyze::classifier::Classifier;
use incident_pipeline::analyze::{Classification, MockAssistant, MockClassifier, MockEmbedder};
use incident_pipeline::bootstrap::{assemble, Collaborators};
use incident_pipeline::config::AppConfig;
use incident_pipeline::incident::{Incident, IncidentType, IncidentUpdate, NewIncident};
use incident_pipeline::notify::{DisabledMailer, Mailer};
use incident_pipeline::store::{
    Applied, ClearReport, LocalObjectStore, MemoryMetadataStore, MemoryVectorIndex, MetadataStore,
    VectorHit, VectorIndex,
};
use incident_pipeline::{AppState, DependencyError};
use parking_lot::Mutex;
use uuid::Uuid;

pub fn classification(t: IncidentType, confidence: f64, people: u32) -> Classification {
    Classification {
        incident_type: t,
        confidence,
        description: format!("{} reported", t.as_str()),
        people_affected: people,
        location_text: None,
    }
}

pub fn fixed(t: IncidentType, confidence: f64) -> Arc<dyn Classifier> {
    Arc::new(MockClassifier::new(classification(t, confidence, 0)))
}

/// Everything in memory; evidence files go to a throwaway directory.
pub fn collaborators(classifier: Arc<dyn Classifier>) -> Collaborators {
    let dir = std::env::temp_dir().join(format!("incident-pipeline-test-{}", Uuid::new_v4()));
    Collaborators {
        classifier,
        embedder: Arc::new(MockEmbedder),
        assistant: Arc::new(MockAssistant),
        metadata: Arc::new(MemoryMetadataStore::new()),
        vectors: Arc::new(MemoryVectorIndex::new()),
        objects: Arc::new(LocalObjectStore::new(dir)),
        mailer: Arc::new(DisabledMailer),
    }
}

pub fn state(c: Collaborators) -> AppState {
    assemble(&AppConfig::default(), c)
}

pub fn state_with(cfg: &AppConfig, c: Collaborators) -> AppState {
    assemble(cfg, c)
}

/// Never answers within any sane deadline.
pub struct SlowClassifier;

#[async_trait]
impl Classifier for SlowClassifier {
    async fn classify_image(&self, _: &[u8], _: &str) -> Result<Classification, DependencyError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(classification(IncidentType::Fire, 0.99, 0))
    }
    async fn classify_text(&self, _: &str) -> Result<Classification, DependencyError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(classification(IncidentType::Fire, 0.99, 0))
    }
    fn name(&self) -> &'static str {
        "slow"
    }
}

pub struct FailingVectorIndex;

#[async_trait]
impl VectorIndex for FailingVectorIndex {
    async fn upsert(&self, _: Uuid, _: Vec<f32>, _: serde_json::Value) -> Result<(), DependencyError> {
        Err(DependencyError::failed("vector_index", "connection refused"))
    }
    async fn search(&self, _: &[f32], _: usize) -> Result<Vec<VectorHit>, DependencyError> {
        Err(DependencyError::failed("vector_index", "connection refused"))
    }
    async fn delete(&self, _: Uuid) -> Result<(), DependencyError> {
        Err(DependencyError::failed("vector_index", "connection refused"))
    }
    async fn clear(&self) -> Result<(), DependencyError> {
        Err(DependencyError::failed("vector_index", "connection refused"))
    }
    fn name(&self) -> &'static str {
        "failing"
    }
}

pub struct FailingMetadataStore;

fn down() -> DependencyError {
    DependencyError::failed("metadata_store", "quota exceeded")
}

#[async_trait]
impl MetadataStore for FailingMetadataStore {
    async fn insert(&self, _: NewIncident) -> Result<Incident, DependencyError> {
        Err(down())
    }
    async fn get(&self, _: Uuid) -> Result<Option<Incident>, DependencyError> {
        Err(down())
    }
    async fn get_archived(&self, _: Uuid) -> Result<Option<Incident>, DependencyError> {
        Err(down())
    }
    async fn apply(&self, _: Uuid, _: &IncidentUpdate, _: DateTime<Utc>) -> Result<Applied, DependencyError> {
        Err(down())
    }
    async fn list_active(&self, _: usize) -> Result<Vec<Incident>, DependencyError> {
        Err(down())
    }
    async fn list_archived(&self, _: usize) -> Result<Vec<Incident>, DependencyError> {
        Err(down())
    }
    async fn clear(&self) -> Result<ClearReport, DependencyError> {
        Err(down())
    }
    fn name(&self) -> &'static str {
        "failing"
    }
}

/// Captures (subject, recipients) of every alert.
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<(String, Vec<String>)>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, subject: &str, to: &[String], _: &str, _: &str) -> Result<(), DependencyError> {
        self.sent.lock().push((subject.to_string(), to.to_vec()));
        Ok(())
    }
    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Memory store whose `apply` waits until `parties` callers are in flight, so
/// lifecycle commands reach the store at the same moment.
pub struct GatedStore {
    inner: MemoryMetadataStore,
    gate: tokio::sync::Barrier,
}

impl GatedStore {
    pub fn new(parties: usize) -> Self {
        Self {
            inner: MemoryMetadataStore::new(),
            gate: tokio::sync::Barrier::new(parties),
        }
    }
}

#[async_trait]
impl MetadataStore for GatedStore {
    async fn insert(&self, new: NewIncident) -> Result<Incident, DependencyError> {
        self.inner.insert(new).await
    }
    async fn get(&self, id: Uuid) -> Result<Option<Incident>, DependencyError> {
        self.inner.get(id).await
    }
    async fn get_archived(&self, id: Uuid) -> Result<Option<Incident>, DependencyError> {
        self.inner.get_archived(id).await
    }
    async fn apply(&self, id: Uuid, change: &IncidentUpdate, at: DateTime<Utc>) -> Result<Applied, DependencyError> {
        self.gate.wait().await;
        self.inner.apply(id, change, at).await
    }
    async fn list_active(&self, limit: usize) -> Result<Vec<Incident>, DependencyError> {
        self.inner.list_active(limit).await
    }
    async fn list_archived(&self, limit: usize) -> Result<Vec<Incident>, DependencyError> {
        self.inner.list_archived(limit).await
    }
    async fn clear(&self) -> Result<ClearReport, DependencyError> {
        self.inner.clear().await
    }
    fn name(&self) -> &'static str {
        "gated"
    }
}
