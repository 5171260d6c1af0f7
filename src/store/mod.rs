// src/store/mod.rs
//! Collaborator contracts for persistence: metadata store, vector index, object store.
//! All methods are fallible with [`DependencyError`]; deadlines are applied by callers.

pub mod memory;
pub mod object;
pub mod qdrant;
pub mod vector;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::DependencyError;
use crate::incident::{Incident, IncidentUpdate, NewIncident};

pub use memory::MemoryMetadataStore;
pub use object::{LocalObjectStore, SupabaseObjectStore};
pub use qdrant::QdrantIndex;
pub use vector::MemoryVectorIndex;

/// Incident metadata, split into the active and archived collections.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Insert into the active collection; the store assigns `id` and `created_at`.
    async fn insert(&self, new: NewIncident) -> Result<Incident, DependencyError>;

    async fn get(&self, id: Uuid) -> Result<Option<Incident>, DependencyError>;

    async fn get_archived(&self, id: Uuid) -> Result<Option<Incident>, DependencyError>;

    /// Apply the lifecycle fields set in `change` to an active record, atomically per
    /// record. If that leaves it resolved and verified, the same call moves it to the
    /// archived collection stamped `at`.
    async fn apply(
        &self,
        id: Uuid,
        change: &IncidentUpdate,
        at: DateTime<Utc>,
    ) -> Result<Applied, DependencyError>;

    /// Active records, newest first.
    async fn list_active(&self, limit: usize) -> Result<Vec<Incident>, DependencyError>;

    /// Archived records, most recently archived first.
    async fn list_archived(&self, limit: usize) -> Result<Vec<Incident>, DependencyError>;

    /// Hard delete of everything. Administrative only.
    async fn clear(&self) -> Result<ClearReport, DependencyError>;

    fn name(&self) -> &'static str;
}

/// Result of [`MetadataStore::apply`].
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    /// Changed and still active.
    Updated(Incident),
    /// Changed, then archived by this same call.
    Archived(Incident),
    /// Already in the archived collection; nothing changed.
    AlreadyArchived,
    Missing,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ClearReport {
    pub active_removed: usize,
    pub archived_removed: usize,
    /// Ids that were active, for `incident_deleted` events.
    #[serde(skip)]
    pub active_ids: Vec<Uuid>,
}

/// Nearest-neighbour hit.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct VectorHit {
    pub id: Uuid,
    pub score: f32,
    pub payload: serde_json::Value,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(
        &self,
        id: Uuid,
        vector: Vec<f32>,
        payload: serde_json::Value,
    ) -> Result<(), DependencyError>;

    /// Best `k` by cosine similarity, descending.
    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<VectorHit>, DependencyError>;

    async fn delete(&self, id: Uuid) -> Result<(), DependencyError>;

    async fn clear(&self) -> Result<(), DependencyError>;

    fn name(&self) -> &'static str;
}

/// Blob storage for evidence media and documents.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store bytes and return a URL that references them.
    async fn store(
        &self,
        name: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> Result<String, DependencyError>;

    fn name(&self) -> &'static str;
}
