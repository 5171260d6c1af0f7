// src/store/memory.rs
//! In-process metadata store with an optional JSON snapshot on disk.
//!
//! Every mutation rewrites the snapshot atomically (temp file + rename) while the write
//! lock is held, so snapshots never interleave. Without a path it is purely in-memory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{Applied, ClearReport, MetadataStore};
use crate::error::DependencyError;
use crate::incident::{Incident, IncidentUpdate, NewIncident};

const STAGE: &str = "metadata_store";

#[derive(Debug, Default, Serialize, Deserialize)]
struct Collections {
    active: HashMap<Uuid, Incident>,
    archived: HashMap<Uuid, Incident>,
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    active: Vec<Incident>,
    archived: Vec<Incident>,
}

#[derive(Debug, Default)]
pub struct MemoryMetadataStore {
    inner: RwLock<Collections>,
    snapshot_path: Option<PathBuf>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a snapshot-backed store. A missing file starts empty; a corrupt one is an error.
    pub async fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut cols = Collections::default();
        match fs::read_to_string(&path).await {
            Ok(s) => {
                let snap: Snapshot = serde_json::from_str(&s)
                    .with_context(|| format!("parsing snapshot {}", path.display()))?;
                cols.active = snap.active.into_iter().map(|i| (i.id, i)).collect();
                cols.archived = snap.archived.into_iter().map(|i| (i.id, i)).collect();
                tracing::info!(
                    path = %path.display(),
                    active = cols.active.len(),
                    archived = cols.archived.len(),
                    "metadata snapshot loaded"
                );
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e).with_context(|| format!("reading snapshot {}", path.display()))
            }
        }
        Ok(Self {
            inner: RwLock::new(cols),
            snapshot_path: Some(path),
        })
    }

    async fn write_snapshot(&self, cols: &Collections) -> Result<(), DependencyError> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        let snap = Snapshot {
            active: cols.active.values().cloned().collect(),
            archived: cols.archived.values().cloned().collect(),
        };
        let json = serde_json::to_vec_pretty(&snap).map_err(|e| DependencyError::failed(STAGE, e))?;
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .await
                .map_err(|e| DependencyError::failed(STAGE, e))?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .await
            .map_err(|e| DependencyError::failed(STAGE, e))?;
        fs::rename(&tmp, path)
            .await
            .map_err(|e| DependencyError::failed(STAGE, e))?;
        Ok(())
    }
}

fn newest_first(mut v: Vec<Incident>, key: impl Fn(&Incident) -> DateTime<Utc>, limit: usize) -> Vec<Incident> {
    v.sort_by_key(|i| std::cmp::Reverse(key(i)));
    v.truncate(limit);
    v
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn insert(&self, new: NewIncident) -> Result<Incident, DependencyError> {
        let incident = new.into_incident(Uuid::new_v4(), Utc::now());
        let mut cols = self.inner.write().await;
        cols.active.insert(incident.id, incident.clone());
        if let Err(e) = self.write_snapshot(&cols).await {
            // not durable: undo so memory and disk agree
            cols.active.remove(&incident.id);
            return Err(e);
        }
        Ok(incident)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Incident>, DependencyError> {
        Ok(self.inner.read().await.active.get(&id).cloned())
    }

    async fn get_archived(&self, id: Uuid) -> Result<Option<Incident>, DependencyError> {
        Ok(self.inner.read().await.archived.get(&id).cloned())
    }

    async fn apply(
        &self,
        id: Uuid,
        change: &IncidentUpdate,
        at: DateTime<Utc>,
    ) -> Result<Applied, DependencyError> {
        let mut cols = self.inner.write().await;
        let Some(before) = cols.active.get(&id).cloned() else {
            return Ok(if cols.archived.contains_key(&id) {
                Applied::AlreadyArchived
            } else {
                Applied::Missing
            });
        };

        let mut after = before.clone();
        after.apply_update(change);
        let applied = if after.is_archivable() {
            after.mark_archived(at);
            cols.active.remove(&id);
            cols.archived.insert(id, after.clone());
            Applied::Archived(after)
        } else {
            cols.active.insert(id, after.clone());
            Applied::Updated(after)
        };

        if let Err(e) = self.write_snapshot(&cols).await {
            cols.archived.remove(&id);
            cols.active.insert(id, before);
            return Err(e);
        }
        Ok(applied)
    }

    async fn list_active(&self, limit: usize) -> Result<Vec<Incident>, DependencyError> {
        let all = self.inner.read().await.active.values().cloned().collect();
        Ok(newest_first(all, |i| i.created_at, limit))
    }

    async fn list_archived(&self, limit: usize) -> Result<Vec<Incident>, DependencyError> {
        let all = self.inner.read().await.archived.values().cloned().collect();
        Ok(newest_first(all, |i| i.archived_at.unwrap_or(i.updated_at), limit))
    }

    async fn clear(&self) -> Result<ClearReport, DependencyError> {
        let mut cols = self.inner.write().await;
        let report = ClearReport {
            active_removed: cols.active.len(),
            archived_removed: cols.archived.len(),
            active_ids: cols.active.keys().copied().collect(),
        };
        cols.active.clear();
        cols.archived.clear();
        self.write_snapshot(&cols).await?;
        Ok(report)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
