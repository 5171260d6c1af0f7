// src/admin.rs
//! Administrative bulk clear. The only hard delete in the system.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::error::IncidentError;
use crate::notify::NotificationFanout;
use crate::stage::with_deadline;
use crate::store::{MetadataStore, VectorIndex};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ClearSummary {
    pub active_removed: usize,
    pub archived_removed: usize,
    /// `false` if the vector index could not be cleared; metadata is still gone.
    pub vectors_cleared: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct ClearDeadlines {
    pub metadata: Duration,
    pub vector: Duration,
}

/// Remove every active and archived record and empty the vector index.
/// With a fan-out, each removed active id is announced as `incident_deleted`.
pub async fn clear_all(
    metadata: &Arc<dyn MetadataStore>,
    vectors: &Arc<dyn VectorIndex>,
    deadlines: ClearDeadlines,
    fanout: Option<&NotificationFanout>,
) -> Result<ClearSummary, IncidentError> {
    let report = with_deadline("metadata_store", deadlines.metadata, metadata.clear()).await?;
    let vectors_cleared = match with_deadline("vector_index", deadlines.vector, vectors.clear()).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(target: "admin", error = %e, "vector index not cleared");
            false
        }
    };
    if let Some(fanout) = fanout {
        for id in &report.active_ids {
            fanout.publish_deleted(*id);
        }
    }
    tracing::info!(
        target: "admin",
        active = report.active_removed,
        archived = report.archived_removed,
        vectors_cleared,
        "all incidents cleared"
    );
    Ok(ClearSummary {
        active_removed: report.active_removed,
        archived_removed: report.archived_removed,
        vectors_cleared,
    })
}
