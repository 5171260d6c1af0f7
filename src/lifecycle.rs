// src/lifecycle.rs
//! Status updates, verification and the auto-archive rule.
//!
//! Archival is the only automatic transition: after every status update and every
//! verify, a record that is `resolved` and `verified` moves to the archived collection.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::error::IncidentError;
use crate::incident::{Incident, IncidentUpdate, Status};
use crate::notify::NotificationFanout;
use crate::stage::with_deadline;
use crate::store::{Applied, MetadataStore};

const STAGE: &str = "metadata_store";

#[derive(Clone)]
pub struct LifecycleStateMachine {
    metadata: Arc<dyn MetadataStore>,
    fanout: NotificationFanout,
    deadline: Duration,
}

impl LifecycleStateMachine {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        fanout: NotificationFanout,
        deadline: Duration,
    ) -> Self {
        Self {
            metadata,
            fanout,
            deadline,
        }
    }

    /// Set `status` (strictly parsed). Returns the record as it stands afterwards,
    /// which is the archived copy if the update completed the lifecycle.
    pub async fn update_status(&self, id: Uuid, status: &str) -> Result<Incident, IncidentError> {
        let status = Status::parse(status).ok_or_else(|| {
            IncidentError::validation(format!(
                "invalid status {status:?}; expected one of {}",
                Status::ALL.map(|s| s.as_str()).join(", ")
            ))
        })?;

        let now = Utc::now();
        let mut change = IncidentUpdate {
            status: Some(status),
            updated_at: Some(now),
            ..Default::default()
        };
        if status == Status::Resolved {
            change.resolved_at = Some(now);
        }

        let incident = self.commit(id, change).await?;
        tracing::info!(target: "lifecycle", incident = %id, status = status.as_str(), "status updated");
        Ok(incident)
    }

    pub async fn verify(&self, id: Uuid) -> Result<Incident, IncidentError> {
        let now = Utc::now();
        let change = IncidentUpdate {
            verified: Some(true),
            verified_at: Some(now),
            updated_at: Some(now),
            ..Default::default()
        };
        let incident = self.commit(id, change).await?;
        tracing::info!(target: "lifecycle", incident = %id, "incident verified");
        Ok(incident)
    }

    /// The store applies the change and the archive rule atomically per record.
    async fn commit(&self, id: Uuid, change: IncidentUpdate) -> Result<Incident, IncidentError> {
        let at = change.updated_at.unwrap_or_else(Utc::now);
        let applied =
            with_deadline(STAGE, self.deadline, self.metadata.apply(id, &change, at)).await?;
        match applied {
            Applied::Updated(incident) => {
                self.fanout.publish_updated(id, change);
                Ok(incident)
            }
            Applied::Archived(incident) => {
                self.fanout.publish_updated(id, change);
                metrics::counter!("incident_archived_total").increment(1);
                tracing::info!(target: "lifecycle", incident = %id, "incident resolved and verified, archived");
                self.fanout.publish_updated(
                    id,
                    IncidentUpdate {
                        archived: Some(true),
                        archived_at: incident.archived_at,
                        ..Default::default()
                    },
                );
                Ok(incident)
            }
            Applied::AlreadyArchived => Err(IncidentError::Archived(id)),
            Applied::Missing => Err(IncidentError::NotFound(id)),
        }
    }
}
