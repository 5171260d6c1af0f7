// src/notify/mod.rs
//! Real-time fan-out and high-urgency email alerts.
//!
//! Delivery is best-effort and at-most-once. Nothing here can fail an ingestion.

pub mod email;
pub mod registry;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use crate::incident::{Incident, IncidentUpdate, Urgency};
use crate::stage::with_deadline;

pub use email::{render_alert, AlertEmail, DisabledMailer, Mailer, SmtpMailer};
pub use registry::{SubscriberRegistry, Subscription};

/// Server-push event. `name()` is the wire event name, the serialised value its data.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum RealtimeEvent {
    NewIncident(Incident),
    IncidentUpdated {
        incident_id: Uuid,
        update: IncidentUpdate,
    },
    IncidentDeleted {
        incident_id: Uuid,
    },
}

impl RealtimeEvent {
    pub fn name(&self) -> &'static str {
        match self {
            RealtimeEvent::NewIncident(_) => "new_incident",
            RealtimeEvent::IncidentUpdated { .. } => "incident_updated",
            RealtimeEvent::IncidentDeleted { .. } => "incident_deleted",
        }
    }
}

#[derive(Clone)]
pub struct NotificationFanout {
    registry: Arc<SubscriberRegistry>,
    mailer: Arc<dyn Mailer>,
    recipients: Arc<Vec<String>>,
    email_deadline: Duration,
}

impl NotificationFanout {
    pub fn new(
        registry: Arc<SubscriberRegistry>,
        mailer: Arc<dyn Mailer>,
        recipients: Vec<String>,
        email_deadline: Duration,
    ) -> Self {
        Self {
            registry,
            mailer,
            recipients: Arc::new(recipients),
            email_deadline,
        }
    }

    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    pub fn subscribe(&self) -> Subscription {
        self.registry.add()
    }

    pub fn publish_created(&self, incident: &Incident) -> usize {
        self.publish(RealtimeEvent::NewIncident(incident.clone()))
    }

    pub fn publish_updated(&self, incident_id: Uuid, update: IncidentUpdate) -> usize {
        self.publish(RealtimeEvent::IncidentUpdated {
            incident_id,
            update,
        })
    }

    pub fn publish_deleted(&self, incident_id: Uuid) -> usize {
        self.publish(RealtimeEvent::IncidentDeleted { incident_id })
    }

    fn publish(&self, event: RealtimeEvent) -> usize {
        let delivered = self.registry.broadcast(&event);
        tracing::debug!(target: "notify", event = event.name(), delivered, "event published");
        delivered
    }

    /// Email the configured recipients about a high-urgency incident.
    /// Returns whether a message went out; failures are logged only.
    pub async fn alert_if_urgent(&self, incident: &Incident) -> bool {
        if incident.urgency != Urgency::High {
            return false;
        }
        if self.recipients.is_empty() {
            tracing::debug!(target: "notify", incident = %incident.id, "no alert recipients configured");
            return false;
        }
        let mail = render_alert(incident);
        let res = with_deadline(
            "email",
            self.email_deadline,
            self.mailer
                .send(&mail.subject, &self.recipients, &mail.html, &mail.text),
        )
        .await;
        match res {
            Ok(()) => {
                metrics::counter!("incident_alerts_sent_total").increment(1);
                tracing::info!(
                    target: "notify",
                    incident = %incident.id,
                    recipients = self.recipients.len(),
                    "high-urgency alert sent"
                );
                true
            }
            Err(e) => {
                tracing::warn!(target: "notify", incident = %incident.id, error = %e, "alert email not sent");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DependencyError;
    use crate::incident::{IncidentType, NewIncident, Source};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording(Mutex<Vec<(String, Vec<String>)>>);

    #[async_trait]
    impl Mailer for Recording {
        async fn send(&self, subject: &str, to: &[String], _: &str, _: &str) -> Result<(), DependencyError> {
            self.0.lock().unwrap().push((subject.to_string(), to.to_vec()));
            Ok(())
        }
        fn name(&self) -> &'static str {
            "recording"
        }
    }

    fn incident(urgency: Urgency) -> Incident {
        NewIncident {
            incident_type: IncidentType::Fire,
            confidence: 0.9,
            urgency,
            description: "warehouse fire".into(),
            location: None,
            location_text: None,
            people_affected: 0,
            evidence_ref: None,
            source: Source::Text,
            source_detail: None,
            analysis_degraded: false,
        }
        .into_incident(Uuid::new_v4(), Utc::now())
    }

    fn fanout(mailer: Arc<dyn Mailer>, recipients: Vec<String>) -> NotificationFanout {
        NotificationFanout::new(
            Arc::new(SubscriberRegistry::default()),
            mailer,
            recipients,
            Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn only_high_urgency_is_emailed() {
        let mailer = Arc::new(Recording::default());
        let f = fanout(mailer.clone(), vec!["ops@example.org".into()]);

        assert!(!f.alert_if_urgent(&incident(Urgency::Medium)).await);
        assert!(f.alert_if_urgent(&incident(Urgency::High)).await);

        let sent = mailer.0.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "HIGH Priority: Fire");
        assert_eq!(sent[0].1, vec!["ops@example.org".to_string()]);
    }

    #[tokio::test]
    async fn mail_failure_is_swallowed() {
        let f = fanout(Arc::new(DisabledMailer), vec!["ops@example.org".into()]);
        assert!(!f.alert_if_urgent(&incident(Urgency::High)).await);
    }

    #[tokio::test]
    async fn update_event_carries_delta() {
        let f = fanout(Arc::new(DisabledMailer), vec![]);
        let mut sub = f.subscribe();
        let id = Uuid::new_v4();
        f.publish_updated(
            id,
            IncidentUpdate {
                archived: Some(true),
                ..Default::default()
            },
        );
        let ev = sub.recv().await.unwrap();
        assert_eq!(ev.name(), "incident_updated");
        assert_eq!(
            serde_json::to_value(&ev).unwrap(),
            serde_json::json!({ "incident_id": id, "update": { "archived": true } })
        );
    }
}
