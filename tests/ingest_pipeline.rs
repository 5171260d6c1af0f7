// tests/ingest_pipeline.rs
// End-to-end ingestion against in-memory collaborators and failure doubles.

mod common;

use std::sync::Arc;

use common::*;
use incident_pipeline::config::AppConfig;
use incident_pipeline::evidence::{Evidence, ImageEvidence, TextEvidence};
use incident_pipeline::incident::{IncidentType, Source, Urgency};
use incident_pipeline::ingest::IngestOutcome;
use incident_pipeline::notify::RealtimeEvent;

fn text_at(text: &str, lat: f64, lng: f64) -> Evidence {
    Evidence::Text(TextEvidence {
        text: text.into(),
        latitude: Some(lat),
        longitude: Some(lng),
    })
}

fn text(text: &str) -> Evidence {
    Evidence::Text(TextEvidence {
        text: text.into(),
        latitude: None,
        longitude: None,
    })
}

#[tokio::test]
async fn nearby_same_type_report_is_suppressed() {
    let state = state(collaborators(fixed(IncidentType::Fire, 0.9)));
    let c = &state.coordinator;

    let first = c
        .ingest(text_at("warehouse on fire", 25.2048, 55.2708))
        .await
        .unwrap();
    assert!(!first.is_duplicate());
    let first_id = first.incident().id;

    let second = c
        .ingest(text_at("flames near the warehouse", 25.2049, 55.2709))
        .await
        .unwrap();
    match second {
        IngestOutcome::Duplicate {
            existing_incident,
            distance_meters,
            ..
        } => {
            assert_eq!(existing_incident.id, first_id);
            assert!(distance_meters < 100.0, "distance {distance_meters}");
        }
        other => panic!("expected duplicate, got {other:?}"),
    }

    let far = c
        .ingest(text_at("another fire across town", 25.30, 55.40))
        .await
        .unwrap();
    assert!(!far.is_duplicate());
    assert_ne!(far.incident().id, first_id);

    let active = state.metadata.list_active(10).await.unwrap();
    assert_eq!(active.len(), 2);
}

#[tokio::test]
async fn reports_without_location_are_never_deduplicated() {
    let state = state(collaborators(fixed(IncidentType::Flood, 0.8)));
    let a = state.coordinator.ingest(text("street flooded")).await.unwrap();
    let b = state.coordinator.ingest(text("street flooded")).await.unwrap();
    assert!(!a.is_duplicate());
    assert!(!b.is_duplicate());
    assert_ne!(a.incident().id, b.incident().id);
}

#[tokio::test]
async fn vector_index_outage_still_creates_incident() {
    let mut c = collaborators(fixed(IncidentType::Flood, 0.8));
    c.vectors = Arc::new(FailingVectorIndex);
    let state = state(c);

    let out = state.coordinator.ingest(text("underpass flooded")).await.unwrap();
    let IngestOutcome::Created {
        incident,
        persisted,
        degraded,
    } = out
    else {
        panic!("expected created");
    };
    assert!(persisted);
    assert!(degraded.iter().any(|d| d.stage == "vector_index"));
    assert!(state.metadata.get(incident.id).await.unwrap().is_some());
}

#[tokio::test]
async fn metadata_outage_yields_local_incident_without_broadcast() {
    let mut c = collaborators(fixed(IncidentType::Smoke, 0.75));
    c.metadata = Arc::new(FailingMetadataStore);
    let state = state(c);
    let mut sub = state.fanout.subscribe();

    let out = state.coordinator.ingest(text("smoke over the port")).await.unwrap();
    let IngestOutcome::Created {
        incident,
        persisted,
        degraded,
    } = out
    else {
        panic!("expected created");
    };
    assert!(!persisted);
    assert_eq!(incident.urgency, Urgency::Medium);
    assert!(degraded.iter().any(|d| d.stage == "metadata_store"));
    assert!(sub.try_recv().is_none());
}

#[tokio::test(start_paused = true)]
async fn slow_classifier_falls_back_to_unknown() {
    let mut cfg = AppConfig::default();
    cfg.timeouts.text_analysis_ms = 50;
    let state = state_with(&cfg, collaborators(Arc::new(SlowClassifier)));

    let out = state
        .coordinator
        .ingest(text("something is happening downtown"))
        .await
        .unwrap();
    let incident = out.incident();
    assert_eq!(incident.incident_type, IncidentType::Unknown);
    assert_eq!(incident.confidence, 0.0);
    assert_eq!(incident.urgency, Urgency::Low);
    assert!(incident.analysis_degraded);
    assert_eq!(incident.description, "something is happening downtown");
    assert!(out
        .degraded()
        .iter()
        .any(|d| d.stage == "text_analysis" && d.timed_out));
}

#[tokio::test]
async fn high_urgency_incident_is_emailed_and_broadcast() {
    let mut cfg = AppConfig::default();
    cfg.alerts.recipients = vec!["ops@example.org".into()];
    let mailer = Arc::new(RecordingMailer::default());
    let mut c = collaborators(fixed(IncidentType::Fire, 0.92));
    c.mailer = mailer.clone();
    let state = state_with(&cfg, c);
    let mut sub = state.fanout.subscribe();

    let out = state.coordinator.ingest(text("tower block burning")).await.unwrap();
    assert_eq!(out.incident().urgency, Urgency::High);

    let sent = mailer.sent.lock();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "HIGH Priority: Fire");
    drop(sent);

    match sub.try_recv() {
        Some(RealtimeEvent::NewIncident(i)) => assert_eq!(i.id, out.incident().id),
        other => panic!("expected new_incident, got {other:?}"),
    }
}

#[tokio::test]
async fn medium_urgency_is_not_emailed() {
    let mut cfg = AppConfig::default();
    cfg.alerts.recipients = vec!["ops@example.org".into()];
    let mailer = Arc::new(RecordingMailer::default());
    let mut c = collaborators(fixed(IncidentType::PeopleInDanger, 0.95));
    c.mailer = mailer.clone();
    let state = state_with(&cfg, c);

    let out = state.coordinator.ingest(text("people trapped")).await.unwrap();
    assert_eq!(out.incident().urgency, Urgency::Medium);
    assert!(mailer.sent.lock().is_empty());
}

#[tokio::test]
async fn image_without_coordinates_uses_default_location_and_stores_evidence() {
    let state = state(collaborators(fixed(IncidentType::CollapsedBuilding, 0.88)));
    let out = state
        .coordinator
        .ingest(Evidence::Image(ImageEvidence {
            filename: Some("rubble.png".into()),
            // "fake png bytes"
            image_base64: "ZmFrZSBwbmcgYnl0ZXM=".into(),
            content_type: Some("image/png".into()),
            latitude: None,
            longitude: None,
        }))
        .await
        .unwrap();

    let incident = out.incident();
    assert_eq!(incident.source, Source::Image);
    let loc = incident.location.expect("default location");
    assert_eq!((loc.latitude, loc.longitude), (25.2048, 55.2708));
    let evidence = incident.evidence_ref.as_deref().unwrap();
    assert!(evidence.starts_with("file://"), "{evidence}");
    assert!(evidence.ends_with(".png"), "{evidence}");
}

#[tokio::test]
async fn invalid_evidence_is_rejected_before_any_write() {
    let state = state(collaborators(fixed(IncidentType::Fire, 0.9)));
    let err = state
        .coordinator
        .ingest(Evidence::Text(TextEvidence {
            text: "fire".into(),
            latitude: Some(120.0),
            longitude: Some(55.0),
        }))
        .await
        .unwrap_err();
    assert!(matches!(err, incident_pipeline::IncidentError::Validation(_)));
    assert!(state.metadata.list_active(10).await.unwrap().is_empty());
}
