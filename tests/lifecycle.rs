// tests/lifecycle.rs
mod common;

use std::sync::Arc;

use common::*;
use incident_pipeline::evidence::{Evidence, TextEvidence};
use incident_pipeline::incident::{IncidentType, Status};
use incident_pipeline::notify::RealtimeEvent;
use incident_pipeline::{AppState, IncidentError};
use uuid::Uuid;

async fn seeded() -> (AppState, Uuid) {
    let state = state(collaborators(fixed(IncidentType::Fire, 0.9)));
    let out = state
        .coordinator
        .ingest(Evidence::Text(TextEvidence {
            text: "shop fire on main street".into(),
            latitude: Some(25.2048),
            longitude: Some(55.2708),
        }))
        .await
        .unwrap();
    let id = out.incident().id;
    (state, id)
}

#[tokio::test]
async fn verify_then_resolve_archives() {
    let (state, id) = seeded().await;

    let verified = state.lifecycle.verify(id).await.unwrap();
    assert!(verified.verified);
    assert!(!verified.archived);

    let resolved = state.lifecycle.update_status(id, "resolved").await.unwrap();
    assert!(resolved.archived);
    assert!(resolved.archived_at.is_some());

    assert!(state.metadata.get(id).await.unwrap().is_none());
    assert!(state.metadata.get_archived(id).await.unwrap().is_some());
}

#[tokio::test]
async fn resolve_then_verify_archives() {
    let (state, id) = seeded().await;
    let mut sub = state.fanout.subscribe();

    let resolved = state.lifecycle.update_status(id, "resolved").await.unwrap();
    assert_eq!(resolved.status, Status::Resolved);
    assert!(resolved.resolved_at.is_some());
    assert!(!resolved.archived);

    let done = state.lifecycle.verify(id).await.unwrap();
    assert!(done.archived);

    let mut saw_archive = false;
    while let Some(ev) = sub.try_recv() {
        if let RealtimeEvent::IncidentUpdated { incident_id, update } = ev {
            assert_eq!(incident_id, id);
            saw_archive |= update.archived == Some(true);
        }
    }
    assert!(saw_archive);
}

#[tokio::test]
async fn single_condition_keeps_incident_active() {
    let (state, id) = seeded().await;
    state.lifecycle.update_status(id, "in_progress").await.unwrap();
    state.lifecycle.verify(id).await.unwrap();

    let active = state.metadata.get(id).await.unwrap().unwrap();
    assert!(active.verified);
    assert_eq!(active.status, Status::InProgress);
    assert!(!active.archived);
}

#[tokio::test]
async fn false_alarm_is_not_archived() {
    let (state, id) = seeded().await;
    state.lifecycle.verify(id).await.unwrap();
    let i = state.lifecycle.update_status(id, "false_alarm").await.unwrap();
    assert!(!i.archived);
    assert!(state.metadata.get(id).await.unwrap().is_some());
}

#[tokio::test]
async fn command_errors() {
    let (state, id) = seeded().await;

    let err = state.lifecycle.update_status(id, "closed").await.unwrap_err();
    assert!(matches!(err, IncidentError::Validation(_)));

    let err = state.lifecycle.verify(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, IncidentError::NotFound(_)));

    state.lifecycle.verify(id).await.unwrap();
    state.lifecycle.update_status(id, "resolved").await.unwrap();
    let err = state.lifecycle.update_status(id, "pending").await.unwrap_err();
    assert!(matches!(err, IncidentError::Archived(_)));
}

#[tokio::test]
async fn archived_incident_no_longer_blocks_new_reports() {
    let (state, id) = seeded().await;
    state.lifecycle.verify(id).await.unwrap();
    state.lifecycle.update_status(id, "resolved").await.unwrap();

    let again = state
        .coordinator
        .ingest(Evidence::Text(TextEvidence {
            text: "fire again on main street".into(),
            latitude: Some(25.2048),
            longitude: Some(55.2708),
        }))
        .await
        .unwrap();
    assert!(!again.is_duplicate());
}

#[tokio::test]
async fn concurrent_resolve_and_verify_both_land_and_archive() {
    let mut c = collaborators(fixed(IncidentType::Flood, 0.8));
    c.metadata = Arc::new(GatedStore::new(2));
    let state = state(c);
    let id = state
        .coordinator
        .ingest(Evidence::Text(TextEvidence {
            text: "river over the road".into(),
            latitude: None,
            longitude: None,
        }))
        .await
        .unwrap()
        .incident()
        .id;

    let (resolved, verified) = tokio::join!(
        state.lifecycle.update_status(id, "resolved"),
        state.lifecycle.verify(id)
    );
    let (resolved, verified) = (resolved.unwrap(), verified.unwrap());
    assert_eq!(
        [resolved.archived, verified.archived].iter().filter(|a| **a).count(),
        1
    );

    assert!(state.metadata.get(id).await.unwrap().is_none());
    let archived = state.metadata.get_archived(id).await.unwrap().unwrap();
    assert!(archived.verified);
    assert_eq!(archived.status, Status::Resolved);
    assert!(archived.resolved_at.is_some() && archived.verified_at.is_some());
}
