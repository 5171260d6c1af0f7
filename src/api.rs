// src/api.rs
//! HTTP surface. Handlers translate JSON to pipeline calls and back; the presentation
//! aliases (`lat`/`lng`/`latitude`/`longitude`, text `location`, `timestamp`) live here only.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_stream::{Stream, StreamExt};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::admin;
use crate::chat::{ChatReply, ChatService};
use crate::error::{Degradation, IncidentError};
use crate::evidence::{DocumentEvidence, Evidence, ImageEvidence, SocialEvidence, TextEvidence};
use crate::incident::{Incident, IncidentType, Source, Status, Urgency};
use crate::ingest::{BatchReport, IngestOutcome, IngestionCoordinator};
use crate::lifecycle::LifecycleStateMachine;
use crate::notify::NotificationFanout;
use crate::query::{QueryService, DEFAULT_LIMIT};
use crate::stage::with_deadline;
use crate::store::{MetadataStore, VectorIndex};

const DASHBOARD_LIMIT: usize = 1000;
const ARCHIVE_PAGE: usize = 100;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<IngestionCoordinator>,
    pub lifecycle: Arc<LifecycleStateMachine>,
    pub query: Arc<QueryService>,
    pub chat: Arc<ChatService>,
    pub fanout: NotificationFanout,
    pub metadata: Arc<dyn MetadataStore>,
    pub vectors: Arc<dyn VectorIndex>,
    pub metadata_deadline: Duration,
    pub vector_deadline: Duration,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/analyze/image", post(analyze_image))
        .route("/analyze/text", post(analyze_text))
        .route("/analyze/document", post(analyze_document))
        .route("/social/analyze", post(analyze_social))
        .route("/social/monitor/start", post(monitor_start))
        .route("/social/monitor/stop", post(monitor_stop))
        .route("/batch/upload", post(batch_upload))
        .route("/status/{id}", put(update_status))
        .route("/verify/{id}", post(verify))
        .route("/incidents/{id}", get(get_incident))
        .route("/archived", get(list_archived))
        .route("/dashboard", get(dashboard))
        .route("/query", post(query))
        .route("/chat", post(chat))
        .route("/events", get(events))
        .route("/admin/incidents", delete(clear_incidents))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError(pub IncidentError);

impl From<IncidentError> for ApiError {
    fn from(e: IncidentError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            IncidentError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            IncidentError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            IncidentError::Archived(_) => (StatusCode::CONFLICT, "archived"),
            IncidentError::Store(_) => (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable"),
            IncidentError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };
        if status.is_server_error() {
            tracing::warn!(target: "api", error = %self.0, "request failed");
        }
        let body = ErrorBody {
            error: code,
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| IncidentError::validation(format!("invalid incident id {raw:?}")).into())
}

// ---------------------------------------------------------------------------
// Presentation
// ---------------------------------------------------------------------------

/// Incident as served over HTTP, with the legacy field aliases older clients read.
#[derive(Debug, Serialize)]
pub struct IncidentView {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub incident_type: IncidentType,
    pub confidence: f64,
    pub urgency: Urgency,
    pub description: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    /// Place name, or formatted coordinates when there is none.
    pub location: Option<String>,
    pub location_text: Option<String>,
    pub people_affected: u32,
    pub evidence_ref: Option<String>,
    pub source: Source,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_detail: Option<String>,
    pub analysis_degraded: bool,
    pub status: Status,
    pub verified: bool,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub timestamp: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub archived_at: Option<DateTime<Utc>>,
}

impl From<&Incident> for IncidentView {
    fn from(i: &Incident) -> Self {
        let lat = i.location.map(|p| p.latitude);
        let lng = i.location.map(|p| p.longitude);
        let location = i.location_text.clone().or_else(|| {
            i.location
                .map(|p| format!("Location ({:.4}, {:.4})", p.latitude, p.longitude))
        });
        Self {
            id: i.id,
            incident_type: i.incident_type,
            confidence: i.confidence,
            urgency: i.urgency,
            description: i.description.clone(),
            latitude: lat,
            longitude: lng,
            lat,
            lng,
            location,
            location_text: i.location_text.clone(),
            people_affected: i.people_affected,
            evidence_ref: i.evidence_ref.clone(),
            source: i.source,
            source_detail: i.source_detail.clone(),
            analysis_degraded: i.analysis_degraded,
            status: i.status,
            verified: i.verified,
            archived: i.archived,
            created_at: i.created_at,
            updated_at: i.updated_at,
            timestamp: i.created_at,
            verified_at: i.verified_at,
            resolved_at: i.resolved_at,
            archived_at: i.archived_at,
        }
    }
}

/// The canonical incident at the top level, with the ingestion report alongside.
#[derive(Debug, Serialize)]
pub struct CreatedResponse {
    pub success: bool,
    pub duplicate: bool,
    pub persisted: bool,
    pub degraded: Vec<Degradation>,
    #[serde(flatten)]
    pub incident: IncidentView,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum IngestResponse {
    Created(CreatedResponse),
    Duplicate {
        success: bool,
        duplicate: bool,
        existing_incident: IncidentView,
        distance_meters: f64,
        message: String,
        degraded: Vec<Degradation>,
    },
}

impl From<IngestOutcome> for IngestResponse {
    fn from(o: IngestOutcome) -> Self {
        match o {
            IngestOutcome::Created {
                incident,
                persisted,
                degraded,
            } => IngestResponse::Created(CreatedResponse {
                success: true,
                duplicate: false,
                persisted,
                degraded,
                incident: IncidentView::from(&incident),
            }),
            IngestOutcome::Duplicate {
                existing_incident,
                distance_meters,
                degraded,
            } => IngestResponse::Duplicate {
                success: true,
                duplicate: true,
                message: format!(
                    "Similar {} incident already reported {:.0} m away",
                    existing_incident.incident_type.as_str(),
                    distance_meters
                ),
                existing_incident: IncidentView::from(&existing_incident),
                distance_meters,
                degraded,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Ingestion
// ---------------------------------------------------------------------------

async fn ingest(state: &AppState, evidence: Evidence) -> ApiResult<IngestResponse> {
    let outcome = state.coordinator.ingest(evidence).await?;
    Ok(Json(outcome.into()))
}

async fn analyze_image(
    State(state): State<AppState>,
    Json(body): Json<ImageEvidence>,
) -> ApiResult<IngestResponse> {
    ingest(&state, Evidence::Image(body)).await
}

async fn analyze_text(
    State(state): State<AppState>,
    Json(body): Json<TextEvidence>,
) -> ApiResult<IngestResponse> {
    ingest(&state, Evidence::Text(body)).await
}

async fn analyze_document(
    State(state): State<AppState>,
    Json(body): Json<DocumentEvidence>,
) -> ApiResult<IngestResponse> {
    ingest(&state, Evidence::Document(body)).await
}

async fn analyze_social(
    State(state): State<AppState>,
    Json(body): Json<SocialEvidence>,
) -> ApiResult<IngestResponse> {
    ingest(&state, Evidence::Social(body)).await
}

#[derive(Deserialize)]
struct BatchReq {
    #[serde(default)]
    items: Vec<Value>,
}

async fn batch_upload(
    State(state): State<AppState>,
    Json(body): Json<BatchReq>,
) -> ApiResult<BatchReport> {
    Ok(Json(state.coordinator.ingest_batch(body.items).await?))
}

#[derive(Serialize)]
struct MonitorResp {
    monitoring: bool,
    status: &'static str,
}

async fn monitor_start(State(state): State<AppState>) -> Json<MonitorResp> {
    let was = state.fanout.registry().set_monitoring(true);
    Json(MonitorResp {
        monitoring: true,
        status: if was { "already_running" } else { "started" },
    })
}

async fn monitor_stop(State(state): State<AppState>) -> Json<MonitorResp> {
    let was = state.fanout.registry().set_monitoring(false);
    Json(MonitorResp {
        monitoring: false,
        status: if was { "stopped" } else { "not_running" },
    })
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct StatusReq {
    status: String,
}

#[derive(Serialize)]
struct LifecycleResp {
    success: bool,
    archived: bool,
    incident: IncidentView,
}

fn lifecycle_resp(incident: Incident) -> Json<LifecycleResp> {
    Json(LifecycleResp {
        success: true,
        archived: incident.archived,
        incident: IncidentView::from(&incident),
    })
}

async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<StatusReq>,
) -> ApiResult<LifecycleResp> {
    let id = parse_id(&id)?;
    let incident = state.lifecycle.update_status(id, &body.status).await?;
    Ok(lifecycle_resp(incident))
}

async fn verify(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<LifecycleResp> {
    let id = parse_id(&id)?;
    let incident = state.lifecycle.verify(id).await?;
    Ok(lifecycle_resp(incident))
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

async fn get_incident(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<IncidentView> {
    let id = parse_id(&id)?;
    let d = state.metadata_deadline;
    let found = match with_deadline("metadata_store", d, state.metadata.get(id))
        .await
        .map_err(IncidentError::from)?
    {
        Some(i) => Some(i),
        None => with_deadline("metadata_store", d, state.metadata.get_archived(id))
            .await
            .map_err(IncidentError::from)?,
    };
    found
        .map(|i| Json(IncidentView::from(&i)))
        .ok_or_else(|| IncidentError::NotFound(id).into())
}

#[derive(Deserialize)]
struct ListParams {
    limit: Option<usize>,
}

#[derive(Serialize)]
struct ArchivedResp {
    incidents: Vec<IncidentView>,
    count: usize,
}

async fn list_archived(
    State(state): State<AppState>,
    Query(p): Query<ListParams>,
) -> ApiResult<ArchivedResp> {
    let limit = p.limit.unwrap_or(ARCHIVE_PAGE).clamp(1, DASHBOARD_LIMIT);
    let rows = with_deadline(
        "metadata_store",
        state.metadata_deadline,
        state.metadata.list_archived(limit),
    )
    .await
    .map_err(IncidentError::from)?;
    let incidents: Vec<IncidentView> = rows.iter().map(IncidentView::from).collect();
    Ok(Json(ArchivedResp {
        count: incidents.len(),
        incidents,
    }))
}

#[derive(Serialize)]
struct DashboardStats {
    total_incidents: usize,
    high_urgency: usize,
    by_status: BTreeMap<&'static str, usize>,
    archived: usize,
}

#[derive(Serialize)]
struct DashboardResp {
    incidents: Vec<IncidentView>,
    stats: DashboardStats,
}

async fn dashboard(State(state): State<AppState>) -> ApiResult<DashboardResp> {
    let d = state.metadata_deadline;
    let active = with_deadline("metadata_store", d, state.metadata.list_active(DASHBOARD_LIMIT))
        .await
        .map_err(IncidentError::from)?;
    let archived = with_deadline("metadata_store", d, state.metadata.list_archived(usize::MAX))
        .await
        .map_err(IncidentError::from)?
        .len();

    let mut by_status: BTreeMap<&'static str, usize> =
        Status::ALL.iter().map(|s| (s.as_str(), 0)).collect();
    for i in &active {
        *by_status.entry(i.status.as_str()).or_default() += 1;
    }
    let stats = DashboardStats {
        total_incidents: active.len(),
        high_urgency: active.iter().filter(|i| i.urgency == Urgency::High).count(),
        by_status,
        archived,
    };
    Ok(Json(DashboardResp {
        incidents: active.iter().map(IncidentView::from).collect(),
        stats,
    }))
}

#[derive(Deserialize)]
struct QueryReq {
    query: String,
    #[serde(default)]
    limit: Option<usize>,
}

async fn query(State(state): State<AppState>, Json(body): Json<QueryReq>) -> ApiResult<Value> {
    let text = body.query.trim();
    if text.is_empty() {
        return Err(IncidentError::validation("query must not be empty").into());
    }
    let result = state
        .query
        .search(text, body.limit.unwrap_or(DEFAULT_LIMIT))
        .await;
    serde_json::to_value(result)
        .map(Json)
        .map_err(|e| IncidentError::Internal(e.to_string()).into())
}

#[derive(Deserialize)]
struct ChatReq {
    message: String,
}

async fn chat(State(state): State<AppState>, Json(body): Json<ChatReq>) -> ApiResult<ChatReply> {
    Ok(Json(state.chat.reply(&body.message).await?))
}

// ---------------------------------------------------------------------------
// Real-time + admin
// ---------------------------------------------------------------------------

async fn events(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = state.fanout.subscribe();
    let stream = subscription.filter_map(|ev| {
        let name = ev.name();
        match serde_json::to_string(&ev) {
            Ok(data) => Some(Ok(Event::default().event(name).data(data))),
            Err(e) => {
                tracing::warn!(target: "api", error = %e, "event not serialisable");
                None
            }
        }
    });
    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

async fn clear_incidents(State(state): State<AppState>) -> ApiResult<admin::ClearSummary> {
    let deadlines = admin::ClearDeadlines {
        metadata: state.metadata_deadline,
        vector: state.vector_deadline,
    };
    let summary =
        admin::clear_all(&state.metadata, &state.vectors, deadlines, Some(&state.fanout)).await?;
    Ok(Json(summary))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "subscribers": state.fanout.registry().len(),
        "monitoring": state.fanout.registry().monitoring(),
        "assistant": state.chat.assistant_name(),
    }))
}
