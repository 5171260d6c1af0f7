// src/metrics.rs
use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "incident_ingest_total",
            "Evidence submissions that completed the pipeline, by source."
        );
        describe_counter!(
            "incident_duplicates_total",
            "Submissions suppressed as duplicates of an active incident."
        );
        describe_counter!(
            "incident_stage_degraded_total",
            "Collaborator calls that timed out or failed and used a fallback, by stage."
        );
        describe_counter!(
            "incident_archived_total",
            "Incidents moved to the archive after being resolved and verified."
        );
        describe_counter!("incident_alerts_sent_total", "High-urgency alert emails sent.");
        describe_counter!(
            "incident_chat_requests_total",
            "Operator assistant questions answered, by whether the reply degraded."
        );
        describe_histogram!(
            "incident_ingest_ms",
            "End-to-end ingestion time per submission in milliseconds."
        );
    });
}

#[derive(Clone)]
pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the process-wide Prometheus recorder on first call; later calls share it.
    pub fn init() -> Result<Self> {
        static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();
        let handle = HANDLE
            .get_or_try_init(|| {
                PrometheusBuilder::new()
                    .install_recorder()
                    .context("prometheus: install recorder")
            })?
            .clone();
        ensure_metrics_described();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
