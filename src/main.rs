//! Incident pipeline service: binary entrypoint.
//! Boots the Axum HTTP server, wiring configuration, collaborators, routes and metrics.

use anyhow::Context;
use incident_pipeline::{bootstrap, config::AppConfig, create_router, init_tracing, metrics::Metrics};
use shuttle_axum::ShuttleAxum;

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = AppConfig::load().context("loading configuration")?;
    let metrics = Metrics::init()?;
    let state = bootstrap::build_state(&cfg)
        .await
        .context("building application state")?;

    tracing::info!(
        vector = %cfg.vector.backend,
        objects = %cfg.storage.object_store,
        max_batch = cfg.batch.max_items,
        "incident pipeline ready"
    );

    let router = create_router(state).merge(metrics.router());
    Ok(router.into())
}
