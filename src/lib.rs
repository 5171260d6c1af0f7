// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod admin;
pub mod analyze;
pub mod api;
pub mod bootstrap;
pub mod chat;
pub mod config;
pub mod dedup;
pub mod error;
pub mod evidence;
pub mod geotag;
pub mod incident;
pub mod ingest;
pub mod lifecycle;
pub mod metrics;
pub mod notify;
pub mod persist;
pub mod query;
pub mod stage;
pub mod store;
pub mod urgency;

// ---- Re-exports for stable public API ----
pub use crate::api::{create_router, AppState};
pub use crate::error::{DependencyError, IncidentError};
pub use crate::incident::{Incident, IncidentType, Status, Urgency};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber: `RUST_LOG` filter (default `incident_pipeline=info,warn`),
/// compact output, or JSON lines when `LOG_FORMAT=json`. A subscriber installed earlier
/// (e.g. by the Shuttle runtime) is left in place.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("incident_pipeline=info,warn"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    let res = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
