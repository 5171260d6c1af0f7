//! Administrative tool: delete every active and archived incident and empty the vector index.
//!
//! Usage: `clear_incidents --yes`. Reads the same configuration as the service.

use anyhow::{bail, Context, Result};
use incident_pipeline::{admin, bootstrap, config::AppConfig, init_tracing};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    if !std::env::args().skip(1).any(|a| a == "--yes" || a == "-y") {
        bail!("refusing to delete all incidents without --yes");
    }

    let cfg = AppConfig::load().context("loading configuration")?;
    let metadata = bootstrap::open_metadata(&cfg).await?;
    let vectors = bootstrap::build_vector_index(&cfg);

    let deadlines = admin::ClearDeadlines {
        metadata: cfg.timeouts.metadata(),
        vector: cfg.timeouts.vector(),
    };
    let summary = admin::clear_all(&metadata, &vectors, deadlines, None).await?;
    println!(
        "cleared {} active and {} archived incidents (vector index cleared: {})",
        summary.active_removed, summary.archived_removed, summary.vectors_cleared
    );
    Ok(())
}
