// src/config/mod.rs
//! Application configuration (TOML).
//!
//! Lookup order:
//! 1) $INCIDENT_CONFIG_PATH
//! 2) config/incident_pipeline.toml
//! 3) built-in defaults
//!
//! Secrets are never stored in the file: fields set to "ENV" (or left empty) are read
//! from the environment by [`AppConfig::resolve`].

pub mod ai;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::dedup::{DEFAULT_RADIUS_M, DuplicateDetector};
use crate::incident::GeoPoint;
pub use ai::AiConfig;

const ENV_PATH: &str = "INCIDENT_CONFIG_PATH";
const DEFAULT_PATH: &str = "config/incident_pipeline.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub timeouts: TimeoutConfig,
    pub dedup: DedupConfig,
    pub location: LocationConfig,
    pub ai: AiConfig,
    pub vector: VectorConfig,
    pub storage: StorageConfig,
    pub alerts: AlertConfig,
    pub smtp: SmtpConfig,
    pub batch: BatchConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            timeouts: TimeoutConfig::default(),
            dedup: DedupConfig::default(),
            location: LocationConfig::default(),
            ai: AiConfig {
                api_key: "ENV".into(),
                ..AiConfig::default()
            },
            vector: VectorConfig::default(),
            storage: StorageConfig::default(),
            alerts: AlertConfig::default(),
            smtp: SmtpConfig::default(),
            batch: BatchConfig::default(),
        }
    }
}

/// Per-stage deadlines in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub image_analysis_ms: u64,
    pub text_analysis_ms: u64,
    pub embedding_ms: u64,
    pub object_store_ms: u64,
    pub metadata_ms: u64,
    pub vector_ms: u64,
    pub email_ms: u64,
    pub chat_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            image_analysis_ms: 5000,
            text_analysis_ms: 4000,
            embedding_ms: 3000,
            object_store_ms: 3000,
            metadata_ms: 3000,
            vector_ms: 3000,
            email_ms: 10_000,
            chat_ms: 8000,
        }
    }
}

impl TimeoutConfig {
    pub fn image_analysis(&self) -> Duration {
        Duration::from_millis(self.image_analysis_ms)
    }
    pub fn text_analysis(&self) -> Duration {
        Duration::from_millis(self.text_analysis_ms)
    }
    pub fn embedding(&self) -> Duration {
        Duration::from_millis(self.embedding_ms)
    }
    pub fn object_store(&self) -> Duration {
        Duration::from_millis(self.object_store_ms)
    }
    pub fn metadata(&self) -> Duration {
        Duration::from_millis(self.metadata_ms)
    }
    pub fn vector(&self) -> Duration {
        Duration::from_millis(self.vector_ms)
    }
    pub fn email(&self) -> Duration {
        Duration::from_millis(self.email_ms)
    }
    pub fn chat(&self) -> Duration {
        Duration::from_millis(self.chat_ms)
    }

    fn sanitize(&mut self) {
        let d = Self::default();
        for (v, def) in [
            (&mut self.image_analysis_ms, d.image_analysis_ms),
            (&mut self.text_analysis_ms, d.text_analysis_ms),
            (&mut self.embedding_ms, d.embedding_ms),
            (&mut self.object_store_ms, d.object_store_ms),
            (&mut self.metadata_ms, d.metadata_ms),
            (&mut self.vector_ms, d.vector_ms),
            (&mut self.email_ms, d.email_ms),
            (&mut self.chat_ms, d.chat_ms),
        ] {
            if *v == 0 {
                *v = def;
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub radius_m: f64,
    /// How many of the newest active incidents the duplicate scan reads.
    pub scan_limit: usize,
    /// Latitude used to scale longitude differences. Unset keeps the plain planar formula.
    pub reference_latitude: Option<f64>,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            radius_m: DEFAULT_RADIUS_M,
            scan_limit: 100,
            reference_latitude: None,
        }
    }
}

impl DedupConfig {
    pub fn detector(&self) -> DuplicateDetector {
        DuplicateDetector::new(self.radius_m, self.reference_latitude)
    }
}

/// Location assumed for images that carry no coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    pub default_latitude: f64,
    pub default_longitude: f64,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            default_latitude: 25.2048,
            default_longitude: 55.2708,
        }
    }
}

impl LocationConfig {
    pub fn default_point(&self) -> GeoPoint {
        GeoPoint::new(self.default_latitude, self.default_longitude)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    /// "memory" | "qdrant"
    pub backend: String,
    pub url: String,
    pub collection: String,
    /// "ENV" means: read from QDRANT_API_KEY
    pub api_key: String,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            backend: "memory".into(),
            url: "http://localhost:6333".into(),
            collection: "incidents".into(),
            api_key: "ENV".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON snapshot of the metadata store. Unset keeps everything in memory.
    pub snapshot_path: Option<PathBuf>,
    /// "local" | "supabase"
    pub object_store: String,
    pub local_dir: PathBuf,
    /// "ENV" means: read from SUPABASE_URL
    pub supabase_url: String,
    pub supabase_bucket: String,
    /// "ENV" means: read from SUPABASE_KEY
    pub supabase_key: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            snapshot_path: None,
            object_store: "local".into(),
            local_dir: PathBuf::from("data/evidence"),
            supabase_url: "ENV".into(),
            supabase_bucket: "incident-images".into(),
            supabase_key: "ENV".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub recipients: Vec<String>,
}

/// Empty fields are filled from SMTP_HOST, SMTP_USER, SMTP_PASS, ALERT_EMAIL_FROM.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpConfig {
    pub host: String,
    pub port: Option<u16>,
    pub user: String,
    pub pass: String,
    pub from: String,
}

impl SmtpConfig {
    pub fn is_configured(&self) -> bool {
        !self.host.is_empty() && !self.from.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub max_items: usize,
    pub concurrency: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_items: 100,
            concurrency: 4,
        }
    }
}

fn env_or(value: &str, var: &str) -> String {
    let v = value.trim();
    if v.is_empty() || v.eq_ignore_ascii_case("env") {
        std::env::var(var).unwrap_or_default().trim().to_string()
    } else {
        v.to_string()
    }
}

fn split_recipients(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string)
        .collect()
}

impl AppConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).context("parsing incident pipeline config")
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// Load using env var + fallbacks, then resolve secrets and sanitise.
    pub fn load() -> Result<Self> {
        let cfg = if let Ok(p) = std::env::var(ENV_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_PATH} points to non-existent path"));
            }
            Self::load_from(&pb)?
        } else if Path::new(DEFAULT_PATH).exists() {
            Self::load_from(Path::new(DEFAULT_PATH))?
        } else {
            tracing::info!("no config file found, using defaults");
            Self::default()
        };
        Ok(cfg.resolve())
    }

    /// Apply environment overrides and replace out-of-range values with defaults.
    pub fn resolve(mut self) -> Self {
        self.ai = self.ai.resolve();
        self.vector.backend = self.vector.backend.trim().to_lowercase();
        self.vector.api_key = env_or(&self.vector.api_key, "QDRANT_API_KEY");
        self.storage.object_store = self.storage.object_store.trim().to_lowercase();
        self.storage.supabase_url = env_or(&self.storage.supabase_url, "SUPABASE_URL");
        self.storage.supabase_key = env_or(&self.storage.supabase_key, "SUPABASE_KEY");

        if let Ok(list) = std::env::var("ALERT_EMAILS") {
            self.alerts.recipients = split_recipients(&list);
        }
        self.alerts.recipients = self
            .alerts
            .recipients
            .iter()
            .flat_map(|r| split_recipients(r))
            .collect();

        self.smtp.host = env_or(&self.smtp.host, "SMTP_HOST");
        self.smtp.user = env_or(&self.smtp.user, "SMTP_USER");
        self.smtp.pass = env_or(&self.smtp.pass, "SMTP_PASS");
        self.smtp.from = env_or(&self.smtp.from, "ALERT_EMAIL_FROM");

        self.sanitize();
        self
    }

    fn sanitize(&mut self) {
        self.timeouts.sanitize();

        if !(self.dedup.radius_m.is_finite() && self.dedup.radius_m > 0.0) {
            self.dedup.radius_m = DEFAULT_RADIUS_M;
        }
        if self.dedup.scan_limit == 0 {
            self.dedup.scan_limit = DedupConfig::default().scan_limit;
        }
        self.dedup.reference_latitude = self
            .dedup
            .reference_latitude
            .filter(|l| l.is_finite())
            .map(|l| l.clamp(-89.0, 89.0));

        if !self.location.default_point().is_valid() {
            self.location = LocationConfig::default();
        }

        let b = BatchConfig::default();
        if self.batch.max_items == 0 {
            self.batch.max_items = b.max_items;
        }
        self.batch.concurrency = self.batch.concurrency.clamp(1, 32);
    }
}
