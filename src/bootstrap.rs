// src/bootstrap.rs
//! Wires configuration into collaborators and the shared application state.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::analyze::{
    build_assistant, build_classifier, build_embedder, AnalysisStage, Assistant, Classifier,
    Embedder, EmbeddingStage,
};
use crate::api::AppState;
use crate::chat::ChatService;
use crate::config::AppConfig;
use crate::ingest::IngestionCoordinator;
use crate::lifecycle::LifecycleStateMachine;
use crate::notify::{DisabledMailer, Mailer, NotificationFanout, SmtpMailer, SubscriberRegistry};
use crate::persist::{PersistenceDeadlines, PersistenceStage};
use crate::query::QueryService;
use crate::store::{
    LocalObjectStore, MemoryMetadataStore, MemoryVectorIndex, MetadataStore, ObjectStore,
    QdrantIndex, SupabaseObjectStore, VectorIndex,
};

/// Every external collaborator the pipeline talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub classifier: Arc<dyn Classifier>,
    pub embedder: Arc<dyn Embedder>,
    pub assistant: Arc<dyn Assistant>,
    pub metadata: Arc<dyn MetadataStore>,
    pub vectors: Arc<dyn VectorIndex>,
    pub objects: Arc<dyn ObjectStore>,
    pub mailer: Arc<dyn Mailer>,
}

impl Collaborators {
    pub async fn from_config(cfg: &AppConfig) -> Result<Self> {
        let metadata = open_metadata(cfg).await?;
        let vectors = build_vector_index(cfg);
        let objects = build_object_store(cfg);

        let mailer: Arc<dyn Mailer> = if cfg.smtp.is_configured() {
            Arc::new(SmtpMailer::from_config(&cfg.smtp)?)
        } else {
            if !cfg.alerts.recipients.is_empty() {
                warn!("alert recipients configured but SMTP is not; alerts disabled");
            }
            Arc::new(DisabledMailer)
        };

        let c = Self {
            classifier: build_classifier(&cfg.ai),
            embedder: build_embedder(&cfg.ai),
            assistant: build_assistant(&cfg.ai),
            metadata,
            vectors,
            objects,
            mailer,
        };
        // Safe diagnostics: only names and counts, never keys
        info!(
            classifier = c.classifier.name(),
            embedder = c.embedder.name(),
            assistant = c.assistant.name(),
            metadata = c.metadata.name(),
            vectors = c.vectors.name(),
            objects = c.objects.name(),
            mailer = c.mailer.name(),
            recipients = cfg.alerts.recipients.len(),
            "collaborators ready"
        );
        Ok(c)
    }
}

pub async fn open_metadata(cfg: &AppConfig) -> Result<Arc<dyn MetadataStore>> {
    Ok(match &cfg.storage.snapshot_path {
        Some(path) => Arc::new(
            MemoryMetadataStore::open(path)
                .await
                .with_context(|| format!("opening metadata snapshot {}", path.display()))?,
        ),
        None => Arc::new(MemoryMetadataStore::new()),
    })
}

pub fn build_vector_index(cfg: &AppConfig) -> Arc<dyn VectorIndex> {
    match cfg.vector.backend.as_str() {
        "qdrant" => Arc::new(QdrantIndex::new(
            &cfg.vector.url,
            &cfg.vector.collection,
            Some(cfg.vector.api_key.clone()),
        )),
        "memory" => Arc::new(MemoryVectorIndex::new()),
        other => {
            warn!(backend = other, "unknown vector backend, using in-memory index");
            Arc::new(MemoryVectorIndex::new())
        }
    }
}

fn build_object_store(cfg: &AppConfig) -> Arc<dyn ObjectStore> {
    let s = &cfg.storage;
    match s.object_store.as_str() {
        "supabase" if !s.supabase_url.is_empty() && !s.supabase_key.is_empty() => Arc::new(
            SupabaseObjectStore::new(&s.supabase_url, &s.supabase_bucket, s.supabase_key.clone()),
        ),
        "supabase" => {
            warn!("supabase object store selected without SUPABASE_URL/SUPABASE_KEY; storing locally");
            Arc::new(LocalObjectStore::new(&s.local_dir))
        }
        _ => Arc::new(LocalObjectStore::new(&s.local_dir)),
    }
}

/// Assemble the pipeline components around the given collaborators.
pub fn assemble(cfg: &AppConfig, c: Collaborators) -> AppState {
    let t = &cfg.timeouts;
    let fanout = NotificationFanout::new(
        Arc::new(SubscriberRegistry::default()),
        c.mailer,
        cfg.alerts.recipients.clone(),
        t.email(),
    );
    let embedding = EmbeddingStage::new(c.embedder, t.embedding());
    let persistence = PersistenceStage::new(
        c.metadata.clone(),
        c.vectors.clone(),
        c.objects,
        PersistenceDeadlines {
            metadata: t.metadata(),
            vector: t.vector(),
            object: t.object_store(),
        },
    );
    let coordinator = IngestionCoordinator::new(
        AnalysisStage::new(c.classifier, t.image_analysis(), t.text_analysis()),
        embedding.clone(),
        cfg.dedup.detector(),
        persistence,
        fanout.clone(),
        cfg.location.default_point(),
        cfg.dedup.scan_limit,
        cfg.batch.clone(),
    );
    let lifecycle = LifecycleStateMachine::new(c.metadata.clone(), fanout.clone(), t.metadata());
    let query = QueryService::new(embedding, c.vectors.clone(), t.vector());
    let chat = ChatService::new(c.assistant, c.metadata.clone(), t.metadata(), t.chat());

    AppState {
        coordinator: Arc::new(coordinator),
        lifecycle: Arc::new(lifecycle),
        query: Arc::new(query),
        chat: Arc::new(chat),
        fanout,
        metadata: c.metadata,
        vectors: c.vectors,
        metadata_deadline: t.metadata(),
        vector_deadline: t.vector(),
    }
}

/// Load collaborators from configuration and assemble the state.
pub async fn build_state(cfg: &AppConfig) -> Result<AppState> {
    let collaborators = Collaborators::from_config(cfg).await?;
    Ok(assemble(cfg, collaborators))
}
