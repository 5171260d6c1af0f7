// src/error.rs
//! Error taxonomy for the ingestion pipeline and lifecycle commands.
//!
//! Two layers:
//! - [`DependencyError`] is what every external collaborator call returns. The pipeline
//!   absorbs it locally by substituting a fallback value and recording a degradation.
//! - [`IncidentError`] is what callers of ingestion and lifecycle commands can see.

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Failure of a single collaborator call (classifier, embedder, stores, mailer).
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DependencyError {
    #[error("{stage} timed out after {after_ms} ms")]
    Timeout { stage: &'static str, after_ms: u64 },

    #[error("{stage} failed: {message}")]
    Failed { stage: &'static str, message: String },

    #[error("{stage} returned malformed data: {message}")]
    Malformed { stage: &'static str, message: String },
}

impl DependencyError {
    pub fn failed(stage: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Failed {
            stage,
            message: err.to_string(),
        }
    }

    pub fn malformed(stage: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Malformed {
            stage,
            message: err.to_string(),
        }
    }

    pub fn stage(&self) -> &'static str {
        match self {
            Self::Timeout { stage, .. } | Self::Failed { stage, .. } | Self::Malformed { stage, .. } => {
                stage
            }
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Errors surfaced to callers of ingestion and lifecycle operations.
#[derive(Debug, Error)]
pub enum IncidentError {
    /// Unsupported evidence, oversized batch, empty or unparseable content.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("incident {0} not found")]
    NotFound(Uuid),

    /// Archived records are terminal; no transitions are defined on them.
    #[error("incident {0} is archived")]
    Archived(Uuid),

    /// The metadata store could not serve a command (lifecycle path only).
    #[error("store unavailable: {0}")]
    Store(#[from] DependencyError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IncidentError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

/// One absorbed collaborator failure, as reported to the caller.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Degradation {
    pub stage: &'static str,
    pub reason: String,
    pub timed_out: bool,
}

impl From<&DependencyError> for Degradation {
    fn from(err: &DependencyError) -> Self {
        Self {
            stage: err.stage(),
            reason: err.to_string(),
            timed_out: err.is_timeout(),
        }
    }
}
