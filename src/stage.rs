// src/stage.rs
//! Deadline wrapper and the per-stage result type.
//!
//! Every collaborator call goes through [`with_deadline`]. A timeout is terminal for that
//! call (no retry); the caller substitutes a fallback via [`Staged::or_fallback`].

use std::future::Future;
use std::time::Duration;

use crate::error::{Degradation, DependencyError};

/// Run `fut` with a deadline. Elapsed deadlines become [`DependencyError::Timeout`].
pub async fn with_deadline<T, F>(
    stage: &'static str,
    deadline: Duration,
    fut: F,
) -> Result<T, DependencyError>
where
    F: Future<Output = Result<T, DependencyError>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(res) => res,
        Err(_) => Err(DependencyError::Timeout {
            stage,
            after_ms: deadline.as_millis() as u64,
        }),
    }
}

/// Output of one pipeline stage: the value to continue with, and whether it is genuine.
#[derive(Debug, Clone, PartialEq)]
pub struct Staged<T> {
    pub value: T,
    pub degraded: Option<DependencyError>,
}

impl<T> Staged<T> {
    pub fn genuine(value: T) -> Self {
        Self {
            value,
            degraded: None,
        }
    }

    /// Keep the genuine value, or log the failure and substitute `fallback`.
    pub fn or_fallback(res: Result<T, DependencyError>, fallback: impl FnOnce() -> T) -> Self {
        match res {
            Ok(value) => Self::genuine(value),
            Err(err) => {
                tracing::warn!(
                    target: "pipeline",
                    stage = err.stage(),
                    timed_out = err.is_timeout(),
                    error = %err,
                    "stage degraded, using fallback"
                );
                metrics::counter!("incident_stage_degraded_total", "stage" => err.stage())
                    .increment(1);
                Self {
                    value: fallback(),
                    degraded: Some(err),
                }
            }
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }

    pub fn degradation(&self) -> Option<Degradation> {
        self.degraded.as_ref().map(Degradation::from)
    }
}
