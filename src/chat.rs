// src/chat.rs
//! Operator assistant: free-form questions answered over the most recent active incidents.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::info;

use crate::analyze::Assistant;
use crate::error::{Degradation, IncidentError};
use crate::incident::Incident;
use crate::stage::{with_deadline, Staged};
use crate::store::MetadataStore;

/// Incidents handed to the assistant as context, newest first.
pub const CONTEXT_INCIDENTS: usize = 20;
pub const FALLBACK_REPLY: &str =
    "I'm having trouble processing your request right now. Please try again shortly.";
const MAX_MESSAGE_CHARS: usize = 2000;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatReply {
    pub message: String,
    pub response: String,
    pub incidents_considered: usize,
    /// The reply or its context fell back.
    pub degraded: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub degradations: Vec<Degradation>,
}

#[derive(Clone)]
pub struct ChatService {
    assistant: Arc<dyn Assistant>,
    metadata: Arc<dyn MetadataStore>,
    metadata_deadline: Duration,
    deadline: Duration,
}

impl ChatService {
    pub fn new(
        assistant: Arc<dyn Assistant>,
        metadata: Arc<dyn MetadataStore>,
        metadata_deadline: Duration,
        deadline: Duration,
    ) -> Self {
        Self {
            assistant,
            metadata,
            metadata_deadline,
            deadline,
        }
    }

    pub fn assistant_name(&self) -> &'static str {
        self.assistant.name()
    }

    /// Only an empty message is an error; store and assistant failures degrade the reply.
    pub async fn reply(&self, message: &str) -> Result<ChatReply, IncidentError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(IncidentError::validation("message must not be empty"));
        }
        let message: String = message.chars().take(MAX_MESSAGE_CHARS).collect();

        let res = with_deadline(
            "metadata_store",
            self.metadata_deadline,
            self.metadata.list_active(CONTEXT_INCIDENTS),
        )
        .await;
        let recent = Staged::or_fallback(res, Vec::new);
        let context = context_json(&recent.value);

        let res = with_deadline(
            "assistant",
            self.deadline,
            self.assistant.answer(&message, &context),
        )
        .await;
        let answer = Staged::or_fallback(res, || FALLBACK_REPLY.to_string());

        let degradations: Vec<Degradation> = [recent.degradation(), answer.degradation()]
            .into_iter()
            .flatten()
            .collect();
        let degraded = !degradations.is_empty();
        info!(
            assistant = self.assistant.name(),
            incidents = recent.value.len(),
            degraded,
            "chat answered"
        );
        metrics::counter!(
            "incident_chat_requests_total",
            "degraded" => if degraded { "true" } else { "false" }
        )
        .increment(1);

        Ok(ChatReply {
            message,
            response: answer.value,
            incidents_considered: recent.value.len(),
            degraded,
            degradations,
        })
    }
}

fn context_json(incidents: &[Incident]) -> String {
    serde_json::to_string(incidents).unwrap_or_else(|_| "[]".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::{DisabledAssistant, MockAssistant};
    use crate::error::DependencyError;
    use crate::incident::{IncidentType, NewIncident, Source, Urgency};
    use crate::store::MemoryMetadataStore;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Capturing {
        seen: Mutex<Option<serde_json::Value>>,
    }

    #[async_trait]
    impl Assistant for Capturing {
        async fn answer(&self, _: &str, context: &str) -> Result<String, DependencyError> {
            *self.seen.lock() = serde_json::from_str(context).ok();
            Ok("noted".into())
        }
        fn name(&self) -> &'static str {
            "capturing"
        }
    }

    struct Stalled;

    #[async_trait]
    impl Assistant for Stalled {
        async fn answer(&self, _: &str, _: &str) -> Result<String, DependencyError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("too late".into())
        }
        fn name(&self) -> &'static str {
            "stalled"
        }
    }

    fn report(desc: &str) -> NewIncident {
        NewIncident {
            incident_type: IncidentType::Fire,
            confidence: 0.8,
            urgency: Urgency::Medium,
            description: desc.into(),
            location: None,
            location_text: None,
            people_affected: 0,
            evidence_ref: None,
            source: Source::Text,
            source_detail: None,
            analysis_degraded: false,
        }
    }

    fn service(assistant: Arc<dyn Assistant>, store: Arc<MemoryMetadataStore>) -> ChatService {
        ChatService::new(assistant, store, Duration::from_secs(1), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn context_is_the_newest_twenty() {
        let store = Arc::new(MemoryMetadataStore::new());
        for n in 0..25 {
            store.insert(report(&format!("report {n}"))).await.unwrap();
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        let capturing = Arc::new(Capturing::default());
        let out = service(capturing.clone(), store).reply("what is burning?").await.unwrap();

        assert!(!out.degraded);
        assert_eq!(out.response, "noted");
        assert_eq!(out.incidents_considered, CONTEXT_INCIDENTS);
        let seen = capturing.seen.lock().clone().unwrap();
        let seen = seen.as_array().unwrap();
        assert_eq!(seen.len(), CONTEXT_INCIDENTS);
        assert_eq!(seen[0]["description"], "report 24");
        assert_eq!(seen[19]["description"], "report 5");
    }

    #[tokio::test]
    async fn failing_provider_gets_fallback_reply() {
        let store = Arc::new(MemoryMetadataStore::new());
        store.insert(report("warehouse fire")).await.unwrap();
        let out = service(Arc::new(DisabledAssistant), store).reply("status?").await.unwrap();
        assert!(out.degraded);
        assert_eq!(out.response, FALLBACK_REPLY);
        assert_eq!(out.incidents_considered, 1);
        assert_eq!(out.degradations[0].stage, "assistant");
    }

    #[tokio::test(start_paused = true)]
    async fn slow_provider_is_cut_off() {
        let store = Arc::new(MemoryMetadataStore::new());
        let out = service(Arc::new(Stalled), store).reply("anything new?").await.unwrap();
        assert_eq!(out.response, FALLBACK_REPLY);
        assert!(out.degradations[0].timed_out);
    }

    #[tokio::test]
    async fn mock_answer_and_blank_message() {
        let store = Arc::new(MemoryMetadataStore::new());
        store.insert(report("a")).await.unwrap();
        store.insert(report("b")).await.unwrap();
        let chat = service(Arc::new(MockAssistant), store);

        let out = chat.reply("  how many?  ").await.unwrap();
        assert_eq!(out.message, "how many?");
        assert!(out.response.starts_with("2 active incidents"));

        let err = chat.reply("   ").await.unwrap_err();
        assert!(matches!(err, IncidentError::Validation(_)));
    }
}
