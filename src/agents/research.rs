//! Simulated research: no search engine is contacted.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::capability::{Capability, CapabilityHandler, Response, Slots, slot};
use crate::error::AgentError;
use crate::store::MemoryHandle;

/// Preference key holding the user's preferred detail level (`brief` or `detailed`).
pub const DETAIL_PREFERENCE: &str = "research.detail";

#[derive(Default)]
pub struct ResearchHandler;

impl ResearchHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CapabilityHandler for ResearchHandler {
    fn capability(&self) -> Capability {
        Capability::Research
    }

    async fn handle(
        &self,
        slots: &Slots,
        memory: &MemoryHandle,
        _timeout: Duration,
    ) -> Result<Response, AgentError> {
        let Some(query) = slot(slots, "query") else {
            return Ok(Response::real(
                "What would you like me to research? Try \"research <topic>\".",
            ));
        };
        let detailed = memory.get_preference(DETAIL_PREFERENCE).await?.as_deref() == Some("detailed");

        let sources = vec![
            json!({ "title": format!("Article about {query}"), "url": "https://example.com/1" }),
            json!({ "title": format!("Guide to {query}"), "url": "https://example.com/2" }),
        ];
        let mut key_points = vec![
            format!("Key insight 1 about {query}"),
            format!("Key insight 2 about {query}"),
        ];
        if detailed {
            key_points.push(format!("Recommended next step for {query}"));
        }

        let mut summary = format!("Found information about: {query}");
        for point in &key_points {
            summary.push_str(&format!("\n- {point}"));
        }

        Ok(Response::simulated(summary)
            .with_payload(json!({
                "query": query,
                "sources": sources,
                "key_points": key_points,
            }))
            .with_actions([format!("Searched for '{query}'"), "Analyzed results".to_string()]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::store::{LibSqlBackend, MemoryStore};

    #[tokio::test]
    async fn research_is_simulated_with_sources() {
        let store: Arc<dyn MemoryStore> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let memory = MemoryHandle::for_capability(store, Capability::Research);
        let slots: Slots = [("query".to_string(), "tide pools".to_string())].into();

        let resp = ResearchHandler::new()
            .handle(&slots, &memory, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(resp.simulated);
        assert!(resp.summary.starts_with("Found information about: tide pools"));
        let payload = resp.structured_payload.unwrap();
        assert_eq!(payload["sources"].as_array().unwrap().len(), 2);
        assert_eq!(payload["key_points"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn detail_preference_adds_points() {
        let store: Arc<dyn MemoryStore> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        store.set_preference(DETAIL_PREFERENCE, "detailed").await.unwrap();
        let memory = MemoryHandle::for_capability(store, Capability::Research);
        let slots: Slots = [("query".to_string(), "tide pools".to_string())].into();

        let resp = ResearchHandler::new()
            .handle(&slots, &memory, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(resp.structured_payload.unwrap()["key_points"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn missing_query_asks_for_one() {
        let store: Arc<dyn MemoryStore> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let memory = MemoryHandle::for_capability(store, Capability::Research);
        let resp = ResearchHandler::new()
            .handle(&Slots::new(), &memory, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(!resp.simulated);
        assert!(resp.summary.starts_with("What would you like me to research?"));
    }
}
