//! End-to-end request handling against a real libSQL store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use tempfile::TempDir;
use uuid::Uuid;

use brainsaver::agents::builtin_registry;
use brainsaver::capability::{Capability, CapabilityHandler, CapabilityRegistry, Response, Slots};
use brainsaver::classifier::{CapabilityRule, DEFAULT_THRESHOLD, IntentClassifier};
use brainsaver::config::AssistantConfig;
use brainsaver::error::AgentError;
use brainsaver::orchestrator::{CLARIFICATION, Orchestrator, RequestState};
use brainsaver::store::{
    InteractionFilter, InteractionStatus, LibSqlBackend, MemoryHandle, MemoryStore,
    NewInteraction,
};

async fn memory_store() -> Arc<dyn MemoryStore> {
    Arc::new(LibSqlBackend::new_memory().await.unwrap())
}

fn builtin(store: Arc<dyn MemoryStore>) -> Orchestrator {
    let config = AssistantConfig::default();
    let registry = Arc::new(builtin_registry(&config).unwrap());
    Orchestrator::from_config(store, registry, &config).unwrap()
}

struct SlowResearch;

#[async_trait]
impl CapabilityHandler for SlowResearch {
    fn capability(&self) -> Capability {
        Capability::Research
    }

    async fn handle(
        &self,
        _slots: &Slots,
        _memory: &MemoryHandle,
        _timeout: Duration,
    ) -> Result<Response, AgentError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(Response::real("too late"))
    }
}

#[tokio::test]
async fn every_request_appends_one_interaction_in_order() {
    let store = memory_store().await;
    let orch = builtin(Arc::clone(&store));

    let requests = [
        "Check if example.com is online",
        "gibberish words nobody understands",
        "research the origins of sourdough",
        "",
        "sort the photos on my phone",
    ];
    for text in requests {
        orch.handle_request(text).await.unwrap();
    }

    let rows = store
        .query_interactions(&InteractionFilter::new())
        .await
        .unwrap();
    assert_eq!(rows.len(), requests.len());
    assert!(rows.windows(2).all(|w| w[0].id < w[1].id));
    for (row, text) in rows.iter().zip(requests) {
        assert_eq!(row.raw_text, text);
        assert_eq!(row.session_id, orch.session_id());
    }

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.received_requests, requests.len() as u64);
}

#[tokio::test]
async fn unresolved_request_gets_clarification_and_no_agent() {
    let store = memory_store().await;
    let orch = builtin(Arc::clone(&store));

    let outcome = orch.process("", None).await.unwrap();
    assert_eq!(outcome.state(), RequestState::Unresolved);
    assert_eq!(outcome.response.summary, CLARIFICATION);
    assert_eq!(outcome.intent.unwrap().confidence, 0.0);

    let rows = store
        .query_interactions(&InteractionFilter::new())
        .await
        .unwrap();
    assert_eq!(rows[0].status, InteractionStatus::Failure);
    assert!(rows[0].resolved_capability.is_none());
}

#[tokio::test]
async fn misconfigured_classifier_fails_with_unknown_capability() {
    let store = memory_store().await;
    let config = AssistantConfig::default();

    // The classifier knows about domain checks, the registry does not.
    let mut registry = CapabilityRegistry::new();
    registry
        .register(Arc::new(brainsaver::agents::MemoryQueryHandler::new(5)))
        .unwrap();
    let classifier = IntentClassifier::new(
        vec![CapabilityRule::with_defaults(Capability::DomainCheck).unwrap()],
        DEFAULT_THRESHOLD,
    );
    let orch = Orchestrator::new(
        Arc::clone(&store),
        Arc::new(registry),
        Arc::new(classifier),
        config.request_timeout,
    );

    let outcome = orch
        .process("Check if example.com is online", None)
        .await
        .unwrap();
    assert_eq!(outcome.state(), RequestState::Failed);
    assert!(outcome.response.summary.contains("not registered"));

    let rows = store
        .query_interactions(&InteractionFilter::new())
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, InteractionStatus::Failure);
    assert_eq!(rows[0].error_kind.as_deref(), Some("unknown_capability"));
    assert_eq!(rows[0].resolved_capability, Some(Capability::DomainCheck));
}

#[tokio::test]
async fn slow_handler_times_out_and_is_recorded() {
    let store = memory_store().await;
    let mut registry = CapabilityRegistry::new();
    registry.register(Arc::new(SlowResearch)).unwrap();
    let registry = Arc::new(registry);
    let classifier = IntentClassifier::from_registry(&registry, DEFAULT_THRESHOLD).unwrap();
    let orch = Orchestrator::new(
        Arc::clone(&store),
        registry,
        Arc::new(classifier),
        Duration::from_millis(50),
    );

    let outcome = orch
        .process("research the origins of sourdough", None)
        .await
        .unwrap();
    assert_eq!(outcome.state(), RequestState::Failed);
    assert!(outcome.response.summary.contains("took longer than"));

    let rows = store
        .query_interactions(&InteractionFilter::new())
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].error_kind.as_deref(), Some("timeout"));
    assert_eq!(rows[0].resolved_capability, Some(Capability::Research));
    assert_eq!(
        rows[0].slots.get("query").map(String::as_str),
        Some("origins of sourdough")
    );
}

#[tokio::test]
async fn yesterday_query_recalls_yesterdays_interactions() {
    let store = memory_store().await;
    let now = Utc::now();
    for (text, age) in [
        ("find my passport scan", ChronoDuration::days(3)),
        ("check if mysite.dev is down", ChronoDuration::days(1)),
    ] {
        let rec = NewInteraction::new(Uuid::new_v4(), "earlier", text, InteractionStatus::Simulated)
            .with_summary(format!("handled {text}"))
            .with_timestamp(now - age);
        store.append_interaction(&rec).await.unwrap();
    }

    let orch = builtin(Arc::clone(&store));
    let outcome = orch
        .process("What did we talk about yesterday?", None)
        .await
        .unwrap();

    assert_eq!(outcome.state(), RequestState::Completed);
    let intent = outcome.intent.unwrap();
    assert_eq!(intent.capability, Some(Capability::MemoryQuery));
    assert_eq!(intent.slots.get("window").map(String::as_str), Some("yesterday"));
    assert!(outcome.response.summary.contains("check if mysite.dev is down"));
    assert!(!outcome.response.summary.contains("passport"));
    assert!(!outcome.response.simulated);
}

#[tokio::test]
async fn sessions_share_one_store() {
    let store = memory_store().await;
    let a = Arc::new(builtin(Arc::clone(&store)).with_session_id("a"));
    let b = Arc::new(builtin(Arc::clone(&store)).with_session_id("b"));

    let mut tasks = Vec::new();
    for i in 0..10 {
        let orch = if i % 2 == 0 { Arc::clone(&a) } else { Arc::clone(&b) };
        tasks.push(tokio::spawn(async move {
            orch.handle_request(&format!("research topic {i}"))
                .await
                .unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let all = store
        .query_interactions(&InteractionFilter::new())
        .await
        .unwrap();
    assert_eq!(all.len(), 10);
    assert!(all.windows(2).all(|w| w[0].id < w[1].id));
    let only_a = store
        .query_interactions(&InteractionFilter::new().session("a"))
        .await
        .unwrap();
    assert_eq!(only_a.len(), 5);
}

#[tokio::test]
async fn history_survives_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("brain.db");

    {
        let store: Arc<dyn MemoryStore> = Arc::new(LibSqlBackend::new_local(&path).await.unwrap());
        let orch = builtin(Arc::clone(&store));
        orch.handle_request("research tide pools").await.unwrap();
        store.close().await.unwrap();
    }

    let store: Arc<dyn MemoryStore> = Arc::new(LibSqlBackend::new_local(&path).await.unwrap());
    let orch = builtin(Arc::clone(&store));
    let resp = orch
        .handle_request("do you remember what I said last time")
        .await
        .unwrap();
    assert!(resp.summary.contains("research tide pools"));
}
