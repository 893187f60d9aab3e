//! Request orchestration: classify, dispatch, record.
//!
//! Every request is written to the audit table before anything else happens,
//! and every request that reaches a terminal state other than `Cancelled`
//! appends exactly one interaction. Handler failures become recorded failure
//! responses; only storage failures escape `handle_request`.

pub mod state;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::capability::{Capability, CapabilityHandler, CapabilityRegistry, Response, Slots};
use crate::classifier::{Intent, IntentClassifier};
use crate::config::AssistantConfig;
use crate::error::{AgentError, AgentErrorKind, ConfigError, StorageError};
use crate::store::{
    InteractionStatus, MemoryHandle, MemoryStore, NewInteraction, ReceivedRequest, StoreStats,
};

pub use state::{RequestContext, RequestState, StateTransition};

/// Reply for requests no capability could claim.
pub const CLARIFICATION: &str =
    "I'm not sure what you'd like me to help with. Could you please clarify your request?";

/// `error_kind` recorded when the classifier picks a capability with no handler.
pub const UNKNOWN_CAPABILITY: &str = "unknown_capability";
/// `error_kind` recorded for unresolved requests.
pub const UNRESOLVED: &str = "unresolved";

/// What happened to one request.
#[derive(Debug, Clone)]
pub struct RequestOutcome {
    pub context: RequestContext,
    /// `None` when cancelled before classification.
    pub intent: Option<Intent>,
    pub response: Response,
    /// Id of the appended interaction; `None` only for cancelled requests.
    pub interaction_id: Option<i64>,
}

impl RequestOutcome {
    pub fn state(&self) -> RequestState {
        self.context.state
    }
}

/// New session id in the `%Y%m%d_%H%M%S` form.
pub fn new_session_id() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Routes requests for one session.
pub struct Orchestrator {
    store: Arc<dyn MemoryStore>,
    registry: Arc<CapabilityRegistry>,
    classifier: Arc<IntentClassifier>,
    session_id: String,
    timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn MemoryStore>,
        registry: Arc<CapabilityRegistry>,
        classifier: Arc<IntentClassifier>,
        timeout: Duration,
    ) -> Self {
        debug!(
            threshold = classifier.threshold(),
            timeout_ms = timeout.as_millis() as u64,
            "Orchestrator ready"
        );
        Self {
            store,
            registry,
            classifier,
            session_id: new_session_id(),
            timeout,
        }
    }

    /// Build with a classifier derived from the registry and config.
    pub fn from_config(
        store: Arc<dyn MemoryStore>,
        registry: Arc<CapabilityRegistry>,
        config: &AssistantConfig,
    ) -> Result<Self, ConfigError> {
        let classifier =
            IntentClassifier::from_registry(&registry, config.confidence_threshold)?;
        Ok(Self::new(
            store,
            registry,
            Arc::new(classifier),
            config.request_timeout,
        ))
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    pub async fn stats(&self) -> Result<StoreStats, StorageError> {
        self.store.stats().await
    }

    /// Handle one request end to end.
    pub async fn handle_request(&self, raw_text: &str) -> Result<Response, StorageError> {
        Ok(self.process(raw_text, None).await?.response)
    }

    /// Like [`handle_request`](Self::handle_request), but stops before
    /// dispatch if `cancel` fires. A cancelled request leaves only its audit row.
    pub async fn handle_request_cancellable(
        &self,
        raw_text: &str,
        cancel: &CancellationToken,
    ) -> Result<RequestOutcome, StorageError> {
        self.process(raw_text, Some(cancel)).await
    }

    /// Run a request through the state machine.
    pub async fn process(
        &self,
        raw_text: &str,
        cancel: Option<&CancellationToken>,
    ) -> Result<RequestOutcome, StorageError> {
        let received = ReceivedRequest::new(&self.session_id, raw_text);
        self.store.record_received(&received).await?;
        let mut ctx = RequestContext::new(
            received.request_id,
            &self.session_id,
            raw_text,
            received.received_at,
        );
        debug!(request_id = %ctx.request_id, session = %self.session_id, "Request received");

        let cancelled = || cancel.is_some_and(CancellationToken::is_cancelled);
        if cancelled() {
            return Ok(self.cancel(ctx, None));
        }

        let intent = self.classifier.classify(raw_text);
        let Some(capability) = intent.capability else {
            transition(&mut ctx, RequestState::Unresolved, None);
            let record = NewInteraction::new(
                ctx.request_id,
                &self.session_id,
                raw_text,
                InteractionStatus::Failure,
            )
            .with_summary(CLARIFICATION)
            .with_error_kind(UNRESOLVED);
            let id = self.store.append_interaction(&record).await?;
            info!(
                request_id = %ctx.request_id,
                confidence = intent.confidence,
                "Request unresolved"
            );
            return Ok(RequestOutcome {
                context: ctx,
                intent: Some(intent),
                response: Response::real(CLARIFICATION),
                interaction_id: Some(id),
            });
        };
        transition(
            &mut ctx,
            RequestState::Classified,
            Some(format!("{capability} ({:.2})", intent.confidence)),
        );

        if cancelled() {
            return Ok(self.cancel(ctx, Some(intent)));
        }

        let handler = match self.registry.resolve(capability) {
            Ok(handler) => handler,
            Err(e) => {
                warn!(request_id = %ctx.request_id, %capability, "No handler for classified capability");
                transition(&mut ctx, RequestState::Failed, Some(e.to_string()));
                let response = Response::real(format!(
                    "Sorry, something went wrong on my side: {e}."
                ))
                .with_payload(json!({ "error_kind": UNKNOWN_CAPABILITY }));
                return self
                    .finish_failed(ctx, intent, capability, response, UNKNOWN_CAPABILITY)
                    .await;
            }
        };

        transition(&mut ctx, RequestState::Dispatched, None);
        let result = self.run_handler(handler, capability, &intent.slots).await;

        match result {
            Ok(response) => {
                transition(&mut ctx, RequestState::Completed, None);
                let status = if response.simulated {
                    InteractionStatus::Simulated
                } else {
                    InteractionStatus::Success
                };
                let record = NewInteraction::new(
                    ctx.request_id,
                    &self.session_id,
                    raw_text,
                    status,
                )
                .with_capability(capability, intent.slots.clone())
                .with_summary(&response.summary);
                let id = self.store.append_interaction(&record).await?;
                info!(
                    request_id = %ctx.request_id,
                    %capability,
                    status = %status,
                    elapsed_ms = ctx.elapsed().map(|d| d.as_millis() as u64),
                    "Request completed"
                );
                Ok(RequestOutcome {
                    context: ctx,
                    intent: Some(intent),
                    response,
                    interaction_id: Some(id),
                })
            }
            Err(AgentError::Storage(e)) => {
                transition(&mut ctx, RequestState::Failed, Some(e.to_string()));
                Err(e)
            }
            Err(e) => {
                let kind = e.kind().unwrap_or(AgentErrorKind::Internal);
                warn!(request_id = %ctx.request_id, %capability, error = %e, "Handler failed");
                transition(&mut ctx, RequestState::Failed, Some(e.to_string()));
                let response = Response::real(failure_message(capability, &e))
                    .with_payload(json!({ "error_kind": kind.as_str() }));
                self.finish_failed(ctx, intent, capability, response, kind.as_str())
                    .await
            }
        }
    }

    /// Run a handler on its own task under the request timeout. A panic or an
    /// overrun becomes an `AgentError` instead of unwinding into the caller.
    async fn run_handler(
        &self,
        handler: Arc<dyn CapabilityHandler>,
        capability: Capability,
        slots: &Slots,
    ) -> Result<Response, AgentError> {
        let memory = MemoryHandle::for_capability(Arc::clone(&self.store), capability);
        let slots = slots.clone();
        let timeout = self.timeout;
        let mut task =
            tokio::spawn(async move { handler.handle(&slots, &memory, timeout).await });

        match tokio::time::timeout(timeout, &mut task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => {
                warn!(%capability, error = %join_err, "Handler task aborted");
                Err(AgentError::Internal(format!("{capability} handler crashed")))
            }
            Err(_) => {
                task.abort();
                Err(AgentError::Timeout(timeout))
            }
        }
    }

    async fn finish_failed(
        &self,
        ctx: RequestContext,
        intent: Intent,
        capability: Capability,
        response: Response,
        error_kind: &str,
    ) -> Result<RequestOutcome, StorageError> {
        let record = NewInteraction::new(
            ctx.request_id,
            &self.session_id,
            &ctx.raw_text,
            InteractionStatus::Failure,
        )
        .with_capability(capability, intent.slots.clone())
        .with_summary(&response.summary)
        .with_error_kind(error_kind);
        let id = self.store.append_interaction(&record).await?;
        Ok(RequestOutcome {
            context: ctx,
            intent: Some(intent),
            response,
            interaction_id: Some(id),
        })
    }

    fn cancel(&self, mut ctx: RequestContext, intent: Option<Intent>) -> RequestOutcome {
        transition(&mut ctx, RequestState::Cancelled, None);
        info!(request_id = %ctx.request_id, "Request cancelled before dispatch");
        RequestOutcome {
            context: ctx,
            intent,
            response: Response::real("Request cancelled."),
            interaction_id: None,
        }
    }
}

fn transition(ctx: &mut RequestContext, to: RequestState, reason: Option<String>) {
    if let Err(e) = ctx.transition_to(to, reason) {
        warn!(request_id = %ctx.request_id, error = %e, "Invalid request transition");
    }
}

fn failure_message(capability: Capability, error: &AgentError) -> String {
    match error {
        AgentError::Timeout(d) => format!(
            "Sorry, the {capability} request took longer than {}s and was stopped.",
            d.as_secs_f32()
        ),
        AgentError::SimulatedDenied(reason) => {
            format!("I couldn't do that: {reason}.")
        }
        _ => format!("Sorry, something went wrong while handling that {capability} request."),
    }
}
