//! Per-request state machine.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// State of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    /// Audit row written, not yet classified.
    Received,
    /// Intent resolved to a capability.
    Classified,
    /// Handed to the capability's handler.
    Dispatched,
    /// Handler returned a response.
    Completed,
    /// Handler failed, timed out, or the capability had no handler.
    Failed,
    /// Nothing cleared the confidence threshold.
    Unresolved,
    /// Cancelled before dispatch.
    Cancelled,
}

impl RequestState {
    /// Check if this state allows transitioning to another state.
    pub fn can_transition_to(&self, target: RequestState) -> bool {
        use RequestState::*;

        matches!(
            (self, target),
            (Received, Classified) | (Received, Unresolved) | (Received, Cancelled) |
            (Classified, Dispatched) | (Classified, Failed) | (Classified, Cancelled) |
            (Dispatched, Completed) | (Dispatched, Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Unresolved | Self::Cancelled
        )
    }
}

impl std::fmt::Display for RequestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Received => "received",
            Self::Classified => "classified",
            Self::Dispatched => "dispatched",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Unresolved => "unresolved",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// A state transition event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: RequestState,
    pub to: RequestState,
    pub timestamp: DateTime<Utc>,
    pub reason: Option<String>,
}

/// Lifecycle of one request through the orchestrator.
#[derive(Debug, Clone, Serialize)]
pub struct RequestContext {
    pub request_id: Uuid,
    pub session_id: String,
    pub raw_text: String,
    pub state: RequestState,
    pub received_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub transitions: Vec<StateTransition>,
}

impl RequestContext {
    pub fn new(
        request_id: Uuid,
        session_id: impl Into<String>,
        raw_text: impl Into<String>,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            request_id,
            session_id: session_id.into(),
            raw_text: raw_text.into(),
            state: RequestState::Received,
            received_at,
            finished_at: None,
            transitions: Vec::new(),
        }
    }

    /// Transition to a new state.
    pub fn transition_to(
        &mut self,
        new_state: RequestState,
        reason: Option<String>,
    ) -> Result<(), String> {
        if !self.state.can_transition_to(new_state) {
            return Err(format!(
                "Cannot transition from {} to {}",
                self.state, new_state
            ));
        }

        self.transitions.push(StateTransition {
            from: self.state,
            to: new_state,
            timestamp: Utc::now(),
            reason,
        });
        self.state = new_state;
        if new_state.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Time from receipt to the terminal state, if reached.
    pub fn elapsed(&self) -> Option<Duration> {
        self.finished_at.map(|end| {
            let ms = end.signed_duration_since(self.received_at).num_milliseconds();
            Duration::from_millis(ms.max(0) as u64)
        })
    }
}
