//! Error types for brainsaver.

use std::time::Duration;

use crate::capability::Capability;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Memory store errors.
///
/// The one error class the orchestrator never masks: once a write fails the
/// audit trail is no longer continuous.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Failed to open store: {0}")]
    Open(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Store is closed")]
    Closed,
}

/// Capability registry errors.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Capability {0} is already registered")]
    DuplicateCapability(Capability),

    #[error("Capability {0} is not registered")]
    UnknownCapability(Capability),
}

/// Coarse classification of a handler failure, recorded on the interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentErrorKind {
    Timeout,
    SimulatedDenied,
    Internal,
}

impl AgentErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::SimulatedDenied => "simulated_denied",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for AgentErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by capability handlers.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Action denied: {0}")]
    SimulatedDenied(String),

    #[error("Internal agent error: {0}")]
    Internal(String),

    /// Storage failure underneath a handler. Propagated, never recorded.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl AgentError {
    /// Recorded kind, or `None` for storage failures which escape the orchestrator.
    pub fn kind(&self) -> Option<AgentErrorKind> {
        match self {
            Self::Timeout(_) => Some(AgentErrorKind::Timeout),
            Self::SimulatedDenied(_) => Some(AgentErrorKind::SimulatedDenied),
            Self::Internal(_) => Some(AgentErrorKind::Internal),
            Self::Storage(_) => None,
        }
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
