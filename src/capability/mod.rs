//! Capability abstraction: the closed set of things the assistant can do.
//!
//! Every capability has exactly one registered [`CapabilityHandler`]. Handlers
//! receive the classifier's slots, a [`MemoryHandle`] scoped to what the
//! capability may touch, and the per-request timeout.

pub mod registry;

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AgentError;
use crate::store::handle::{Access, MemoryAccess, MemoryHandle};

pub use registry::CapabilityRegistry;

/// Slot values extracted from a request, keyed by slot name.
pub type Slots = BTreeMap<String, String>;

/// A named category of user intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    MemoryQuery,
    FileSearch,
    Research,
    Automation,
    PhoneSort,
    DomainCheck,
}

impl Capability {
    /// All capabilities in their default declaration order.
    pub const ALL: [Capability; 6] = [
        Capability::MemoryQuery,
        Capability::FileSearch,
        Capability::Research,
        Capability::Automation,
        Capability::PhoneSort,
        Capability::DomainCheck,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MemoryQuery => "memory-query",
            Self::FileSearch => "file-search",
            Self::Research => "research",
            Self::Automation => "automation",
            Self::PhoneSort => "phone-sort",
            Self::DomainCheck => "domain-check",
        }
    }

    /// What part of the memory store this capability's handler may touch.
    pub fn memory_access(&self) -> MemoryAccess {
        use Access::*;
        match self {
            Self::MemoryQuery => MemoryAccess::new(Read, Read, Denied),
            Self::FileSearch => MemoryAccess::new(Denied, Read, ReadWrite),
            Self::Research => MemoryAccess::new(Denied, Read, Denied),
            Self::Automation => MemoryAccess::new(Denied, ReadWrite, Read),
            Self::PhoneSort => MemoryAccess::new(Denied, Read, Read),
            Self::DomainCheck => MemoryAccess::new(Denied, Read, Denied),
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown capability: {s}"))
    }
}

/// What a handler hands back to the orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Human-readable summary, printed by the CLI and stored on the interaction.
    pub summary: String,
    /// True when the handler reported success without a real-world side effect.
    pub simulated: bool,
    /// Optional machine-readable result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_payload: Option<serde_json::Value>,
    /// Steps the handler took (or would have taken), most important first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions_taken: Vec<String>,
}

impl Response {
    /// A response for work that actually happened.
    pub fn real(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            ..Default::default()
        }
    }

    /// A response for work that was only simulated.
    pub fn simulated(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            simulated: true,
            ..Default::default()
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.structured_payload = Some(payload);
        self
    }

    pub fn with_actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.actions_taken = actions.into_iter().map(Into::into).collect();
        self
    }
}

/// One trigger a capability declares to the classifier.
#[derive(Debug, Clone)]
pub enum Trigger {
    /// A single word; simple inflections (`files`, `talked`) also match.
    Word(&'static str),
    /// A multi-word phrase matched against the normalized text.
    Phrase(&'static str),
    /// A regex matched against each lowercased token (e.g. domain names).
    Pattern(&'static str),
}

/// Handler for one capability.
#[async_trait]
pub trait CapabilityHandler: Send + Sync {
    /// The capability this handler serves.
    fn capability(&self) -> Capability;

    /// Trigger vocabulary used by the classifier.
    fn triggers(&self) -> Vec<Trigger> {
        crate::classifier::vocabulary::default_triggers(self.capability())
    }

    /// Handle one request.
    ///
    /// `timeout` is the budget the orchestrator enforces; long-running work
    /// should honour it rather than rely on being cancelled.
    async fn handle(
        &self,
        slots: &Slots,
        memory: &MemoryHandle,
        timeout: Duration,
    ) -> Result<Response, AgentError>;
}

/// Fetch a slot value, treating empty strings as absent.
pub fn slot<'a>(slots: &'a Slots, name: &str) -> Option<&'a str> {
    slots
        .get(name)
        .map(String::as_str)
        .filter(|v| !v.trim().is_empty())
}
