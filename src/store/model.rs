//! Persisted record types owned by the memory store.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::capability::{Capability, Slots};

/// Outcome recorded on an interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionStatus {
    Success,
    Failure,
    /// The handler succeeded without a real-world side effect.
    Simulated,
}

impl InteractionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Simulated => "simulated",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "failure" => Some(Self::Failure),
            "simulated" => Some(Self::Simulated),
            _ => None,
        }
    }
}

impl std::fmt::Display for InteractionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable audit record of a full request lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    /// Log position. Strictly increasing.
    pub id: i64,
    /// Links back to the RECEIVED audit row.
    pub request_id: Uuid,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub raw_text: String,
    /// `None` when the request never resolved to a capability.
    pub resolved_capability: Option<Capability>,
    pub slots: Slots,
    pub response_summary: String,
    pub status: InteractionStatus,
    /// Failure kind (`unresolved`, `unknown_capability`, `timeout`, ...).
    pub error_kind: Option<String>,
}

/// An interaction that has not been appended yet.
#[derive(Debug, Clone)]
pub struct NewInteraction {
    pub request_id: Uuid,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub raw_text: String,
    pub resolved_capability: Option<Capability>,
    pub slots: Slots,
    pub response_summary: String,
    pub status: InteractionStatus,
    pub error_kind: Option<String>,
}

impl NewInteraction {
    /// Start a record for `raw_text`, stamped now.
    pub fn new(
        request_id: Uuid,
        session_id: impl Into<String>,
        raw_text: impl Into<String>,
        status: InteractionStatus,
    ) -> Self {
        Self {
            request_id,
            session_id: session_id.into(),
            timestamp: Utc::now(),
            raw_text: raw_text.into(),
            resolved_capability: None,
            slots: Slots::new(),
            response_summary: String::new(),
            status,
            error_kind: None,
        }
    }

    pub fn with_capability(mut self, capability: Capability, slots: Slots) -> Self {
        self.resolved_capability = Some(capability);
        self.slots = slots;
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.response_summary = summary.into();
        self
    }

    pub fn with_error_kind(mut self, kind: impl Into<String>) -> Self {
        self.error_kind = Some(kind.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Predicates for reading the interaction log.
///
/// All predicates are ANDed. `since` is inclusive, `until` exclusive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InteractionFilter {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub capability: Option<Capability>,
    pub status: Option<InteractionStatus>,
    pub session_id: Option<String>,
    /// Whitespace-separated terms; each must appear (case-insensitively) in the
    /// raw text or response summary.
    pub text: Option<String>,
    /// Only ids strictly greater than this (cursor position).
    pub after_id: Option<i64>,
    pub limit: Option<usize>,
}

impl InteractionFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn between(mut self, since: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self.until = Some(until);
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn capability(mut self, capability: Capability) -> Self {
        self.capability = Some(capability);
        self
    }

    pub fn status(mut self, status: InteractionStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn after_id(mut self, id: i64) -> Self {
        self.after_id = Some(id);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// A user preference row. Keys are unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preference {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

/// A cached file observation used for duplicate detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileIndexEntry {
    pub path: String,
    pub size: u64,
    /// Hex SHA-256 of the file content.
    pub content_hash: String,
    /// When the file was last indexed.
    pub last_seen: DateTime<Utc>,
    /// Filesystem modification time, when the platform reports one.
    #[serde(default)]
    pub modified: Option<DateTime<Utc>>,
}

impl FileIndexEntry {
    pub fn new(path: impl Into<String>, size: u64, content_hash: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            size,
            content_hash: content_hash.into(),
            last_seen: Utc::now(),
            modified: None,
        }
    }

    pub fn with_modified(mut self, modified: DateTime<Utc>) -> Self {
        self.modified = Some(modified);
        self
    }

    /// True if the entry is `dir` itself or lies somewhere below it.
    pub fn is_within(&self, dir: &str) -> bool {
        path_within(&self.path, dir)
    }

    /// Lowercased extension without the dot, if any.
    pub fn extension(&self) -> Option<String> {
        std::path::Path::new(&self.path)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
    }

    /// Final path component.
    pub fn file_name(&self) -> &str {
        std::path::Path::new(&self.path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&self.path)
    }
}

/// Directory scope check on path strings. `/data/photos` contains
/// `/data/photos/a.jpg` but not `/data/photos-old/a.jpg`.
pub fn path_within(path: &str, dir: &str) -> bool {
    let dir = dir.trim_end_matches('/');
    if dir.is_empty() {
        return true;
    }
    match path.strip_prefix(dir) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Content hash → paths sharing it, only for hashes with at least two paths.
pub type DuplicateGroups = BTreeMap<String, BTreeSet<String>>;

/// The RECEIVED audit row, written before a request is classified.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedRequest {
    pub request_id: Uuid,
    pub session_id: String,
    pub raw_text: String,
    pub received_at: DateTime<Utc>,
}

impl ReceivedRequest {
    pub fn new(session_id: impl Into<String>, raw_text: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            session_id: session_id.into(),
            raw_text: raw_text.into(),
            received_at: Utc::now(),
        }
    }
}

/// Row counts, reported by the CLI `status` command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub interactions: u64,
    pub preferences: u64,
    pub indexed_files: u64,
    pub received_requests: u64,
}
