//! `MemoryStore` trait: the only persistence interface the core depends on.

use async_trait::async_trait;

use crate::error::StorageError;
use crate::store::model::{
    DuplicateGroups, FileIndexEntry, Interaction, InteractionFilter, NewInteraction, Preference,
    ReceivedRequest, StoreStats,
};

/// Backend-agnostic memory store.
///
/// Single writer: implementations serialize every write behind one
/// store-wide lock, and every read observes all completed writes.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    // ── Interaction log ─────────────────────────────────────────────

    /// Append one interaction atomically. Returns its id.
    async fn append_interaction(&self, record: &NewInteraction) -> Result<i64, StorageError>;

    /// Read interactions matching `filter`, ascending by id.
    async fn query_interactions(
        &self,
        filter: &InteractionFilter,
    ) -> Result<Vec<Interaction>, StorageError>;

    /// Record the verbatim text of a request before it is classified.
    async fn record_received(&self, request: &ReceivedRequest) -> Result<(), StorageError>;

    // ── Preferences ─────────────────────────────────────────────────

    /// Get a preference by key.
    async fn get_preference(&self, key: &str) -> Result<Option<Preference>, StorageError>;

    /// Insert or replace a preference. Last write wins.
    async fn set_preference(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Increment the integer preference `key` (missing counts as 0) and return
    /// the new value. Read and write happen under the same write lock.
    async fn next_sequence(&self, key: &str) -> Result<u64, StorageError>;

    // ── File index ──────────────────────────────────────────────────

    /// Upsert a batch of entries in one transaction, refreshing `last_seen`.
    async fn upsert_file_index(&self, entries: &[FileIndexEntry]) -> Result<usize, StorageError>;

    /// List indexed files, optionally restricted to a path prefix.
    async fn list_file_index(
        &self,
        prefix: Option<&str>,
    ) -> Result<Vec<FileIndexEntry>, StorageError>;

    /// Hashes shared by two or more non-empty files.
    async fn find_duplicates(&self) -> Result<DuplicateGroups, StorageError>;

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Row counts across all tables.
    async fn stats(&self) -> Result<StoreStats, StorageError>;

    /// Flush and refuse further writes.
    async fn close(&self) -> Result<(), StorageError>;
}
