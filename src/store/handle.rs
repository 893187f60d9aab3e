//! Scoped memory handles issued to capability handlers.
//!
//! A handle exposes only the parts of the store its capability was granted.
//! Out-of-scope calls fail with `AgentError::Internal` without touching the
//! store: they indicate a handler bug, not a user error.

use std::sync::Arc;

use crate::capability::Capability;
use crate::error::AgentError;
use crate::store::cursor::InteractionCursor;
use crate::store::model::{DuplicateGroups, FileIndexEntry, Interaction, InteractionFilter};
use crate::store::traits::MemoryStore;

/// Access level for one area of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Denied,
    Read,
    ReadWrite,
}

impl Access {
    pub fn can_read(&self) -> bool {
        matches!(self, Self::Read | Self::ReadWrite)
    }

    pub fn can_write(&self) -> bool {
        matches!(self, Self::ReadWrite)
    }
}

/// Per-area access granted to a capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryAccess {
    pub interactions: Access,
    pub preferences: Access,
    pub file_index: Access,
}

impl MemoryAccess {
    pub const fn new(interactions: Access, preferences: Access, file_index: Access) -> Self {
        Self {
            interactions,
            preferences,
            file_index,
        }
    }
}

/// Read/write view of the store scoped to one capability for one request.
#[derive(Clone)]
pub struct MemoryHandle {
    store: Arc<dyn MemoryStore>,
    capability: Capability,
    access: MemoryAccess,
}

impl MemoryHandle {
    /// Issue a handle with the capability's default access set.
    pub fn for_capability(store: Arc<dyn MemoryStore>, capability: Capability) -> Self {
        Self::with_access(store, capability, capability.memory_access())
    }

    /// Issue a handle with an explicit access set.
    pub fn with_access(
        store: Arc<dyn MemoryStore>,
        capability: Capability,
        access: MemoryAccess,
    ) -> Self {
        Self {
            store,
            capability,
            access,
        }
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }

    pub fn access(&self) -> MemoryAccess {
        self.access
    }

    fn check(&self, allowed: bool, what: &str) -> Result<(), AgentError> {
        if allowed {
            Ok(())
        } else {
            tracing::warn!(capability = %self.capability, what, "Memory access denied");
            Err(AgentError::Internal(format!(
                "{} is not allowed to {what}",
                self.capability
            )))
        }
    }

    // ── Interactions ────────────────────────────────────────────────

    pub async fn query_interactions(
        &self,
        filter: &InteractionFilter,
    ) -> Result<Vec<Interaction>, AgentError> {
        self.check(self.access.interactions.can_read(), "read interactions")?;
        Ok(self.store.query_interactions(filter).await?)
    }

    /// Lazy cursor over the log; the access check happens once, up front.
    pub fn interaction_cursor(
        &self,
        filter: InteractionFilter,
        page_size: usize,
    ) -> Result<InteractionCursor, AgentError> {
        self.check(self.access.interactions.can_read(), "read interactions")?;
        Ok(InteractionCursor::new(
            Arc::clone(&self.store),
            filter,
            page_size,
        ))
    }

    // ── Preferences ─────────────────────────────────────────────────

    pub async fn get_preference(&self, key: &str) -> Result<Option<String>, AgentError> {
        self.check(self.access.preferences.can_read(), "read preferences")?;
        Ok(self.store.get_preference(key).await?.map(|p| p.value))
    }

    pub async fn set_preference(&self, key: &str, value: &str) -> Result<(), AgentError> {
        self.check(self.access.preferences.can_write(), "write preferences")?;
        Ok(self.store.set_preference(key, value).await?)
    }

    /// Atomically advance a counter stored as a preference.
    pub async fn next_sequence(&self, key: &str) -> Result<u64, AgentError> {
        self.check(self.access.preferences.can_write(), "write preferences")?;
        Ok(self.store.next_sequence(key).await?)
    }

    // ── File index ──────────────────────────────────────────────────

    pub async fn list_file_index(
        &self,
        prefix: Option<&str>,
    ) -> Result<Vec<FileIndexEntry>, AgentError> {
        self.check(self.access.file_index.can_read(), "read the file index")?;
        Ok(self.store.list_file_index(prefix).await?)
    }

    pub async fn find_duplicates(&self) -> Result<DuplicateGroups, AgentError> {
        self.check(self.access.file_index.can_read(), "read the file index")?;
        Ok(self.store.find_duplicates().await?)
    }

    pub async fn upsert_file_index(&self, entries: &[FileIndexEntry]) -> Result<usize, AgentError> {
        self.check(self.access.file_index.can_write(), "write the file index")?;
        Ok(self.store.upsert_file_index(entries).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LibSqlBackend;

    async fn store() -> Arc<dyn MemoryStore> {
        Arc::new(LibSqlBackend::new_memory().await.unwrap())
    }

    #[tokio::test]
    async fn domain_check_cannot_touch_file_index() {
        let handle = MemoryHandle::for_capability(store().await, Capability::DomainCheck);
        let err = handle.find_duplicates().await.unwrap_err();
        assert!(matches!(err, AgentError::Internal(_)));
        let err = handle
            .upsert_file_index(&[FileIndexEntry::new("/a", 1, "h")])
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Internal(_)));
    }

    #[tokio::test]
    async fn read_only_preferences_reject_writes() {
        let store = store().await;
        store.set_preference("phone.access", "granted").await.unwrap();

        let handle = MemoryHandle::for_capability(Arc::clone(&store), Capability::PhoneSort);
        assert_eq!(
            handle.get_preference("phone.access").await.unwrap().as_deref(),
            Some("granted")
        );
        assert!(handle.set_preference("phone.access", "revoked").await.is_err());
        assert_eq!(
            store.get_preference("phone.access").await.unwrap().unwrap().value,
            "granted"
        );
    }

    #[tokio::test]
    async fn file_search_writes_index() {
        let store = store().await;
        let handle = MemoryHandle::for_capability(Arc::clone(&store), Capability::FileSearch);
        handle
            .upsert_file_index(&[
                FileIndexEntry::new("/a", 3, "h"),
                FileIndexEntry::new("/b", 3, "h"),
            ])
            .await
            .unwrap();
        assert_eq!(handle.find_duplicates().await.unwrap().len(), 1);
        assert!(handle
            .query_interactions(&InteractionFilter::new())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn storage_errors_pass_through() {
        let store = store().await;
        store.close().await.unwrap();
        let handle = MemoryHandle::for_capability(store, Capability::MemoryQuery);
        let err = handle
            .query_interactions(&InteractionFilter::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Storage(_)));
    }
}
