//! File finding, duplicate detection and organize plans over the file index.
//!
//! When the request names a path, that directory is scanned (read-only) and
//! the index refreshed first. Organizing and duplicate removal are only ever
//! planned: nothing is moved or deleted.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use crate::capability::{Capability, CapabilityHandler, Response, Slots, slot};
use crate::error::AgentError;
use crate::indexer;
use crate::store::{FileIndexEntry, MemoryHandle, path_within};

/// Most files listed in a summary.
const MAX_LISTED: usize = 20;

pub struct FileSearchHandler {
    scan_limit: usize,
}

impl FileSearchHandler {
    pub fn new(scan_limit: usize) -> Self {
        Self { scan_limit }
    }

    /// Scan `path` and refresh the index. Returns the prefix to restrict reads to.
    async fn refresh(
        &self,
        path: &str,
        memory: &MemoryHandle,
        timeout: Duration,
        actions: &mut Vec<String>,
    ) -> Result<String, AgentError> {
        let root = indexer::expand_home(path);
        let report = tokio::time::timeout(timeout, indexer::scan(&root, self.scan_limit))
            .await
            .map_err(|_| AgentError::Timeout(timeout))?
            .map_err(|e| AgentError::Internal(format!("Cannot read {path}: {e}")))?;

        let written = memory.upsert_file_index(&report.entries).await?;
        info!(path, files = written, skipped = report.skipped, "Indexed directory");
        actions.push(format!("Scanned {path} ({written} files indexed)"));
        if report.truncated {
            actions.push(format!("Stopped after {} files", self.scan_limit));
        }
        Ok(root.display().to_string())
    }
}

fn type_folder(entry: &FileIndexEntry) -> String {
    match entry.extension() {
        Some(ext) => format!("{ext}_files"),
        None => "no_extension".to_string(),
    }
}

#[async_trait]
impl CapabilityHandler for FileSearchHandler {
    fn capability(&self) -> Capability {
        Capability::FileSearch
    }

    async fn handle(
        &self,
        slots: &Slots,
        memory: &MemoryHandle,
        timeout: Duration,
    ) -> Result<Response, AgentError> {
        let action = slot(slots, "action").unwrap_or("find");
        let mut actions = Vec::new();
        let prefix = match slot(slots, "path") {
            Some(path) => Some(self.refresh(path, memory, timeout, &mut actions).await?),
            None => None,
        };
        let scope = prefix
            .as_deref()
            .map(|p| format!(" in {p}"))
            .unwrap_or_default();

        match action {
            "duplicates" => {
                let groups: Vec<Vec<String>> = memory
                    .find_duplicates()
                    .await?
                    .into_values()
                    .map(|paths| {
                        paths
                            .into_iter()
                            .filter(|p| prefix.as_deref().is_none_or(|dir| path_within(p, dir)))
                            .collect::<Vec<_>>()
                    })
                    .filter(|paths| paths.len() >= 2)
                    .collect();

                if groups.is_empty() {
                    return Ok(Response::real(format!("No duplicate files found{scope}."))
                        .with_actions(actions));
                }

                let extra: usize = groups.iter().map(|g| g.len() - 1).sum();
                let mut summary = format!(
                    "Found {} sets of duplicates{scope}; {extra} copies could be removed:",
                    groups.len()
                );
                for group in groups.iter().take(MAX_LISTED) {
                    summary.push_str(&format!("\n- {}", group.join(", ")));
                    for copy in &group[1..] {
                        actions.push(format!("Would remove duplicate {copy} (keeping {})", group[0]));
                    }
                }
                Ok(Response::simulated(summary)
                    .with_payload(json!({ "duplicate_groups": groups, "removable": extra }))
                    .with_actions(actions))
            }
            "organize" => {
                let entries = memory.list_file_index(prefix.as_deref()).await?;
                if entries.is_empty() {
                    return Ok(Response::real(format!("No indexed files{scope} to organize."))
                        .with_actions(actions));
                }

                let mut plan: BTreeMap<String, Vec<String>> = BTreeMap::new();
                for entry in &entries {
                    plan.entry(type_folder(entry))
                        .or_default()
                        .push(entry.file_name().to_string());
                }
                for (folder, files) in &plan {
                    for file in files {
                        actions.push(format!("Would move {file} to {folder}/"));
                    }
                }
                let summary = format!(
                    "Organized by type{scope}: {} files into {} folders ({}).",
                    entries.len(),
                    plan.len(),
                    plan.keys().cloned().collect::<Vec<_>>().join(", ")
                );
                Ok(Response::simulated(summary)
                    .with_payload(json!({ "plan": plan, "organized_count": entries.len() }))
                    .with_actions(actions))
            }
            _ => {
                let entries = memory.list_file_index(prefix.as_deref()).await?;
                let terms: Vec<String> = slot(slots, "query")
                    .map(|q| q.split_whitespace().map(str::to_lowercase).collect())
                    .unwrap_or_default();
                let found: Vec<&FileIndexEntry> = entries
                    .iter()
                    .filter(|e| {
                        let name = e.file_name().to_lowercase();
                        terms.iter().all(|t| name.contains(t.as_str()))
                    })
                    .collect();

                let what = if terms.is_empty() {
                    "files".to_string()
                } else {
                    format!("files matching \"{}\"", terms.join(" "))
                };
                actions.push(format!("Searched the file index for {what}"));

                if found.is_empty() {
                    return Ok(Response::real(format!("No {what}{scope}.")).with_actions(actions));
                }
                let mut summary = format!("Found {} {what}{scope}:", found.len());
                for entry in found.iter().take(MAX_LISTED) {
                    summary.push_str(&format!("\n- {} ({} bytes)", entry.path, entry.size));
                }
                if found.len() > MAX_LISTED {
                    summary.push_str(&format!("\n... and {} more", found.len() - MAX_LISTED));
                }
                let payload = json!({
                    "files": found.iter().map(|e| json!({
                        "path": e.path,
                        "size": e.size,
                        "hash": e.content_hash,
                    })).collect::<Vec<_>>(),
                });
                Ok(Response::real(summary)
                    .with_payload(payload)
                    .with_actions(actions))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    use crate::store::{LibSqlBackend, MemoryStore};

    fn slots(pairs: &[(&str, &str)]) -> Slots {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    async fn handle_for(store: Arc<dyn MemoryStore>) -> MemoryHandle {
        MemoryHandle::for_capability(store, Capability::FileSearch)
    }

    #[tokio::test]
    async fn scan_then_find_duplicates() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "same").unwrap();
        std::fs::write(dir.path().join("b.txt"), "same").unwrap();
        std::fs::write(dir.path().join("c.txt"), "other").unwrap();

        let store: Arc<dyn MemoryStore> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let memory = handle_for(Arc::clone(&store)).await;
        let path = dir.path().display().to_string();
        let resp = FileSearchHandler::new(100)
            .handle(
                &slots(&[("action", "duplicates"), ("path", &path)]),
                &memory,
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        assert!(resp.simulated);
        assert!(resp.summary.contains("Found 1 sets of duplicates"));
        assert_eq!(resp.structured_payload.unwrap()["removable"], 1);
        assert_eq!(store.stats().await.unwrap().indexed_files, 3);
        // Plan only: both copies still exist.
        assert!(dir.path().join("a.txt").exists());
        assert!(dir.path().join("b.txt").exists());
    }

    #[tokio::test]
    async fn sibling_directory_is_out_of_scope() {
        let dir = TempDir::new().unwrap();
        let photos = dir.path().join("photos");
        let old = dir.path().join("photos-old");
        std::fs::create_dir_all(&photos).unwrap();
        std::fs::create_dir_all(&old).unwrap();
        std::fs::write(photos.join("a.jpg"), "beach").unwrap();
        std::fs::write(old.join("a.jpg"), "beach").unwrap();
        std::fs::write(old.join("b.jpg"), "beach").unwrap();

        let store: Arc<dyn MemoryStore> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let memory = handle_for(Arc::clone(&store)).await;
        let handler = FileSearchHandler::new(100);
        let old_path = old.display().to_string();
        handler
            .handle(
                &slots(&[("action", "organize"), ("path", &old_path)]),
                &memory,
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        let photos_path = photos.display().to_string();
        let resp = handler
            .handle(
                &slots(&[("action", "duplicates"), ("path", &photos_path)]),
                &memory,
                Duration::from_secs(5),
            )
            .await
            .unwrap();
        assert!(resp.summary.starts_with("No duplicate files found"), "{}", resp.summary);

        let resp = handler
            .handle(
                &slots(&[("action", "organize"), ("path", &photos_path)]),
                &memory,
                Duration::from_secs(5),
            )
            .await
            .unwrap();
        let planned: Vec<_> = resp
            .actions_taken
            .iter()
            .filter(|a| a.starts_with("Would move"))
            .collect();
        assert_eq!(planned, vec!["Would move a.jpg to jpg_files/"]);
        assert_eq!(store.stats().await.unwrap().indexed_files, 3);
    }

    #[tokio::test]
    async fn find_by_name_from_index() {
        let store: Arc<dyn MemoryStore> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        store
            .upsert_file_index(&[
                FileIndexEntry::new("/docs/Budget-2024.xlsx", 10, "h1"),
                FileIndexEntry::new("/docs/notes.txt", 5, "h2"),
            ])
            .await
            .unwrap();

        let memory = handle_for(store).await;
        let resp = FileSearchHandler::new(100)
            .handle(
                &slots(&[("action", "find"), ("query", "budget")]),
                &memory,
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        assert!(!resp.simulated);
        assert!(resp.summary.contains("/docs/Budget-2024.xlsx"));
        assert!(!resp.summary.contains("notes.txt"));
    }

    #[tokio::test]
    async fn organize_plans_by_extension() {
        let store: Arc<dyn MemoryStore> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        store
            .upsert_file_index(&[
                FileIndexEntry::new("/dl/a.PDF", 1, "h1"),
                FileIndexEntry::new("/dl/b.pdf", 1, "h2"),
                FileIndexEntry::new("/dl/README", 1, "h3"),
            ])
            .await
            .unwrap();

        let memory = handle_for(store).await;
        let resp = FileSearchHandler::new(100)
            .handle(&slots(&[("action", "organize")]), &memory, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(resp.simulated);
        assert!(resp.actions_taken.contains(&"Would move a.PDF to pdf_files/".to_string()));
        assert!(resp.actions_taken.contains(&"Would move README to no_extension/".to_string()));
    }

    #[tokio::test]
    async fn missing_path_is_internal_error() {
        let store: Arc<dyn MemoryStore> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let memory = handle_for(store).await;
        let err = FileSearchHandler::new(100)
            .handle(
                &slots(&[("path", "/definitely/not/here")]),
                &memory,
                Duration::from_secs(1),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Internal(_)));
    }
}
