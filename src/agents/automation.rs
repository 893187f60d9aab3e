//! Routine automation: backups, desktop cleanup, scheduled tasks and tool ideas.
//!
//! Every action here is simulated. Scheduled tasks are recorded as preferences
//! so later sessions can see them, but nothing executes them.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;

use crate::capability::{Capability, CapabilityHandler, Response, Slots, slot};
use crate::error::AgentError;
use crate::indexer::expand_home;
use crate::store::MemoryHandle;

/// Preference key for the default backup destination.
pub const BACKUP_DESTINATION: &str = "backup.destination";
/// Preference key holding the number of scheduled tasks.
pub const SCHEDULE_COUNT: &str = "schedule.count";

const DEFAULT_SOURCE: &str = "~/Documents";
const DEFAULT_DESTINATION: &str = "~/Backups";
const DESKTOP: &str = "~/Desktop";

const DESKTOP_FOLDERS: &[(&str, &[&str])] = &[
    ("Documents", &["pdf", "doc", "docx", "txt", "md"]),
    ("Images", &["jpg", "jpeg", "png", "gif", "bmp", "heic"]),
    ("Spreadsheets", &["xls", "xlsx", "csv"]),
    ("Archives", &["zip", "rar", "7z", "tar", "gz"]),
    ("Executables", &["exe", "msi", "app", "deb", "dmg"]),
];

const TOOL_SUGGESTIONS: &[(&str, &str)] = &[
    ("organize", "Script to automatically organize files by type and date"),
    ("backup", "Automated backup script with scheduling"),
    ("duplicate", "Tool to find and remove duplicate files"),
    ("monitor", "Monitor system resources and send alerts"),
    ("rename", "Batch renamer driven by a naming pattern"),
];

/// Preference key for scheduled task `id`.
pub fn schedule_key(id: u64) -> String {
    format!("schedule.task.{id}")
}

#[derive(Default)]
pub struct AutomationHandler;

impl AutomationHandler {
    pub fn new() -> Self {
        Self
    }

    async fn backup(&self, slots: &Slots, memory: &MemoryHandle) -> Result<Response, AgentError> {
        let source = slot(slots, "source").unwrap_or(DEFAULT_SOURCE);
        let destination = match slot(slots, "destination") {
            Some(d) => d.to_string(),
            None => memory
                .get_preference(BACKUP_DESTINATION)
                .await?
                .unwrap_or_else(|| DEFAULT_DESTINATION.to_string()),
        };
        let when = slot(slots, "when").unwrap_or("now");

        Ok(Response::simulated(format!(
            "Backup completed: {source} -> {destination} ({when})"
        ))
        .with_payload(json!({ "source": source, "destination": destination, "when": when }))
        .with_actions([
            format!("Started backup from {source}"),
            format!("Creating backup directory: {destination}"),
            "Copying files...".to_string(),
            "Backup completed successfully".to_string(),
        ]))
    }

    async fn organize_desktop(&self, memory: &MemoryHandle) -> Result<Response, AgentError> {
        let desktop = expand_home(DESKTOP).display().to_string();
        let entries = memory.list_file_index(Some(&desktop)).await?;

        let mut plan: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        let mut actions = Vec::new();
        for entry in &entries {
            let Some(ext) = entry.extension() else {
                continue;
            };
            if let Some((folder, _)) = DESKTOP_FOLDERS
                .iter()
                .find(|(_, exts)| exts.contains(&ext.as_str()))
            {
                actions.push(format!("Would move {} to {folder}/", entry.file_name()));
                plan.entry(*folder).or_default().push(entry.file_name().to_string());
            }
        }
        let count: usize = plan.values().map(Vec::len).sum();
        if entries.is_empty() {
            actions.push(format!("No indexed files under {desktop}; scan it with a file search first"));
        }

        Ok(
            Response::simulated(format!("Desktop organized - {count} files categorized"))
                .with_payload(json!({ "organized_count": count, "plan": plan }))
                .with_actions(actions),
        )
    }

    async fn schedule(&self, slots: &Slots, memory: &MemoryHandle) -> Result<Response, AgentError> {
        let Some(task) = slot(slots, "task") else {
            return Ok(Response::real(
                "What should I schedule? Try \"remind me to <task> every morning\".",
            ));
        };
        let when = slot(slots, "when").unwrap_or("unspecified");

        let id = memory.next_sequence(SCHEDULE_COUNT).await?;
        let record = json!({
            "id": id,
            "task": task,
            "schedule_time": when,
            "created_at": Utc::now(),
            "status": "scheduled",
        });
        memory.set_preference(&schedule_key(id), &record.to_string()).await?;
        tracing::info!(id, task, when, "Task scheduled");

        Ok(Response::simulated(format!("Task scheduled: {task} ({when})"))
            .with_payload(json!({ "task_id": id, "task": record }))
            .with_actions([format!("Added task to schedule with ID {id}")]))
    }

    fn create_tool(&self, slots: &Slots) -> Response {
        let description = slot(slots, "task").unwrap_or("general automation");
        let lower = description.to_lowercase();
        let suggestion = TOOL_SUGGESTIONS
            .iter()
            .find(|(keyword, _)| lower.contains(keyword))
            .map(|(_, s)| s.to_string())
            .unwrap_or_else(|| format!("Custom tool for: {description}"));

        Response::simulated(format!("Tool suggestion: {suggestion}"))
            .with_payload(json!({ "tool_description": description, "suggestion": suggestion }))
            .with_actions([
                format!("Analyzed request: {description}"),
                "Generated tool suggestion".to_string(),
            ])
    }
}

#[async_trait]
impl CapabilityHandler for AutomationHandler {
    fn capability(&self) -> Capability {
        Capability::Automation
    }

    async fn handle(
        &self,
        slots: &Slots,
        memory: &MemoryHandle,
        _timeout: Duration,
    ) -> Result<Response, AgentError> {
        match slot(slots, "action").unwrap_or("organize_desktop") {
            "backup" => self.backup(slots, memory).await,
            "schedule" => self.schedule(slots, memory).await,
            "create_tool" => Ok(self.create_tool(slots)),
            _ => self.organize_desktop(memory).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::store::{FileIndexEntry, LibSqlBackend, MemoryStore};

    fn slots(pairs: &[(&str, &str)]) -> Slots {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    async fn setup() -> (Arc<dyn MemoryStore>, MemoryHandle) {
        let store: Arc<dyn MemoryStore> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let memory = MemoryHandle::for_capability(Arc::clone(&store), Capability::Automation);
        (store, memory)
    }

    #[tokio::test]
    async fn schedule_records_task_preferences() {
        let (store, memory) = setup().await;
        let handler = AutomationHandler::new();
        for task in ["water plants", "pay rent"] {
            let resp = handler
                .handle(
                    &slots(&[("action", "schedule"), ("task", task), ("when", "every morning")]),
                    &memory,
                    Duration::from_secs(1),
                )
                .await
                .unwrap();
            assert!(resp.simulated);
        }

        assert_eq!(store.get_preference(SCHEDULE_COUNT).await.unwrap().unwrap().value, "2");
        let second = store.get_preference(&schedule_key(2)).await.unwrap().unwrap();
        let record: serde_json::Value = serde_json::from_str(&second.value).unwrap();
        assert_eq!(record["task"], "pay rent");
        assert_eq!(record["schedule_time"], "every morning");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_schedules_get_distinct_ids() {
        let (store, _) = setup().await;
        let handler = Arc::new(AutomationHandler::new());

        let mut tasks = Vec::new();
        for i in 0..20 {
            let handler = Arc::clone(&handler);
            let memory = MemoryHandle::for_capability(Arc::clone(&store), Capability::Automation);
            tasks.push(tokio::spawn(async move {
                let task = format!("task{i}");
                handler
                    .handle(
                        &slots(&[("action", "schedule"), ("task", &task), ("when", "daily")]),
                        &memory,
                        Duration::from_secs(5),
                    )
                    .await
                    .unwrap()
            }));
        }
        let mut ids = std::collections::BTreeSet::new();
        for task in tasks {
            let resp = task.await.unwrap();
            ids.insert(resp.structured_payload.unwrap()["task_id"].as_u64().unwrap());
        }

        assert_eq!(ids, (1..=20).collect());
        assert_eq!(store.get_preference(SCHEDULE_COUNT).await.unwrap().unwrap().value, "20");
        assert_eq!(store.stats().await.unwrap().preferences, 21);
    }

    #[tokio::test]
    async fn backup_uses_preferred_destination() {
        let (store, memory) = setup().await;
        store.set_preference(BACKUP_DESTINATION, "/mnt/nas").await.unwrap();
        let resp = AutomationHandler::new()
            .handle(&slots(&[("action", "backup")]), &memory, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(resp.simulated);
        assert_eq!(resp.summary, "Backup completed: ~/Documents -> /mnt/nas (now)");
        assert_eq!(resp.actions_taken.len(), 4);
    }

    #[tokio::test]
    async fn organize_desktop_plans_from_index() {
        let (store, memory) = setup().await;
        let desktop = expand_home(DESKTOP);
        store
            .upsert_file_index(&[
                FileIndexEntry::new(desktop.join("report.pdf").display().to_string(), 1, "a"),
                FileIndexEntry::new(desktop.join("cat.png").display().to_string(), 1, "b"),
                FileIndexEntry::new(desktop.join("mystery.bin").display().to_string(), 1, "c"),
            ])
            .await
            .unwrap();
        let resp = AutomationHandler::new()
            .handle(&Slots::new(), &memory, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(resp.summary, "Desktop organized - 2 files categorized");
        assert!(resp.actions_taken.contains(&"Would move report.pdf to Documents/".to_string()));
    }

    #[tokio::test]
    async fn create_tool_matches_keyword() {
        let (_, memory) = setup().await;
        let resp = AutomationHandler::new()
            .handle(
                &slots(&[("action", "create_tool"), ("task", "renames screenshots")]),
                &memory,
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        assert_eq!(resp.summary, "Tool suggestion: Batch renamer driven by a naming pattern");
    }
}
