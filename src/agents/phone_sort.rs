//! Phone photo sorting and contact cleanup (simulated).
//!
//! Needs the user's consent recorded as `phone.access=granted`.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::capability::{Capability, CapabilityHandler, Response, Slots, slot};
use crate::error::AgentError;
use crate::store::MemoryHandle;

pub const ACCESS_PREFERENCE: &str = "phone.access";
/// JSON array of `{name, phone, email}` synced from the phone.
pub const CONTACTS_PREFERENCE: &str = "phone.contacts";

/// Album for photos whose modification time is unknown.
const UNDATED_ALBUM: &str = "Undated";

const PHOTO_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "heic"];

#[derive(Debug, Deserialize)]
struct Contact {
    name: String,
    #[serde(default)]
    phone: String,
    #[serde(default)]
    email: String,
}

#[derive(Default)]
pub struct PhoneSortHandler;

impl PhoneSortHandler {
    pub fn new() -> Self {
        Self
    }

    async fn sort_photos(&self, memory: &MemoryHandle) -> Result<Response, AgentError> {
        let photos: Vec<_> = memory
            .list_file_index(None)
            .await?
            .into_iter()
            .filter(|e| {
                e.extension()
                    .is_some_and(|ext| PHOTO_EXTENSIONS.contains(&ext.as_str()))
            })
            .collect();

        let mut albums: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut actions = Vec::new();
        for photo in &photos {
            let name = photo.file_name();
            let album = if name.to_lowercase().contains("screenshot") {
                "Screenshots".to_string()
            } else {
                match photo.modified {
                    Some(taken) => taken.format("%Y-%m").to_string(),
                    None => UNDATED_ALBUM.to_string(),
                }
            };
            actions.push(format!("Would move {name} to {album}/"));
            albums.entry(album).or_default().push(name.to_string());
        }

        Ok(Response::simulated(format!(
            "Photos organized - {} photos sorted into {} albums",
            photos.len(),
            albums.len()
        ))
        .with_payload(json!({ "sorted_count": photos.len(), "albums": albums }))
        .with_actions(actions))
    }

    async fn clean_contacts(&self, memory: &MemoryHandle) -> Result<Response, AgentError> {
        let contacts: Vec<Contact> = match memory.get_preference(CONTACTS_PREFERENCE).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map_err(|e| AgentError::Internal(format!("Contact list is unreadable: {e}")))?,
            None => Vec::new(),
        };

        let mut seen = HashSet::new();
        let mut kept = Vec::new();
        let mut actions = Vec::new();
        let mut duplicates = 0usize;
        for contact in &contacts {
            if seen.insert(contact.name.trim().to_lowercase()) {
                kept.push(contact);
            } else {
                duplicates += 1;
                actions.push(format!("Found duplicate: {}", contact.name));
            }
        }
        for contact in &kept {
            if contact.phone.trim().is_empty() {
                actions.push(format!("Missing phone for: {}", contact.name));
            }
            if contact.email.trim().is_empty() {
                actions.push(format!("Missing email for: {}", contact.name));
            }
        }

        Ok(Response::simulated(format!(
            "Contacts cleaned - {duplicates} duplicates found, {} contacts remaining",
            kept.len()
        ))
        .with_payload(json!({
            "original_count": contacts.len(),
            "cleaned_count": kept.len(),
            "duplicates_removed": duplicates,
        }))
        .with_actions(actions))
    }
}

#[async_trait]
impl CapabilityHandler for PhoneSortHandler {
    fn capability(&self) -> Capability {
        Capability::PhoneSort
    }

    async fn handle(
        &self,
        slots: &Slots,
        memory: &MemoryHandle,
        _timeout: Duration,
    ) -> Result<Response, AgentError> {
        if memory.get_preference(ACCESS_PREFERENCE).await?.as_deref() != Some("granted") {
            return Err(AgentError::SimulatedDenied(
                "Phone access has not been granted".into(),
            ));
        }

        match slot(slots, "action").unwrap_or("sort_photos") {
            "clean_contacts" => self.clean_contacts(memory).await,
            _ => self.sort_photos(memory).await,
        }
    }
}
