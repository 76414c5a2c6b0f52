//! Remote draft store backed by a directory of JSON files.
//!
//! Stands in for the CRM's draft service when composing from the terminal:
//! one `{contact}.json` per draft under `{dir}/{user}/`, stamped with the
//! store's own clock and versioned on every upsert.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Utc;
use outreach_drafts::local::encode_file_name;
use outreach_drafts::{
    DraftError, DraftRecordMetadata, RemoteDraftRecord, RemoteDraftStore, UpsertDraft,
};
use smol_str::SmolStr;
use tokio::sync::Mutex;

pub struct FileDraftStore {
    user_id: SmolStr,
    dir: PathBuf,
    // Serializes read-modify-write of a record.
    write_lock: Mutex<()>,
}

impl FileDraftStore {
    pub fn open(root: impl AsRef<Path>, user_id: impl Into<SmolStr>) -> Result<Self, DraftError> {
        let user_id = user_id.into();
        let dir = root.as_ref().join(encode_file_name(&user_id));
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            user_id,
            dir,
            write_lock: Mutex::new(()),
        })
    }

    fn path_for(&self, contact_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", encode_file_name(contact_id)))
    }

    async fn read(&self, contact_id: &str) -> Result<Option<RemoteDraftRecord>, DraftError> {
        match tokio::fs::read_to_string(self.path_for(contact_id)).await {
            Ok(text) => Ok(Some(serde_json::from_str(&text)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DraftError::Remote(e.to_string())),
        }
    }

    /// Every draft held for this user, newest first.
    pub async fn list(&self) -> Result<Vec<RemoteDraftRecord>, DraftError> {
        let mut records = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let text = tokio::fs::read_to_string(&path).await?;
            match serde_json::from_str::<RemoteDraftRecord>(&text) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(path = %path.display(), "skipping unreadable draft: {}", e)
                }
            }
        }
        records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(records)
    }

    /// Remove the draft for `contact_id`. Returns whether one existed.
    pub async fn delete(&self, contact_id: &str) -> Result<bool, DraftError> {
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(self.path_for(contact_id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(DraftError::Remote(e.to_string())),
        }
    }
}

impl RemoteDraftStore for FileDraftStore {
    async fn upsert_draft(&self, draft: UpsertDraft) -> Result<DraftRecordMetadata, DraftError> {
        let _guard = self.write_lock.lock().await;
        let now = Utc::now();

        let record = match self.read(&draft.contact_id).await? {
            Some(existing) => RemoteDraftRecord {
                subject: draft.subject,
                body_html: draft.body_html,
                updated_at: now,
                version: Some(existing.version.unwrap_or(0) + 1),
                ..existing
            },
            None => RemoteDraftRecord {
                id: SmolStr::new(uuid::Uuid::now_v7().to_string()),
                user_id: self.user_id.clone(),
                contact_id: draft.contact_id,
                subject: draft.subject,
                body_html: draft.body_html,
                updated_at: now,
                version: Some(1),
            },
        };

        let path = self.path_for(&record.contact_id);
        let tmp = path.with_extension("tmp");
        let text = serde_json::to_string_pretty(&record)?;
        tokio::fs::write(&tmp, text)
            .await
            .map_err(|e| DraftError::Remote(e.to_string()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| DraftError::Remote(e.to_string()))?;

        tracing::debug!(contact_id = %record.contact_id, version = ?record.version, "stored draft");
        Ok(record.metadata())
    }

    async fn get_draft_by_contact(
        &self,
        contact_id: &str,
    ) -> Result<Option<RemoteDraftRecord>, DraftError> {
        self.read(contact_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use outreach_drafts::DraftContent;

    #[tokio::test]
    async fn test_upsert_and_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileDraftStore::open(dir.path(), "u1").unwrap();

        assert!(store.get_draft_by_contact("c1").await.unwrap().is_none());

        let first = store
            .upsert_draft(UpsertDraft::new("c1", DraftContent::new("Hi", "<p>one</p>")))
            .await
            .unwrap();
        let second = store
            .upsert_draft(UpsertDraft::new("c1", DraftContent::new("Hi", "<p>two</p>")))
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.version, Some(2));
        assert!(second.updated_at >= first.updated_at);

        let record = store.get_draft_by_contact("c1").await.unwrap().unwrap();
        assert_eq!(record.body_html, "<p>two</p>");
        assert_eq!(record.user_id, "u1");
    }

    #[tokio::test]
    async fn test_list_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileDraftStore::open(dir.path(), "u1").unwrap();
        for contact in ["a", "b/c"] {
            store
                .upsert_draft(UpsertDraft::new(contact, DraftContent::new(contact, "")))
                .await
                .unwrap();
        }

        assert_eq!(store.list().await.unwrap().len(), 2);
        assert!(store.delete("b/c").await.unwrap());
        assert!(!store.delete("b/c").await.unwrap());
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_users_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let alice = FileDraftStore::open(dir.path(), "alice").unwrap();
        let bob = FileDraftStore::open(dir.path(), "bob").unwrap();

        alice
            .upsert_draft(UpsertDraft::new("c1", DraftContent::new("from alice", "")))
            .await
            .unwrap();
        assert!(bob.get_draft_by_contact("c1").await.unwrap().is_none());
    }
}
