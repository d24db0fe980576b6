//! Draft store collaborators.
//!
//! The store only ever sees whole records: every write replaces the record
//! for a post, and there is no partial update.

use std::collections::HashMap;
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use inscript_common::SyncError;
use inscript_editor_core::DraftRecord;
use n0_future::time::{self, Duration};
use smol_str::SmolStr;
use tracing::{debug, info};

pub trait DraftStore: Send + Sync + 'static {
    /// The stored record, or `None` when the post has no draft.
    fn read_draft(
        &self,
        post_id: &str,
    ) -> impl Future<Output = Result<Option<DraftRecord>, SyncError>> + Send;

    /// Replace the record for `post_id`.
    fn write_draft(
        &self,
        post_id: &str,
        record: &DraftRecord,
    ) -> impl Future<Output = Result<(), SyncError>> + Send;

    /// Remove the record for `post_id`. Removing a missing draft succeeds.
    fn delete_draft(&self, post_id: &str) -> impl Future<Output = Result<(), SyncError>> + Send;
}

/// In-process draft store.
///
/// Clones share the same map, so a test can keep a handle while the session
/// owns another. Every operation can be made to fail, and writes can be
/// delayed to exercise overlapping completions.
#[derive(Debug, Clone, Default)]
pub struct MemoryDraftStore {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    drafts: HashMap<SmolStr, DraftRecord>,
    writes: Vec<(SmolStr, DraftRecord)>,
    deletes: usize,
    failure: Option<String>,
    latency: Option<Duration>,
}

impl MemoryDraftStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed a record without counting it as a write.
    pub fn insert(&self, post_id: impl Into<SmolStr>, record: DraftRecord) {
        self.inner().drafts.insert(post_id.into(), record);
    }

    pub fn get(&self, post_id: &str) -> Option<DraftRecord> {
        self.inner().drafts.get(post_id).cloned()
    }

    pub fn contains(&self, post_id: &str) -> bool {
        self.inner().drafts.contains_key(post_id)
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> usize {
        self.inner().writes.len()
    }

    /// Every successful write, oldest first.
    pub fn writes(&self) -> Vec<(SmolStr, DraftRecord)> {
        self.inner().writes.clone()
    }

    pub fn delete_count(&self) -> usize {
        self.inner().deletes
    }

    /// Make every subsequent operation fail with `message`, or succeed again
    /// with `None`.
    pub fn set_failure(&self, message: Option<&str>) {
        self.inner().failure = message.map(str::to_string);
    }

    /// Delay every subsequent write by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.inner().latency = latency;
    }

    fn check_failure(&self) -> Result<(), SyncError> {
        match &self.inner().failure {
            Some(message) => Err(SyncError::Unavailable {
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }
}

impl DraftStore for MemoryDraftStore {
    async fn read_draft(&self, post_id: &str) -> Result<Option<DraftRecord>, SyncError> {
        self.check_failure()?;
        Ok(self.get(post_id))
    }

    async fn write_draft(&self, post_id: &str, record: &DraftRecord) -> Result<(), SyncError> {
        let latency = self.inner().latency;
        if let Some(latency) = latency {
            time::sleep(latency).await;
        }
        self.check_failure()?;

        let mut inner = self.inner();
        inner.drafts.insert(post_id.into(), record.clone());
        inner.writes.push((post_id.into(), record.clone()));
        Ok(())
    }

    async fn delete_draft(&self, post_id: &str) -> Result<(), SyncError> {
        self.check_failure()?;
        let mut inner = self.inner();
        inner.drafts.remove(post_id);
        inner.deletes += 1;
        Ok(())
    }
}

/// One JSON file per post under a drafts directory.
///
/// The record for `hello.md` lives at `<root>/hello.md.json`. Writes go to a
/// temporary sibling first and are renamed into place.
#[derive(Debug, Clone)]
pub struct FileDraftStore {
    root: PathBuf,
}

impl FileDraftStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the record for `post_id`, rejecting identifiers that would
    /// escape the drafts directory.
    pub fn path_for(&self, post_id: &str) -> Result<PathBuf, SyncError> {
        validate_post_id(post_id)?;
        Ok(self.root.join(format!("{post_id}.json")))
    }

    /// Identifiers of every stored draft, sorted.
    pub async fn list_drafts(&self) -> Result<Vec<SmolStr>, SyncError> {
        let io_err = |source| SyncError::Io {
            post_id: SmolStr::default(),
            path: self.root.clone(),
            source,
        };

        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err(e)),
        };

        let mut ids = Vec::new();
        while let Some(entry) = dir.next_entry().await.map_err(io_err)? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.starts_with('.') {
                continue;
            }
            if let Some(post_id) = name.strip_suffix(".json") {
                ids.push(SmolStr::new(post_id));
            }
        }
        ids.sort();
        Ok(ids)
    }
}

impl DraftStore for FileDraftStore {
    async fn read_draft(&self, post_id: &str) -> Result<Option<DraftRecord>, SyncError> {
        let path = self.path_for(post_id)?;
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(SyncError::Io {
                    post_id: post_id.into(),
                    path,
                    source,
                });
            }
        };

        let record = serde_json::from_str(&text).map_err(|e| SyncError::Decode {
            post_id: post_id.into(),
            message: e.to_string(),
        })?;
        Ok(Some(record))
    }

    async fn write_draft(&self, post_id: &str, record: &DraftRecord) -> Result<(), SyncError> {
        let path = self.path_for(post_id)?;
        let io_err = |path: &Path, source| SyncError::Io {
            post_id: post_id.into(),
            path: path.to_path_buf(),
            source,
        };

        let json = serde_json::to_string_pretty(record).map_err(|e| SyncError::Encode {
            post_id: post_id.into(),
            message: e.to_string(),
        })?;

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| io_err(&self.root, e))?;

        let tmp = self.root.join(format!(".{post_id}.json.tmp"));
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| io_err(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| io_err(&path, e))?;

        debug!(post_id, path = %path.display(), entries = record.entries.len(), "draft file written");
        Ok(())
    }

    async fn delete_draft(&self, post_id: &str) -> Result<(), SyncError> {
        let path = self.path_for(post_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!(post_id, "draft file removed");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(SyncError::Io {
                post_id: post_id.into(),
                path,
                source,
            }),
        }
    }
}

/// Post identifiers are bare file names.
pub fn validate_post_id(post_id: &str) -> Result<(), SyncError> {
    let invalid = post_id.is_empty()
        || post_id.starts_with('.')
        || post_id.contains("..")
        || post_id.contains(['/', '\\', '\0']);
    if invalid {
        return Err(SyncError::InvalidPostId {
            post_id: post_id.into(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use inscript_editor_core::{DocumentState, Snapshot};

    use super::*;

    fn record(contents: &[&str]) -> DraftRecord {
        let entries: Vec<Snapshot> = contents
            .iter()
            .map(|c| DocumentState::new(*c, "T").capture(Utc::now()))
            .collect();
        let cursor = entries.len() - 1;
        DraftRecord::new(entries, cursor)
    }

    #[tokio::test]
    async fn test_memory_store_round_trip_and_counters() {
        let store = MemoryDraftStore::new();
        assert!(store.read_draft("a.md").await.unwrap().is_none());

        store.write_draft("a.md", &record(&["x", "y"])).await.unwrap();
        assert_eq!(store.write_count(), 1);
        assert_eq!(store.read_draft("a.md").await.unwrap().unwrap().entries.len(), 2);

        store.delete_draft("a.md").await.unwrap();
        assert!(!store.contains("a.md"));
        assert_eq!(store.delete_count(), 1);
    }

    #[tokio::test]
    async fn test_memory_store_failure_switch() {
        let store = MemoryDraftStore::new();
        store.set_failure(Some("offline"));
        let err = store.write_draft("a.md", &record(&["x", "y"])).await.unwrap_err();
        assert!(matches!(err, SyncError::Unavailable { .. }));
        assert_eq!(store.write_count(), 0);

        store.set_failure(None);
        store.write_draft("a.md", &record(&["x", "y"])).await.unwrap();
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileDraftStore::new(dir.path().join("drafts"));

        assert!(store.read_draft("hello.md").await.unwrap().is_none());

        let written = record(&["<p>a</p>", "<p>b</p>"]);
        store.write_draft("hello.md", &written).await.unwrap();
        assert!(dir.path().join("drafts/hello.md.json").exists());
        assert!(!dir.path().join("drafts/.hello.md.json.tmp").exists());

        let read = store.read_draft("hello.md").await.unwrap().unwrap();
        assert_eq!(read, written);
        assert_eq!(store.list_drafts().await.unwrap(), vec![SmolStr::new("hello.md")]);

        store.delete_draft("hello.md").await.unwrap();
        store.delete_draft("hello.md").await.unwrap();
        assert!(store.read_draft("hello.md").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_store_reads_legacy_records() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("old.md.json"),
            r#"{ "history": [ { "html": "<p>a</p>", "title": "Old", "isOriginal": true } ], "currentIndex": 0 }"#,
        )
        .unwrap();

        let store = FileDraftStore::new(dir.path());
        let read = store.read_draft("old.md").await.unwrap().unwrap();
        assert_eq!(read.entries[0].content, "<p>a</p>");
        assert_eq!(read.cursor, Some(0));
    }

    #[tokio::test]
    async fn test_file_store_rejects_corrupt_json() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.md.json"), "{ not json").unwrap();
        let store = FileDraftStore::new(dir.path());
        let err = store.read_draft("bad.md").await.unwrap_err();
        assert!(matches!(err, SyncError::Decode { .. }));
    }

    #[test]
    fn test_post_id_validation() {
        assert!(validate_post_id("hello.md").is_ok());
        assert!(validate_post_id("2024-01-01-notes.md").is_ok());
        for bad in ["", "../x.md", "a/b.md", "a\\b.md", ".hidden", "a..md"] {
            assert!(
                matches!(validate_post_id(bad), Err(SyncError::InvalidPostId { .. })),
                "{bad:?} accepted"
            );
        }
    }
}
